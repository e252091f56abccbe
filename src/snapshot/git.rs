// Local git repository holding the stockpile: open-or-init, stage everything, commit.

use anyhow::Context;
use git2::{ErrorCode, IndexAddOption, Oid, Repository, Signature};
use std::path::Path;
use tracing::info;

pub const AUTHOR_NAME: &str = "Stockpiler";
pub const AUTHOR_EMAIL: &str = "stockpiler@localhost.local";

/// Create `dir` if needed; open the repository in it, or initialize one.
pub fn open_or_init(dir: &Path) -> anyhow::Result<Repository> {
    if !dir.is_dir() {
        info!(path = %dir.display(), "output directory does not exist, creating it");
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    if dir.join(".git").is_dir() {
        info!(path = %dir.display(), "reading existing repository");
        Repository::open(dir).with_context(|| format!("opening repository {}", dir.display()))
    } else {
        info!(path = %dir.display(), "no repository found, initializing one");
        Repository::init(dir).with_context(|| format!("initializing repository {}", dir.display()))
    }
}

/// Stage every addition, modification and deletion in the working tree.
pub fn stage_all(repo: &Repository) -> anyhow::Result<()> {
    let mut index = repo.index()?;
    index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"], None)?;
    index.write()?;
    Ok(())
}

/// Commit the index on top of HEAD (or as the root commit). Commits even when nothing changed.
pub fn commit(repo: &Repository, message: &str) -> anyhow::Result<Oid> {
    let signature = Signature::now(AUTHOR_NAME, AUTHOR_EMAIL)?;
    let tree_id = repo.index()?.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    Ok(oid)
}
