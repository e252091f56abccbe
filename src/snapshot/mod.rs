// Snapshot committer: on run completion, write results.csv into the stockpile and
// commit the whole working tree as one labelled snapshot.

pub mod git;
pub mod report;

pub use report::{REPORT_FILE, write_report};

use crate::fleet::RunObserver;
use crate::models::{DeviceResult, FleetRun, report_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

/// Commit message for a snapshot taken at `at`.
pub fn commit_message(label: &str, at: &DateTime<Utc>) -> String {
    format!("{} {}", label, report_timestamp(at))
}

/// Open-or-init the repository, write the report, stage everything, commit.
pub fn commit_snapshot(output_dir: &Path, label: &str, run: &FleetRun) -> anyhow::Result<git2::Oid> {
    let repo = git::open_or_init(output_dir)?;
    let rows = write_report(&output_dir.join(REPORT_FILE), run)?;
    git::stage_all(&repo)?;
    let message = commit_message(label, &Utc::now());
    let oid = git::commit(&repo, &message)?;
    info!(commit = %oid, rows, message = %message, "snapshot committed");
    Ok(oid)
}

/// Prints run progress to stdout and commits the stockpile when the run completes.
#[derive(Debug, Clone)]
pub struct SnapshotCommitter {
    output_dir: PathBuf,
    commit_label: String,
}

impl SnapshotCommitter {
    pub fn new(output_dir: impl Into<PathBuf>, commit_label: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            commit_label: commit_label.into(),
        }
    }
}

#[async_trait]
impl RunObserver for SnapshotCommitter {
    fn run_started(&self, started_at: DateTime<Utc>, _devices: usize) {
        println!("Backup Task Start Time: {}", report_timestamp(&started_at));
    }

    fn device_completed(&self, device: &str, result: &DeviceResult) {
        let status = if result.succeeded() {
            "Successful"
        } else {
            "Failed"
        };
        println!("  - {}: Stockpile {}", device, status);
    }

    async fn run_completed(&self, run: &FleetRun) -> anyhow::Result<()> {
        println!("Backup Task End Time: {}", report_timestamp(&run.finished_at));
        println!(
            "Backup Task Elapsed Time: {:.3}s",
            run.elapsed().num_milliseconds() as f64 / 1000.0
        );
        let output_dir = self.output_dir.clone();
        let label = self.commit_label.clone();
        let run = run.clone();
        tokio::task::spawn_blocking(move || commit_snapshot(&output_dir, &label, &run)).await??;
        Ok(())
    }
}
