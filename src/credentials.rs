// Credential provider: resolved once, before any device is contacted.
// Order: inventory-only > explicit credential file > prompt > environment > default credential file.

use crate::inventory::Device;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::{BufRead, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CREDENTIAL_FILE: &str = "/opt/stockpiler/credentials.b64";

pub const ENV_USER: &str = "STOCKPILER_USER";
pub const ENV_PASSWORD: &str = "STOCKPILER_PW";
pub const ENV_ENABLE: &str = "STOCKPILER_ENABLE";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No credentials have been provided!")]
    Missing,
    #[error("{} is not found!", .0.display())]
    NotFound(PathBuf),
    #[error("{} is not owned by user `{}`!", .path.display(), .user)]
    NotOwned { path: PathBuf, user: String },
    #[error(
        "{} has bad permissions: `{:03o}`. Please restrict to only {}",
        .path.display(),
        .mode,
        .user
    )]
    BadPermissions {
        path: PathBuf,
        mode: u32,
        user: String,
    },
    #[error(
        "{} is not able to be parsed into STOCKPILER_USER:username\\nSTOCKPILER_PW:password: {}",
        .path.display(),
        .reason
    )]
    Format { path: PathBuf, reason: String },
    #[error("reading credentials: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub enable: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("enable", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        enable: Option<String>,
    ) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            enable: enable.unwrap_or_else(|| password.clone()),
            password,
        }
    }

    /// Install as inventory-wide defaults. Values a device already got from its
    /// host, groups or inventory defaults are kept.
    pub fn apply_to(&self, devices: &mut [Device]) {
        for device in devices {
            device.username.get_or_insert_with(|| self.username.clone());
            device.password.get_or_insert_with(|| self.password.clone());
            device.secret.get_or_insert_with(|| self.enable.clone());
        }
    }
}

/// Where the credentials should come from, as requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct CredentialRequest {
    pub from_inventory: bool,
    pub file: Option<PathBuf>,
    pub prompt: bool,
}

/// Source of interactive answers; stdin/tty in the binary, scripted in tests.
pub trait Prompter {
    fn read_line(&mut self, prompt: &str) -> std::io::Result<String>;
    fn read_secret(&mut self, prompt: &str) -> std::io::Result<String>;
}

pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn read_line(&mut self, prompt: &str) -> std::io::Result<String> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut input = String::new();
        std::io::stdin().lock().read_line(&mut input)?;
        Ok(input.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_secret(&mut self, prompt: &str) -> std::io::Result<String> {
        rpassword::prompt_password(prompt)
    }
}

/// Resolve credentials. `Ok(None)` means keep what the inventory provides.
pub fn resolve(
    request: &CredentialRequest,
    prompter: &mut dyn Prompter,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<Credentials>, CredentialError> {
    if request.from_inventory {
        debug!("using credentials from the inventory");
        return Ok(None);
    }
    if let Some(path) = &request.file {
        info!(path = %path.display(), "reading credentials from file");
        return read_credential_file(path).map(Some);
    }
    if request.prompt {
        let username = prompter.read_line("Please provide a username for backup execution: ")?;
        let password =
            prompter.read_secret("Please provide a password for backup execution: ")?;
        return Ok(Some(Credentials::new(username, password, None)));
    }
    if let (Some(user), Some(password)) = (env(ENV_USER), env(ENV_PASSWORD)) {
        debug!("using credentials from the environment");
        return Ok(Some(Credentials::new(user, password, env(ENV_ENABLE))));
    }
    let default = Path::new(DEFAULT_CREDENTIAL_FILE);
    if default.is_file() {
        info!(path = %default.display(), "reading credentials from default file");
        return read_credential_file(default).map(Some);
    }
    Err(CredentialError::Missing)
}

/// Resolve with the real terminal and process environment.
pub fn resolve_from_process(
    request: &CredentialRequest,
) -> Result<Option<Credentials>, CredentialError> {
    resolve(request, &mut TerminalPrompter, |key| std::env::var(key).ok())
}

fn current_user() -> String {
    let uid = nix::unistd::Uid::current();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

/// Ownership and mode are checked before any content is read.
pub fn read_credential_file(path: &Path) -> Result<Credentials, CredentialError> {
    if !path.is_file() {
        return Err(CredentialError::NotFound(path.to_path_buf()));
    }
    let meta = std::fs::metadata(path)?;
    if meta.uid() != nix::unistd::Uid::current().as_raw() {
        return Err(CredentialError::NotOwned {
            path: path.to_path_buf(),
            user: current_user(),
        });
    }
    let mode = meta.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(CredentialError::BadPermissions {
            path: path.to_path_buf(),
            mode,
            user: current_user(),
        });
    }
    let encoded = std::fs::read_to_string(path)?;
    parse_credential_payload(&encoded).map_err(|reason| CredentialError::Format {
        path: path.to_path_buf(),
        reason,
    })
}

/// Decode `STOCKPILER_USER:u STOCKPILER_PW:p [STOCKPILER_ENABLE:e]` from base64.
pub fn parse_credential_payload(encoded: &str) -> Result<Credentials, String> {
    let compact: String = encoded.split_whitespace().collect();
    let decoded = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid base64: {}", e))?;
    let text = String::from_utf8(decoded).map_err(|_| "decoded payload is not UTF-8".to_string())?;

    let values = text
        .split_whitespace()
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(_, v)| v.to_string())
                .ok_or_else(|| format!("entry without `:` separator ({} chars)", entry.len()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match <[String; 3]>::try_from(values) {
        Ok([user, password, enable]) => Ok(Credentials::new(user, password, Some(enable))),
        Err(values) => match <[String; 2]>::try_from(values) {
            Ok([user, password]) => Ok(Credentials::new(user, password, None)),
            Err(values) => Err(format!("expected 2 or 3 entries, found {}", values.len())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(s: &str) -> String {
        STANDARD.encode(s)
    }

    #[test]
    fn two_entries_reuse_password_for_enable() {
        let creds =
            parse_credential_payload(&encode("STOCKPILER_USER:admin\nSTOCKPILER_PW:s3cr:et\n"))
                .unwrap();
        assert_eq!(creds, Credentials::new("admin", "s3cr:et", Some("s3cr:et".into())));
    }

    #[test]
    fn three_entries_keep_enable() {
        let creds = parse_credential_payload(&encode(
            "STOCKPILER_USER:admin\nSTOCKPILER_PW:pw\nSTOCKPILER_ENABLE:en\n",
        ))
        .unwrap();
        assert_eq!(creds.enable, "en");
    }

    #[test]
    fn other_counts_are_format_errors() {
        assert!(parse_credential_payload(&encode("STOCKPILER_USER:admin\n")).is_err());
        assert!(parse_credential_payload("").is_err());
        assert!(parse_credential_payload("not base64 at all!").is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new("admin", "hunter2", None);
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
