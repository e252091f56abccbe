// Command line: flags override the loaded config; --command / --config switch to ad-hoc mode.

use crate::adhoc::AdhocAction;
use crate::config::AppConfig;
use crate::credentials::{CredentialRequest, DEFAULT_CREDENTIAL_FILE};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    name = "stockpiler",
    version = crate::version::VERSION,
    about = "Back up network device configurations into a git-versioned stockpile"
)]
pub struct Cli {
    /// Inventory hosts file
    #[arg(short = 'i', long)]
    pub inventory: Option<PathBuf>,

    /// Application config file (TOML)
    #[arg(short = 'c', long)]
    pub config_file: Option<PathBuf>,

    /// Directory holding the stockpile repository
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// SOCKS5 proxy (HOST:PORT) for HTTPS management traffic
    #[arg(short = 'p', long)]
    pub proxy: Option<String>,

    /// Prompt for credentials
    #[arg(long)]
    pub credential_prompt: bool,

    /// Read credentials from a base64 file (default path when no value is given)
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_CREDENTIAL_FILE)]
    pub credential_file: Option<PathBuf>,

    /// Use only the credentials defined in the inventory
    #[arg(long)]
    pub credential_from_inventory: bool,

    /// Only run against hosts with these addresses
    #[arg(short = 'a', long, num_args = 1..)]
    pub addresses: Vec<String>,

    /// Run one command on every selected device and print the output
    #[arg(long, conflicts_with = "config")]
    pub command: Option<String>,

    /// Push semicolon-separated configuration lines to every selected device
    #[arg(long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Directory for stockpiler.log
    #[arg(long)]
    pub logging_dir: Option<PathBuf>,

    /// Devices worked on at once
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(path) = &self.inventory {
            config.inventory.hosts_file = path.clone();
        }
        if let Some(dir) = &self.output {
            config.stockpile.output_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(dir) = &self.logging_dir {
            config.logging.dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.runner.num_workers = workers;
        }
    }

    pub fn credential_request(&self) -> CredentialRequest {
        CredentialRequest {
            from_inventory: self.credential_from_inventory,
            file: self.credential_file.clone(),
            prompt: self.credential_prompt,
        }
    }

    /// `None` means the default stockpile run.
    pub fn adhoc_action(&self) -> Option<AdhocAction> {
        if let Some(command) = &self.command {
            return Some(AdhocAction::Command(command.clone()));
        }
        self.config.as_deref().map(AdhocAction::config_from_arg)
    }
}
