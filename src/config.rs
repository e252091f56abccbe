use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file read when neither `--config-file` nor `STOCKPILER_CONFIG` is given (if present).
pub const DEFAULT_CONFIG_PATH: &str = "/etc/stockpiler/stockpiler.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inventory: InventoryConfig,
    pub runner: RunnerConfig,
    pub stockpile: StockpileConfig,
    pub probe: ProbeConfig,
    pub ssh: SshConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub hosts_file: PathBuf,
    /// Skipped when the file does not exist.
    pub groups_file: PathBuf,
    /// Skipped when the file does not exist.
    pub defaults_file: PathBuf,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            hosts_file: "/etc/stockpiler/hosts.yaml".into(),
            groups_file: "/etc/stockpiler/groups.yaml".into(),
            defaults_file: "/etc/stockpiler/defaults.yaml".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// How many devices are worked on at once.
    pub num_workers: usize,
    /// Upper bound for a single device's procedure; the device is recorded as failed past it.
    pub device_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            num_workers: 20,
            device_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StockpileConfig {
    pub output_dir: PathBuf,
    pub backup_command: String,
    /// Commit messages are `<commit_label> <ISO-8601 UTC>`.
    pub commit_label: String,
}

impl Default for StockpileConfig {
    fn default() -> Self {
        Self {
            output_dir: "/opt/stockpiler".into(),
            backup_command: "more system:running-config".into(),
            commit_label: "Stockpile Built at".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_ms: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub connect_timeout_secs: u64,
    /// Max silence while waiting for the device prompt.
    pub command_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            command_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: "ASDM".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "/var/log/stockpiler".into(),
            level: "info".into(),
        }
    }
}

impl AppConfig {
    /// Explicit path > `STOCKPILER_CONFIG` > `DEFAULT_CONFIG_PATH` (if present) > built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => match std::env::var("STOCKPILER_CONFIG") {
                Ok(p) => Some(PathBuf::from(p)),
                Err(_) => {
                    let default = Path::new(DEFAULT_CONFIG_PATH);
                    default.is_file().then(|| default.to_path_buf())
                }
            },
        };
        let Some(path) = path else {
            let config = AppConfig::default();
            config.validate()?;
            return Ok(config);
        };
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.inventory.hosts_file.as_os_str().is_empty(),
            "inventory.hosts_file must be non-empty"
        );
        anyhow::ensure!(
            self.runner.num_workers > 0,
            "runner.num_workers must be > 0, got {}",
            self.runner.num_workers
        );
        anyhow::ensure!(
            self.runner.device_timeout_secs > 0,
            "runner.device_timeout_secs must be > 0, got {}",
            self.runner.device_timeout_secs
        );
        anyhow::ensure!(
            !self.stockpile.output_dir.as_os_str().is_empty(),
            "stockpile.output_dir must be non-empty"
        );
        anyhow::ensure!(
            !self.stockpile.backup_command.trim().is_empty(),
            "stockpile.backup_command must be non-empty"
        );
        anyhow::ensure!(
            !self.stockpile.commit_label.trim().is_empty(),
            "stockpile.commit_label must be non-empty"
        );
        anyhow::ensure!(
            self.probe.timeout_ms > 0,
            "probe.timeout_ms must be > 0, got {}",
            self.probe.timeout_ms
        );
        anyhow::ensure!(
            self.ssh.connect_timeout_secs > 0,
            "ssh.connect_timeout_secs must be > 0, got {}",
            self.ssh.connect_timeout_secs
        );
        anyhow::ensure!(
            self.ssh.command_timeout_secs > 0,
            "ssh.command_timeout_secs must be > 0, got {}",
            self.ssh.command_timeout_secs
        );
        anyhow::ensure!(
            self.http.timeout_secs > 0,
            "http.timeout_secs must be > 0, got {}",
            self.http.timeout_secs
        );
        anyhow::ensure!(
            LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()),
            "logging.level must be one of {:?}, got {:?}",
            LOG_LEVELS,
            self.logging.level
        );
        Ok(())
    }
}
