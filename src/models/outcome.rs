// Backup outcome: one record per device per run.
// Created with every flag false, mutated as the procedure advances, read-only afterwards.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_HTTP_MGMT_PORT: u16 = 8443;

/// Fixed report columns, in order. Extension keys follow these.
pub const REPORT_COLUMNS: [&str; 13] = [
    "ip",
    "hostname",
    "http_management",
    "http_mgmt_port",
    "http_port_check_ok",
    "ssh_mgmt_port",
    "ssh_port_check_ok",
    "backup_successful",
    "save_config_successful",
    "http_used",
    "ssh_used",
    "last_backup_attempt",
    "last_successful_backup",
];

/// Which transport retrieved (or attempted) a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Ssh,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => f.write_str("HTTPS"),
            TransportKind::Ssh => f.write_str("SSH"),
        }
    }
}

/// Platform-specific attribute reported as an extra column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraValue::Bool(b) => f.write_str(report_bool(*b)),
            ExtraValue::Int(i) => write!(f, "{}", i),
            ExtraValue::Text(s) => f.write_str(s),
        }
    }
}

/// Booleans are rendered the way earlier reports in existing stockpiles render them.
pub fn report_bool(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

pub fn report_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupOutcome {
    /// Identity of this record, `<inventory name>_backup`. Not reported.
    pub name: String,
    pub ip: String,
    pub hostname: String,
    pub http_management: bool,
    pub http_mgmt_port: u16,
    pub http_port_check_ok: bool,
    pub ssh_mgmt_port: u16,
    pub ssh_port_check_ok: bool,
    pub backup_successful: bool,
    pub save_config_successful: bool,
    pub http_used: bool,
    pub ssh_used: bool,
    pub last_backup_attempt: DateTime<Utc>,
    pub last_successful_backup: Option<DateTime<Utc>>,
    /// Retrieved configuration; only held long enough to write the device file.
    pub device_config: Option<String>,
    pub extra: BTreeMap<String, ExtraValue>,
}

impl BackupOutcome {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            hostname: hostname.into(),
            http_management: false,
            http_mgmt_port: DEFAULT_HTTP_MGMT_PORT,
            http_port_check_ok: false,
            ssh_mgmt_port: DEFAULT_SSH_PORT,
            ssh_port_check_ok: false,
            backup_successful: false,
            save_config_successful: false,
            http_used: false,
            ssh_used: false,
            last_backup_attempt: Utc::now(),
            last_successful_backup: None,
            device_config: None,
            extra: BTreeMap::new(),
        }
    }

    /// Records a usable configuration retrieved over `via`.
    /// Only the first retrieval counts; later calls are ignored so at most one transport is marked used.
    /// Blank or whitespace-only text is not a usable configuration.
    pub fn record_backup(&mut self, via: TransportKind, config: String) -> bool {
        if self.backup_successful || config.trim().is_empty() {
            return false;
        }
        self.device_config = Some(config);
        self.backup_successful = true;
        match via {
            TransportKind::Http => self.http_used = true,
            TransportKind::Ssh => self.ssh_used = true,
        }
        true
    }

    pub fn record_save_config(&mut self) {
        self.save_config_successful = true;
    }

    pub fn mark_persisted(&mut self, at: DateTime<Utc>) {
        self.last_successful_backup = Some(at);
    }

    /// Transport that produced the backup, if any.
    pub fn transport_used(&self) -> Option<TransportKind> {
        match (self.http_used, self.ssh_used) {
            (true, _) => Some(TransportKind::Http),
            (false, true) => Some(TransportKind::Ssh),
            _ => None,
        }
    }

    /// Values for `REPORT_COLUMNS`, in the same order.
    pub fn report_values(&self) -> Vec<String> {
        vec![
            self.ip.clone(),
            self.hostname.clone(),
            report_bool(self.http_management).to_string(),
            self.http_mgmt_port.to_string(),
            report_bool(self.http_port_check_ok).to_string(),
            self.ssh_mgmt_port.to_string(),
            report_bool(self.ssh_port_check_ok).to_string(),
            report_bool(self.backup_successful).to_string(),
            report_bool(self.save_config_successful).to_string(),
            report_bool(self.http_used).to_string(),
            report_bool(self.ssh_used).to_string(),
            report_timestamp(&self.last_backup_attempt),
            self.last_successful_backup
                .as_ref()
                .map(report_timestamp)
                .unwrap_or_default(),
        ]
    }

    /// Report cell for an extension column; empty when this outcome lacks the key.
    pub fn extra_value(&self, key: &str) -> String {
        self.extra.get(key).map(|v| v.to_string()).unwrap_or_default()
    }
}
