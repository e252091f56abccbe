// Transport adapters: one contract ("run command, get text or failure") over
// HTTP command execution or an interactive SSH command session.

pub mod http;
pub mod ssh;

use crate::config::AppConfig;
use crate::inventory::Device;
use async_trait::async_trait;
use std::time::Duration;

pub use crate::models::TransportKind;
pub use http::{HttpSettings, HttpTransport};
pub use ssh::{SshSettings, SshTransport};

/// Devices answer with this when the session is authenticated but the command is denied.
pub const REJECTION_MARKER: &str = "command authorization failed";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connecting to {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("authentication failed on {target}: {reason}")]
    Auth { target: String, reason: String },
    #[error("no {0} configured for this device")]
    MissingCredentials(&'static str),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("command authorization failed")]
    Rejected,
    #[error("device returned an empty response")]
    Empty,
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
    #[error("session error: {0}")]
    Session(String),
}

/// Case-insensitive check for a device-side command denial.
pub fn is_rejection(text: &str) -> bool {
    text.to_lowercase().contains(REJECTION_MARKER)
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Run one command and return the raw response text.
    async fn execute(&self, command: &str) -> Result<String, TransportError>;

    /// Save running configuration to non-volatile storage; returns the raw response.
    async fn save_config(&self) -> Result<String, TransportError>;

    /// Push configuration lines (enter config mode, send lines, leave).
    async fn apply_config(&self, _lines: &[String]) -> Result<String, TransportError> {
        Err(TransportError::Unsupported("configuration push"))
    }
}

/// Read the configuration: a transport success that is neither a rejection nor empty.
pub async fn fetch_config(
    transport: &dyn Transport,
    command: &str,
) -> Result<String, TransportError> {
    let text = transport.execute(command).await?;
    if is_rejection(&text) {
        return Err(TransportError::Rejected);
    }
    if text.trim().is_empty() {
        return Err(TransportError::Empty);
    }
    Ok(text)
}

/// Persist the configuration device-side; a rejection in the response counts as failure.
pub async fn persist_config(transport: &dyn Transport) -> Result<(), TransportError> {
    let text = transport.save_config().await?;
    if is_rejection(&text) {
        return Err(TransportError::Rejected);
    }
    Ok(())
}

/// Opens transports for a device (the session provider).
pub trait TransportFactory: Send + Sync {
    fn ssh(&self, device: &Device) -> Result<Box<dyn Transport>, TransportError>;

    fn http(
        &self,
        device: &Device,
        proxy: Option<&str>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Real SSH (libssh2) and HTTPS (reqwest) transports.
#[derive(Debug, Clone)]
pub struct LiveTransports {
    ssh: SshSettings,
    http: HttpSettings,
}

impl LiveTransports {
    pub fn new(ssh: SshSettings, http: HttpSettings) -> Self {
        Self { ssh, http }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            SshSettings {
                connect_timeout: Duration::from_secs(config.ssh.connect_timeout_secs),
                command_timeout: Duration::from_secs(config.ssh.command_timeout_secs),
            },
            HttpSettings {
                timeout: Duration::from_secs(config.http.timeout_secs),
                user_agent: config.http.user_agent.clone(),
            },
        )
    }
}

impl TransportFactory for LiveTransports {
    fn ssh(&self, device: &Device) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SshTransport::new(device, self.ssh.clone())?))
    }

    fn http(
        &self,
        device: &Device,
        proxy: Option<&str>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(HttpTransport::new(device, &self.http, proxy)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_case_insensitive_substring() {
        assert!(is_rejection("% Command authorization failed."));
        assert!(is_rejection("ERROR: COMMAND AUTHORIZATION FAILED"));
        assert!(!is_rejection("hostname R1\n"));
    }
}
