// HTTPS command execution against the appliance's /admin/exec/ endpoint.

use super::{Transport, TransportError, TransportKind};
use crate::inventory::Device;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

const EXEC_PATH: &str = "/admin/exec/";
const SAVE_COMMAND: &str = "write mem";

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

/// Certificates are only verified when the device is addressed by name; a literal IP has no name to check.
pub fn verify_tls(host: &str) -> bool {
    host.parse::<IpAddr>().is_err()
}

/// `host:port` for a proxy becomes a SOCKS5 URL; full URLs pass through.
pub fn proxy_url(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("socks5://{}", proxy)
    }
}

/// `https://host:port/admin/exec/<command, form-encoded>`.
pub fn exec_url(host: &str, port: u16, command: &str) -> String {
    let host = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
        _ => host.to_string(),
    };
    let encoded: String = url::form_urlencoded::byte_serialize(command.as_bytes()).collect();
    format!("https://{}:{}{}{}", host, port, EXEC_PATH, encoded)
}

pub struct HttpTransport {
    client: reqwest::Client,
    host: String,
    port: u16,
    username: String,
    password: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        device: &Device,
        settings: &HttpSettings,
        proxy: Option<&str>,
    ) -> Result<Self, TransportError> {
        let username = device
            .username
            .clone()
            .ok_or(TransportError::MissingCredentials("username"))?;
        let password = device
            .password
            .clone()
            .ok_or(TransportError::MissingCredentials("password"))?;

        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .danger_accept_invalid_certs(!verify_tls(&device.hostname));
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url(proxy))
                .map_err(|e| TransportError::Session(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Session(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: device.hostname.clone(),
            port: device.http_port(),
            username,
            password,
            timeout: settings.timeout,
        })
    }

    async fn get(&self, command: &str) -> Result<String, TransportError> {
        let url = exec_url(&self.host, self.port, command);
        debug!(host = %self.host, port = self.port, command, "HTTP exec");
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        response.text().await.map_err(|e| self.request_error(e))
    }

    fn request_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_connect() {
            TransportError::Connect {
                target: format!("{}:{}", self.host, self.port),
                reason: e.to_string(),
            }
        } else {
            TransportError::Session(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn execute(&self, command: &str) -> Result<String, TransportError> {
        self.get(command).await
    }

    async fn save_config(&self) -> Result<String, TransportError> {
        self.get(SAVE_COMMAND).await
    }
}
