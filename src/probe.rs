// Reachability prober: TCP connect with a per-port timeout. No retries; failures report false.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

#[async_trait]
pub trait PortProbe: Send + Sync {
    /// True if a TCP connection to `host:port` completes within `timeout`.
    async fn is_open(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Probes with a real TCP connect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait]
impl PortProbe for TcpProbe {
    #[instrument(skip(self), fields(operation = "tcp_probe"))]
    async fn is_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "port closed or unreachable");
                false
            }
            Err(_) => {
                debug!(timeout_ms = timeout.as_millis() as u64, "probe timed out");
                false
            }
        }
    }
}

/// Probe each port once; the map holds one entry per requested port.
pub async fn check_ports(
    probe: &dyn PortProbe,
    host: &str,
    ports: &[u16],
    timeout: Duration,
) -> BTreeMap<u16, bool> {
    let mut results = BTreeMap::new();
    for &port in ports {
        if results.contains_key(&port) {
            continue;
        }
        results.insert(port, probe.is_open(host, port, timeout).await);
    }
    results
}
