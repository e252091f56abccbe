// One-off command execution or configuration push across the selected devices.
// Never touches the stockpile directory or its repository.

use crate::fleet::spawn_per_device;
use crate::inventory::Device;
use crate::transport::{TransportError, TransportFactory};
use futures_util::StreamExt;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info_span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdhocAction {
    Command(String),
    Config(Vec<String>),
}

impl AdhocAction {
    /// `"a; b ;c"` -> `["a", "b", "c"]`; empty segments are dropped.
    pub fn config_from_arg(arg: &str) -> Self {
        AdhocAction::Config(
            arg.split(';')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

#[derive(Debug)]
pub struct AdhocResult {
    pub device: String,
    pub hostname: String,
    pub result: Result<String, TransportError>,
}

impl fmt::Display for AdhocResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ({}) ===", self.device, self.hostname)?;
        match &self.result {
            Ok(output) => write!(f, "{}", output.trim_end()),
            Err(e) => write!(f, "ERROR: {}", e),
        }
    }
}

async fn run_one(
    transports: &dyn TransportFactory,
    device: &Device,
    action: &AdhocAction,
) -> Result<String, TransportError> {
    let transport = transports.ssh(device)?;
    match action {
        AdhocAction::Command(command) => transport.execute(command).await,
        AdhocAction::Config(lines) => transport.apply_config(lines).await,
    }
}

/// Run `action` on every device with at most `workers` in flight. Results are sorted by device.
pub async fn run_adhoc(
    devices: Vec<Device>,
    transports: Arc<dyn TransportFactory>,
    action: AdhocAction,
    workers: usize,
) -> Vec<AdhocResult> {
    let action = Arc::new(action);
    let hostnames: Vec<(String, String)> = devices
        .iter()
        .map(|d| (d.name.clone(), d.hostname.clone()))
        .collect();

    let mut running = spawn_per_device(devices, workers, move |device| {
        let transports = transports.clone();
        let action = action.clone();
        let span = info_span!("adhoc", device = %device.name);
        async move {
            let result = run_one(transports.as_ref(), &device, &action).await;
            match &result {
                Ok(_) => debug!("ad-hoc action completed"),
                Err(e) => error!(error = %e, "ad-hoc action failed"),
            }
            result
        }
        .instrument(span)
    });

    let mut results = Vec::with_capacity(hostnames.len());
    while let Some((device, joined)) = running.next().await {
        let result = joined.unwrap_or_else(|e| Err(TransportError::Session(e.to_string())));
        let hostname = hostnames
            .iter()
            .find(|(name, _)| *name == device)
            .map(|(_, host)| host.clone())
            .unwrap_or_default();
        results.push(AdhocResult {
            device,
            hostname,
            result,
        });
    }
    results.sort_by(|a, b| a.device.cmp(&b.device));
    results
}
