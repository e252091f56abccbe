// Per-device backup ("stockpile") procedures.
//
// Every variant follows START -> PROBE -> (HTTP attempt)? -> (SSH attempt)? -> PERSIST_LOCAL -> DONE
// and may jump to DONE when no transport is reachable. Device-side failures end up as outcome
// flags; only a failure to write the local file is returned as an error.
//
// Retrieval (everything up to PERSIST_LOCAL) and the local write are separate calls. A
// deadline may cut retrieval short, never a file write.

mod dual;
mod generic;

pub use dual::{retrieve_dual_transport, stockpile_dual_transport};
pub use generic::{retrieve_generic, stockpile_generic};

use crate::config::AppConfig;
use crate::inventory::Device;
use crate::models::{BackupOutcome, TransportKind};
use crate::platform::PlatformRegistry;
use crate::probe::PortProbe;
use crate::transport::{Transport, TransportFactory, fetch_config, persist_config};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug, thiserror::Error)]
pub enum StockpileError {
    #[error("writing {}: {}", .path.display(), .source)]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a procedure needs besides the device itself.
pub struct StockpileContext {
    pub output_dir: PathBuf,
    pub backup_command: String,
    /// SOCKS proxy (`host:port`) for HTTP management traffic.
    pub proxy: Option<String>,
    pub probe_timeout: Duration,
    pub prober: Arc<dyn PortProbe>,
    pub transports: Arc<dyn TransportFactory>,
}

impl StockpileContext {
    pub fn from_config(
        config: &AppConfig,
        proxy: Option<String>,
        prober: Arc<dyn PortProbe>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            output_dir: config.stockpile.output_dir.clone(),
            backup_command: config.stockpile.backup_command.clone(),
            proxy,
            probe_timeout: Duration::from_millis(config.probe.timeout_ms),
            prober,
            transports,
        }
    }
}

/// Fresh outcome for `device`: identity and ports filled in, every flag false.
pub fn new_outcome(device: &Device) -> BackupOutcome {
    let mut outcome = BackupOutcome::new(
        format!("{}_backup", device.name),
        device.hostname.clone(),
        device.display_hostname(),
    );
    outcome.http_management = device.http_management;
    outcome.http_mgmt_port = device.http_port();
    outcome.ssh_mgmt_port = device.ssh_port();
    outcome.extra = device.extra.clone();
    outcome
}

/// Path of a device's configuration file inside the stockpile.
pub fn device_file_path(output_dir: &Path, device_name: &str) -> PathBuf {
    let file_name: String = device_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    output_dir.join(format!("{}.txt", file_name))
}

/// Dispatch on the device's platform and run the matching procedure.
/// An unknown platform fails only this device.
pub async fn stockpile_device(
    ctx: &StockpileContext,
    registry: &PlatformRegistry,
    device: &Device,
) -> Result<BackupOutcome, StockpileError> {
    let outcome = retrieve_device(ctx, registry, device).await;
    persist_local(ctx, device, outcome).await
}

/// Dispatch and retrieve only; the configuration stays in the outcome.
pub async fn retrieve_device(
    ctx: &StockpileContext,
    registry: &PlatformRegistry,
    device: &Device,
) -> BackupOutcome {
    match registry.resolve(device) {
        Ok(procedure) => procedure.retrieve(ctx, device).await,
        Err(e) => {
            error!(error = %e, "cannot dispatch device");
            new_outcome(device)
        }
    }
}

/// Open the requested transport, then read the configuration and persist it device-side.
/// The two steps are independent: persist runs whether or not the read worked.
async fn attempt(
    ctx: &StockpileContext,
    device: &Device,
    outcome: &mut BackupOutcome,
    via: TransportKind,
) {
    let transport = match via {
        TransportKind::Ssh => ctx.transports.ssh(device),
        TransportKind::Http => ctx.transports.http(device, ctx.proxy.as_deref()),
    };
    match transport {
        Ok(t) => attempt_with(ctx, outcome, t.as_ref()).await,
        Err(e) => error!(via = %via, error = %e, "unable to open transport"),
    }
}

async fn attempt_with(ctx: &StockpileContext, outcome: &mut BackupOutcome, transport: &dyn Transport) {
    let via = transport.kind();
    match fetch_config(transport, &ctx.backup_command).await {
        Ok(config) => {
            outcome.record_backup(via, config);
            debug!(via = %via, "successfully backed up");
        }
        Err(e) => error!(via = %via, error = %e, "backup command failed"),
    }
    match persist_config(transport).await {
        Ok(()) => {
            outcome.record_save_config();
            debug!(via = %via, "successfully saved configuration on device");
        }
        Err(e) => warn!(via = %via, error = %e, "saving configuration on device failed"),
    }
}

/// PERSIST_LOCAL: write the retrieved configuration, overwriting any previous copy.
/// Outcomes without a successful backup are returned untouched.
pub async fn persist_local(
    ctx: &StockpileContext,
    device: &Device,
    mut outcome: BackupOutcome,
) -> Result<BackupOutcome, StockpileError> {
    if !outcome.backup_successful {
        return Ok(outcome);
    }
    let config = outcome.device_config.take().unwrap_or_default();
    let path = device_file_path(&ctx.output_dir, &device.name);
    let persist_err = |source: std::io::Error| StockpileError::Persist {
        path: path.clone(),
        source,
    };
    tokio::fs::create_dir_all(&ctx.output_dir)
        .await
        .map_err(persist_err)?;
    tokio::fs::write(&path, config.as_bytes())
        .await
        .map_err(persist_err)?;
    outcome.mark_persisted(Utc::now());
    debug!(path = %path.display(), bytes = config.len(), "configuration written");
    Ok(outcome)
}
