// SSH-only procedure for every platform without an HTTP management plane.

use super::{StockpileContext, StockpileError, attempt, new_outcome, persist_local};
use crate::inventory::Device;
use crate::models::{BackupOutcome, TransportKind};
use crate::probe::check_ports;
use tracing::{error, instrument};

/// Retrieve, then write the configuration file.
pub async fn stockpile_generic(
    ctx: &StockpileContext,
    device: &Device,
) -> Result<BackupOutcome, StockpileError> {
    let outcome = retrieve_generic(ctx, device).await;
    persist_local(ctx, device, outcome).await
}

#[instrument(skip_all, fields(procedure = "generic"))]
pub async fn retrieve_generic(ctx: &StockpileContext, device: &Device) -> BackupOutcome {
    let mut outcome = new_outcome(device);
    let port = outcome.ssh_mgmt_port;

    let reachable = check_ports(ctx.prober.as_ref(), &device.hostname, &[port], ctx.probe_timeout).await;
    outcome.ssh_port_check_ok = reachable.get(&port).copied().unwrap_or(false);
    if !outcome.ssh_port_check_ok {
        error!(host = %device.hostname, port, "unable to reach SSH management port");
        return outcome;
    }

    attempt(ctx, device, &mut outcome, TransportKind::Ssh).await;
    if !outcome.backup_successful {
        error!(host = %device.hostname, "failed to backup via SSH");
    }
    outcome
}
