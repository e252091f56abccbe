// HTTPS-first procedure with SSH fallback, for appliances exposing /admin/exec/.

use super::{StockpileContext, StockpileError, attempt, new_outcome, persist_local};
use crate::inventory::Device;
use crate::models::{BackupOutcome, TransportKind};
use crate::probe::check_ports;
use tracing::{debug, error, instrument};

/// Retrieve, then write the configuration file.
pub async fn stockpile_dual_transport(
    ctx: &StockpileContext,
    device: &Device,
) -> Result<BackupOutcome, StockpileError> {
    let outcome = retrieve_dual_transport(ctx, device).await;
    persist_local(ctx, device, outcome).await
}

#[instrument(skip_all, fields(procedure = "dual_transport"))]
pub async fn retrieve_dual_transport(ctx: &StockpileContext, device: &Device) -> BackupOutcome {
    let mut outcome = new_outcome(device);
    let http_port = outcome.http_mgmt_port;
    let ssh_port = outcome.ssh_mgmt_port;

    // Through a proxy the HTTP port cannot be probed directly; assume it is open.
    let probe_http = outcome.http_management && ctx.proxy.is_none();
    let mut ports = Vec::with_capacity(2);
    if probe_http {
        ports.push(http_port);
    }
    ports.push(ssh_port);
    let reachable = check_ports(ctx.prober.as_ref(), &device.hostname, &ports, ctx.probe_timeout).await;
    let is_open = |port: u16| reachable.get(&port).copied().unwrap_or(false);

    if outcome.http_management {
        outcome.http_port_check_ok = !probe_http || is_open(http_port);
    }
    outcome.ssh_port_check_ok = is_open(ssh_port);

    if !outcome.http_port_check_ok && !outcome.ssh_port_check_ok {
        error!(
            host = %device.hostname,
            http_port,
            ssh_port,
            "unable to reach HTTPS or SSH management ports"
        );
        return outcome;
    }

    if outcome.http_port_check_ok {
        attempt(ctx, device, &mut outcome, TransportKind::Http).await;
    }
    if !outcome.backup_successful && outcome.ssh_port_check_ok {
        debug!(host = %device.hostname, "falling back to SSH");
        attempt(ctx, device, &mut outcome, TransportKind::Ssh).await;
    }
    if !outcome.backup_successful {
        error!(host = %device.hostname, "failed to backup via HTTPS or SSH");
    }
    outcome
}
