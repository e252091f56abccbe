// Fleet executor: runs one procedure per device on a bounded worker pool and feeds
// the run lifecycle (started, device completed, completed) to an observer.

use crate::inventory::Device;
use crate::models::{BackupOutcome, DeviceResult, FleetRun};
use crate::platform::PlatformRegistry;
use crate::stockpile::{StockpileContext, StockpileError, new_outcome, persist_local, retrieve_device};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{Instrument, error, info, info_span, warn};

/// Receives run events. Only completion needs a body; the others default to no-ops.
#[async_trait]
pub trait RunObserver: Send + Sync {
    fn run_started(&self, _started_at: DateTime<Utc>, _devices: usize) {}

    fn device_completed(&self, _device: &str, _result: &DeviceResult) {}

    /// Called once with the finished aggregate. An error fails the run.
    async fn run_completed(&self, run: &FleetRun) -> anyhow::Result<()>;
}

/// Spawn `task` for each device, at most `workers` running at once.
/// Results come back in completion order, tagged with the device name.
pub(crate) fn spawn_per_device<T, F, Fut>(
    devices: Vec<Device>,
    workers: usize,
    task: F,
) -> FuturesUnordered<BoxFuture<'static, (String, Result<T, JoinError>)>>
where
    T: Send + 'static,
    F: Fn(Device) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    devices
        .into_iter()
        .map(|device| {
            let name = device.name.clone();
            let semaphore = semaphore.clone();
            let work = task(device);
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquiring only waits.
                let _permit = semaphore.acquire_owned().await;
                work.await
            });
            async move { (name, handle.await) }.boxed()
        })
        .collect()
}

pub struct FleetExecutor {
    ctx: Arc<StockpileContext>,
    registry: Arc<PlatformRegistry>,
    workers: usize,
    device_timeout: Duration,
}

impl FleetExecutor {
    pub fn new(
        ctx: Arc<StockpileContext>,
        registry: Arc<PlatformRegistry>,
        workers: usize,
        device_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            registry,
            workers,
            device_timeout,
        }
    }

    /// Stockpile every device, then hand the aggregate to `observer`.
    ///
    /// Device failures never abort the run. A failure to write a device's file does: the
    /// remaining devices finish, but no aggregate is committed and the error is returned.
    pub async fn run(
        &self,
        devices: Vec<Device>,
        observer: &dyn RunObserver,
    ) -> anyhow::Result<FleetRun> {
        let mut pending = FleetRun::begin();
        observer.run_started(pending.started_at(), devices.len());
        info!(devices = devices.len(), workers = self.workers, "fleet run started");

        let ctx = self.ctx.clone();
        let registry = self.registry.clone();
        let device_timeout = self.device_timeout;
        let mut running = spawn_per_device(devices, self.workers, move |device| {
            let ctx = ctx.clone();
            let registry = registry.clone();
            async move { run_device(&ctx, &registry, &device, device_timeout).await }
        });

        let mut fatal: Option<StockpileError> = None;
        while let Some((name, joined)) = running.next().await {
            let result = match joined {
                Ok(Ok(outcome)) => DeviceResult::Outcome(outcome),
                Ok(Err(e)) => {
                    error!(device = %name, error = %e, "local persistence failed");
                    fatal.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    error!(device = %name, error = %e, "device task ended without an outcome");
                    DeviceResult::Crashed {
                        error: e.to_string(),
                    }
                }
            };
            observer.device_completed(&name, &result);
            if !pending.insert(name.as_str(), result) {
                warn!(device = %name, "device appeared twice in one run; keeping the first result");
            }
        }

        if let Some(e) = fatal {
            return Err(anyhow::Error::new(e).context("fleet run aborted before snapshot"));
        }

        let run = pending.finish();
        info!(
            succeeded = run.succeeded(),
            failed = run.failed(),
            elapsed_ms = run.elapsed().num_milliseconds(),
            "fleet run finished"
        );
        observer.run_completed(&run).await?;
        Ok(run)
    }
}

async fn run_device(
    ctx: &StockpileContext,
    registry: &PlatformRegistry,
    device: &Device,
    device_timeout: Duration,
) -> Result<BackupOutcome, StockpileError> {
    let span = info_span!("stockpile", device = %device.name, host = %device.hostname);
    async {
        // The deadline covers retrieval only; the file write always runs to completion.
        let retrieval = retrieve_device(ctx, registry, device);
        let outcome = match tokio::time::timeout(device_timeout, retrieval).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    timeout_secs = device_timeout.as_secs(),
                    "device procedure timed out"
                );
                new_outcome(device)
            }
        };
        persist_local(ctx, device, outcome).await
    }
    .instrument(span)
    .await
}
