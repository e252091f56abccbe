use anyhow::Result;
use clap::Parser;
use stockpiler::*;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_FILE: &str = "stockpiler.log";

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Console + `<dir>/stockpiler.log`. Exits the process if the log file cannot be opened.
fn init_logging(dir: &Path, level: &str) {
    let log_file = std::fs::create_dir_all(dir).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))
    });
    let log_file = match log_file {
        Ok(f) => f,
        Err(e) => {
            let user = std::env::var("USER").unwrap_or_else(|_| "$USER".to_string());
            eprintln!(
                "Unable to open log file {}: {}\n\
                 Create the directory and give your user access, e.g.:\n  \
                 sudo mkdir -p {dir} && sudo chown {user} {dir}\n\
                 or pass --logging-dir <DIR>",
                dir.join(LOG_FILE).display(),
                e,
                dir = dir.display(),
                user = user,
            );
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let mut app_config = config::AppConfig::load(cli.config_file.as_deref())?;
    cli.apply_overrides(&mut app_config);
    app_config.validate()?;

    init_logging(&app_config.logging.dir, &app_config.logging.level);
    tracing::info!(version = %version::banner(), "starting");

    let inventory = inventory::Inventory::load(&app_config.inventory)?;
    let mut devices = inventory::filter_by_addresses(inventory.devices()?, &cli.addresses);
    tracing::info!(
        "Executing on {} devices based on the given filter",
        devices.len()
    );

    if let Some(credentials) = credentials::resolve_from_process(&cli.credential_request())? {
        credentials.apply_to(&mut devices);
    }

    let transports: Arc<dyn transport::TransportFactory> =
        Arc::new(transport::LiveTransports::from_config(&app_config));
    let workers = app_config.runner.num_workers;

    if let Some(action) = cli.adhoc_action() {
        for result in adhoc::run_adhoc(devices, transports, action, workers).await {
            println!("{}", result);
        }
        return Ok(());
    }

    let ctx = Arc::new(stockpile::StockpileContext::from_config(
        &app_config,
        cli.proxy.clone(),
        Arc::new(probe::TcpProbe),
        transports,
    ));
    let executor = fleet::FleetExecutor::new(
        ctx,
        Arc::new(platform::PlatformRegistry::default()),
        workers,
        Duration::from_secs(app_config.runner.device_timeout_secs),
    );
    let committer = snapshot::SnapshotCommitter::new(
        &app_config.stockpile.output_dir,
        &app_config.stockpile.commit_label,
    );
    let run = executor.run(devices, &committer).await?;
    tracing::info!(
        succeeded = run.succeeded(),
        failed = run.failed(),
        "stockpile complete"
    );
    Ok(())
}
