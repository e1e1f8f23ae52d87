//! Fan control daemon.
//!
//! Takes manual control of the laptop fan, runs the control loop until
//! SIGINT or SIGTERM, then gives control back to the embedded controller.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use smartfan::config::{Config, HardwareArgs};
use smartfan::ec::EcDevice;
use smartfan::scheduler::{HandbackGuard, Scheduler};
use smartfan::sensor::SysfsTemperature;
use smartfan::tracing::{self, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "smartfand", version, about = "Closed-loop laptop fan control")]
struct Cli {
    #[command(flatten)]
    hardware: HardwareArgs,

    /// JSON file overriding control tuning
    #[arg(long, env = "SMARTFAN_TUNING")]
    tuning: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing::init(cli.debug);

    info!("smartfand {} starting", env!("CARGO_PKG_VERSION"));

    if !nix::unistd::geteuid().is_root() {
        warn!("Not running as root, EC register access will likely fail");
    }

    let config = Config::load(&cli.hardware, cli.tuning.as_deref(), cli.debug)
        .context("invalid configuration")?;
    debug!(?config, "Configuration loaded");

    let sensor = SysfsTemperature::new(&config.thermal_zone);
    let ec = EcDevice::open(&config.ec_path).await?;
    info!(
        sensor = %sensor.path().display(),
        ec = %ec.path().display(),
        "Hardware opened"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let scheduler = Scheduler::new(
        sensor,
        ec,
        config.registers,
        config.thermal,
        HandbackGuard::new(),
    );
    scheduler
        .run(shutdown)
        .await
        .context("fan control stopped on a hardware error")?;

    info!("Exiting");
    Ok(())
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let terminate = match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => Some(async move {
            sigterm.recv().await;
        }),
        Err(e) => {
            warn!("Failed to install SIGTERM handler, listening for SIGINT only: {e}");
            None
        }
    };

    match first_signal(terminate, tokio::signal::ctrl_c()).await {
        Ok(name) => info!("Received {name}"),
        Err(e) => {
            error!("Failed to listen for SIGINT: {e}");
            return;
        }
    }

    shutdown.cancel();
}

/// Name of whichever signal arrives first. Without a SIGTERM listener only
/// `interrupt` is awaited.
async fn first_signal<T, I>(terminate: Option<T>, interrupt: I) -> io::Result<&'static str>
where
    T: Future<Output = ()>,
    I: Future<Output = io::Result<()>>,
{
    match terminate {
        Some(terminate) => tokio::select! {
            _ = terminate => Ok("SIGTERM"),
            result = interrupt => result.map(|()| "SIGINT"),
        },
        None => interrupt.await.map(|()| "SIGINT"),
    }
}
