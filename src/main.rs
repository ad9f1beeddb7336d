//! CLI entry point for scanbot
//!
//! Provides command-line access to:
//! - Path preview (no device needed)
//! - Running a scan, live or as a dry run
//! - One-shot controller status
//! - Emergency stop
//! - Printing the effective configuration
//!
//! # Usage
//!
//! ```bash
//! scanbot preview --radius 320 --waypoints 9
//! scanbot scan --radius 320 --waypoints 9 --repeats 2 --from-center
//! scanbot scan --radius 200 --waypoints 5 --dry-run
//! scanbot --config rig.toml estop
//! SCANBOT_TIMING__MOVE_TIMEOUT_MS=30000 scanbot config
//! ```
//!
//! Ctrl-C during a scan requests a stop; the run winds down and restores the operator
//! modes before the process exits.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scanbot::config::RigConfig;
use scanbot::controller::http::HttpController;
use scanbot::controller::{MotionController, MoveCommand};
use scanbot::estop::emergency_stop;
use scanbot::modes::OperatorModes;
use scanbot::scan::{ScanSequencer, ScanSettings, StartDirection};
use scanbot::telemetry::{stop_poller, TelemetryCell, TelemetryPoller};
use scanbot::tracing_setup;

#[derive(Parser)]
#[command(name = "scanbot")]
#[command(about = "Arc scans on a multi-axis rig", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/scanbot.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the waypoints a scan would visit
    Preview {
        #[arg(long)]
        radius: f64,
        #[arg(long, default_value = "9")]
        waypoints: usize,
    },

    /// Run a scan
    Scan {
        /// Arc radius in scene units
        #[arg(long)]
        radius: f64,
        #[arg(long, default_value = "9")]
        waypoints: usize,
        /// Number of back-and-forth cycles
        #[arg(long, default_value = "1")]
        repeats: usize,
        /// Start from the 90 degree end of the arc
        #[arg(long)]
        reverse: bool,
        /// Start the first cycle at the middle waypoint
        #[arg(long)]
        from_center: bool,
        /// Simulate the run without moving the device
        #[arg(long)]
        dry_run: bool,
    },

    /// Query the controller once
    Status,

    /// Stop every axis
    Estop,

    /// Print the effective configuration (file plus environment overrides)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RigConfig::load_from(path),
        None => RigConfig::load(),
    }
    .context("loading configuration")?;
    config.validate().context("validating configuration")?;
    tracing_setup::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Preview { radius, waypoints } => preview(&config, radius, waypoints),
        Commands::Scan {
            radius,
            waypoints,
            repeats,
            reverse,
            from_center,
            dry_run,
        } => {
            let settings = ScanSettings {
                radius,
                waypoint_count: waypoints,
                repeats,
                start_direction: if reverse {
                    StartDirection::Reverse
                } else {
                    StartDirection::Forward
                },
                start_at_center: from_center,
                dry_run,
            };
            run_scan(&config, settings).await
        }
        Commands::Status => status(&config).await,
        Commands::Estop => estop(&config).await,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn preview(config: &RigConfig, radius: f64, count: usize) -> Result<()> {
    let sequencer = ScanSequencer::new(
        config,
        None,
        Arc::new(TelemetryCell::new()),
        OperatorModes::detached(config.limits.rotation_soft_limit),
    );
    let mapper = config.mapper();
    let waypoints = sequencer.preview(radius, count);
    if waypoints.is_empty() {
        anyhow::bail!("no reachable waypoints for radius {radius}");
    }

    let rows: Vec<_> = waypoints
        .iter()
        .enumerate()
        .map(|(index, wp)| {
            let pos = mapper.scene_to_pos(wp.x, wp.z);
            let deflection = mapper.lock_origin_deflection(wp.x, wp.z);
            json!({
                "index": index,
                "scene": { "x": wp.x, "z": wp.z },
                "command": MoveCommand::rounded(
                    pos.x,
                    pos.z,
                    mapper.deflection_to_p_raw(deflection),
                    0.0,
                ),
                "deflection": deflection,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn run_scan(config: &RigConfig, settings: ScanSettings) -> Result<()> {
    let telemetry = Arc::new(TelemetryCell::new());
    let shutdown = CancellationToken::new();

    let (sequencer, poller_task) = if settings.dry_run {
        let modes = OperatorModes::detached(config.limits.rotation_soft_limit);
        let sequencer = ScanSequencer::new(config, None, telemetry, modes);
        (sequencer, None)
    } else {
        let controller: Arc<dyn MotionController> =
            Arc::new(HttpController::new(&config.controller)?);
        let poller = TelemetryPoller::new(
            Arc::clone(&controller),
            Arc::clone(&telemetry),
            config.mapper(),
            config.controller.telemetry_poll_interval(),
        );
        let modes = OperatorModes::new(config.limits.rotation_soft_limit, poller.device_status());
        // the first poll seeds the R accumulator
        poller.poll_once().await;
        let task = poller.spawn(shutdown.clone());
        let sequencer = ScanSequencer::new(config, Some(controller), telemetry, modes);
        (sequencer, Some(task))
    };

    let mut status = sequencer.subscribe();
    sequencer.start(settings)?;

    let join = sequencer.join();
    tokio::pin!(join);
    let outcome = loop {
        tokio::select! {
            outcome = &mut join => break outcome,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping scan");
                sequencer.stop();
            }
            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                if current.state.active() {
                    println!(
                        "[{}] {}/{} ({})  eta {}  R {:.0} ({:.0}°)",
                        current.state.phase,
                        current.progress.completed_steps,
                        current.progress.total_steps,
                        current.progress.percentage_label,
                        current.progress.eta_label,
                        current.current_r,
                        current.current_r_degrees,
                    );
                }
            }
        }
    };

    match poller_task {
        Some(task) => stop_poller(&shutdown, task).await,
        None => shutdown.cancel(),
    }

    let outcome = outcome.context("scan task did not complete")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn status(config: &RigConfig) -> Result<()> {
    let controller = HttpController::new(&config.controller)?;
    let report = controller.poll_status(true).await?;
    info!(permits_direct_control = report.permits_direct_control(), "Status received");
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(raw) = report.position {
        let scene = config.mapper().pos_to_scene(raw.x, raw.z);
        println!("scene: x {:.2}  z {:.2}", scene.x, scene.z);
    }
    Ok(())
}

async fn estop(config: &RigConfig) -> Result<()> {
    let controller = HttpController::new(&config.controller)?;
    let report = emergency_stop(&controller).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_complete() {
        anyhow::bail!("{} axes did not acknowledge stop", report.failed.len());
    }
    Ok(())
}
