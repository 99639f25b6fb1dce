//! # Limb HAL Binary
//!
//! Builds the robot's devices from `robot.toml` and runs the pressure and
//! sensing loop until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Run on the simulation backend
//! limb_hal --config config/robot.toml
//!
//! # Ten cycles, verbose, JSON logs
//! limb_hal --config config/robot.toml --cycles 10 -v --json
//! ```

use clap::Parser;
use limb_common::config::{LogLevel, load_robot_config};
use limb_common::consts::DEFAULT_CONFIG_PATH;
use limb_hal::{DriverRegistry, Rig};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Limb HAL - pressure regulation, potentiometers and motors
#[derive(Parser, Debug)]
#[command(name = "limb_hal")]
#[command(version)]
#[command(about = "Hardware Abstraction Layer for the limb robot")]
#[command(long_about = None)]
struct Args {
    /// Path to robot configuration file (robot.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// HardwareIO backend; overrides `driver` in the config file
    #[arg(short, long)]
    driver: Option<String>,

    /// Stop after this many cycles
    #[arg(short = 'n', long)]
    cycles: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("HAL startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // The config file may raise the log level, so read it before tracing
    // is installed and report a failure afterwards.
    let loaded = load_robot_config(&args.config);
    setup_tracing(&args, loaded.as_ref().ok().map(|c| c.shared.log_level));

    info!("Limb HAL v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = loaded?;
    let driver_name = args.driver.clone().unwrap_or_else(|| config.driver.clone());

    let drivers = DriverRegistry::with_builtin();
    info!("Available drivers: {:?}", drivers.list_drivers());
    let io = drivers.create_driver(&driver_name)?;
    info!("Using driver '{}'", io.name());

    let mut rig = Rig::from_config(config, io)?;

    let running = rig.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    if let Err(e) = rig.run(args.cycles) {
        error!("Control loop error: {}", e);
    }

    rig.shutdown()?;

    info!("Limb HAL shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: Option<LogLevel>) {
    let level = match (args.verbose, log_level) {
        (true, _) => Level::DEBUG,
        (false, Some(l)) => l.as_directive().parse().unwrap_or(Level::INFO),
        (false, None) => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
