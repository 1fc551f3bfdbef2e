//! # ulsim
//!
//! CLI for the UAV-to-gateway LoRa link-quality simulator.
//!
//! `ulsim run` drives a full sampling session against a scenario file;
//! `ulsim check-link` evaluates a single gateway/vehicle geometry, which is
//! handy while calibrating channel parameters or sanity-checking a mesh.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ulsim_channel::{compute_rssi, ChannelParams, LoraChannel};
use ulsim_common::{GeoCoord, LocalFrame};
use ulsim_geom::{check_los, Mesh};
use ulsim_runner::{
    load_scenario, CancelToken, ConfigError, FlightLog, ReaderSource, RunnerError, ScriptedFlight,
    TelemetrySource,
};

// ============================================================================
// CLI Configuration
// ============================================================================

/// ulsim - UAV LoRa Link Simulator
#[derive(Parser, Debug)]
#[command(name = "ulsim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a sampling session from a YAML scenario file
    Run(RunConfig),
    /// Evaluate one gateway/vehicle geometry against a mesh
    CheckLink(CheckLinkConfig),
}

/// Configuration for running a sampling session
#[derive(Parser, Debug)]
struct RunConfig {
    /// Path to the scenario YAML file
    scenario: PathBuf,

    /// Telemetry source: "scripted" (the scenario's flight plan),
    /// "stdin" (lat lon alt lines piped in), or a path to a replay file
    #[arg(long, default_value = "scripted")]
    telemetry: String,

    /// Random seed (default: scenario value, else random)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Sampling period override in seconds
    #[arg(long)]
    period: Option<f64>,

    /// Flight log directory override
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Configuration for a one-shot link check
#[derive(Parser, Debug)]
#[command(allow_hyphen_values = true)]
struct CheckLinkConfig {
    /// Path to the triangulated city mesh (Wavefront OBJ)
    mesh: PathBuf,

    /// Gateway latitude in degrees
    gw_lat: f64,
    /// Gateway longitude in degrees
    gw_lon: f64,
    /// Gateway altitude in meters
    gw_alt: f64,

    /// Vehicle latitude in degrees
    uav_lat: f64,
    /// Vehicle longitude in degrees
    uav_lon: f64,
    /// Vehicle altitude in meters
    uav_alt: f64,

    /// TX power override in dBm
    #[arg(long)]
    tx_power: Option<f64>,

    /// Random seed for the shadowing draw (default: random)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================================
// Run Command
// ============================================================================

fn run(config: RunConfig) -> Result<(), RunnerError> {
    let mut scenario = load_scenario(&config.scenario)?;
    if let Some(period) = config.period {
        scenario.sampling.period_s = period;
    }
    if let Some(dir) = config.log_dir {
        scenario.log_dir = dir;
    }
    scenario.validate()?;

    let seed = config
        .seed
        .or(scenario.sampling.seed)
        .unwrap_or_else(rand::random);
    let period = Duration::from_secs_f64(scenario.sampling.period_s);

    eprintln!("Loading 3D environment from {}...", scenario.mesh.display());
    let mesh = Mesh::load(&scenario.mesh)?;
    eprintln!("✓ Mesh loaded ({} faces)", mesh.face_count());

    let frame = LocalFrame::new(scenario.reference());
    let mut channel = LoraChannel::new(scenario.channel.clone(), seed)?;

    let mut source: Box<dyn TelemetrySource> = match config.telemetry.as_str() {
        "scripted" => {
            let plan = scenario.flight.as_ref().ok_or_else(|| {
                ConfigError::Invalid(
                    "scenario has no flight plan; use --telemetry stdin or a replay file".into(),
                )
            })?;
            Box::new(ScriptedFlight::new(plan, scenario.sampling.period_s))
        }
        "stdin" => Box::new(ReaderSource::new(BufReader::new(std::io::stdin()))),
        path => Box::new(ReaderSource::new(BufReader::new(File::open(path)?))),
    };

    // Ctrl+C requests a clean stop through the cancellation token
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .expect("Error setting Ctrl+C handler");

    let (mut log, log_path) = FlightLog::create(&scenario.log_dir)?;
    eprintln!("🚀 Recording to {}. Press Ctrl+C to stop.", log_path.display());

    if config.verbose {
        eprintln!("  seed: {} | period: {:.2}s", seed, scenario.sampling.period_s);
    }

    let stats = ulsim_runner::run_session(
        &mesh,
        &frame,
        &scenario.gateway,
        &mut channel,
        &mut *source,
        &mut log,
        &cancel,
        period,
        |sample| {
            let status = if sample.los { "LOS " } else { "NLOS" };
            eprintln!(
                "  {:8.1} m | {} | {:8.2} dBm | {}",
                sample.distance_m,
                status,
                sample.rssi_dbm,
                if sample.packet_received { "ok" } else { "lost" }
            );
        },
    )?;

    let pct = |count: u64| {
        if stats.samples == 0 {
            0.0
        } else {
            100.0 * count as f64 / stats.samples as f64
        }
    };
    eprintln!("\n⏹  Session complete.");
    eprintln!("  Samples:   {}", stats.samples);
    eprintln!("  LOS:       {} ({:.1}%)", stats.los_samples, pct(stats.los_samples));
    eprintln!(
        "  Delivered: {} ({:.1}%)",
        stats.packets_delivered,
        pct(stats.packets_delivered)
    );
    eprintln!("  Log: {}", log_path.display());
    Ok(())
}

// ============================================================================
// Check-Link Command
// ============================================================================

/// One-shot link evaluation result.
#[derive(Debug, Serialize)]
struct LinkReport {
    distance_m: f64,
    los: bool,
    /// Shadowing-free RSSI (the model median).
    median_rssi_dbm: f64,
    /// One stochastic RSSI draw.
    rssi_dbm: f64,
    packet_received: bool,
}

fn check_link(config: CheckLinkConfig) -> Result<(), RunnerError> {
    let mesh = Mesh::load(&config.mesh)?;

    let gateway = GeoCoord::new(config.gw_lat, config.gw_lon, config.gw_alt);
    let vehicle = GeoCoord::new(config.uav_lat, config.uav_lon, config.uav_alt);
    let frame = LocalFrame::new(gateway);

    let gateway_local = frame.to_local(&gateway);
    let vehicle_local = frame.to_local(&vehicle);
    let distance_m = (vehicle_local - gateway_local).norm();
    let los = check_los(&mesh, &gateway_local, &vehicle_local);

    let mut params = ChannelParams::default();
    if let Some(tx_power) = config.tx_power {
        params.tx_power_dbm = tx_power;
    }
    let seed = config.seed.unwrap_or_else(rand::random);
    let mut channel = LoraChannel::new(params.clone(), seed)?;
    let rssi_dbm = channel.rssi(distance_m, los)?;
    let packet_received = channel.packet_received(rssi_dbm);

    // Median: the same model with the shadowing term disabled
    let median_params = ChannelParams {
        shadowing_std_dev_db: 0.0,
        ..params
    };
    let median_rssi_dbm = compute_rssi(&median_params, &mut rand::thread_rng(), distance_m, los)?;

    let report = LinkReport {
        distance_m,
        los,
        median_rssi_dbm,
        rssi_dbm,
        packet_received,
    };

    match config.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("Distance:     {:.2} m", report.distance_m);
            println!(
                "Status:       {}",
                if report.los { "clear (LOS)" } else { "obstructed (NLOS)" }
            );
            println!("Median RSSI:  {:.2} dBm", report.median_rssi_dbm);
            println!("Sampled RSSI: {:.2} dBm", report.rssi_dbm);
            println!(
                "Packet:       {}",
                if report.packet_received { "received" } else { "lost" }
            );
        }
    }
    Ok(())
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> Result<(), RunnerError> {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Run(c) => c.verbose,
        Commands::CheckLink(c) => c.verbose,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run(config) => run(config),
        Commands::CheckLink(config) => check_link(config),
    }
}
