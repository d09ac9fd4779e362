//! Non-interactive driver: loads the four JSON configuration documents and
//! the DEM, then runs the fixed-step swarm loop for a requested number of
//! ticks, logging as it goes and printing a run summary at the end.

use anyhow::Result;
use clap::Parser;
use mission_planner::{missions, stations, World};
use std::path::PathBuf;
use std::time::Duration;

/// Rasterization sampling density, meters. A driver-loop literal, independent
/// of the DEM's routing-grid resolution.
const MISSION_STEP: f64 = 500.0;
/// Nominal speed used only to size split sub-missions, m/s. Independent of
/// any individual drone's actual speed.
const SPLIT_SPEED: f64 = 8.0;
/// Per-sub-mission time budget used when splitting, seconds.
const SPLIT_TIME_BUDGET: f64 = 1000.0;

#[derive(Parser)]
#[command(name = "drone_simulator")]
#[command(about = "Fixed-step multi-drone mission simulator")]
struct Cli {
    /// Directory holding world.json, stations.json, drones.json, missions.json and the DEM image
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Overrides the world config file path
    #[arg(long)]
    world: Option<PathBuf>,
    /// Overrides the stations config file path
    #[arg(long)]
    stations: Option<PathBuf>,
    /// Overrides the drones config file path
    #[arg(long)]
    drones: Option<PathBuf>,
    /// Overrides the missions config file path
    #[arg(long)]
    missions: Option<PathBuf>,

    /// Number of fixed-size ticks to run
    #[arg(long, default_value_t = 1000)]
    ticks: u64,

    /// Seconds simulated per tick; defaults to the world config's simulation_step
    #[arg(long)]
    dt: Option<f64>,

    /// How many ticks to run between frame log lines (mirrors the source's steps-per-frame control)
    #[arg(long, default_value_t = 1)]
    steps_per_frame: u64,

    /// Milliseconds paused between frame log lines, purely for readability (mirrors the source's slowdown control)
    #[arg(long, default_value_t = 0)]
    slowdown_ms: u64,
}

fn main() -> Result<()> {
    shared::init_logging()?;
    let cli = Cli::parse();

    let world_path = cli.world.unwrap_or_else(|| cli.config_dir.join("world.json"));
    let stations_path = cli.stations.unwrap_or_else(|| cli.config_dir.join("stations.json"));
    let drones_path = cli.drones.unwrap_or_else(|| cli.config_dir.join("drones.json"));
    let missions_path = cli.missions.unwrap_or_else(|| cli.config_dir.join("missions.json"));

    let world_config = shared::config::load_world(&world_path)?;
    let dt = cli.dt.unwrap_or(world_config.simulation_step);
    let world = World::load(&world_config, &cli.config_dir)?;

    let station_configs = shared::config::load_stations(&stations_path)?;
    let (control, charge_stations) = stations::load_stations(station_configs)?;

    let drone_configs = shared::config::load_drones(&drones_path)?;
    let mut drones = multi_drone_control::load_drones(drone_configs, control.position(), world.charge_power)?;
    let master_key = drones
        .iter()
        .find(|(_, d)| d.is_master)
        .map(|(k, _)| k.clone())
        .expect("load_drones enforces exactly one master");

    let mission_configs = shared::config::load_missions(&missions_path)?;
    let mut mission_pool = missions::load_missions(&mission_configs)?;
    missions::rasterize_all(&mut mission_pool, MISSION_STEP);
    let mut mission_pool = missions::split_and_rekey(mission_pool, SPLIT_TIME_BUDGET, SPLIT_SPEED);

    tracing::info!(
        drones = drones.len(),
        missions = mission_pool.len(),
        charge_stations = charge_stations.len(),
        ticks = cli.ticks,
        dt,
        "starting simulation"
    );

    let mut tick_no = 0u64;
    let run: Result<(), shared::error::SimError> = (|| {
        while tick_no < cli.ticks {
            multi_drone_control::tick(dt, &mut drones, &master_key, &mut mission_pool, &charge_stations, &world)?;
            tick_no += 1;
            if tick_no % cli.steps_per_frame == 0 {
                tracing::info!(tick = tick_no, pending_missions = mission_pool.len(), "frame");
                if cli.slowdown_ms > 0 {
                    std::thread::sleep(Duration::from_millis(cli.slowdown_ms));
                }
            }
        }
        Ok(())
    })();

    let airborne = drones.values().filter(|d| d.flying).count();
    let assigned = drones.values().filter(|d| d.target_mission.is_some()).count();

    println!("ticks executed: {tick_no}");
    println!("missions pending: {}", mission_pool.len());
    println!("missions assigned: {assigned}");
    println!("drones airborne: {airborne}");

    run?;
    Ok(())
}
