pub mod drone;
pub mod scheduler;
pub mod wireless;

pub use drone::{load_drones, Drone, DroneState};
pub use scheduler::try_to_schedule_tasks;
pub use wireless::reachable_drones;

use mission_planner::{Mission, Station, World};
use shared::error::SimError;
use std::collections::BTreeMap;

/// Runs one fixed-step tick of the swarm: rewires the wireless topology,
/// lets the master schedule any idle, reachable drones against pending
/// missions, then advances every drone's own state machine in ascending
/// key order.
pub fn tick(
    dt: f64,
    drones: &mut BTreeMap<String, Drone>,
    master_key: &str,
    mission_pool: &mut Vec<Mission>,
    charge_stations: &[Station],
    world: &World,
) -> Result<(), SimError> {
    let reachable = reachable_drones(drones, master_key, world.wireless_range);

    try_to_schedule_tasks(drones, &reachable, mission_pool, charge_stations, world)?;

    let total = drones.len();
    let reachable_count = reachable.len();
    let keys: Vec<String> = drones.keys().cloned().collect();
    for key in keys {
        let mut d = drones.remove(&key).expect("key came from this map's own keys");
        let result = d.update(dt, world, drones, charge_stations, mission_pool, total, reachable_count);
        drones.insert(key, d);
        result?;
    }
    Ok(())
}
