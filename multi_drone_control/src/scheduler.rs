//! The master's greedy task scheduler: repeatedly finds the cheapest
//! idle-drone/pending-mission pairing and assigns it, until no finite
//! assignment remains.

use crate::drone::Drone;
use mission_planner::stations::nearest_charger;
use mission_planner::{Mission, MissionOps, Station, World};
use shared::error::SimError;
use shared::geometry::dist_between;
use std::collections::{BTreeMap, BTreeSet};

struct Candidate {
    drone_key: String,
    mission_index: usize,
    cost: f64,
}

fn agro_rate(mission: &Mission) -> f64 {
    match mission {
        Mission::Poly(poly) => poly.agro_volume_per_second.unwrap_or(0.0),
        _ => 0.0,
    }
}

/// For every drone currently executing a mission, projects whether it could
/// also take on `mission` after finishing its own: time to finish its
/// current mission, plus travel to `mission`'s start, plus `mission` itself,
/// plus a trip to a charger afterward. Returns the smallest such
/// `time to mission start` among drones for which the whole chain still
/// fits in their remaining battery life, or `f64::INFINITY` if none could.
fn closest_alternative_start(
    mission: &Mission,
    drones_on_mission: &[&String],
    drones: &BTreeMap<String, Drone>,
    charge_stations: &[Station],
) -> f64 {
    let mut best = f64::INFINITY;
    for &other_key in drones_on_mission {
        let other = &drones[other_key];
        let other_mission = match &other.target_mission {
            Some(m) => m,
            None => continue,
        };

        let time_to_finish = other.time_to(other_mission.last_waypoint());
        let time_to_start = dist_between(other_mission.last_waypoint(), mission.first_waypoint()) / other.speed;
        let time_to_execute = mission.total_length() / other.speed;
        let charger = nearest_charger(mission.last_waypoint(), charge_stations).position();
        let time_to_charge = dist_between(mission.last_waypoint(), charger) / other.speed;

        let total = time_to_finish + time_to_start + time_to_execute + time_to_charge;
        if total <= other.lifetime_left {
            best = best.min(time_to_start);
        }
    }
    best
}

/// Assigns as many pending missions as possible to idle, reachable drones.
/// Each iteration finds the single cheapest (drone, mission) pairing and
/// commits it; repeats until no candidate pairing remains. A mission a
/// drone cannot reach, lacks payload for, or cannot finish before running
/// out of battery is never a candidate.
pub fn try_to_schedule_tasks(
    drones: &mut BTreeMap<String, Drone>,
    available: &BTreeSet<String>,
    mission_pool: &mut Vec<Mission>,
    charge_stations: &[Station],
    world: &World,
) -> Result<(), SimError> {
    loop {
        let mission_indices: Vec<usize> = mission_pool
            .iter()
            .enumerate()
            .filter(|(_, m)| m.has_next_waypoint())
            .map(|(i, _)| i)
            .collect();
        if mission_indices.is_empty() {
            break;
        }

        let idle_drones: Vec<&String> = available
            .iter()
            .filter(|k| drones.get(*k).map_or(false, Drone::needs_task))
            .collect();
        if idle_drones.is_empty() {
            break;
        }

        let drones_on_mission: Vec<&String> = available
            .iter()
            .filter(|k| drones.get(*k).map_or(false, |d| d.target_mission.is_some()))
            .collect();

        let mut best: Option<Candidate> = None;

        for &drone_key in &idle_drones {
            let drone = &drones[drone_key];
            for &mi in &mission_indices {
                let mission = &mission_pool[mi];
                if !drone.payload.contains(mission.kind()) {
                    continue;
                }
                if drone.speed <= 0.0 {
                    continue;
                }

                let time_to_start = drone.time_to(mission.first_waypoint());
                let time_to_execute = mission.total_length() / drone.speed;

                if mission.kind() == "agro" {
                    let rate = agro_rate(mission);
                    if drone.payload_agro_volume_left < time_to_execute * rate {
                        continue;
                    }
                }

                let charger = nearest_charger(mission.last_waypoint(), charge_stations).position();
                let time_to_charge = dist_between(mission.last_waypoint(), charger) / drone.speed;
                if time_to_start + time_to_execute + time_to_charge > drone.lifetime_left {
                    continue;
                }

                let closest_alt_start =
                    closest_alternative_start(mission, &drones_on_mission, drones, charge_stations);
                let cost = time_to_start + time_to_execute - closest_alt_start * 0.25;

                let better = match &best {
                    None => true,
                    Some(b) => cost < b.cost,
                };
                if better {
                    best = Some(Candidate {
                        drone_key: drone_key.clone(),
                        mission_index: mi,
                        cost,
                    });
                }
            }
        }

        match best {
            Some(candidate) => {
                let mission = mission_pool.remove(candidate.mission_index);
                tracing::info!(
                    drone = %candidate.drone_key,
                    mission = mission.key(),
                    cost = candidate.cost,
                    "scheduling mission"
                );
                drones
                    .get_mut(&candidate.drone_key)
                    .expect("candidate drone key came from the drones map")
                    .add_task(mission, world)?;
            }
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::DroneState;
    use mission_planner::stations::StationKind;
    use mission_planner::{PathMission, PointMission};
    use std::collections::HashSet;

    fn idle_drone(key: &str, payload: &[&str]) -> Drone {
        Drone {
            key: key.to_string(),
            is_master: false,
            payload: payload.iter().map(|s| s.to_string()).collect(),
            x: 0.0,
            y: 0.0,
            speed: 10.0,
            max_lifetime: 1000.0,
            lifetime_left: 1000.0,
            charge_power: 1.0,
            payload_agro_volume: 0.0,
            payload_agro_volume_left: 0.0,
            state: DroneState::Wait,
            target_x: None,
            target_y: None,
            target_mission: None,
            path_planner_mission: None,
            flying: false,
        }
    }

    fn flat_world(name: &str) -> World {
        use shared::config::WorldConfig;
        let dir = std::env::temp_dir();
        let dem_name = format!("scheduler_test_dem_{name}.png");
        let dem_path = dir.join(&dem_name);
        let img = image::GrayImage::from_pixel(20, 20, image::Luma([0u8]));
        img.save(&dem_path).unwrap();
        let cfg = WorldConfig {
            dem_path: dem_name,
            dem_resolution: 1.0,
            maximum_allowed_height: 255.0,
            simulation_step: 1.0,
            wireless_range: 100.0,
            drone_speed: 10.0,
            drone_life: 1000.0,
            charge_power: 1.0,
        };
        let world = World::load(&cfg, &dir).unwrap();
        let _ = std::fs::remove_file(&dem_path);
        world
    }

    #[test]
    fn schedules_reachable_mission_to_capable_drone() {
        let world = flat_world("schedules_reachable_mission_to_capable_drone");
        let mut drones = BTreeMap::new();
        drones.insert("0".to_string(), idle_drone("0", &["scan"]));
        let available: BTreeSet<String> = ["0".to_string()].into_iter().collect();

        let mut pool = vec![Mission::Path(PathMission {
            key: 1,
            kind: "scan".into(),
            waypoints: vec![(5.0, 5.0)],
            visited: vec![false],
            n_visited: 0,
        })];
        let charge_stations = vec![Station {
            key: 1,
            kind: StationKind::Charge,
            x: 0.0,
            y: 0.0,
        }];

        try_to_schedule_tasks(&mut drones, &available, &mut pool, &charge_stations, &world).unwrap();
        assert!(pool.is_empty());
        assert!(drones["0"].target_mission.is_some());
    }

    #[test]
    fn skips_mission_drone_has_no_payload_for() {
        let world = flat_world("skips_mission_drone_has_no_payload_for");
        let mut drones = BTreeMap::new();
        drones.insert("0".to_string(), idle_drone("0", &["scan"]));
        let available: BTreeSet<String> = ["0".to_string()].into_iter().collect();

        let mut pool = vec![Mission::Point(PointMission {
            key: 1,
            kind: "agro".into(),
            total_time: 1.0,
            time_to_finish_left: 1.0,
            x: 5.0,
            y: 5.0,
        })];
        let charge_stations = vec![Station {
            key: 1,
            kind: StationKind::Charge,
            x: 0.0,
            y: 0.0,
        }];

        try_to_schedule_tasks(&mut drones, &available, &mut pool, &charge_stations, &world).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(drones["0"].target_mission.is_none());
    }
}
