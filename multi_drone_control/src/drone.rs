//! The per-drone state machine: flight, mission progress, charging,
//! collision avoidance and battery-driven diversion.

use mission_planner::stations::{furthest_charger, nearest_charger, time_to_furthest_charger, time_to_nearest_charger};
use mission_planner::{Mission, MissionOps, PathMission, Station, World};
use shared::config::DroneConfig;
use shared::error::SimError;
use shared::geometry::{dist, segments_intersect, Point};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroneState {
    Wait,
    FlyToMission,
    OnMission,
    FlyToCharge,
    OnCharge,
}

#[derive(Debug, Clone)]
pub struct Drone {
    pub key: String,
    pub is_master: bool,
    pub payload: HashSet<String>,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub max_lifetime: f64,
    pub lifetime_left: f64,
    pub charge_power: f64,
    pub payload_agro_volume: f64,
    pub payload_agro_volume_left: f64,
    pub state: DroneState,
    pub target_x: Option<f64>,
    pub target_y: Option<f64>,
    pub target_mission: Option<Mission>,
    pub path_planner_mission: Option<PathMission>,
    pub flying: bool,
}

/// Scales `(dx, dy)` to magnitude `speed`, clamping the divisor to at least
/// 1 so a near-zero vector doesn't blow up the ratio.
fn speed_limit(dx: f64, dy: f64, speed: f64) -> (f64, f64) {
    let magnitude = dist(dx, dy).max(1.0);
    let ratio = speed / magnitude;
    (dx * ratio, dy * ratio)
}

impl Drone {
    pub fn position(&self) -> Point {
        (self.x, self.y)
    }

    fn target(&self) -> Option<Point> {
        match (self.target_x, self.target_y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }

    pub fn needs_task(&self) -> bool {
        self.target_mission.is_none() && self.state == DroneState::Wait
    }

    pub fn time_to(&self, point: Point) -> f64 {
        shared::geometry::dist_between(self.position(), point) / self.speed
    }

    fn predict_next_position(&self, dt: f64, target: Option<Point>) -> Point {
        match target {
            None => self.position(),
            Some((tx, ty)) => {
                let (dx, dy) = (tx - self.x, ty - self.y);
                let distance_to_target = dist(dx, dy);
                let (vx, vy) = speed_limit(dx, dy, self.speed);
                let (sx, sy) = (vx * dt, vy * dt);
                if dist(sx, sy) >= distance_to_target {
                    (tx, ty)
                } else {
                    (self.x + sx, self.y + sy)
                }
            }
        }
    }

    fn route_to(&mut self, world: &World, destination: Point) -> Result<(), SimError> {
        let path = world.estimate_path(self.position(), destination)?;
        let waypoints_len = path.len();
        self.path_planner_mission = Some(PathMission {
            key: 0,
            kind: String::new(),
            waypoints: path,
            visited: vec![false; waypoints_len],
            n_visited: 0,
        });
        let wp = self.path_planner_mission.as_ref().unwrap().first_waypoint();
        self.target_x = Some(wp.0);
        self.target_y = Some(wp.1);
        Ok(())
    }

    /// Assigns `mission` to this (idle) drone and plans the outbound route
    /// to its first waypoint.
    pub fn add_task(&mut self, mission: Mission, world: &World) -> Result<(), SimError> {
        debug_assert!(self.needs_task());
        let first = mission.first_waypoint();
        self.target_mission = Some(mission);
        self.flying = true;
        self.state = DroneState::FlyToMission;
        self.route_to(world, first)
    }

    fn check_battery(
        &mut self,
        charge_stations: &[Station],
        world: &World,
        mission_pool: &mut Vec<Mission>,
    ) -> Result<(), SimError> {
        if matches!(self.state, DroneState::FlyToCharge | DroneState::OnCharge) {
            return Ok(());
        }
        let nearest_time = time_to_nearest_charger(self.position(), charge_stations, self.speed);
        if self.lifetime_left <= nearest_time {
            tracing::warn!(drone = %self.key, nearest_time, lifetime_left = self.lifetime_left, "battery low, diverting to nearest charger");
            if let Some(mission) = self.target_mission.take() {
                mission_pool.push(mission);
            }
            let charger = nearest_charger(self.position(), charge_stations).position();
            self.state = DroneState::FlyToCharge;
            self.route_to(world, charger)?;
        }
        Ok(())
    }

    /// Flight step: advances toward `(target_x, target_y)`, pausing for
    /// collision avoidance, then handles arrival.
    fn fly(&mut self, dt: f64, others: &BTreeMap<String, Drone>) -> Result<(), SimError> {
        let target = self.target();
        let mut next = self.predict_next_position(dt, target);

        for (other_key, other) in others {
            let other_next = other.predict_next_position(dt, other.target());
            if segments_intersect(self.position(), next, other.position(), other_next)
                && self.key.as_str() < other_key.as_str()
            {
                tracing::info!(drone = %self.key, other = %other_key, "pausing for collision avoidance");
                next = self.position();
            }
        }

        self.x = next.0;
        self.y = next.1;

        if target == Some(self.position()) {
            self.target_x = None;
            self.target_y = None;

            if let Some(mut ppm) = self.path_planner_mission.take() {
                ppm.update(dt);
                if !ppm.finished() {
                    let wp = ppm.next_waypoint();
                    self.target_x = Some(wp.0);
                    self.target_y = Some(wp.1);
                    self.path_planner_mission = Some(ppm);
                    return Ok(());
                }
            }

            match self.state {
                DroneState::FlyToMission => {
                    self.state = DroneState::OnMission;
                    tracing::info!(drone = %self.key, "arrived, starting mission");
                }
                DroneState::FlyToCharge => {
                    self.state = DroneState::OnCharge;
                    self.flying = false;
                    tracing::info!(drone = %self.key, "arrived at charger");
                }
                other => {
                    return Err(SimError::StateDesync(format!(
                        "drone {} arrived while in state {other:?}",
                        self.key
                    )))
                }
            }
        }
        Ok(())
    }

    fn update_mission(&mut self, dt: f64, mission_pool: &mut Vec<Mission>) -> Result<(), SimError> {
        if self.state != DroneState::OnMission {
            return Err(SimError::StateDesync(format!(
                "update_mission called on drone {} outside onMission",
                self.key
            )));
        }
        let mission = self
            .target_mission
            .as_mut()
            .expect("onMission implies target_mission is Some");
        mission.update(dt);

        if mission.kind() == "agro" {
            if let Mission::Poly(poly) = mission {
                if let Some(rate) = poly.agro_volume_per_second {
                    self.payload_agro_volume_left -= rate * dt;
                    if self.payload_agro_volume_left < 0.0 {
                        tracing::warn!(drone = %self.key, "agro payload exhausted mid-mission");
                    }
                }
            }
        }

        if mission.finished() {
            let mut finished = self.target_mission.take().unwrap();
            if let Mission::Patrol(patrol) = &mut finished {
                patrol.reset();
                mission_pool.push(finished);
            }
            self.state = DroneState::Wait;
            tracing::info!(drone = %self.key, "mission finished");
        } else if mission.has_next_waypoint() {
            let wp = mission.next_waypoint();
            self.target_x = Some(wp.0);
            self.target_y = Some(wp.1);
            self.state = DroneState::FlyToMission;
        }
        Ok(())
    }

    fn update_charge(&mut self, dt: f64) -> Result<(), SimError> {
        self.lifetime_left = (self.lifetime_left + self.charge_power * dt).min(self.max_lifetime);

        if (self.payload_agro_volume_left - self.payload_agro_volume).abs() > f64::EPSILON {
            tracing::info!(drone = %self.key, "restoring agro payload while charging");
            self.payload_agro_volume_left = self.payload_agro_volume;
        }

        if self.lifetime_left >= self.max_lifetime {
            if self.target_mission.is_some() {
                return Err(SimError::StateDesync(format!(
                    "drone {} finished charging with a mission still assigned",
                    self.key
                )));
            }
            self.state = DroneState::Wait;
            tracing::info!(drone = %self.key, "charge finished");
        }
        Ok(())
    }

    /// The master's wait-state connectivity patrol: if the reachable set is
    /// smaller than the swarm, fly to the furthest charger to extend the
    /// wireless relay, provided there's enough battery to get there.
    fn maybe_patrol_for_connectivity(
        &mut self,
        charge_stations: &[Station],
        world: &World,
        total_drones: usize,
        reachable: usize,
    ) -> Result<(), SimError> {
        if !self.is_master || reachable >= total_drones {
            return Ok(());
        }
        let furthest_time = time_to_furthest_charger(self.position(), charge_stations, self.speed);
        if self.lifetime_left >= furthest_time {
            let charger = furthest_charger(self.position(), charge_stations).position();
            tracing::info!(drone = %self.key, "master diverting to furthest charger to relay connectivity");
            self.state = DroneState::FlyToCharge;
            self.flying = true;
            self.route_to(world, charger)?;
        }
        Ok(())
    }

    /// Advances this drone by one tick. `others` must be the rest of the
    /// swarm (this drone removed), reflecting this tick's moves for
    /// already-updated lower-keyed peers.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        dt: f64,
        world: &World,
        others: &BTreeMap<String, Drone>,
        charge_stations: &[Station],
        mission_pool: &mut Vec<Mission>,
        total_drones: usize,
        reachable: usize,
    ) -> Result<(), SimError> {
        if !matches!(self.state, DroneState::FlyToCharge | DroneState::OnCharge) {
            self.check_battery(charge_stations, world, mission_pool)?;
        }

        match self.state {
            DroneState::FlyToMission | DroneState::FlyToCharge => self.fly(dt, others)?,
            DroneState::OnMission => self.update_mission(dt, mission_pool)?,
            DroneState::OnCharge => self.update_charge(dt)?,
            DroneState::Wait => {
                self.maybe_patrol_for_connectivity(charge_stations, world, total_drones, reachable)?
            }
        }

        if self.flying {
            self.lifetime_left -= dt;
            if self.lifetime_left <= 0.0 {
                return Err(SimError::BatteryExhausted(self.key.clone()));
            }
        }
        Ok(())
    }
}

pub fn load_drones(
    configs: Vec<DroneConfig>,
    start: Point,
    charge_power: f64,
) -> Result<BTreeMap<String, Drone>, SimError> {
    let mut drones = BTreeMap::new();
    for (idx, cfg) in configs.into_iter().enumerate() {
        let key = idx.to_string();
        let payload: HashSet<String> = cfg.payload.into_iter().collect();
        let agro_volume = cfg.payload_agro_volume.unwrap_or(0.0);
        drones.insert(
            key.clone(),
            Drone {
                key,
                is_master: cfg.is_master,
                payload,
                x: start.0,
                y: start.1,
                speed: cfg.speed,
                max_lifetime: cfg.lifetime,
                lifetime_left: cfg.lifetime,
                charge_power,
                payload_agro_volume: agro_volume,
                payload_agro_volume_left: agro_volume,
                state: DroneState::Wait,
                target_x: None,
                target_y: None,
                target_mission: None,
                path_planner_mission: None,
                flying: false,
            },
        );
    }
    Ok(drones)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_drone(key: &str, x: f64, y: f64) -> Drone {
        Drone {
            key: key.to_string(),
            is_master: false,
            payload: HashSet::new(),
            x,
            y,
            speed: 10.0,
            max_lifetime: 100.0,
            lifetime_left: 100.0,
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

    #[test]
    fn needs_task_when_idle() {
        let drone = test_drone("0", 0.0, 0.0);
        assert!(drone.needs_task());
    }

    #[test]
    fn charge_restores_lifetime_and_agro() {
        let mut drone = test_drone("0", 0.0, 0.0);
        drone.state = DroneState::OnCharge;
        drone.lifetime_left = 50.0;
        drone.payload_agro_volume = 20.0;
        drone.payload_agro_volume_left = 5.0;
        drone.update_charge(10.0).unwrap();
        assert_eq!(drone.lifetime_left, 60.0);
        assert_eq!(drone.payload_agro_volume_left, 20.0);
        assert_eq!(drone.state, DroneState::OnCharge);
    }

    #[test]
    fn full_charge_transitions_to_wait() {
        let mut drone = test_drone("0", 0.0, 0.0);
        drone.state = DroneState::OnCharge;
        drone.lifetime_left = 95.0;
        drone.update_charge(10.0).unwrap();
        assert_eq!(drone.lifetime_left, 100.0);
        assert_eq!(drone.state, DroneState::Wait);
    }

    #[test]
    fn lower_key_pauses_on_collision() {
        let mut a = test_drone("1", 0.0, 0.0);
        a.target_x = Some(10.0);
        a.target_y = Some(0.0);
        a.state = DroneState::FlyToMission;

        let mut b = test_drone("2", 10.0, 0.0);
        b.target_x = Some(0.0);
        b.target_y = Some(0.0);
        b.state = DroneState::FlyToMission;

        let mut others = BTreeMap::new();
        others.insert("2".to_string(), b.clone());
        a.fly(1.0, &others).unwrap();
        assert_eq!(a.position(), (0.0, 0.0), "lower key must pause");

        let mut others2 = BTreeMap::new();
        others2.insert("1".to_string(), test_drone("1", 0.0, 0.0));
        b.fly(1.0, &others2).unwrap();
        assert_ne!(b.position(), (10.0, 0.0), "higher key must move");
    }

    #[test]
    fn speed_limit_clamps_near_zero_vector() {
        let (vx, vy) = speed_limit(0.0, 0.0, 5.0);
        assert!(vx.is_finite() && vy.is_finite());
    }
}
