//! The four mission variants and the operations shared across them:
//! boustrophedon polygon rasterization, mission splitting, and loading from
//! the raw JSON records in [`shared::config`].

use shared::config::MissionConfig;
use shared::error::SimError;
use shared::geometry::{dist_between, Point};

pub trait MissionOps {
    fn key(&self) -> u32;
    fn set_key(&mut self, key: u32);
    /// The payload tag this mission requires a drone to carry (e.g. "agro", "scan").
    fn kind(&self) -> &str;
    fn has_next_waypoint(&self) -> bool;
    fn next_waypoint(&self) -> Point;
    fn first_waypoint(&self) -> Point;
    fn last_waypoint(&self) -> Point;
    fn total_length(&self) -> f64;
    /// Advances mission progress. All variants ignore `dt` and mark exactly
    /// one more waypoint visited per call.
    fn update(&mut self, dt: f64);
    fn finished(&self) -> bool;
}

fn total_length_of(waypoints: &[Point]) -> f64 {
    waypoints
        .windows(2)
        .map(|pair| dist_between(pair[0], pair[1]))
        .sum()
}

#[derive(Debug, Clone)]
pub struct PointMission {
    pub key: u32,
    pub kind: String,
    pub total_time: f64,
    pub time_to_finish_left: f64,
    pub x: f64,
    pub y: f64,
}

impl MissionOps for PointMission {
    fn key(&self) -> u32 {
        self.key
    }
    fn set_key(&mut self, key: u32) {
        self.key = key;
    }
    fn kind(&self) -> &str {
        &self.kind
    }
    fn has_next_waypoint(&self) -> bool {
        !self.finished()
    }
    fn next_waypoint(&self) -> Point {
        (self.x, self.y)
    }
    fn first_waypoint(&self) -> Point {
        (self.x, self.y)
    }
    fn last_waypoint(&self) -> Point {
        (self.x, self.y)
    }
    fn total_length(&self) -> f64 {
        0.0
    }
    fn update(&mut self, dt: f64) {
        self.time_to_finish_left = (self.time_to_finish_left - dt).max(0.0);
    }
    fn finished(&self) -> bool {
        self.time_to_finish_left <= 0.0
    }
}

#[derive(Debug, Clone)]
pub struct PolyMission {
    pub key: u32,
    pub kind: String,
    pub polygon: Vec<Point>,
    pub step: f64,
    pub waypoints: Vec<Point>,
    pub visited: Vec<bool>,
    pub n_visited: usize,
    pub agro_volume_per_second: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PathMission {
    pub key: u32,
    pub kind: String,
    pub waypoints: Vec<Point>,
    pub visited: Vec<bool>,
    pub n_visited: usize,
}

#[derive(Debug, Clone)]
pub struct PatrolMission {
    pub key: u32,
    pub kind: String,
    pub waypoints: Vec<Point>,
    pub visited: Vec<bool>,
    pub n_visited: usize,
}

impl PatrolMission {
    pub fn reset(&mut self) {
        self.n_visited = 0;
        self.visited.iter_mut().for_each(|v| *v = false);
    }
}

macro_rules! impl_waypoint_stepper {
    ($t:ty) => {
        impl MissionOps for $t {
            fn key(&self) -> u32 {
                self.key
            }
            fn set_key(&mut self, key: u32) {
                self.key = key;
            }
            fn kind(&self) -> &str {
                &self.kind
            }
            fn has_next_waypoint(&self) -> bool {
                self.n_visited < self.waypoints.len()
            }
            fn next_waypoint(&self) -> Point {
                self.waypoints[self.n_visited]
            }
            fn first_waypoint(&self) -> Point {
                self.waypoints[0]
            }
            fn last_waypoint(&self) -> Point {
                *self.waypoints.last().expect("waypoints is non-empty")
            }
            fn total_length(&self) -> f64 {
                total_length_of(&self.waypoints)
            }
            fn update(&mut self, _dt: f64) {
                if self.n_visited < self.visited.len() {
                    self.visited[self.n_visited] = true;
                }
                self.n_visited += 1;
            }
            fn finished(&self) -> bool {
                self.n_visited >= self.waypoints.len()
            }
        }
    };
}

impl_waypoint_stepper!(PolyMission);
impl_waypoint_stepper!(PathMission);
impl_waypoint_stepper!(PatrolMission);

#[derive(Debug, Clone)]
pub enum Mission {
    Point(PointMission),
    Poly(PolyMission),
    Path(PathMission),
    Patrol(PatrolMission),
}

impl Mission {
    pub fn is_patrol(&self) -> bool {
        matches!(self, Mission::Patrol(_))
    }
}

impl MissionOps for Mission {
    fn key(&self) -> u32 {
        match self {
            Mission::Point(m) => m.key(),
            Mission::Poly(m) => m.key(),
            Mission::Path(m) => m.key(),
            Mission::Patrol(m) => m.key(),
        }
    }
    fn set_key(&mut self, key: u32) {
        match self {
            Mission::Point(m) => m.set_key(key),
            Mission::Poly(m) => m.set_key(key),
            Mission::Path(m) => m.set_key(key),
            Mission::Patrol(m) => m.set_key(key),
        }
    }
    fn kind(&self) -> &str {
        match self {
            Mission::Point(m) => m.kind(),
            Mission::Poly(m) => m.kind(),
            Mission::Path(m) => m.kind(),
            Mission::Patrol(m) => m.kind(),
        }
    }
    fn has_next_waypoint(&self) -> bool {
        match self {
            Mission::Point(m) => m.has_next_waypoint(),
            Mission::Poly(m) => m.has_next_waypoint(),
            Mission::Path(m) => m.has_next_waypoint(),
            Mission::Patrol(m) => m.has_next_waypoint(),
        }
    }
    fn next_waypoint(&self) -> Point {
        match self {
            Mission::Point(m) => m.next_waypoint(),
            Mission::Poly(m) => m.next_waypoint(),
            Mission::Path(m) => m.next_waypoint(),
            Mission::Patrol(m) => m.next_waypoint(),
        }
    }
    fn first_waypoint(&self) -> Point {
        match self {
            Mission::Point(m) => m.first_waypoint(),
            Mission::Poly(m) => m.first_waypoint(),
            Mission::Path(m) => m.first_waypoint(),
            Mission::Patrol(m) => m.first_waypoint(),
        }
    }
    fn last_waypoint(&self) -> Point {
        match self {
            Mission::Point(m) => m.last_waypoint(),
            Mission::Poly(m) => m.last_waypoint(),
            Mission::Path(m) => m.last_waypoint(),
            Mission::Patrol(m) => m.last_waypoint(),
        }
    }
    fn total_length(&self) -> f64 {
        match self {
            Mission::Point(m) => m.total_length(),
            Mission::Poly(m) => m.total_length(),
            Mission::Path(m) => m.total_length(),
            Mission::Patrol(m) => m.total_length(),
        }
    }
    fn update(&mut self, dt: f64) {
        match self {
            Mission::Point(m) => m.update(dt),
            Mission::Poly(m) => m.update(dt),
            Mission::Path(m) => m.update(dt),
            Mission::Patrol(m) => m.update(dt),
        }
    }
    fn finished(&self) -> bool {
        match self {
            Mission::Point(m) => m.finished(),
            Mission::Poly(m) => m.finished(),
            Mission::Path(m) => m.finished(),
            Mission::Patrol(m) => m.finished(),
        }
    }
}

/// numpy.arange-like float range: `start` inclusive, `stop` exclusive.
fn frange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if stop <= start || step <= 0.0 {
        return Vec::new();
    }
    let count = ((stop - start) / step).ceil() as usize;
    (0..count).map(|i| start + i as f64 * step).collect()
}

/// Even-odd point-in-polygon test, boundary excluded (matching the strict
/// `shapely` containment test the source rasterizer relies on).
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        let crosses = (yi > p.1) != (yj > p.1);
        if crosses {
            let x_at_y = xi + (p.1 - yi) / (yj - yi) * (xj - xi);
            if p.0 < x_at_y {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Boustrophedon (serpentine) rasterization of `polygon` at grid spacing
/// `step`: samples cell centers row by row, reversing every even-indexed
/// row.
pub fn rasterize_polygon(polygon: &[Point], step: f64) -> Vec<Point> {
    let min_x = polygon.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = polygon.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let min_y = polygon.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let max_y = polygon.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

    let mut waypoints = Vec::new();
    for (irow, y) in frange(min_y, max_y, step).into_iter().enumerate() {
        let mut row: Vec<Point> = frange(min_x, max_x, step)
            .into_iter()
            .map(|x| (x, y))
            .filter(|&p| point_in_polygon(p, polygon))
            .collect();
        if irow % 2 == 0 {
            row.reverse();
        }
        waypoints.extend(row);
    }
    waypoints
}

/// Closed 4-corner ring for a `[x, y, w, h]` rectangle, not explicitly
/// closed (the last vertex does not repeat the first).
pub fn poly_square(rect: [f64; 4]) -> Vec<Point> {
    let [x, y, w, h] = rect;
    vec![(x, y), (x + w, y), (x + w, y + h), (x, y + h)]
}

/// Splits a polygon mission into sub-missions, each covering at most
/// `time_budget` seconds of travel at the given nominal `speed`. The
/// waypoint that pushes accumulated time over budget is included in the
/// sub-mission it completes, not deferred to the next one. Concatenating
/// the returned sub-missions' waypoints in order reproduces `mission`'s
/// waypoint list exactly.
pub fn split_mission(mission: &PolyMission, time_budget: f64, speed: f64) -> Vec<PolyMission> {
    let mut out = Vec::new();
    let mut buf_waypoints: Vec<Point> = Vec::new();
    let mut buf_visited: Vec<bool> = Vec::new();
    let mut cur_time = 0.0;

    for (i, &wp) in mission.waypoints.iter().enumerate() {
        buf_waypoints.push(wp);
        buf_visited.push(mission.visited[i]);
        if i > 0 {
            cur_time += dist_between(mission.waypoints[i - 1], wp) / speed;
        }
        if cur_time > time_budget || i + 1 == mission.waypoints.len() {
            out.push(PolyMission {
                key: mission.key,
                kind: mission.kind.clone(),
                polygon: mission.polygon.clone(),
                step: mission.step,
                waypoints: std::mem::take(&mut buf_waypoints),
                visited: std::mem::take(&mut buf_visited),
                n_visited: 0,
                agro_volume_per_second: mission.agro_volume_per_second,
            });
            cur_time = 0.0;
        }
    }
    out
}

fn close_ring(mut ring: Vec<Point>) -> Vec<Point> {
    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }
    ring
}

/// Builds the mission pool from the raw config records, in the same
/// dispatch order as the source: patrol fields checked first, then
/// `destination`, then area (`rect`/`polygon`).
pub fn load_missions(configs: &[MissionConfig]) -> Result<Vec<Mission>, SimError> {
    let mut missions = Vec::with_capacity(configs.len());
    for (idx, cfg) in configs.iter().enumerate() {
        let key = idx as u32 + 1;
        let mission = if let Some(rect) = cfg.patrolrect {
            let waypoints = close_ring(poly_square(rect));
            Mission::Patrol(PatrolMission {
                key,
                kind: cfg.kind.clone().unwrap_or_default(),
                visited: vec![false; waypoints.len()],
                n_visited: 0,
                waypoints,
            })
        } else if let Some(poly) = &cfg.patrolpolygon {
            let waypoints = close_ring(poly.iter().map(|&[x, y]| (x, y)).collect());
            Mission::Patrol(PatrolMission {
                key,
                kind: cfg.kind.clone().unwrap_or_default(),
                visited: vec![false; waypoints.len()],
                n_visited: 0,
                waypoints,
            })
        } else if let Some([x, y]) = cfg.destination {
            Mission::Path(PathMission {
                key,
                kind: cfg.kind.clone().unwrap_or_default(),
                waypoints: vec![(x, y)],
                visited: vec![false],
                n_visited: 0,
            })
        } else if let Some(rect) = cfg.rect {
            let polygon = poly_square(rect);
            Mission::Poly(PolyMission {
                key,
                kind: cfg.kind.clone().unwrap_or_default(),
                waypoints: Vec::new(),
                visited: Vec::new(),
                n_visited: 0,
                agro_volume_per_second: cfg.agro_volume_per_second,
                polygon,
                step: 0.0,
            })
        } else if let Some(poly) = &cfg.polygon {
            let polygon: Vec<Point> = poly.iter().map(|&[x, y]| (x, y)).collect();
            Mission::Poly(PolyMission {
                key,
                kind: cfg.kind.clone().unwrap_or_default(),
                waypoints: Vec::new(),
                visited: Vec::new(),
                n_visited: 0,
                agro_volume_per_second: cfg.agro_volume_per_second,
                polygon,
                step: 0.0,
            })
        } else {
            return Err(SimError::Config(format!(
                "mission {idx} has no recognizable variant fields"
            )));
        };
        missions.push(mission);
    }
    Ok(missions)
}

/// Rasterizes every pending [`PolyMission`]'s waypoints at resolution
/// `step`. Called once after loading, before splitting and before the
/// first tick. `step` is a driver-loop constant (independent of the
/// routing grid's DEM resolution), not a per-mission or per-world value.
pub fn rasterize_all(missions: &mut [Mission], step: f64) {
    for mission in missions.iter_mut() {
        if let Mission::Poly(poly) = mission {
            poly.step = step;
            poly.waypoints = rasterize_polygon(&poly.polygon, step);
            poly.visited = vec![false; poly.waypoints.len()];
        }
    }
}

/// Splits every polygon mission into sub-missions of at most `time_budget`
/// seconds at nominal `speed`, passes path/patrol missions through
/// unchanged, flattens the result, and re-keys the combined list
/// sequentially starting at 1. Called once after rasterization, before the
/// first tick.
pub fn split_and_rekey(missions: Vec<Mission>, time_budget: f64, speed: f64) -> Vec<Mission> {
    let mut out = Vec::with_capacity(missions.len());
    for mission in missions {
        match mission {
            Mission::Poly(poly) => {
                out.extend(split_mission(&poly, time_budget, speed).into_iter().map(Mission::Poly));
            }
            other => out.push(other),
        }
    }
    for (i, mission) in out.iter_mut().enumerate() {
        mission.set_key(i as u32 + 1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rasterizes_unit_square_with_boustrophedon_rows() {
        // row y=0 is the 0th (even) row and is reversed; row y=2 is the 1st
        // (odd) row and keeps ascending x order.
        let square = poly_square([0.0, 0.0, 10.0, 10.0]);
        let waypoints = rasterize_polygon(&square, 2.0);
        let row0: Vec<f64> = waypoints.iter().filter(|p| p.1 == 0.0).map(|p| p.0).collect();
        let row1: Vec<f64> = waypoints.iter().filter(|p| p.1 == 2.0).map(|p| p.0).collect();
        assert!(!row0.is_empty() && !row1.is_empty());

        let mut ascending = row1.clone();
        ascending.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(row1, ascending);

        let mut descending = row0.clone();
        descending.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(row0, descending);
    }

    #[test]
    fn split_mission_preserves_waypoint_concatenation() {
        let mission = PolyMission {
            key: 1,
            kind: "scan".into(),
            polygon: vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)],
            step: 10.0,
            waypoints: (0..10).map(|i| (i as f64 * 10.0, 0.0)).collect(),
            visited: vec![false; 10],
            n_visited: 0,
            agro_volume_per_second: None,
        };
        let parts = split_mission(&mission, 1.0, 10.0);
        let concatenated: Vec<Point> = parts.iter().flat_map(|p| p.waypoints.clone()).collect();
        assert_eq!(concatenated, mission.waypoints);
    }

    #[test]
    fn patrol_reset_clears_progress() {
        let mut patrol = PatrolMission {
            key: 1,
            kind: "patrol".into(),
            waypoints: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)],
            visited: vec![false; 4],
            n_visited: 0,
        };
        while patrol.has_next_waypoint() {
            patrol.update(1.0);
        }
        assert!(patrol.finished());
        patrol.reset();
        assert_eq!(patrol.n_visited, 0);
        assert!(patrol.visited.iter().all(|v| !v));
    }

    #[test]
    fn point_in_polygon_excludes_far_outside() {
        let square = poly_square([0.0, 0.0, 10.0, 10.0]);
        assert!(point_in_polygon((5.0, 5.0), &square));
        assert!(!point_in_polygon((50.0, 50.0), &square));
    }

    #[test]
    fn split_and_rekey_splits_poly_and_passes_others_through() {
        let poly = Mission::Poly(PolyMission {
            key: 7,
            kind: "scan".into(),
            polygon: vec![(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)],
            step: 10.0,
            waypoints: (0..10).map(|i| (i as f64 * 10.0, 0.0)).collect(),
            visited: vec![false; 10],
            n_visited: 0,
            agro_volume_per_second: None,
        });
        let path = Mission::Path(PathMission {
            key: 3,
            kind: "deliver".into(),
            waypoints: vec![(1.0, 1.0)],
            visited: vec![false],
            n_visited: 0,
        });

        let result = split_and_rekey(vec![poly, path], 1.0, 10.0);

        // One path mission plus however many sub-missions the poly split into.
        assert!(result.len() > 2);
        let keys: Vec<u32> = result.iter().map(|m| m.key()).collect();
        assert_eq!(keys, (1..=result.len() as u32).collect::<Vec<u32>>());
        assert!(result.iter().any(|m| matches!(m, Mission::Path(_))));
        assert!(result.iter().filter(|m| matches!(m, Mission::Poly(_))).count() > 1);
    }

    #[test]
    fn split_and_rekey_is_noop_for_already_small_missions() {
        let patrol = Mission::Patrol(PatrolMission {
            key: 9,
            kind: "patrol".into(),
            waypoints: vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)],
            visited: vec![false; 4],
            n_visited: 0,
        });
        let result = split_and_rekey(vec![patrol], 1000.0, 8.0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].key(), 1);
    }
}
