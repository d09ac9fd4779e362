//! DEM terrain, the prohibited-cell mask, the weighted grid graph and the
//! memoized shortest-path query.

use ndarray::Array2;
use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use shared::config::WorldConfig;
use shared::error::SimError;
use shared::geometry::{dist, simplify_path, Point};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

type Cell = (i64, i64);

pub struct World {
    pub resolution: f64,
    pub width: usize,
    pub height: usize,
    pub max_allowed_height: f64,
    pub prohibited_mask: Array2<bool>,
    pub simulation_step: f64,
    pub wireless_range: f64,
    pub drone_speed_default: f64,
    pub drone_lifetime_default: f64,
    pub charge_power: f64,

    graph: UnGraph<Cell, f64>,
    node_of: HashMap<Cell, NodeIndex>,
    cached_paths: RefCell<HashMap<(Cell, Cell), Vec<Point>>>,
}

impl World {
    pub fn load(config: &WorldConfig, dem_dir: &Path) -> Result<Self, SimError> {
        let dem_path = dem_dir.join(&config.dem_path);
        let image = image::open(&dem_path)
            .map_err(|e| SimError::Dem(format!("{}: {e}", dem_path.display())))?
            .to_luma8();
        let (width, height) = image.dimensions();
        let (width, height) = (width as usize, height as usize);

        let mut prohibited_mask = Array2::from_elem((height, width), false);
        for j in 0..height {
            for i in 0..width {
                let elevation = image.get_pixel(i as u32, j as u32).0[0] as f64;
                prohibited_mask[[j, i]] = elevation > config.maximum_allowed_height;
            }
        }

        let (graph, node_of) = build_graph(&prohibited_mask, width, height, config.dem_resolution);

        Ok(World {
            resolution: config.dem_resolution,
            width,
            height,
            max_allowed_height: config.maximum_allowed_height,
            prohibited_mask,
            simulation_step: config.simulation_step,
            wireless_range: config.wireless_range,
            drone_speed_default: config.drone_speed,
            drone_lifetime_default: config.drone_life,
            charge_power: config.charge_power,
            graph,
            node_of,
            cached_paths: RefCell::new(HashMap::new()),
        })
    }

    fn cell_of(&self, p: Point) -> Result<Cell, SimError> {
        let i = (p.0 / self.resolution).floor() as i64;
        let j = (p.1 / self.resolution).floor() as i64;
        if i < 0 || j < 0 || i as usize >= self.width || j as usize >= self.height {
            return Err(SimError::Unrouteable(p.0, p.1, p.0, p.1));
        }
        Ok((i, j))
    }

    /// Finds an obstacle-free polyline from `start` to `finish`, memoized
    /// on the pair of quantized cell ids. The returned polyline's first and
    /// last points are always exactly `start` and `finish`, whether served
    /// from cache or computed fresh.
    pub fn estimate_path(&self, start: Point, finish: Point) -> Result<Vec<Point>, SimError> {
        let start_cell = self.cell_of(start)?;
        let finish_cell = self.cell_of(finish)?;
        let key = (start_cell, finish_cell);

        if let Some(cached) = self.cached_paths.borrow().get(&key) {
            let mut path = cached.clone();
            if let Some(first) = path.first_mut() {
                *first = start;
            }
            if let Some(last) = path.last_mut() {
                *last = finish;
            }
            return Ok(path);
        }

        let path = self.compute_path(start, finish, start_cell, finish_cell)?;
        self.cached_paths.borrow_mut().insert(key, path.clone());
        Ok(path)
    }

    fn compute_path(
        &self,
        start: Point,
        finish: Point,
        start_cell: Cell,
        finish_cell: Cell,
    ) -> Result<Vec<Point>, SimError> {
        let start_node = *self
            .node_of
            .get(&start_cell)
            .ok_or(SimError::Unrouteable(start.0, start.1, finish.0, finish.1))?;
        let finish_node = *self
            .node_of
            .get(&finish_cell)
            .ok_or(SimError::Unrouteable(start.0, start.1, finish.0, finish.1))?;

        let (_, node_path) = astar(
            &self.graph,
            start_node,
            |n| n == finish_node,
            |e| *e.weight(),
            |_| 0.0,
        )
        .ok_or_else(|| {
            tracing::warn!(?start, ?finish, "no path through the passable grid");
            SimError::Unrouteable(start.0, start.1, finish.0, finish.1)
        })?;

        let last_idx = node_path.len() - 1;
        let raw: Vec<Point> = node_path
            .iter()
            .enumerate()
            .map(|(idx, &node)| {
                if idx == 0 {
                    start
                } else if idx == last_idx {
                    finish
                } else {
                    let (i, j) = self.graph[node];
                    ((i as f64 + 0.5) * self.resolution, (j as f64 + 0.5) * self.resolution)
                }
            })
            .collect();

        Ok(simplify_path(&raw, self.resolution / 4.0))
    }
}

fn build_graph(
    prohibited: &Array2<bool>,
    width: usize,
    height: usize,
    resolution: f64,
) -> (UnGraph<Cell, f64>, HashMap<Cell, NodeIndex>) {
    let mut graph = UnGraph::<Cell, f64>::new_undirected();
    let mut node_of = HashMap::new();

    for j in 0..height {
        for i in 0..width {
            if !prohibited[[j, i]] {
                let cell = (i as i64, j as i64);
                node_of.insert(cell, graph.add_node(cell));
            }
        }
    }

    let passable = |i: i64, j: i64| -> bool {
        if i < 0 || j < 0 || i as usize >= width || j as usize >= height {
            false
        } else {
            !prohibited[[j as usize, i as usize]]
        }
    };

    // The source's loop bound stops one short of the far edge in both
    // dimensions: the last row/column is never an edge-generating origin,
    // though it can still be an edge target from an earlier cell. Preserved
    // verbatim rather than extended.
    for j in 0..(height.saturating_sub(1)) as i64 {
        for i in 0..(width.saturating_sub(1)) as i64 {
            if prohibited[[j as usize, i as usize]] {
                continue;
            }
            for dj in 0..=2i64 {
                for di in -2..=2i64 {
                    if di == 0 && dj == 0 {
                        continue;
                    }
                    let (ti, tj) = (i + di, j + dj);
                    if !passable(ti, tj) {
                        continue;
                    }
                    let corner_blocked = match (di.abs(), dj) {
                        (2, 0) => !passable(i + di / 2, j),
                        (2, 1) => !passable(i + di / 2, j) && !passable(i + di / 2, j + 1),
                        (1, 2) => !passable(i, j + 1) && !passable(ti, j + 1),
                        (0, 2) => !passable(i, j + 1),
                        _ => false,
                    };
                    if corner_blocked {
                        continue;
                    }
                    let weight = dist(di as f64 * resolution, dj as f64 * resolution);
                    let (a, b) = ((i, j), (ti, tj));
                    let (u, v) = if a <= b { (a, b) } else { (b, a) };
                    if let (Some(&un), Some(&vn)) = (node_of.get(&u), node_of.get(&v)) {
                        if graph.find_edge(un, vn).is_none() {
                            graph.add_edge(un, vn, weight);
                        }
                    }
                }
            }
        }
    }

    (graph, node_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_world(width: usize, height: usize, resolution: f64) -> World {
        let prohibited_mask = Array2::from_elem((height, width), false);
        let (graph, node_of) = build_graph(&prohibited_mask, width, height, resolution);
        World {
            resolution,
            width,
            height,
            max_allowed_height: 100.0,
            prohibited_mask,
            simulation_step: 1.0,
            wireless_range: 100.0,
            drone_speed_default: 10.0,
            drone_lifetime_default: 100.0,
            charge_power: 1.0,
            graph,
            node_of,
            cached_paths: RefCell::new(HashMap::new()),
        }
    }

    #[test]
    fn estimate_path_endpoints_match_request() {
        let world = flat_world(20, 20, 1.0);
        let path = world.estimate_path((1.5, 1.5), (15.5, 15.5)).unwrap();
        assert_eq!(*path.first().unwrap(), (1.5, 1.5));
        assert_eq!(*path.last().unwrap(), (15.5, 15.5));
    }

    #[test]
    fn estimate_path_is_memoized() {
        let world = flat_world(20, 20, 1.0);
        let a = world.estimate_path((1.5, 1.5), (15.5, 15.5)).unwrap();
        let b = world.estimate_path((1.5, 1.5), (15.5, 15.5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(world.cached_paths.borrow().len(), 1);
    }

    #[test]
    fn unreachable_target_surfaces_error() {
        let mut prohibited_mask = Array2::from_elem((10, 10), false);
        for j in 0..10 {
            prohibited_mask[[j, 5]] = true;
        }
        let (graph, node_of) = build_graph(&prohibited_mask, 10, 10, 1.0);
        let world = World {
            resolution: 1.0,
            width: 10,
            height: 10,
            max_allowed_height: 100.0,
            prohibited_mask,
            simulation_step: 1.0,
            wireless_range: 100.0,
            drone_speed_default: 10.0,
            drone_lifetime_default: 100.0,
            charge_power: 1.0,
            graph,
            node_of,
            cached_paths: RefCell::new(HashMap::new()),
        };
        let result = world.estimate_path((1.5, 1.5), (8.5, 8.5));
        assert!(result.is_err());
    }
}
