//! Wireless topology: a minimum spanning tree over drone positions, pruned
//! of any edge longer than the wireless range, used to find which drones
//! can still relay back to the master.

use crate::drone::Drone;
use petgraph::algo::min_spanning_tree;
use petgraph::data::FromElements;
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// The set of drone keys reachable from `master_key` over wireless links no
/// longer than `wireless_range`, computed as the master's connected
/// component in the drone-position minimum spanning tree after pruning
/// overlong edges. Drones are added to the underlying graph in ascending
/// key order, since `drones` is a `BTreeMap`.
pub fn reachable_drones(
    drones: &BTreeMap<String, Drone>,
    master_key: &str,
    wireless_range: f64,
) -> BTreeSet<String> {
    let mut reachable = BTreeSet::new();
    reachable.insert(master_key.to_string());

    if drones.len() < 2 {
        return reachable;
    }

    let mut graph = UnGraph::<String, f64>::new_undirected();
    let mut index_of = BTreeMap::new();
    for key in drones.keys() {
        index_of.insert(key.clone(), graph.add_node(key.clone()));
    }

    let keys: Vec<&String> = drones.keys().collect();
    for i in 0..keys.len() {
        for j in (i + 1)..keys.len() {
            let a = drones[keys[i]].position();
            let b = drones[keys[j]].position();
            let weight = shared::geometry::dist_between(a, b);
            graph.add_edge(index_of[keys[i]], index_of[keys[j]], weight);
        }
    }

    let mst = UnGraph::<String, f64>::from_elements(min_spanning_tree(&graph));

    let master_node = match mst.node_indices().find(|&n| mst[n] == master_key) {
        Some(n) => n,
        None => return reachable,
    };

    let mut visited = HashSet::new();
    let mut stack = vec![master_node];
    visited.insert(master_node);
    while let Some(n) = stack.pop() {
        for edge in mst.edges(n) {
            if *edge.weight() <= wireless_range {
                let other = edge.target();
                if visited.insert(other) {
                    stack.push(other);
                }
            }
        }
    }

    for n in visited {
        reachable.insert(mst[n].clone());
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drone::DroneState;
    use std::collections::HashSet as StdHashSet;

    fn drone_at(key: &str, x: f64, y: f64, is_master: bool) -> Drone {
        Drone {
            key: key.to_string(),
            is_master,
            payload: StdHashSet::new(),
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
    fn all_drones_reachable_within_range() {
        let mut drones = BTreeMap::new();
        drones.insert("0".to_string(), drone_at("0", 0.0, 0.0, true));
        drones.insert("1".to_string(), drone_at("1", 10.0, 0.0, false));
        drones.insert("2".to_string(), drone_at("2", 20.0, 0.0, false));

        let reachable = reachable_drones(&drones, "0", 15.0);
        assert_eq!(reachable.len(), 3);
    }

    #[test]
    fn distant_drone_is_unreachable() {
        let mut drones = BTreeMap::new();
        drones.insert("0".to_string(), drone_at("0", 0.0, 0.0, true));
        drones.insert("1".to_string(), drone_at("1", 10.0, 0.0, false));
        drones.insert("2".to_string(), drone_at("2", 1000.0, 0.0, false));

        let reachable = reachable_drones(&drones, "0", 15.0);
        assert!(reachable.contains("0"));
        assert!(reachable.contains("1"));
        assert!(!reachable.contains("2"));
    }

    #[test]
    fn single_drone_is_trivially_reachable() {
        let mut drones = BTreeMap::new();
        drones.insert("0".to_string(), drone_at("0", 0.0, 0.0, true));
        let reachable = reachable_drones(&drones, "0", 15.0);
        assert_eq!(reachable, BTreeSet::from(["0".to_string()]));
    }
}
