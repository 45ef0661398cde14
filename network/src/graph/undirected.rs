use std::collections::BTreeSet;

use anyhow::Result;

use super::RoadNetworkGraph;
use crate::{RoadWay, WayID};

/// What happened while collapsing a directed map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UndirectedStats {
    /// Forward ways dropped because another way already connects the same two points
    pub duplicate_geometry: usize,
    /// Reverse ways with no forward counterpart, recovered under their forward ID
    pub missing_reverse: usize,
    /// Reverse ways with no forward counterpart, where the forward ID was taken anyway
    pub unrecoverable_reverse: usize,
    pub max_visit_count: usize,
}

type EndpointKey = ((u64, u64), (u64, u64));

fn endpoint_key(way: &RoadWay) -> EndpointKey {
    (way.from_node().pt.key(), way.to_node().pt.key())
}

fn swapped((from, to): EndpointKey) -> EndpointKey {
    (to, from)
}

impl RoadNetworkGraph {
    /// Keeps one way per physical connection. Forward ways win; a reverse way (any `-` in its ID)
    /// only survives, under its forward ID, if nothing else connects its two endpoints.
    pub fn to_undirected_map(&self) -> Result<(RoadNetworkGraph, UndirectedStats)> {
        let mut stats = UndirectedStats::default();
        let mut seen: BTreeSet<EndpointKey> = BTreeSet::new();
        let mut kept_ids: BTreeSet<WayID> = BTreeSet::new();
        let mut kept: Vec<RoadWay> = Vec::new();
        let mut reverse: Vec<&RoadWay> = Vec::new();

        for way in self.ways() {
            if way.id.is_reverse() {
                reverse.push(way);
                continue;
            }
            let key = endpoint_key(way);
            if seen.contains(&key) || seen.contains(&swapped(key)) {
                error!(
                    "Multiple ways connect {} and {}, dropping {}",
                    way.from_node().pt,
                    way.to_node().pt,
                    way.id
                );
                stats.duplicate_geometry += 1;
                continue;
            }
            seen.insert(key);
            stats.max_visit_count = stats.max_visit_count.max(way.visit_count);
            kept_ids.insert(way.id.clone());
            kept.push(way.clone());
        }

        for way in reverse {
            let key = endpoint_key(way);
            if seen.contains(&key) || seen.contains(&swapped(key)) {
                continue;
            }
            error!("Reverse road of {} does not appear in the map", way.id);
            let recovered = way.id.strip_reverse();
            if self.contains_way(&recovered) || kept_ids.contains(&recovered) {
                error!(
                    "{} has a forward way {}, but it isn't part of the new map",
                    way.id, recovered
                );
                stats.unrecoverable_reverse += 1;
                continue;
            }
            stats.missing_reverse += 1;
            seen.insert(key);
            kept_ids.insert(recovered.clone());
            kept.push(way.renamed(recovered));
        }

        let mut result = RoadNetworkGraph::new_undirected(self.dist.clone());
        result.set_nodes(self.nodes().map(|n| n.detached()).collect())?;
        result.add_ways(kept)?;
        match self.boundary {
            Some(boundary) => result.set_boundary(boundary),
            None => result.update_boundary(),
        }

        info!(
            "Undirected map has {} ways, down from {}. {} duplicates dropped, {} reverse ways \
             recovered",
            result.num_ways(),
            self.num_ways(),
            stats.duplicate_geometry,
            stats.missing_reverse
        );
        Ok((result, stats))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{EuclideanDistance, NodeID, Point, RoadNode};

    fn node(id: &str, x: f64, y: f64) -> RoadNode {
        RoadNode::new(NodeID::new(id), Point::new(x, y))
    }

    fn graph(ways: Vec<(&str, usize, usize)>) -> RoadNetworkGraph {
        let nodes = vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0), node("3", 1.0, 1.0)];
        let mut graph = RoadNetworkGraph::new(Arc::new(EuclideanDistance));
        graph.add_nodes(nodes.clone());
        for (id, from, to) in ways {
            graph
                .add_way(
                    RoadWay::new(WayID::new(id), vec![nodes[from].clone(), nodes[to].clone()])
                        .unwrap(),
                )
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_reverse_way_without_forward_is_recovered() {
        let directed = graph(vec![("5", 0, 1), ("-5", 1, 0), ("-6", 2, 1)]);
        let (undirected, stats) = directed.to_undirected_map().unwrap();
        assert!(!undirected.is_directed());
        assert_eq!(undirected.num_ways(), 2);
        assert!(undirected.contains_way(&WayID::new("5")));
        assert!(undirected.contains_way(&WayID::new("6")));
        assert_eq!(stats.missing_reverse, 1);

        // Undirected ways count as both incoming and outgoing on both ends
        let n2 = undirected.node(&NodeID::new("2")).unwrap();
        assert_eq!(n2.incoming_degree(), 2);
        assert_eq!(n2.outgoing_degree(), 2);
        // The directed input keeps its adjacency
        assert_eq!(directed.node(&NodeID::new("2")).unwrap().degree(), 3);
    }

    #[test]
    fn test_duplicate_geometry_dropped() {
        let (undirected, stats) = graph(vec![("5", 0, 1), ("7", 1, 0)])
            .to_undirected_map()
            .unwrap();
        assert_eq!(undirected.num_ways(), 1);
        assert_eq!(stats.duplicate_geometry, 1);
    }

    #[test]
    fn test_reverse_with_dropped_forward() {
        // 6 duplicates 5's geometry and gets dropped, so -6 (pointing elsewhere) can't take its ID
        let (undirected, stats) = graph(vec![("5", 0, 1), ("6", 1, 0), ("-6", 2, 0)])
            .to_undirected_map()
            .unwrap();
        assert_eq!(undirected.num_ways(), 1);
        assert_eq!(stats.unrecoverable_reverse, 1);
        assert_eq!(stats.missing_reverse, 0);
    }
}
