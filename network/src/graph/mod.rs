mod arena;
mod compact;
mod planarity;
mod undirected;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;

use self::arena::Arena;
use crate::{DistanceFunction, NodeID, Point, Rectangle, RoadNode, RoadWay, WayID};

pub use self::undirected::UndirectedStats;

/// A road network: intersections registered by ID, and ways connecting them. Every structural
/// transformation (`to_compact_map`, `to_loose_map`, `to_undirected_map`) leaves `self` alone
/// and produces a new graph.
pub struct RoadNetworkGraph {
    nodes: Arena<NodeID, RoadNode>,
    ways: Arena<WayID, RoadWay>,
    dist: Arc<dyn DistanceFunction>,
    boundary: Option<Rectangle>,
    is_directed: bool,
    // Set once any way has more than 2 vertices
    is_compact: bool,
}

impl RoadNetworkGraph {
    pub fn new(dist: Arc<dyn DistanceFunction>) -> Self {
        Self {
            nodes: Arena::new(),
            ways: Arena::new(),
            dist,
            boundary: None,
            is_directed: true,
            is_compact: false,
        }
    }

    /// Every way added to this graph is traversable both ways, so it counts as incoming and
    /// outgoing on both of its endpoints.
    pub fn new_undirected(dist: Arc<dyn DistanceFunction>) -> Self {
        let mut graph = Self::new(dist);
        graph.is_directed = false;
        graph
    }

    pub fn distance_function(&self) -> &Arc<dyn DistanceFunction> {
        &self.dist
    }

    pub fn is_directed(&self) -> bool {
        self.is_directed
    }

    pub fn is_compact(&self) -> bool {
        self.is_compact
    }

    /// Registers an intersection, dropping whatever adjacency it carried. A second node with an
    /// existing ID is logged and ignored, except for the empty ID, which is simply replaced.
    /// Returns true if the node was inserted.
    pub fn add_node(&mut self, node: RoadNode) -> bool {
        if self.nodes.contains(&node.id) && !node.id.is_empty() {
            warn!("Not inserting node {}, it already exists", node.id);
            return false;
        }
        let mut node = node;
        node.clear_connected_ways();
        self.extend_boundary(node.pt);
        self.nodes.insert_or_replace(node.id.clone(), node);
        true
    }

    /// Returns the number of nodes actually inserted.
    pub fn add_nodes(&mut self, nodes: Vec<RoadNode>) -> usize {
        let mut count = 0;
        for node in nodes {
            if self.add_node(node) {
                count += 1;
            }
        }
        count
    }

    /// Replaces every node. Only allowed before any ways exist.
    pub fn set_nodes(&mut self, nodes: Vec<RoadNode>) -> Result<()> {
        if !self.ways.is_empty() {
            bail!(
                "Can't reset the nodes of a graph that already has {} ways",
                self.ways.len()
            );
        }
        self.nodes.clear();
        self.boundary = None;
        self.add_nodes(nodes);
        Ok(())
    }

    pub fn add_way(&mut self, way: RoadWay) -> Result<()> {
        if self.ways.contains(&way.id) {
            bail!("Way {} already exists", way.id);
        }
        let from = way.from_node().id.clone();
        let to = way.to_node().id.clone();
        for endpoint in [&from, &to] {
            if !self.nodes.contains(endpoint) {
                bail!("Way {} ends at {}, which isn't a registered node", way.id, endpoint);
            }
        }

        if let Some(node) = self.nodes.get_mut(&from) {
            node.add_outgoing(&way.id);
            if !self.is_directed {
                node.add_incoming(&way.id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            node.add_incoming(&way.id);
            if !self.is_directed {
                node.add_outgoing(&way.id);
            }
        }

        for vertex in way.vertices() {
            self.extend_boundary(vertex.pt);
        }
        if way.len() != 2 {
            self.is_compact = true;
        }
        self.ways.insert_new(way.id.clone(), way)
    }

    /// Stops at the first way that can't be added.
    pub fn add_ways(&mut self, ways: Vec<RoadWay>) -> Result<()> {
        for way in ways {
            self.add_way(way)?;
        }
        Ok(())
    }

    /// Detaches and removes each way. Ways that don't exist are logged and skipped. Returns the
    /// ways actually removed.
    pub fn remove_road_way_list(&mut self, ids: &[WayID]) -> Vec<RoadWay> {
        let mut removed = Vec::new();
        for id in ids {
            let way = match self.ways.remove(id) {
                Some(way) => way,
                None => {
                    warn!("Can't remove way {}, it doesn't exist", id);
                    continue;
                }
            };
            for endpoint in [&way.from_node().id, &way.to_node().id] {
                if let Some(node) = self.nodes.get_mut(endpoint) {
                    node.remove_incoming(id);
                    node.remove_outgoing(id);
                }
            }
            removed.push(way);
        }
        removed
    }

    /// Only nodes with no ways attached can be removed.
    pub fn remove_node(&mut self, id: &NodeID) -> Result<RoadNode> {
        let degree = self.nodes.lookup(id)?.degree();
        if degree != 0 {
            bail!("Can't remove node {}, it still has {} ways attached", id, degree);
        }
        self.nodes
            .remove(id)
            .ok_or_else(|| anyhow!("Node {} vanished during removal", id))
    }

    /// Removes every node without any ways attached, returning how many were removed.
    pub fn isolated_node_removal(&mut self) -> usize {
        let isolated: Vec<NodeID> = self
            .nodes
            .values()
            .filter(|n| n.degree() == 0)
            .map(|n| n.id.clone())
            .collect();
        for id in &isolated {
            self.nodes.remove(id);
        }
        if !isolated.is_empty() {
            info!("Removed {} isolated nodes", isolated.len());
        }
        isolated.len()
    }

    /// Intersections, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &RoadNode> {
        self.nodes.values()
    }

    /// Ways, in insertion order.
    pub fn ways(&self) -> impl Iterator<Item = &RoadWay> {
        self.ways.values()
    }

    pub fn node(&self, id: &NodeID) -> Option<&RoadNode> {
        self.nodes.get(id)
    }

    pub fn way(&self, id: &WayID) -> Option<&RoadWay> {
        self.ways.get(id)
    }

    pub fn contains_node(&self, id: &NodeID) -> bool {
        self.nodes.contains(id)
    }

    pub fn contains_way(&self, id: &WayID) -> bool {
        self.ways.contains(id)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_ways(&self) -> usize {
        self.ways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty()
    }

    /// Intersections, then the mini nodes embedded in ways. Every ID appears once.
    pub fn all_type_nodes(&self) -> Vec<RoadNode> {
        let mut seen: BTreeSet<&NodeID> = BTreeSet::new();
        let mut result = Vec::new();
        for node in self.nodes.values() {
            if seen.insert(&node.id) {
                result.push(node.clone());
            }
        }
        for way in self.ways.values() {
            for vertex in way.mini_nodes() {
                if seen.insert(&vertex.id) {
                    result.push(vertex.clone());
                }
            }
        }
        result
    }

    /// None until something has been inserted.
    pub fn boundary(&self) -> Option<Rectangle> {
        self.boundary
    }

    /// Recomputes the boundary from scratch, so it also shrinks after removals.
    pub fn update_boundary(&mut self) {
        let mut pts: Vec<Point> = self.nodes.values().map(|n| n.pt).collect();
        for way in self.ways.values() {
            pts.extend(way.vertices().iter().map(|v| v.pt));
        }
        self.boundary = Rectangle::covering(pts);
    }

    /// Overrides the boundary, for maps clipped to a known region.
    pub fn set_boundary(&mut self, boundary: Rectangle) {
        self.boundary = Some(boundary);
    }

    fn extend_boundary(&mut self, pt: Point) {
        match self.boundary {
            Some(ref mut rect) => rect.update(pt),
            None => {
                self.boundary = Some(Rectangle::new(pt.x(), pt.y(), pt.x(), pt.y()));
            }
        }
    }
}

impl Clone for RoadNetworkGraph {
    /// Deep copy, keeping the stored boundary even when it was set manually. Warns if the copied
    /// contents don't fit inside it.
    fn clone(&self) -> Self {
        let copy = Self {
            nodes: self.nodes.clone(),
            ways: self.ways.clone(),
            dist: self.dist.clone(),
            boundary: self.boundary,
            is_directed: self.is_directed,
            is_compact: self.is_compact,
        };
        let mut recomputed = copy.nodes.values().map(|n| n.pt).collect::<Vec<_>>();
        for way in copy.ways.values() {
            recomputed.extend(way.vertices().iter().map(|v| v.pt));
        }
        if let (Some(stored), Some(actual)) = (self.boundary, Rectangle::covering(recomputed)) {
            if !actual.corners().iter().all(|pt| stored.contains(*pt)) {
                warn!(
                    "Cloned map has contents outside its boundary: {} vs {}",
                    actual, stored
                );
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EuclideanDistance;

    fn node(id: &str, x: f64, y: f64) -> RoadNode {
        RoadNode::new(NodeID::new(id), Point::new(x, y))
    }

    fn way(id: &str, pts: Vec<RoadNode>) -> RoadWay {
        RoadWay::new(WayID::new(id), pts).unwrap()
    }

    fn empty_graph() -> RoadNetworkGraph {
        RoadNetworkGraph::new(Arc::new(EuclideanDistance))
    }

    #[test]
    fn test_duplicate_nodes() {
        let mut graph = empty_graph();
        assert!(graph.add_node(node("1", 0.0, 0.0)));
        assert!(!graph.add_node(node("1", 5.0, 5.0)));
        assert_eq!(graph.num_nodes(), 1);
        assert!(graph.node(&NodeID::new("1")).unwrap().pt.equals_2d(&Point::new(0.0, 0.0)));

        // The empty ID is a placeholder that can be overwritten
        assert!(graph.add_node(node("", 1.0, 1.0)));
        assert!(graph.add_node(node("", 2.0, 2.0)));
        assert_eq!(graph.num_nodes(), 2);
        assert!(graph.node(&NodeID::new("")).unwrap().pt.equals_2d(&Point::new(2.0, 2.0)));
    }

    #[test]
    fn test_add_way_checks() {
        let mut graph = empty_graph();
        graph.add_nodes(vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]);
        graph
            .add_way(way("a", vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]))
            .unwrap();
        assert!(graph
            .add_way(way("a", vec![node("2", 1.0, 0.0), node("1", 0.0, 0.0)]))
            .is_err());
        assert!(graph
            .add_way(way("b", vec![node("1", 0.0, 0.0), node("3", 2.0, 0.0)]))
            .is_err());
        assert!(!graph.is_compact());

        let n1 = graph.node(&NodeID::new("1")).unwrap();
        assert!(n1.outgoing().contains(&WayID::new("a")));
        assert_eq!(n1.incoming_degree(), 0);
        let n2 = graph.node(&NodeID::new("2")).unwrap();
        assert!(n2.incoming().contains(&WayID::new("a")));

        // A polyline flips the graph to compact
        graph
            .add_way(way(
                "c",
                vec![node("2", 1.0, 0.0), node("x", 1.5, 3.0), node("1", 0.0, 0.0)],
            ))
            .unwrap();
        assert!(graph.is_compact());
        assert_eq!(graph.all_type_nodes().len(), 3);
        assert_eq!(graph.boundary(), Some(Rectangle::new(0.0, 0.0, 1.5, 3.0)));

        assert!(graph.set_nodes(Vec::new()).is_err());
    }

    #[test]
    fn test_removal() {
        let mut graph = empty_graph();
        graph.add_nodes(vec![
            node("1", 0.0, 0.0),
            node("2", 1.0, 0.0),
            node("3", 9.0, 9.0),
        ]);
        graph
            .add_way(way("a", vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]))
            .unwrap();

        assert!(graph.remove_node(&NodeID::new("1")).is_err());
        assert!(graph.remove_node(&NodeID::new("nope")).is_err());

        let removed = graph.remove_road_way_list(&[WayID::new("a"), WayID::new("missing")]);
        assert_eq!(removed.len(), 1);
        assert_eq!(graph.node(&NodeID::new("1")).unwrap().degree(), 0);
        assert!(graph.remove_node(&NodeID::new("1")).is_ok());

        assert_eq!(graph.isolated_node_removal(), 2);
        assert!(graph.is_empty());

        // The boundary only shrinks on demand
        assert_eq!(graph.boundary(), Some(Rectangle::new(0.0, 0.0, 9.0, 9.0)));
        graph.update_boundary();
        assert_eq!(graph.boundary(), None);
    }

    #[test]
    fn test_undirected_adjacency() {
        let mut graph = RoadNetworkGraph::new_undirected(Arc::new(EuclideanDistance));
        graph.add_nodes(vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]);
        graph
            .add_way(way("a", vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]))
            .unwrap();
        for id in ["1", "2"] {
            let n = graph.node(&NodeID::new(id)).unwrap();
            assert_eq!(n.incoming_degree(), 1);
            assert_eq!(n.outgoing_degree(), 1);
        }
    }

    #[test]
    fn test_clone_is_independent() {
        let mut graph = empty_graph();
        graph.add_nodes(vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]);
        graph
            .add_way(way("a", vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]))
            .unwrap();
        let copy = graph.clone();
        graph.remove_road_way_list(&[WayID::new("a")]);
        assert_eq!(copy.num_ways(), 1);
        assert_eq!(copy.node(&NodeID::new("2")).unwrap().degree(), 1);
        assert_eq!(copy.boundary(), graph.boundary());
    }

    #[test]
    fn test_clone_keeps_manual_boundary() {
        let mut graph = empty_graph();
        graph.add_nodes(vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]);
        graph
            .add_way(way("a", vec![node("1", 0.0, 0.0), node("2", 1.0, 0.0)]))
            .unwrap();
        let clip = Rectangle::new(-5.0, -5.0, 5.0, 5.0);
        graph.set_boundary(clip);

        assert_eq!(graph.clone().boundary(), Some(clip));
        // Transformations start from a clone, so they keep it too
        assert_eq!(graph.to_loose_map().unwrap().boundary(), Some(clip));
        assert_eq!(graph.to_compact_map().unwrap().boundary(), Some(clip));
        assert_eq!(graph.to_undirected_map().unwrap().0.boundary(), Some(clip));
    }
}
