use std::collections::BTreeSet;
use std::fmt;

use abstutil::Tags;
use serde::{Deserialize, Serialize};

use crate::{Point, WayID};

/// Numeric OSM node IDs as strings. Copies made for reversed ways get a `-` suffix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeID(pub String);

impl NodeID {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// The ID an intermediate vertex gets on the reverse copy of a two-way road.
    pub fn reversed(&self) -> NodeID {
        NodeID(format!("{}-", self.0))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Either an intersection registered in a graph, or a "mini node" only living inside some
/// RoadWay's vertex list. Adjacency is only meaningful for the copy owned by the graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoadNode {
    pub id: NodeID,
    pub pt: Point,
    pub tags: Tags,
    incoming: BTreeSet<WayID>,
    outgoing: BTreeSet<WayID>,
}

impl RoadNode {
    pub fn new(id: NodeID, pt: Point) -> Self {
        Self {
            id,
            pt,
            tags: Tags::empty(),
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn lon(&self) -> f64 {
        self.pt.x()
    }

    pub fn lat(&self) -> f64 {
        self.pt.y()
    }

    pub fn incoming(&self) -> &BTreeSet<WayID> {
        &self.incoming
    }

    pub fn outgoing(&self) -> &BTreeSet<WayID> {
        &self.outgoing
    }

    pub fn incoming_degree(&self) -> usize {
        self.incoming.len()
    }

    pub fn outgoing_degree(&self) -> usize {
        self.outgoing.len()
    }

    pub fn degree(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }

    /// Exactly one way in and one way out; a leftover of how OSM splits ways, not a real
    /// junction.
    pub fn is_through_node(&self) -> bool {
        self.degree() == 2 && self.incoming.len() == self.outgoing.len()
    }

    /// The same node with no adjacency, suitable for embedding in a way or re-inserting into a
    /// graph.
    pub fn detached(&self) -> RoadNode {
        RoadNode::new(self.id.clone(), self.pt).with_tags(self.tags.clone())
    }

    pub(crate) fn clear_connected_ways(&mut self) {
        self.incoming.clear();
        self.outgoing.clear();
    }

    pub(crate) fn add_incoming(&mut self, way: &WayID) {
        self.incoming.insert(way.clone());
    }

    pub(crate) fn add_outgoing(&mut self, way: &WayID) {
        self.outgoing.insert(way.clone());
    }

    pub(crate) fn remove_incoming(&mut self, way: &WayID) -> bool {
        self.incoming.remove(way)
    }

    pub(crate) fn remove_outgoing(&mut self, way: &WayID) -> bool {
        self.outgoing.remove(way)
    }
}
