use std::fmt;

use abstutil::Tags;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{DistanceFunction, RoadNode, Segment};

/// Marks the pieces of a way split up by `to_loose_map`: `id_S0`, `id_S1`, ...
pub const SPLIT_MARKER: &str = "_S";
/// Joins the IDs of ways merged by `to_compact_map`: `id1,id2,...`
pub const MERGE_SEPARATOR: char = ',';
/// Prefixes the reverse copy of a two-way road.
pub const REVERSE_MARKER: char = '-';

/// OSM way IDs as strings, plus whatever bookkeeping the graph transformations append.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WayID(pub String);

impl WayID {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Any `-` anywhere counts, since merging can bury a reverse way's ID in a composite.
    pub fn is_reverse(&self) -> bool {
        self.0.contains(REVERSE_MARKER)
    }

    /// The reverse copy of this way.
    pub fn reversed(&self) -> WayID {
        WayID(format!("{}{}", REVERSE_MARKER, self.0))
    }

    /// Drops a leading `-`, if there is one.
    pub fn strip_reverse(&self) -> WayID {
        WayID(
            self.0
                .strip_prefix(REVERSE_MARKER)
                .unwrap_or(&self.0)
                .to_string(),
        )
    }

    pub fn has_split_marker(&self) -> bool {
        self.0.contains(SPLIT_MARKER)
    }

    /// The ID before any `_S` marker. Unmarked IDs are their own base.
    pub fn split_base(&self) -> &str {
        match self.0.find(SPLIT_MARKER) {
            Some(idx) => &self.0[..idx],
            None => &self.0,
        }
    }

    /// The `k`th piece of this way, as produced by splitting.
    pub fn split_piece(&self, k: usize) -> WayID {
        WayID(format!("{}{}{}", self.0, SPLIT_MARKER, k))
    }

    pub fn is_merged(&self) -> bool {
        self.0.contains(MERGE_SEPARATOR)
    }

    pub fn merged_parts(&self) -> Vec<WayID> {
        self.0.split(MERGE_SEPARATOR).map(WayID::new).collect()
    }

    pub fn merge(first: &WayID, second: &WayID) -> WayID {
        WayID(format!("{}{}{}", first.0, MERGE_SEPARATOR, second.0))
    }
}

impl fmt::Display for WayID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered chain of vertices. The first and last vertices are copies of intersections
/// registered in the graph; anything in between is a mini node that only exists here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "SerializedWay")]
pub struct RoadWay {
    pub id: WayID,
    vertices: Vec<RoadNode>,
    pub tags: Tags,
    /// Only used to break ties when merging into an undirected map
    pub visit_count: usize,
}

// Deserialized ways still go through RoadWay::new
#[derive(Deserialize)]
struct SerializedWay {
    id: WayID,
    vertices: Vec<RoadNode>,
    tags: Tags,
    visit_count: usize,
}

impl TryFrom<SerializedWay> for RoadWay {
    type Error = anyhow::Error;

    fn try_from(raw: SerializedWay) -> Result<Self> {
        let mut way = RoadWay::new(raw.id, raw.vertices)?.with_tags(raw.tags);
        way.visit_count = raw.visit_count;
        Ok(way)
    }
}

impl RoadWay {
    pub fn new(id: WayID, vertices: Vec<RoadNode>) -> Result<Self> {
        if vertices.len() < 2 {
            bail!(
                "Way {} needs at least 2 vertices, but has {}",
                id,
                vertices.len()
            );
        }
        Ok(Self {
            id,
            vertices: vertices.into_iter().map(|n| n.detached()).collect(),
            tags: Tags::empty(),
            visit_count: 0,
        })
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn vertices(&self) -> &[RoadNode] {
        &self.vertices
    }

    pub fn from_node(&self) -> &RoadNode {
        &self.vertices[0]
    }

    pub fn to_node(&self) -> &RoadNode {
        &self.vertices[self.vertices.len() - 1]
    }

    /// Just the vertices in between the endpoints.
    pub fn mini_nodes(&self) -> &[RoadNode] {
        &self.vertices[1..self.vertices.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_polyline(&self) -> bool {
        self.vertices.len() > 2
    }

    pub fn edges(&self) -> Vec<Segment> {
        self.vertices
            .windows(2)
            .map(|pair| Segment::new(pair[0].pt, pair[1].pt))
            .collect()
    }

    pub fn length(&self, dist: &dyn DistanceFunction) -> f64 {
        self.edges().iter().map(|e| e.length(dist)).sum()
    }

    /// Same geometry and tags under a new ID.
    pub fn renamed(&self, id: WayID) -> RoadWay {
        let mut copy = self.clone();
        copy.id = id;
        copy
    }
}
