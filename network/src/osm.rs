use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use abstutil::{Tags, Timer};
use anyhow::Result;
use osmpbfreader::{OsmObj, OsmPbfReader};

use crate::{
    DistanceFunction, NodeID, Point, Rectangle, RoadNetworkGraph, RoadNode, RoadWay, WayID,
};

/// Road types worth keeping for vehicle trips.
const HIGHWAY_ALLOW_LIST: [&str; 15] = [
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "service",
    "living_street",
    "road",
    "residential",
];

/// Only these way tags survive into the graph.
const KEPT_WAY_TAGS: [&str; 6] = ["highway", "oneway", "name", "maxspeed", "lanes", "junction"];

/// The subset of OSM the builder cares about, independent of the file format.
#[derive(Clone, Debug)]
pub enum OsmElement {
    Node { id: i64, pt: Point, tags: Tags },
    Way { id: i64, node_ids: Vec<i64>, tags: Tags },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Direction {
    Forwards,
    Backwards,
    Both,
}

fn direction(tags: &Tags) -> Direction {
    match tags.get("oneway").map(|x| x.as_str()) {
        Some("yes") | Some("1") | Some("true") => Direction::Forwards,
        Some("-1") | Some("reverse") => Direction::Backwards,
        Some("no") => Direction::Both,
        // Some road types are one-way unless stated otherwise
        _ => {
            if tags.is("highway", "motorway")
                || tags.is("highway", "motorway_link")
                || tags.is("junction", "roundabout")
            {
                Direction::Forwards
            } else {
                Direction::Both
            }
        }
    }
}

/// Consumes a stream of OSM elements, then turns the drivable ways into a directed road graph.
/// Nodes outside the optional clip boundary are treated as absent, so ways crossing the edge
/// get trimmed to their inner portion.
pub struct OsmMapBuilder {
    dist: Arc<dyn DistanceFunction>,
    clip: Option<Rectangle>,
    nodes: BTreeMap<i64, RoadNode>,
    ways: Vec<(i64, Vec<i64>, Tags)>,
}

impl OsmMapBuilder {
    pub fn new(dist: Arc<dyn DistanceFunction>, clip: Option<Rectangle>) -> Self {
        Self {
            dist,
            clip,
            nodes: BTreeMap::new(),
            ways: Vec::new(),
        }
    }

    pub fn process(&mut self, elem: OsmElement) {
        match elem {
            OsmElement::Node { id, pt, tags } => {
                if let Some(ref clip) = self.clip {
                    if !clip.contains(pt) {
                        return;
                    }
                }
                self.nodes
                    .insert(id, RoadNode::new(NodeID(id.to_string()), pt).with_tags(tags));
            }
            OsmElement::Way { id, node_ids, tags } => {
                let keep = tags
                    .get("highway")
                    .map(|hwy| HIGHWAY_ALLOW_LIST.contains(&hwy.as_str()))
                    .unwrap_or(false);
                if keep {
                    self.ways.push((id, node_ids, tags));
                }
            }
        }
    }

    pub fn finish(self) -> Result<RoadNetworkGraph> {
        let mut trimmed: Vec<(i64, Vec<i64>, Tags)> = Vec::new();
        for (id, node_ids, tags) in &self.ways {
            if let Some(pts) = self.trim_way(*id, node_ids) {
                trimmed.push((*id, pts, keep_way_tags(tags)));
            }
        }

        // Every way endpoint is an intersection, and so is any vertex used more than once
        let mut uses: BTreeMap<i64, usize> = BTreeMap::new();
        let mut intersections: BTreeSet<i64> = BTreeSet::new();
        for (_, pts, _) in &trimmed {
            for id in pts {
                *uses.entry(*id).or_insert(0) += 1;
            }
            intersections.insert(pts[0]);
            intersections.insert(pts[pts.len() - 1]);
        }
        intersections.extend(uses.into_iter().filter(|(_, n)| *n > 1).map(|(id, _)| id));

        let mut node_order: Vec<i64> = Vec::new();
        let mut registered: BTreeSet<i64> = BTreeSet::new();
        let mut ways = Vec::new();
        let mut num_pieces = 0;
        for (id, pts, tags) in trimmed {
            let pieces = split_at_intersections(&pts, &intersections);
            let split = pieces.len() > 1;
            for (k, piece) in pieces.into_iter().enumerate() {
                let way_id = if split {
                    WayID(format!("{}_P{}", id, k))
                } else {
                    WayID(id.to_string())
                };
                for endpoint in [piece[0], piece[piece.len() - 1]] {
                    if registered.insert(endpoint) {
                        node_order.push(endpoint);
                    }
                }
                let vertices = piece
                    .iter()
                    .map(|n| self.lookup_node(*n))
                    .collect::<Result<Vec<_>>>()?;
                num_pieces += 1;
                ways.extend(directed_ways(way_id, vertices, &tags)?);
            }
        }

        let mut graph = RoadNetworkGraph::new(self.dist.clone());
        graph.set_nodes(
            node_order
                .into_iter()
                .map(|id| self.lookup_node(id))
                .collect::<Result<Vec<_>>>()?,
        )?;
        graph.add_ways(ways)?;
        graph.isolated_node_removal();
        if let Some(clip) = self.clip {
            graph.set_boundary(clip);
        }
        info!(
            "Built a road graph from {} OSM ways ({} pieces after splitting): {} nodes, {} ways",
            self.ways.len(),
            num_pieces,
            graph.num_nodes(),
            graph.num_ways()
        );
        Ok(graph)
    }

    /// Trims the way to the portion whose endpoints are known. Returns None if nothing usable is
    /// left.
    fn trim_way(&self, id: i64, node_ids: &[i64]) -> Option<Vec<i64>> {
        if node_ids.len() < 2 {
            error!("Way {} only has {} nodes", id, node_ids.len());
            return None;
        }
        let start = node_ids.iter().position(|n| self.nodes.contains_key(n))?;
        let end = node_ids.iter().rposition(|n| self.nodes.contains_key(n))?;
        if start >= end {
            debug!("Way {} isn't inside the map", id);
            return None;
        }
        let pts = &node_ids[start..=end];
        if let Some(missing) = pts.iter().find(|n| !self.nodes.contains_key(n)) {
            warn!(
                "Way {} passes through node {} outside the map, skipping it",
                id, missing
            );
            return None;
        }
        if self.nodes[&pts[0]].pt.equals_2d(&self.nodes[&pts[pts.len() - 1]].pt) {
            debug!("Way {} starts and ends at the same point", id);
            return None;
        }
        Some(pts.to_vec())
    }

    fn lookup_node(&self, id: i64) -> Result<RoadNode> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("Node {} is missing", id))
    }
}

fn keep_way_tags(tags: &Tags) -> Tags {
    let mut result = Tags::empty();
    for key in KEPT_WAY_TAGS {
        if let Some(value) = tags.get(key) {
            result.insert(key, value.clone());
        }
    }
    result
}

fn split_at_intersections(pts: &[i64], intersections: &BTreeSet<i64>) -> Vec<Vec<i64>> {
    let mut pieces = Vec::new();
    let mut current = vec![pts[0]];
    for id in &pts[1..] {
        current.push(*id);
        if intersections.contains(id) {
            pieces.push(std::mem::replace(&mut current, vec![*id]));
        }
    }
    // The last point is always an intersection, so current only holds it
    pieces
}

/// Applies oneway semantics. Two-way roads get a reverse copy with a `-` prefixed ID, whose
/// interior vertices are renamed so they stay distinct from the forward copy's.
fn directed_ways(id: WayID, vertices: Vec<RoadNode>, tags: &Tags) -> Result<Vec<RoadWay>> {
    let mut reversed = vertices.clone();
    reversed.reverse();
    let last = reversed.len() - 1;
    for (idx, node) in reversed.iter_mut().enumerate() {
        if idx != 0 && idx != last {
            node.id = node.id.reversed();
        }
    }

    Ok(match direction(tags) {
        Direction::Forwards => vec![RoadWay::new(id, vertices)?.with_tags(tags.clone())],
        Direction::Backwards => vec![RoadWay::new(id, reversed)?.with_tags(tags.clone())],
        Direction::Both => vec![
            RoadWay::new(id.clone(), vertices)?.with_tags(tags.clone()),
            RoadWay::new(id.reversed(), reversed)?.with_tags(tags.clone()),
        ],
    })
}

/// Reads the drivable road network from an `.osm.pbf` file.
pub fn load_pbf(
    path: &str,
    clip: Option<Rectangle>,
    dist: Arc<dyn DistanceFunction>,
    timer: &mut Timer,
) -> Result<RoadNetworkGraph> {
    timer.start(format!("read {}", path));
    let mut reader = OsmPbfReader::new(fs_err::File::open(path)?);
    let mut builder = OsmMapBuilder::new(dist, clip);
    for obj in reader.iter() {
        let obj = obj.map_err(|err| anyhow!("Couldn't read {}: {}", path, err))?;
        match obj {
            OsmObj::Node(node) => builder.process(OsmElement::Node {
                id: node.id.0,
                pt: Point::new(node.lon(), node.lat()),
                tags: convert_tags(&node.tags),
            }),
            OsmObj::Way(way) => builder.process(OsmElement::Way {
                id: way.id.0,
                node_ids: way.nodes.iter().map(|n| n.0).collect(),
                tags: convert_tags(&way.tags),
            }),
            OsmObj::Relation(_) => {}
        }
    }
    timer.stop(format!("read {}", path));

    timer.start("build road graph");
    let graph = builder.finish();
    timer.stop("build road graph");
    graph
}

fn convert_tags(tags: &osmpbfreader::Tags) -> Tags {
    Tags::new(
        tags.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}
