//! A road graph on disk is a folder of three CSV files. `nodes.csv` has the intersections,
//! `way_vertices.csv` lists every way's vertices in order (the same way GTFS shapes are stored),
//! and `way_tags.csv` has one row per way tag.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use abstutil::Tags;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    DistanceFunction, NodeID, Point, Rectangle, RoadNetworkGraph, RoadNode, RoadWay, WayID,
};

const NODES: &str = "nodes.csv";
const WAY_VERTICES: &str = "way_vertices.csv";
const WAY_TAGS: &str = "way_tags.csv";

#[derive(Serialize, Deserialize)]
struct NodeRecord {
    node_id: NodeID,
    lon: f64,
    lat: f64,
}

#[derive(Serialize, Deserialize)]
struct VertexRecord {
    way_id: WayID,
    seq: usize,
    node_id: NodeID,
    lon: f64,
    lat: f64,
}

#[derive(Serialize, Deserialize)]
struct TagRecord {
    way_id: WayID,
    key: String,
    value: String,
}

pub fn write_map<P: AsRef<Path>>(graph: &RoadNetworkGraph, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs_err::create_dir_all(dir)?;

    let mut writer = csv::Writer::from_writer(fs_err::File::create(dir.join(NODES))?);
    for node in graph.nodes() {
        writer.serialize(NodeRecord {
            node_id: node.id.clone(),
            lon: node.lon(),
            lat: node.lat(),
        })?;
    }
    writer.flush()?;

    let mut vertices = csv::Writer::from_writer(fs_err::File::create(dir.join(WAY_VERTICES))?);
    let mut tags = csv::Writer::from_writer(fs_err::File::create(dir.join(WAY_TAGS))?);
    for way in graph.ways() {
        for (seq, vertex) in way.vertices().iter().enumerate() {
            vertices.serialize(VertexRecord {
                way_id: way.id.clone(),
                seq,
                node_id: vertex.id.clone(),
                lon: vertex.lon(),
                lat: vertex.lat(),
            })?;
        }
        for (key, value) in way.tags.inner() {
            tags.serialize(TagRecord {
                way_id: way.id.clone(),
                key: key.clone(),
                value: value.clone(),
            })?;
        }
    }
    vertices.flush()?;
    tags.flush()?;

    info!(
        "Wrote {} nodes and {} ways to {}",
        graph.num_nodes(),
        graph.num_ways(),
        dir.display()
    );
    Ok(())
}

/// Reads a map written by `write_map`. Directedness isn't stored, so the caller says what the
/// map is.
pub fn read_map<P: AsRef<Path>>(
    dir: P,
    dist: Arc<dyn DistanceFunction>,
    directed: bool,
) -> Result<RoadNetworkGraph> {
    let dir = dir.as_ref();
    let nodes = load_nodes(fs_err::File::open(dir.join(NODES))?)?;
    let tags = load_way_tags(fs_err::File::open(dir.join(WAY_TAGS))?)?;
    let ways = load_ways(fs_err::File::open(dir.join(WAY_VERTICES))?, tags)?;

    let mut graph = if directed {
        RoadNetworkGraph::new(dist)
    } else {
        RoadNetworkGraph::new_undirected(dist)
    };
    graph.set_nodes(nodes)?;
    graph.add_ways(ways)?;
    Ok(graph)
}

pub fn load_nodes<R: std::io::Read>(reader: R) -> Result<Vec<RoadNode>> {
    let mut nodes = Vec::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: NodeRecord = rec?;
        nodes.push(RoadNode::new(rec.node_id, Point::new(rec.lon, rec.lat)));
    }
    Ok(nodes)
}

pub fn load_way_tags<R: std::io::Read>(reader: R) -> Result<BTreeMap<WayID, Tags>> {
    let mut tags: BTreeMap<WayID, Tags> = BTreeMap::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: TagRecord = rec?;
        tags.entry(rec.way_id)
            .or_insert_with(Tags::empty)
            .insert(rec.key, rec.value);
    }
    Ok(tags)
}

/// Ways come out in the order they first appear.
pub fn load_ways<R: std::io::Read>(
    reader: R,
    mut tags: BTreeMap<WayID, Tags>,
) -> Result<Vec<RoadWay>> {
    let mut order: Vec<WayID> = Vec::new();
    let mut vertices: BTreeMap<WayID, Vec<(usize, RoadNode)>> = BTreeMap::new();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: VertexRecord = rec?;
        let node = RoadNode::new(rec.node_id, Point::new(rec.lon, rec.lat));
        match vertices.get_mut(&rec.way_id) {
            Some(list) => list.push((rec.seq, node)),
            None => {
                order.push(rec.way_id.clone());
                vertices.insert(rec.way_id, vec![(rec.seq, node)]);
            }
        }
    }

    let mut ways = Vec::new();
    for id in order {
        let mut list = vertices.remove(&id).unwrap_or_default();
        list.sort_by_key(|(seq, _)| *seq);
        let way = RoadWay::new(id.clone(), list.into_iter().map(|(_, n)| n).collect())?;
        ways.push(way.with_tags(tags.remove(&id).unwrap_or_else(Tags::empty)));
    }
    if !tags.is_empty() {
        warn!("{} ways have tags, but no vertices", tags.len());
    }
    Ok(ways)
}

/// Ways become LineStrings and intersections become Points, for inspecting a map in any GeoJSON
/// viewer.
pub fn export_to_geojson<P: AsRef<Path>>(graph: &RoadNetworkGraph, path: P) -> Result<()> {
    use geojson::{Feature, FeatureCollection, GeoJson};

    let mut features = Vec::new();
    for way in graph.ways() {
        let mut feature = Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::LineString(
                way.vertices()
                    .iter()
                    .map(|v| vec![v.lon(), v.lat()])
                    .collect(),
            ))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("type", "way");
        feature.set_property("id", way.id.0.clone());
        for (key, value) in way.tags.inner() {
            feature.set_property(key.clone(), value.clone());
        }
        features.push(feature);
    }
    for node in graph.nodes() {
        let mut feature = Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                node.lon(),
                node.lat(),
            ]))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("type", "node");
        feature.set_property("id", node.id.0.clone());
        feature.set_property("degree", node.degree());
        features.push(feature);
    }

    let gj = GeoJson::FeatureCollection(FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    });
    fs_err::write(path, serde_json::to_string_pretty(&gj)?)?;
    Ok(())
}

pub fn dump_bounding_box(boundary: &Rectangle) {
    use geojson::{Feature, FeatureCollection, GeoJson};

    let feature = Feature {
        bbox: None,
        geometry: Some(boundary.to_geojson()),
        id: None,
        properties: None,
        foreign_members: None,
    };
    let gj = GeoJson::FeatureCollection(FeatureCollection {
        features: vec![feature],
        bbox: None,
        foreign_members: None,
    });
    match serde_json::to_string(&gj) {
        Ok(json) => info!("GeoJSON covering the bounding box: {}", json),
        Err(err) => warn!("Couldn't describe the bounding box {}: {}", boundary, err),
    }
}
