use std::collections::BTreeSet;

use anyhow::Result;

use super::RoadNetworkGraph;
use crate::{NodeID, RoadWay, WayID};

impl RoadNetworkGraph {
    /// Merges the two ways meeting at every through node (one way in, one way out) into a
    /// single polyline, and removes the through node. Ways previously split by `to_loose_map`
    /// get their original ID back; otherwise merged IDs are joined by commas. Polylines straight
    /// from OSM count as compact, but may still meet end-to-end, so those get merged too.
    pub fn to_compact_map(&self) -> Result<RoadNetworkGraph> {
        if self.is_compact && !self.has_mergeable_node() {
            info!("Map is already compact, skipping conversion");
            return Ok(self.clone());
        }

        let mut result = self.clone();
        let mut merged_away: Vec<NodeID> = Vec::new();
        let mut self_loops: BTreeSet<NodeID> = BTreeSet::new();
        // Adjacency changes as ways get merged, so only the IDs are fixed up-front
        let candidates: Vec<NodeID> = result.nodes.ids().cloned().collect();
        for id in candidates {
            let node = result.nodes.lookup(&id)?;
            if node.degree() != 2 {
                continue;
            }
            if !node.is_through_node() {
                warn!(
                    "Node {} only has {} incoming and {} outgoing ways, not merging",
                    id,
                    node.incoming_degree(),
                    node.outgoing_degree()
                );
                continue;
            }
            let (incoming, outgoing) = match (
                node.incoming().iter().next(),
                node.outgoing().iter().next(),
            ) {
                (Some(i), Some(o)) => (i.clone(), o.clone()),
                _ => bail!("Node {} has degree 2, but its ways are missing", id),
            };
            if incoming == outgoing {
                warn!("Way {} starts and ends at {}, not merging", incoming, id);
                self_loops.insert(id);
                continue;
            }

            let merged = merge_ways(
                result.ways.lookup(&incoming)?,
                result.ways.lookup(&outgoing)?,
            )?;
            result.remove_road_way_list(&[incoming, outgoing]);
            result.add_way(merged)?;
            merged_away.push(id);
        }
        for id in &merged_away {
            result.remove_node(id)?;
        }

        for way in result.ways() {
            if way.id.has_split_marker() {
                bail!("Way {} is still split after compacting", way.id);
            }
        }
        for node in result.nodes() {
            if node.is_through_node() && !self_loops.contains(&node.id) {
                bail!("Node {} is still a through node after compacting", node.id);
            }
        }
        result.is_compact = true;

        info!(
            "Compacted the map: {} through nodes removed, {} nodes and {} ways remain",
            merged_away.len(),
            result.num_nodes(),
            result.num_ways()
        );
        Ok(result)
    }

    /// Splits every polyline into straight 2-vertex ways, registering the interior vertices as
    /// nodes. A comma-joined ID hands out one part per piece; anything else gets `_S0`, `_S1`,
    /// ... appended.
    pub fn to_loose_map(&self) -> Result<RoadNetworkGraph> {
        if !self.is_compact {
            info!("Map is already loose, skipping conversion");
            return Ok(self.clone());
        }

        let mut result = self.clone();
        let polylines: Vec<RoadWay> = result
            .ways()
            .filter(|w| w.is_polyline())
            .cloned()
            .collect();
        let mut pieces = Vec::new();
        for way in &polylines {
            let num_edges = way.len() - 1;
            let ids = if way.id.is_merged() {
                let parts = way.id.merged_parts();
                if parts.len() != num_edges {
                    bail!(
                        "Way {} has {} edges, but its ID has {} parts",
                        way.id,
                        num_edges,
                        parts.len()
                    );
                }
                parts
            } else {
                (0..num_edges).map(|i| way.id.split_piece(i)).collect()
            };

            for (idx, (pair, id)) in way.vertices().windows(2).zip(ids).enumerate() {
                // The last vertex is already an intersection
                if idx + 1 < num_edges {
                    result.add_node(pair[1].detached());
                }
                let mut piece = RoadWay::new(id, pair.to_vec())?.with_tags(way.tags.clone());
                piece.visit_count = way.visit_count;
                pieces.push(piece);
            }
        }
        let num_pieces = pieces.len();
        let split_ids: Vec<WayID> = polylines.iter().map(|w| w.id.clone()).collect();
        result.remove_road_way_list(&split_ids);
        result.add_ways(pieces)?;

        for way in result.ways() {
            if way.len() != 2 {
                bail!("Way {} still has {} vertices after loosening", way.id, way.len());
            }
            if way.id.is_merged() {
                bail!("Way {} still has a merged ID after loosening", way.id);
            }
        }
        let expected = self.all_type_nodes().len();
        if expected != result.num_nodes() {
            bail!(
                "Loosening should produce {} nodes, but got {}",
                expected,
                result.num_nodes()
            );
        }
        result.is_compact = false;

        info!(
            "Loosened the map: {} polylines split into {} ways",
            polylines.len(),
            num_pieces
        );
        Ok(result)
    }

    // A through node joining two different ways
    fn has_mergeable_node(&self) -> bool {
        self.nodes().any(|node| {
            node.is_through_node()
                && match (node.incoming().iter().next(), node.outgoing().iter().next()) {
                    (Some(incoming), Some(outgoing)) => incoming != outgoing,
                    _ => false,
                }
        })
    }
}

/// `incoming` ends where `outgoing` starts.
fn merge_ways(incoming: &RoadWay, outgoing: &RoadWay) -> Result<RoadWay> {
    let id = merged_way_id(&incoming.id, &outgoing.id)?;
    let mut vertices = incoming.vertices().to_vec();
    vertices.extend(outgoing.vertices()[1..].iter().cloned());
    let mut merged = RoadWay::new(id, vertices)?.with_tags(incoming.tags.clone());
    merged.visit_count = incoming.visit_count.max(outgoing.visit_count);
    Ok(merged)
}

fn merged_way_id(first: &WayID, second: &WayID) -> Result<WayID> {
    if !first.has_split_marker() && !second.has_split_marker() {
        return Ok(WayID::merge(first, second));
    }
    if first.split_base() != second.split_base() {
        bail!(
            "Can't merge {} and {}, they were split from different ways",
            first,
            second
        );
    }
    Ok(WayID::new(first.split_base()))
}
