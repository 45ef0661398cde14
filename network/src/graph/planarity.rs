use super::RoadNetworkGraph;
use crate::{RoadWay, Segment};

impl RoadNetworkGraph {
    /// Counts every place two ways cross without meeting at an intersection. Pairs of ways that
    /// share any endpoint are skipped entirely. This is quadratic in both ways and edges, so it's
    /// meant for one-off validation.
    pub fn non_planar_node_count(&self) -> usize {
        let ways: Vec<(&RoadWay, Vec<Segment>)> = self.ways().map(|w| (w, w.edges())).collect();
        let mut count = 0;
        for (i, (way1, edges1)) in ways.iter().enumerate() {
            for (way2, edges2) in &ways[i + 1..] {
                if share_endpoint(way1, way2) {
                    continue;
                }
                for e1 in edges1 {
                    count += edges2.iter().filter(|e2| e1.crosses(e2)).count();
                }
            }
        }
        count
    }

    pub fn is_planar_map(&self) -> bool {
        self.non_planar_node_count() == 0
    }
}

fn share_endpoint(way1: &RoadWay, way2: &RoadWay) -> bool {
    let ends1 = [way1.from_node().pt, way1.to_node().pt];
    let ends2 = [way2.from_node().pt, way2.to_node().pt];
    ends1
        .iter()
        .any(|pt1| ends2.iter().any(|pt2| pt1.equals_2d(pt2)))
}
