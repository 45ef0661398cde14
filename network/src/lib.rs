//! Road networks as directed graphs of intersections and ways, built from OpenStreetMap and
//! transformed between compact/loose and directed/undirected forms.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod distance;
mod geometry;
mod graph;
pub mod io;
mod node;
pub mod osm;
mod way;

pub use self::distance::{DistanceFunction, EuclideanDistance, GreatCircleDistance};
pub use self::geometry::{Point, Rectangle, Segment};
pub use self::graph::{RoadNetworkGraph, UndirectedStats};
pub use self::node::{NodeID, RoadNode};
pub use self::way::{RoadWay, WayID};
