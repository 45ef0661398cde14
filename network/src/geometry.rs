use std::fmt;

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geom::Distance;
use serde::{Deserialize, Serialize};

use crate::DistanceFunction;

/// A longitude (x) / latitude (y) pair. Equality is exact, never within a tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    x: f64,
    y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn equals_2d(&self, other: &Point) -> bool {
        self.x == other.x && self.y == other.y
    }

    /// A hashable key that's equal exactly when `equals_2d` is. (-0.0 and 0.0 are treated as
    /// distinct, which never matters for real coordinates.)
    pub fn key(&self) -> (u64, u64) {
        (self.x.to_bits(), self.y.to_bits())
    }

    pub(crate) fn to_geo(self) -> geo::Point {
        geo::Point::new(self.x, self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.5} {:.5}", self.x, self.y)
    }
}

/// A straight line between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub p1: Point,
    pub p2: Point,
}

impl Segment {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    pub fn length(&self, dist: &dyn DistanceFunction) -> f64 {
        dist.distance(self.p1, self.p2)
    }

    pub fn equals_2d(&self, other: &Segment) -> bool {
        self.p1.equals_2d(&other.p1) && self.p2.equals_2d(&other.p2)
    }

    /// True only when the two segments cross at a single point strictly inside both of them.
    /// Touching at an endpoint, or overlapping collinearly, doesn't count.
    pub fn crosses(&self, other: &Segment) -> bool {
        matches!(
            line_intersection(self.to_geo(), other.to_geo()),
            Some(LineIntersection::SinglePoint {
                is_proper: true,
                ..
            })
        )
    }

    fn to_geo(self) -> geo::Line {
        geo::Line::new(self.p1.to_geo().0, self.p2.to_geo().0)
    }
}

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rectangle {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The smallest box covering every point. None if there are no points.
    pub fn covering<I: IntoIterator<Item = Point>>(pts: I) -> Option<Self> {
        let mut result: Option<Rectangle> = None;
        for pt in pts {
            match result {
                Some(ref mut rect) => rect.update(pt),
                None => {
                    result = Some(Rectangle::new(pt.x(), pt.y(), pt.x(), pt.y()));
                }
            }
        }
        result
    }

    /// Grow to include the point. Never shrinks.
    pub fn update(&mut self, pt: Point) {
        self.min_x = self.min_x.min(pt.x());
        self.min_y = self.min_y.min(pt.y());
        self.max_x = self.max_x.max(pt.x());
        self.max_y = self.max_y.max(pt.y());
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).abs()
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).abs()
    }

    pub fn area(&self) -> f64 {
        (self.max_x - self.min_x) * (self.max_y - self.min_y)
    }

    pub fn perimeter(&self) -> f64 {
        2.0 * self.width() + 2.0 * self.height()
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.min_x + (self.max_x - self.min_x) / 2.0,
            self.min_y + (self.max_y - self.min_y) / 2.0,
        )
    }

    /// Corners, counter-clockwise from the lower-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
            Point::new(self.min_x, self.max_y),
        ]
    }

    pub fn left_edge(&self) -> Segment {
        Segment::new(
            Point::new(self.min_x, self.min_y),
            Point::new(self.min_x, self.max_y),
        )
    }

    pub fn right_edge(&self) -> Segment {
        Segment::new(
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
        )
    }

    pub fn lower_edge(&self) -> Segment {
        Segment::new(
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
        )
    }

    pub fn upper_edge(&self) -> Segment {
        Segment::new(
            Point::new(self.min_x, self.max_y),
            Point::new(self.max_x, self.max_y),
        )
    }

    pub fn edges(&self) -> [Segment; 4] {
        [
            self.left_edge(),
            self.upper_edge(),
            self.right_edge(),
            self.lower_edge(),
        ]
    }

    pub fn is_square(&self) -> bool {
        self.width() == self.height()
    }

    /// Inclusive of the border.
    pub fn contains(&self, pt: Point) -> bool {
        pt.x() >= self.min_x && pt.x() <= self.max_x && pt.y() >= self.min_y && pt.y() <= self.max_y
    }

    /// True if `other` lies entirely in the interior, not touching any border.
    pub fn strictly_contains(&self, other: &Rectangle) -> bool {
        self.min_x < other.min_x
            && self.min_y < other.min_y
            && self.max_x > other.max_x
            && self.max_y > other.max_y
    }

    pub fn overlaps(&self, other: &Rectangle) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    /// Two rectangles are adjacent if they share an entire edge.
    pub fn is_adjacent(&self, other: &Rectangle) -> bool {
        self.edges()
            .iter()
            .any(|e1| other.edges().iter().any(|e2| e1.equals_2d(e2)))
    }

    /// Grow the box by a physical buffer on all four sides. The degree offsets for both sides
    /// of an axis are evaluated once, at the middle of the original box.
    pub fn extend_by_dist(&self, buffer: Distance, dist: &dyn DistanceFunction) -> Rectangle {
        let meters = buffer.inner_meters();
        let mid_lat = (self.min_y + self.max_y) / 2.0;
        let mid_lon = (self.min_x + self.max_x) / 2.0;
        let dx = dist.coordinate_offset_x(meters, mid_lat);
        let dy = dist.coordinate_offset_y(meters, mid_lon);
        Rectangle::new(
            self.min_x - dx,
            self.min_y - dy,
            self.max_x + dx,
            self.max_y + dy,
        )
    }

    pub fn to_geojson(&self) -> geojson::Geometry {
        let mut ring: Vec<Vec<f64>> = self
            .corners()
            .iter()
            .map(|pt| vec![pt.x(), pt.y()])
            .collect();
        ring.push(ring[0].clone());
        geojson::Geometry::new(geojson::Value::Polygon(vec![ring]))
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "lon [{}, {}], lat [{}, {}]",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}
