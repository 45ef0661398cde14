use geo::{Destination, Distance, Haversine};

use crate::Point;

/// Measures physical distance between coordinates and converts metric buffers back into
/// coordinate space. Every spatial computation in the workspace goes through one of these, so
/// callers can swap great-circle distance for something projected.
pub trait DistanceFunction: Send + Sync {
    /// Distance between two points, in meters.
    fn distance(&self, a: Point, b: Point) -> f64;

    /// How many degrees of longitude span `meters` at the given latitude.
    fn coordinate_offset_x(&self, meters: f64, at_latitude: f64) -> f64;

    /// How many degrees of latitude span `meters` at the given longitude.
    fn coordinate_offset_y(&self, meters: f64, at_longitude: f64) -> f64;
}

/// Haversine distance over WGS84 lon/lat.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreatCircleDistance;

impl DistanceFunction for GreatCircleDistance {
    fn distance(&self, a: Point, b: Point) -> f64 {
        Haversine.distance(a.to_geo(), b.to_geo())
    }

    // Walk due east from the given latitude
    fn coordinate_offset_x(&self, meters: f64, at_latitude: f64) -> f64 {
        let origin = geo::Point::new(0.0, at_latitude);
        Haversine.destination(origin, 90.0, meters).x()
    }

    // On a sphere the latitude scale doesn't depend on the longitude
    fn coordinate_offset_y(&self, meters: f64, _: f64) -> f64 {
        let origin = geo::Point::new(0.0, 0.0);
        Haversine.destination(origin, 0.0, meters).y()
    }
}

/// Plain euclidean distance, treating coordinates as meters. Handy for projected data and tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct EuclideanDistance;

impl DistanceFunction for EuclideanDistance {
    fn distance(&self, a: Point, b: Point) -> f64 {
        (a.x() - b.x()).hypot(a.y() - b.y())
    }

    fn coordinate_offset_x(&self, meters: f64, _: f64) -> f64 {
        meters
    }

    fn coordinate_offset_y(&self, meters: f64, _: f64) -> f64 {
        meters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_great_circle_distance() {
        let dist = GreatCircleDistance;
        // One degree of latitude is roughly 111km anywhere
        let d = dist.distance(Point::new(153.0, -27.5), Point::new(153.0, -26.5));
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
        assert_eq!(dist.distance(Point::new(1.0, 2.0), Point::new(1.0, 2.0)), 0.0);
    }

    #[test]
    fn test_offsets_invert_distance() {
        let dist = GreatCircleDistance;
        let origin = Point::new(153.0, -27.5);

        let dx = dist.coordinate_offset_x(1000.0, origin.y());
        let east = Point::new(origin.x() + dx, origin.y());
        assert!((dist.distance(origin, east) - 1000.0).abs() < 1.0);

        let dy = dist.coordinate_offset_y(1000.0, origin.x());
        let north = Point::new(origin.x(), origin.y() + dy);
        assert!((dist.distance(origin, north) - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_offsets_shrink_towards_the_poles() {
        let dist = GreatCircleDistance;
        let equator = dist.coordinate_offset_x(1000.0, 0.0);
        let oslo = dist.coordinate_offset_x(1000.0, 60.0);
        // cos(60) = 0.5, so the same distance spans twice the longitude
        assert!((oslo / equator - 2.0).abs() < 0.01, "got {oslo} vs {equator}");

        let origin = Point::new(10.75, 60.0);
        let east = Point::new(origin.x() + oslo, origin.y());
        assert!((dist.distance(origin, east) - 1000.0).abs() < 1.0);
        assert!((dist.distance(origin, east) - dist.distance(east, origin)).abs() < 1e-6);
    }
}
