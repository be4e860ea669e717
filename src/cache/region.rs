//! Point-in-region containment for sub-county alert polygons.

use geo::{Contains, Point, Polygon};

/// Anything that can answer "is this point inside me?" — a simple rectangle for tests, or a
/// `geo::Polygon` ring parsed from a VTEC product for the real thing.
pub trait PointInRegion: Send + Sync {
    fn contains(&self, lat: f64, lon: f64) -> bool;
}

/// A `geo`-backed polygon ring, using standard ray-casting point-in-polygon containment.
pub struct PolygonRegion {
    polygon: Polygon<f64>,
}

impl PolygonRegion {
    pub fn new(polygon: Polygon<f64>) -> Self {
        PolygonRegion { polygon }
    }

    /// Build from a ring of `(lat, lon)` pairs, closing it if the caller didn't repeat the
    /// first point at the end.
    pub fn from_lat_lon_ring(points: &[(f64, f64)]) -> Self {
        let mut coords: Vec<(f64, f64)> = points.iter().map(|&(lat, lon)| (lon, lat)).collect();
        if coords.first() != coords.last() {
            if let Some(&first) = coords.first() {
                coords.push(first);
            }
        }
        PolygonRegion::new(Polygon::new(coords.into(), vec![]))
    }
}

impl PointInRegion for PolygonRegion {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        self.polygon.contains(&Point::new(lon, lat))
    }
}

/// A simple lat/lon bounding rectangle, useful for tests and coarse transmitter footprints.
pub struct RectangleRegion {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl PointInRegion for RectangleRegion {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_contains_interior_point() {
        let r = RectangleRegion {
            min_lat: 35.0,
            max_lat: 36.0,
            min_lon: -79.0,
            max_lon: -78.0,
        };
        assert!(r.contains(35.5, -78.5));
        assert!(!r.contains(34.0, -78.5));
    }

    #[test]
    fn polygon_excludes_point_outside_ring() {
        let square = PolygonRegion::from_lat_lon_ring(&[
            (35.0, -79.0),
            (35.0, -78.0),
            (36.0, -78.0),
            (36.0, -79.0),
        ]);
        assert!(square.contains(35.5, -78.5));
        assert!(!square.contains(10.0, 10.0));
    }
}
