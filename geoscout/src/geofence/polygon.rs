//! Polygon and bounding-box primitives.

use crate::coord::{self, Coordinate};
use serde::{Deserialize, Serialize};

/// Axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Returns true if the coordinate lies inside the box (inclusive).
    pub fn contains(&self, c: &Coordinate) -> bool {
        c.lat >= self.min_lat
            && c.lat <= self.max_lat
            && c.lon >= self.min_lon
            && c.lon <= self.max_lon
    }

    /// Northeast corner of the box.
    pub fn northeast(&self) -> Coordinate {
        Coordinate::new(self.max_lat, self.max_lon)
    }

    /// Southwest corner of the box.
    pub fn southwest(&self) -> Coordinate {
        Coordinate::new(self.min_lat, self.min_lon)
    }
}

/// A simple polygon defined by a ring of vertices.
///
/// The ring does not need to be explicitly closed; the edge between the
/// last and first vertex is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    ring: Vec<Coordinate>,
}

impl Polygon {
    /// Creates a polygon from a vertex ring.
    ///
    /// Returns `None` if fewer than three vertices are supplied.
    pub fn new(ring: Vec<Coordinate>) -> Option<Self> {
        if ring.len() < 3 {
            return None;
        }
        Some(Self { ring })
    }

    /// The vertex ring.
    pub fn ring(&self) -> &[Coordinate] {
        &self.ring
    }

    /// Computes the bounding box of the vertex ring.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lat: f64::MAX,
            max_lat: f64::MIN,
            min_lon: f64::MAX,
            max_lon: f64::MIN,
        };
        for v in &self.ring {
            bbox.min_lat = bbox.min_lat.min(v.lat);
            bbox.max_lat = bbox.max_lat.max(v.lat);
            bbox.min_lon = bbox.min_lon.min(v.lon);
            bbox.max_lon = bbox.max_lon.max(v.lon);
        }
        bbox
    }

    /// Ray-casting point-in-polygon test.
    ///
    /// Points exactly on an edge may fall on either side; work areas are
    /// large relative to coordinate precision so this is acceptable.
    pub fn contains(&self, c: &Coordinate) -> bool {
        let n = self.ring.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let a = &self.ring[i];
            let b = &self.ring[j];
            if ((a.lat > c.lat) != (b.lat > c.lat))
                && (c.lon < (b.lon - a.lon) * (c.lat - a.lat) / (b.lat - a.lat) + a.lon)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Distance in metres from a point to the nearest polygon edge.
    ///
    /// Used by the bootstrap grid sweep to keep points that fall just
    /// outside the boundary but whose scan circle still overlaps it.
    pub fn distance_to_boundary_meters(&self, c: &Coordinate) -> f64 {
        let n = self.ring.len();
        let mut best = f64::MAX;
        let mut j = n - 1;
        for i in 0..n {
            let d = point_segment_distance_meters(c, &self.ring[j], &self.ring[i]);
            if d < best {
                best = d;
            }
            j = i;
        }
        best
    }

    /// Returns true if any of the supplied polygons contains the point.
    pub fn any_contains(polygons: &[Polygon], c: &Coordinate) -> bool {
        polygons.iter().any(|p| p.contains(c))
    }
}

/// Distance from `p` to segment `a`-`b`, approximated in metres.
///
/// The segment is projected into a local planar frame scaled by the
/// latitude of `p`; adequate at work-area scale.
fn point_segment_distance_meters(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> f64 {
    let lon_scale = p.lat.to_radians().cos();
    let to_xy = |c: &Coordinate| {
        (
            c.lon * lon_scale * coord::METERS_PER_DEGREE,
            c.lat * coord::METERS_PER_DEGREE,
        )
    };
    let (px, py) = to_xy(p);
    let (ax, ay) = to_xy(a);
    let (bx, by) = to_xy(b);

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}
