//! Geofence primitives and the spatial-cell contract
//!
//! A geofence is a named set of polygons an instance operates within.
//! Controllers only ever see resolved polygon lists; resolution from
//! named references happens in the dispatcher when an instance starts.

mod cell;
mod polygon;

pub use cell::{CellId, CellScheme, GridCellScheme, DEFAULT_CELL_LEVEL};
pub use polygon::{BoundingBox, Polygon};

/// A named multipolygon boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    pub name: String,
    pub polygons: Vec<Polygon>,
}

impl Geofence {
    pub fn new(name: impl Into<String>, polygons: Vec<Polygon>) -> Self {
        Self {
            name: name.into(),
            polygons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coordinate;

    #[test]
    fn test_geofence_construction() {
        let poly = Polygon::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(1.0, 0.0),
        ])
        .unwrap();
        let fence = Geofence::new("downtown", vec![poly]);
        assert_eq!(fence.name, "downtown");
        assert_eq!(fence.polygons.len(), 1);
    }
}
