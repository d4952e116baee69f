//! Spatial cell covering contract and the default grid scheme.
//!
//! Bootstrap sweeps work in terms of discrete spatial cells: the covering
//! of a polygon is diffed against the cells already present in storage,
//! and each accepted scan clears the cells around its centre. The core
//! only requires the [`CellScheme`] contract; [`GridCellScheme`] is the
//! bundled fixed-level implementation.

use crate::coord::{self, Coordinate};
use crate::geofence::Polygon;
use std::fmt;

/// Default subdivision level for bootstrap coverings.
///
/// At level 15 a grid cell edge is roughly 1.2 km of latitude.
pub const DEFAULT_CELL_LEVEL: u8 = 15;

/// Opaque identifier of one spatial cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u64);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contract for a hierarchical spatial subdivision.
///
/// Implementations answer which cells cover a polygon at their configured
/// level, which cells lie near a point, and where a cell's centre is.
pub trait CellScheme: Send + Sync + 'static {
    /// All cells at the scheme's level whose area overlaps the polygon,
    /// including cells just outside whose scan circle reaches the boundary.
    fn covering(&self, polygon: &Polygon) -> Vec<CellId>;

    /// All cells whose centre lies within `radius_m` metres of `center`.
    fn cells_near(&self, center: &Coordinate, radius_m: f64) -> Vec<CellId>;

    /// The centre coordinate of a cell.
    fn cell_center(&self, cell: CellId) -> Coordinate;
}

/// Fixed-level latitude/longitude grid.
///
/// Cells are `360 / 2^level` degrees on each axis, identified by packing
/// the row and column indices into a single 64-bit id.
#[derive(Debug, Clone, Copy)]
pub struct GridCellScheme {
    level: u8,
}

impl GridCellScheme {
    pub fn new(level: u8) -> Self {
        Self { level }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// Cell edge length in degrees.
    fn edge_degrees(&self) -> f64 {
        360.0 / (1u64 << self.level) as f64
    }

    /// Cell edge length in metres of latitude.
    fn edge_meters(&self) -> f64 {
        self.edge_degrees() * coord::METERS_PER_DEGREE
    }

    fn cell_at(&self, c: &Coordinate) -> CellId {
        let edge = self.edge_degrees();
        let row = ((c.lat + 90.0) / edge).floor() as u64;
        let col = ((c.lon + 180.0) / edge).floor() as u64;
        CellId((row << 32) | col)
    }

    fn unpack(cell: CellId) -> (u64, u64) {
        (cell.0 >> 32, cell.0 & 0xFFFF_FFFF)
    }
}

impl Default for GridCellScheme {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_LEVEL)
    }
}

impl CellScheme for GridCellScheme {
    fn covering(&self, polygon: &Polygon) -> Vec<CellId> {
        let edge = self.edge_degrees();
        let edge_m = self.edge_meters();
        let bbox = polygon.bounding_box();

        let row_min = ((bbox.min_lat + 90.0) / edge).floor() as i64 - 1;
        let row_max = ((bbox.max_lat + 90.0) / edge).floor() as i64 + 1;
        let col_min = ((bbox.min_lon + 180.0) / edge).floor() as i64 - 1;
        let col_max = ((bbox.max_lon + 180.0) / edge).floor() as i64 + 1;

        let mut cells = Vec::new();
        for row in row_min..=row_max {
            for col in col_min..=col_max {
                let center = Coordinate::new(
                    (row as f64 + 0.5) * edge - 90.0,
                    (col as f64 + 0.5) * edge - 180.0,
                );
                // Keep the cell when its centre is inside, or close enough
                // to the boundary that the cell area overlaps the fence.
                if polygon.contains(&center)
                    || polygon.distance_to_boundary_meters(&center) <= edge_m
                {
                    cells.push(CellId(((row as u64) << 32) | col as u64));
                }
            }
        }
        cells
    }

    fn cells_near(&self, center: &Coordinate, radius_m: f64) -> Vec<CellId> {
        let edge = self.edge_degrees();
        let lat_span = radius_m / coord::METERS_PER_DEGREE;
        let lon_scale = center.lat.to_radians().cos().max(0.01);
        let lon_span = lat_span / lon_scale;

        let row_min = ((center.lat - lat_span + 90.0) / edge).floor() as i64;
        let row_max = ((center.lat + lat_span + 90.0) / edge).floor() as i64;
        let col_min = ((center.lon - lon_span + 180.0) / edge).floor() as i64;
        let col_max = ((center.lon + lon_span + 180.0) / edge).floor() as i64;

        let mut cells = Vec::new();
        for row in row_min..=row_max {
            for col in col_min..=col_max {
                let cell = CellId(((row as u64) << 32) | col as u64);
                let cc = self.cell_center(cell);
                if coord::haversine_meters(center, &cc) <= radius_m {
                    cells.push(cell);
                }
            }
        }
        // The cell containing the point itself always clears.
        let own = self.cell_at(center);
        if !cells.contains(&own) {
            cells.push(own);
        }
        cells
    }

    fn cell_center(&self, cell: CellId) -> Coordinate {
        let edge = self.edge_degrees();
        let (row, col) = Self::unpack(cell);
        Coordinate::new(
            (row as f64 + 0.5) * edge - 90.0,
            (col as f64 + 0.5) * edge - 180.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_square() -> Polygon {
        // ~2.2 km square, a few dozen level-15 cells
        Polygon::new(vec![
            Coordinate::new(40.00, -74.00),
            Coordinate::new(40.00, -73.98),
            Coordinate::new(40.02, -73.98),
            Coordinate::new(40.02, -74.00),
        ])
        .unwrap()
    }

    #[test]
    fn test_cell_at_roundtrip() {
        let scheme = GridCellScheme::default();
        let c = Coordinate::new(40.7128, -74.0060);
        let cell = scheme.cell_at(&c);
        let center = scheme.cell_center(cell);
        // Centre of the containing cell is within one edge of the point
        assert!(coord::haversine_meters(&c, &center) <= scheme.edge_meters());
    }

    #[test]
    fn test_covering_non_empty_and_centres_near_fence() {
        let scheme = GridCellScheme::default();
        let poly = small_square();
        let cells = scheme.covering(&poly);
        assert!(!cells.is_empty());
        for cell in &cells {
            let c = scheme.cell_center(*cell);
            assert!(
                poly.contains(&c) || poly.distance_to_boundary_meters(&c) <= scheme.edge_meters(),
                "cell {} centre {} too far from fence",
                cell,
                c
            );
        }
    }

    #[test]
    fn test_covering_deterministic() {
        let scheme = GridCellScheme::default();
        let poly = small_square();
        assert_eq!(scheme.covering(&poly), scheme.covering(&poly));
    }

    #[test]
    fn test_cells_near_includes_own_cell() {
        let scheme = GridCellScheme::default();
        let c = Coordinate::new(40.01, -73.99);
        let near = scheme.cells_near(&c, 10.0);
        assert!(near.contains(&scheme.cell_at(&c)));
    }

    #[test]
    fn test_cells_near_radius_grows_set() {
        let scheme = GridCellScheme::default();
        let c = Coordinate::new(40.01, -73.99);
        let small = scheme.cells_near(&c, 200.0);
        let large = scheme.cells_near(&c, 2_000.0);
        assert!(large.len() > small.len());
        for cell in &small {
            assert!(large.contains(cell));
        }
    }

    #[test]
    fn test_covering_cleared_by_center_scans() {
        // Scanning every cell centre with a modest clear radius must
        // empty the covering set.
        let scheme = GridCellScheme::default();
        let poly = small_square();
        let mut pending: std::collections::HashSet<CellId> =
            scheme.covering(&poly).into_iter().collect();
        let total = pending.len();
        let mut scans = 0;
        while let Some(&cell) = pending.iter().next() {
            let center = scheme.cell_center(cell);
            for near in scheme.cells_near(&center, 1_000.0) {
                pending.remove(&near);
            }
            pending.remove(&cell);
            scans += 1;
            assert!(scans <= total, "sweep did not terminate");
        }
        assert!(scans <= total);
    }
}
