//! Route generation over geofenced areas.
//!
//! Three generators, all taking a polygon list and concatenating
//! per-polygon results:
//!
//! - [`bootstrap_route`] - deterministic boustrophedon grid sweep giving
//!   full coverage of a brand-new area
//! - [`random_route`] - uniform samples inside the fence, cheaply ordered
//! - [`poi_route`] - built from the points of interest already known to
//!   the map-data store

use crate::coord::{self, Coordinate};
use crate::geofence::{BoundingBox, Polygon};
use crate::store::{MapDataStore, StoreError};
use rand::Rng;

/// Horizontal grid step as a multiple of the circle size.
///
/// `sqrt(0.75) * 2` lays circles out in the offset "brick" pattern where
/// horizontally adjacent circles overlap just enough to leave no gap.
const GRID_STEP_X: f64 = 1.732_050_808_568_877_2; // sqrt(0.75) * 2

/// Vertical grid step as a multiple of the circle size.
const GRID_STEP_Y: f64 = 1.507_314_829_332_7; // sqrt(0.568) * 2

/// Generates the deterministic bootstrap grid route for a polygon set.
///
/// Starting at each polygon's northeast corner, rows are walked westward
/// and eastward alternately, stepping `sqrt(0.75) * 2 * circle_size`
/// horizontally and `sqrt(0.568) * 2 * circle_size` vertically. A point is
/// emitted when it is inside the polygon or within `circle_size` of its
/// boundary (inclusive). The sweep terminates once it has passed the
/// southwest corner with a half-step margin.
///
/// Coverage is independent of what exists in storage, which is what makes
/// this suitable for the very first sweep of a brand-new area.
pub fn bootstrap_route(polygons: &[Polygon], circle_size_m: f64) -> Vec<Coordinate> {
    let mut route = Vec::new();
    for polygon in polygons {
        sweep_polygon(polygon, circle_size_m, &mut route);
    }
    route
}

fn sweep_polygon(polygon: &Polygon, circle_size_m: f64, out: &mut Vec<Coordinate>) {
    let bbox = polygon.bounding_box();
    let step_x_m = GRID_STEP_X * circle_size_m;
    let step_y_m = GRID_STEP_Y * circle_size_m;
    let step_y_deg = step_y_m / coord::METERS_PER_DEGREE;

    let mut lat = bbox.max_lat;
    let mut westward = true;
    let mut row = 0u64;

    // Half-step margin past the southwest corner terminates the sweep.
    while lat >= bbox.min_lat - step_y_deg / 2.0 {
        let lon_scale = lat.to_radians().cos().max(0.01);
        let step_x_deg = step_x_m / (coord::METERS_PER_DEGREE * lon_scale);
        // Odd rows shift half a step so circles interlock.
        let offset = if row % 2 == 1 { step_x_deg / 2.0 } else { 0.0 };

        let mut lons = Vec::new();
        let mut lon = bbox.max_lon - offset;
        while lon >= bbox.min_lon - step_x_deg / 2.0 {
            lons.push(lon);
            lon -= step_x_deg;
        }
        if !westward {
            lons.reverse();
        }

        for lon in lons {
            let point = Coordinate::new(lat, lon);
            if polygon.contains(&point)
                || polygon.distance_to_boundary_meters(&point) <= circle_size_m
            {
                out.push(point);
            }
        }

        lat -= step_y_deg;
        westward = !westward;
        row += 1;
    }
}

/// Generates a route of up to `samples` random points per polygon.
///
/// Points are drawn uniformly inside each polygon's bounding box, kept
/// only if inside the polygon, and sorted by latitude for a cheap
/// locality ordering. Non-deterministic; used where exhaustive coverage
/// is not required.
pub fn random_route(polygons: &[Polygon], samples: usize) -> Vec<Coordinate> {
    let mut rng = rand::thread_rng();
    let mut route = Vec::new();
    for polygon in polygons {
        let bbox = polygon.bounding_box();
        let mut points: Vec<Coordinate> = (0..samples)
            .map(|_| {
                Coordinate::new(
                    rng.gen_range(bbox.min_lat..=bbox.max_lat),
                    rng.gen_range(bbox.min_lon..=bbox.max_lon),
                )
            })
            .filter(|p| polygon.contains(p))
            .collect();
        points.sort_by(|a, b| a.lat.total_cmp(&b.lat));
        route.extend(points);
    }
    route
}

/// Builds a route from the points of interest already known inside the
/// polygon set.
///
/// Queries the map-data store by bounding box for pokestops and cells,
/// keeping only entries inside the polygon. Used for optimized routes
/// over already-surveyed areas. Store failures propagate so the caller
/// can treat the round as "no data".
pub async fn poi_route(
    polygons: &[Polygon],
    map_data: &dyn MapDataStore,
) -> Result<Vec<Coordinate>, StoreError> {
    let mut route = Vec::new();
    for polygon in polygons {
        let bbox: BoundingBox = polygon.bounding_box();
        for stop in map_data.pokestops_in_bbox(&bbox).await? {
            if polygon.contains(&stop.coord) {
                route.push(stop.coord);
            }
        }
        for cell in map_data.cells_in_bbox(&bbox).await? {
            if polygon.contains(&cell.center) {
                route.push(cell.center);
            }
        }
    }
    Ok(route)
}
