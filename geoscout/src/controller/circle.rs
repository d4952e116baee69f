//! Route-cursor controllers.
//!
//! One controller covers every instance kind whose behaviour is "walk a
//! route forever": pokemon/raid/IV circling, leveling, and dynamic
//! routes. The route is either configured verbatim or generated from the
//! fence, and a shared cursor hands out the next waypoint per poll.
//! Generated routes are recomputed when the cursor passes the end, since
//! fence contents can change between sweeps; static routes just wrap.

use crate::controller::JobController;
use crate::coord::Coordinate;
use crate::geofence::Polygon;
use crate::route;
use crate::store::MapDataStore;
use crate::task::{Task, TaskAction, TaskRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which scan the waypoints carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircleKind {
    Pokemon,
    Raid,
    SmartRaid,
    Iv,
    Leveling,
    Dynamic,
}

impl CircleKind {
    fn action(self) -> TaskAction {
        match self {
            CircleKind::Pokemon | CircleKind::Dynamic => TaskAction::ScanPokemon,
            CircleKind::Raid | CircleKind::SmartRaid => TaskAction::ScanRaid,
            CircleKind::Iv => TaskAction::ScanIv,
            CircleKind::Leveling => TaskAction::Leveling,
        }
    }
}

/// Where the route comes from.
pub enum RouteSource {
    /// A route configured verbatim; never regenerated.
    Static(Vec<Coordinate>),
    /// Boustrophedon grid over the fence.
    Grid {
        polygons: Vec<Polygon>,
        circle_size: f64,
    },
    /// Points of interest in the fence, deduped and ordered.
    Poi {
        polygons: Vec<Polygon>,
        circle_size: f64,
    },
}

#[derive(Default)]
struct CircleState {
    route: Vec<Coordinate>,
    index: usize,
}

/// Controller for circle-style and dynamic-route instances.
pub struct CircleController {
    name: String,
    kind: CircleKind,
    source: RouteSource,
    min_level: u8,
    max_level: u8,
    map_data: Arc<dyn MapDataStore>,
    state: Mutex<CircleState>,
    stopped: AtomicBool,
}

impl CircleController {
    pub fn new(
        name: impl Into<String>,
        kind: CircleKind,
        source: RouteSource,
        min_level: u8,
        max_level: u8,
        map_data: Arc<dyn MapDataStore>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source,
            min_level,
            max_level,
            map_data,
            state: Mutex::new(CircleState::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Computes the route from the source. For generated sources a
    /// storage failure leaves the previous route in place.
    pub async fn init(&self) {
        let route = match &self.source {
            RouteSource::Static(route) => route.clone(),
            RouteSource::Grid {
                polygons,
                circle_size,
            } => route::bootstrap_route(polygons, *circle_size),
            RouteSource::Poi {
                polygons,
                circle_size,
            } => match route::poi_route(polygons, self.map_data.as_ref()).await {
                Ok(points) => {
                    route::optimize(&points, *circle_size, route::DEFAULT_DEDUPE_ATTEMPTS)
                }
                Err(err) => {
                    warn!(instance = %self.name, error = %err, "route generation failed");
                    return;
                }
            },
        };
        info!(instance = %self.name, waypoints = route.len(), "route computed");
        let mut state = self.state.lock();
        state.route = route;
        state.index = 0;
    }
}

#[async_trait]
impl JobController for CircleController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_task(&self, _request: &TaskRequest) -> Option<Task> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }

        // A finished pass over a generated route triggers a recompute.
        let exhausted = {
            let state = self.state.lock();
            !state.route.is_empty() && state.index >= state.route.len()
        };
        if exhausted && !matches!(self.source, RouteSource::Static(_)) {
            debug!(instance = %self.name, "route pass finished; regenerating");
            self.init().await;
        }

        let coord = {
            let mut state = self.state.lock();
            if state.route.is_empty() {
                return None;
            }
            if state.index >= state.route.len() {
                state.index = 0;
            }
            let coord = state.route[state.index];
            state.index += 1;
            coord
        };

        debug!(instance = %self.name, target = %coord, "dispatching route waypoint");
        Some(Task::scan(
            self.kind.action(),
            coord,
            self.min_level,
            self.max_level,
        ))
    }

    async fn status(&self) -> String {
        let state = self.state.lock();
        if state.route.is_empty() {
            return "Route: empty".to_string();
        }
        format!("Route {}/{}", state.index, state.route.len())
    }

    async fn reload(&self) {
        self.init().await;
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
