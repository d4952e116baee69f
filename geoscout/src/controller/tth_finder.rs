//! Spawnpoint despawn-timer discovery.
//!
//! Cycles a device over every spawnpoint in the fence whose despawn
//! timer (time-till-hidden) is still unconfirmed. Repeated visits let
//! the scan pipeline pin the timer down; the cursor simply wraps until
//! a reload observes the point as confirmed and drops it.

use crate::controller::{ControllerEvent, EventSender, JobController};
use crate::coord::Coordinate;
use crate::geofence::Polygon;
use crate::store::MapDataStore;
use crate::task::{Task, TaskAction, TaskRequest};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct TthState {
    points: Vec<Coordinate>,
    index: usize,
}

/// Controller for `spawnpoint_discovery` instances.
pub struct TthFinderController {
    name: String,
    polygons: Vec<Polygon>,
    min_level: u8,
    max_level: u8,
    map_data: Arc<dyn MapDataStore>,
    events: EventSender,
    state: Mutex<TthState>,
    stopped: AtomicBool,
    completion_sent: AtomicBool,
}

impl TthFinderController {
    pub fn new(
        name: impl Into<String>,
        polygons: Vec<Polygon>,
        min_level: u8,
        max_level: u8,
        map_data: Arc<dyn MapDataStore>,
        events: EventSender,
    ) -> Self {
        Self {
            name: name.into(),
            polygons,
            min_level,
            max_level,
            map_data,
            events,
            state: Mutex::new(TthState::default()),
            stopped: AtomicBool::new(false),
            completion_sent: AtomicBool::new(false),
        }
    }

    /// Loads the unconfirmed spawnpoints inside the fence.
    pub async fn init(&self) {
        let mut points = Vec::new();
        let mut seen = HashSet::new();
        for polygon in &self.polygons {
            let spawnpoints = match self
                .map_data
                .spawnpoints_in_bbox(&polygon.bounding_box())
                .await
            {
                Ok(sp) => sp,
                Err(err) => {
                    warn!(instance = %self.name, error = %err, "spawnpoint load failed");
                    return;
                }
            };
            for sp in spawnpoints {
                if !sp.has_tth && polygon.contains(&sp.coord) && seen.insert(sp.id) {
                    points.push(sp.coord);
                }
            }
        }
        info!(
            instance = %self.name,
            points = points.len(),
            "spawnpoint discovery initialized"
        );
        let mut state = self.state.lock();
        state.points = points;
        state.index = 0;
    }
}

#[async_trait]
impl JobController for TthFinderController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_task(&self, _request: &TaskRequest) -> Option<Task> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }

        let (coord, wrapped) = {
            let mut state = self.state.lock();
            if state.points.is_empty() {
                return None;
            }
            let mut wrapped = false;
            if state.index >= state.points.len() {
                state.index = 0;
                wrapped = true;
            }
            let coord = state.points[state.index];
            state.index += 1;
            (coord, wrapped)
        };

        // A full pass means every unconfirmed point has been visited
        // once. Announce it a single time; later passes are refinement.
        if wrapped && !self.completion_sent.swap(true, Ordering::SeqCst) {
            info!(instance = %self.name, "spawnpoint sweep completed a full pass");
            let _ = self.events.send(ControllerEvent::InstanceComplete {
                instance_name: self.name.clone(),
                completed_at: Utc::now(),
            });
        }

        debug!(instance = %self.name, target = %coord, "dispatching spawnpoint scan");
        Some(Task::scan(
            TaskAction::ScanPokemon,
            coord,
            self.min_level,
            self.max_level,
        ))
    }

    async fn status(&self) -> String {
        let state = self.state.lock();
        if state.points.is_empty() {
            return "Spawnpoints: none unconfirmed".to_string();
        }
        format!("Spawnpoints {}/{}", state.index, state.points.len())
    }

    async fn reload(&self) {
        self.completion_sent.store(false, Ordering::SeqCst);
        self.init().await;
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
