//! Bootstrap sweep controller.
//!
//! A bootstrap-capable controller owns a working set of "missing"
//! spatial cells: the covering of its geofence minus the cells storage
//! already knows. Each poll pops one missing cell, targets a scan at its
//! centre, and clears every pending cell within a fixed radius of that
//! centre - a single scan naturally covers a neighbourhood, so the
//! neighbours must not be redundantly dispatched.

use crate::controller::{ControllerEvent, EventSender, JobController};
use crate::geofence::{CellId, CellScheme, Polygon};
use crate::store::MapDataStore;
use crate::task::{Task, TaskAction, TaskRequest};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Radius in metres around a scanned centre within which pending cells
/// are considered covered by the same scan.
pub const BOOTSTRAP_CLEAR_RADIUS_METERS: f64 = 1_000.0;

/// The pending-cell working set of a bootstrap phase.
///
/// Shared between [`BootstrapController`] and the bootstrap phase of the
/// quest-rotation controller.
#[derive(Debug, Default)]
pub(crate) struct BootstrapPhase {
    pending: HashSet<CellId>,
    total: usize,
}

impl BootstrapPhase {
    /// An already-finished phase (no cells to sweep).
    pub fn done() -> Self {
        Self::default()
    }

    /// Builds the working set as covering minus already-known cells.
    pub fn from_diff(covering: Vec<CellId>, existing: &HashSet<CellId>) -> Self {
        let pending: HashSet<CellId> = covering
            .into_iter()
            .filter(|cell| !existing.contains(cell))
            .collect();
        let total = pending.len();
        Self { pending, total }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// `(completed, total)` for progress reporting.
    pub fn progress(&self) -> (usize, usize) {
        (self.total - self.pending.len(), self.total)
    }

    /// Pops an arbitrary pending cell.
    pub fn next_cell(&mut self) -> Option<CellId> {
        let cell = self.pending.iter().next().copied()?;
        self.pending.remove(&cell);
        Some(cell)
    }

    /// Removes every listed cell from the pending set.
    pub fn clear_cells(&mut self, cells: &[CellId]) {
        for cell in cells {
            self.pending.remove(cell);
        }
    }

    /// One-line progress string.
    pub fn status_line(&self) -> String {
        let (done, total) = self.progress();
        if total == 0 || self.is_done() {
            format!("Bootstrapping done ({} cells)", total)
        } else {
            format!(
                "Bootstrapping {:.1}% ({}/{})",
                done as f64 / total as f64 * 100.0,
                done,
                total
            )
        }
    }
}

/// Controller serving the one-time initial sweep of an area.
///
/// State machine: `Bootstrapping -> Normal`. Once the pending set is
/// empty the controller signals completion; if configured with a
/// follow-on instance the completing device is handed to it, otherwise
/// the area-exhausted event fires.
pub struct BootstrapController {
    name: String,
    polygons: Vec<Polygon>,
    min_level: u8,
    max_level: u8,
    on_complete_instance: Option<String>,
    scheme: Arc<dyn CellScheme>,
    map_data: Arc<dyn MapDataStore>,
    events: EventSender,
    state: Mutex<BootstrapPhase>,
    stopped: AtomicBool,
    completion_sent: AtomicBool,
}

impl BootstrapController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        polygons: Vec<Polygon>,
        min_level: u8,
        max_level: u8,
        on_complete_instance: Option<String>,
        scheme: Arc<dyn CellScheme>,
        map_data: Arc<dyn MapDataStore>,
        events: EventSender,
    ) -> Self {
        Self {
            name: name.into(),
            polygons,
            min_level,
            max_level,
            on_complete_instance,
            scheme,
            map_data,
            events,
            state: Mutex::new(BootstrapPhase::done()),
            stopped: AtomicBool::new(false),
            completion_sent: AtomicBool::new(false),
        }
    }

    /// Computes the pending set from the current covering and storage.
    ///
    /// A storage failure leaves the full covering pending: the area is
    /// treated as entirely unswept and visibly stuck in `Bootstrapping`
    /// until the store recovers and a reload runs.
    pub async fn init(&self) {
        let phase = compute_bootstrap_phase(
            &self.name,
            &self.polygons,
            self.scheme.as_ref(),
            self.map_data.as_ref(),
        )
        .await;
        let (done, total) = phase.progress();
        info!(
            instance = %self.name,
            pending = total - done,
            total,
            "bootstrap working set computed"
        );
        *self.state.lock() = phase;
    }

    fn emit_completion(&self, request: &TaskRequest) {
        if self.completion_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let event = match &self.on_complete_instance {
            Some(next) => ControllerEvent::BootstrapComplete {
                device_uuid: request.device_uuid.clone(),
                next_instance: next.clone(),
            },
            None => ControllerEvent::InstanceComplete {
                instance_name: self.name.clone(),
                completed_at: Utc::now(),
            },
        };
        info!(instance = %self.name, "bootstrap sweep complete");
        let _ = self.events.send(event);
    }
}

/// Covering-minus-existing computation shared with the quest controller.
pub(crate) async fn compute_bootstrap_phase(
    name: &str,
    polygons: &[Polygon],
    scheme: &dyn CellScheme,
    map_data: &dyn MapDataStore,
) -> BootstrapPhase {
    let mut covering = Vec::new();
    for polygon in polygons {
        covering.extend(scheme.covering(polygon));
    }
    covering.sort_unstable();
    covering.dedup();

    let existing: HashSet<CellId> = match map_data.cells_by_ids(&covering).await {
        Ok(cells) => cells.into_iter().map(|c| c.id).collect(),
        Err(err) => {
            warn!(
                instance = %name,
                error = %err,
                "cell lookup failed; treating entire covering as unswept"
            );
            HashSet::new()
        }
    };
    BootstrapPhase::from_diff(covering, &existing)
}

#[async_trait]
impl JobController for BootstrapController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_task(&self, request: &TaskRequest) -> Option<Task> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }

        let (center, finished) = {
            let mut state = self.state.lock();
            let cell = match state.next_cell() {
                Some(cell) => cell,
                None => return None,
            };
            let center = self.scheme.cell_center(cell);
            let near = self
                .scheme
                .cells_near(&center, BOOTSTRAP_CLEAR_RADIUS_METERS);
            state.clear_cells(&near);
            (center, state.is_done())
        };

        debug!(instance = %self.name, target = %center, "dispatching bootstrap scan");
        if finished {
            self.emit_completion(request);
        }
        Some(Task::scan(
            TaskAction::Bootstrap,
            center,
            self.min_level,
            self.max_level,
        ))
    }

    async fn status(&self) -> String {
        self.state.lock().status_line()
    }

    async fn reload(&self) {
        self.completion_sent.store(false, Ordering::SeqCst);
        self.init().await;
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
