//! Quest-rotation controller.
//!
//! Serves the daily quest sweep of a geofenced area: a one-time
//! bootstrap phase first, then rotation over every pokestop still
//! missing today's quest result. A private recurring timer resets the
//! working set at local midnight.

use crate::controller::bootstrap::{
    compute_bootstrap_phase, BootstrapPhase, BOOTSTRAP_CLEAR_RADIUS_METERS,
};
use crate::controller::{seconds_until_local_midnight, ControllerEvent, EventSender, JobController};
use crate::coord::{self, Coordinate};
use crate::geofence::{CellScheme, Polygon};
use crate::store::{AccountStore, MapDataStore};
use crate::task::{Task, TaskAction, TaskRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pending points within this many metres of a handed-out point are
/// removed with it; the same physical visit covers them.
pub const QUEST_PROXIMITY_METERS: f64 = 80.0;

/// Minimum interval between area-complete checks once the pool drains.
/// Guards against a completion storm on every poll of an empty area.
const COMPLETION_CHECK_INTERVAL: Duration = Duration::from_secs(600);

/// One eligible pokestop in the rotation.
#[derive(Debug, Clone, PartialEq)]
struct QuestPoint {
    id: String,
    coord: Coordinate,
}

#[derive(Default)]
struct QuestState {
    bootstrap: BootstrapPhase,
    /// Every eligible point in the fence.
    all: Vec<QuestPoint>,
    /// Points still needing today's quest result.
    today: Vec<QuestPoint>,
    /// Times each point has been handed out this cycle.
    retries: HashMap<String, u8>,
    completed_at: Option<DateTime<Utc>>,
    last_completion_check: Option<Instant>,
}

/// Controller for `quest_rotation` instances.
pub struct AutoQuestController {
    name: String,
    polygons: Vec<Polygon>,
    min_level: u8,
    max_level: u8,
    spin_limit: u32,
    retry_limit: u8,
    timezone_offset: i32,
    scheme: Arc<dyn CellScheme>,
    map_data: Arc<dyn MapDataStore>,
    accounts: Arc<dyn AccountStore>,
    events: EventSender,
    state: Mutex<QuestState>,
    shutdown: CancellationToken,
}

impl AutoQuestController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        polygons: Vec<Polygon>,
        min_level: u8,
        max_level: u8,
        spin_limit: u32,
        retry_limit: u8,
        timezone_offset: i32,
        scheme: Arc<dyn CellScheme>,
        map_data: Arc<dyn MapDataStore>,
        accounts: Arc<dyn AccountStore>,
        events: EventSender,
    ) -> Self {
        Self {
            name: name.into(),
            polygons,
            min_level,
            max_level,
            spin_limit,
            retry_limit,
            timezone_offset,
            scheme,
            map_data,
            accounts,
            events,
            state: Mutex::new(QuestState::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds the bootstrap working set and the point pools from current
    /// map data. A storage failure leaves the pools empty; the instance
    /// is inert until the store recovers and a reload runs.
    pub async fn init(&self) {
        let bootstrap = compute_bootstrap_phase(
            &self.name,
            &self.polygons,
            self.scheme.as_ref(),
            self.map_data.as_ref(),
        )
        .await;

        let (all, today) = self.load_points().await;
        info!(
            instance = %self.name,
            points = all.len(),
            pending_today = today.len(),
            bootstrapping = !bootstrap.is_done(),
            "quest rotation initialized"
        );

        let mut state = self.state.lock();
        state.bootstrap = bootstrap;
        state.all = all;
        state.today = today;
        state.retries.clear();
        state.completed_at = None;
        state.last_completion_check = None;
    }

    /// Arms the recurring local-midnight reset. The timer task holds a
    /// weak reference and exits when the controller is dropped or
    /// stopped.
    pub fn start_daily_reset(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let cancel = self.shutdown.clone();
        let offset = self.timezone_offset;
        let name = self.name.clone();
        tokio::spawn(async move {
            loop {
                let secs = seconds_until_local_midnight(offset, Utc::now());
                debug!(instance = %name, in_secs = secs, "daily reset armed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                        let Some(controller) = weak.upgrade() else { break };
                        controller.daily_reset().await;
                    }
                }
            }
            debug!(instance = %name, "daily reset timer stopped");
        });
    }

    /// Clears yesterday's results and repopulates the point pools.
    /// Idempotent: running it twice in succession leaves the same state
    /// as running it once.
    pub async fn daily_reset(&self) {
        info!(instance = %self.name, "daily quest reset");
        let ids = self.point_ids();
        if let Err(err) = self.map_data.clear_quests(&ids).await {
            warn!(instance = %self.name, error = %err, "quest clearing failed");
        }

        let (all, today) = self.load_points_by_ids(&ids).await;
        let mut state = self.state.lock();
        state.all = all;
        state.today = today;
        state.retries.clear();
        state.completed_at = None;
        state.last_completion_check = None;
    }

    fn point_ids(&self) -> Vec<String> {
        self.state.lock().all.iter().map(|p| p.id.clone()).collect()
    }

    /// Initial point discovery: bounding-box query filtered to the fence.
    async fn load_points(&self) -> (Vec<QuestPoint>, Vec<QuestPoint>) {
        let mut all = Vec::new();
        let mut today = Vec::new();
        let mut seen = HashSet::new();
        for polygon in &self.polygons {
            let stops = match self.map_data.pokestops_in_bbox(&polygon.bounding_box()).await {
                Ok(stops) => stops,
                Err(err) => {
                    warn!(instance = %self.name, error = %err, "pokestop load failed");
                    return (Vec::new(), Vec::new());
                }
            };
            for stop in stops {
                if !stop.enabled || !polygon.contains(&stop.coord) || !seen.insert(stop.id.clone())
                {
                    continue;
                }
                let point = QuestPoint {
                    id: stop.id.clone(),
                    coord: stop.coord,
                };
                if !stop.has_quest {
                    today.push(point.clone());
                }
                all.push(point);
            }
        }
        (all, today)
    }

    /// Point refresh by id, used by the daily reset.
    async fn load_points_by_ids(&self, ids: &[String]) -> (Vec<QuestPoint>, Vec<QuestPoint>) {
        let stops = match self.map_data.pokestops_by_ids(ids).await {
            Ok(stops) => stops,
            Err(err) => {
                warn!(instance = %self.name, error = %err, "pokestop refresh failed");
                return (Vec::new(), Vec::new());
            }
        };
        let mut all = Vec::new();
        let mut today = Vec::new();
        for stop in stops {
            if !stop.enabled {
                continue;
            }
            let point = QuestPoint {
                id: stop.id.clone(),
                coord: stop.coord,
            };
            if !stop.has_quest {
                today.push(point.clone());
            }
            all.push(point);
        }
        (all, today)
    }

    /// Refills `today` from storage: every known point that has no quest
    /// result yet, is enabled, and is under the retry ceiling comes
    /// back. Returns the refreshed pool size, or `None` when storage was
    /// unreachable (which must not be read as "confirmed empty").
    async fn refresh_today(&self) -> Option<usize> {
        let ids = self.point_ids();
        if ids.is_empty() {
            return Some(0);
        }
        let stops = match self.map_data.pokestops_by_ids(&ids).await {
            Ok(stops) => stops,
            Err(err) => {
                warn!(instance = %self.name, error = %err, "today-pool refresh failed");
                return None;
            }
        };

        let mut state = self.state.lock();
        let mut today = Vec::new();
        for stop in stops {
            let retries = state.retries.get(&stop.id).copied().unwrap_or(0);
            if stop.enabled && !stop.has_quest && retries <= self.retry_limit {
                today.push(QuestPoint {
                    id: stop.id,
                    coord: stop.coord,
                });
            }
        }
        let count = today.len();
        state.today = today;
        Some(count)
    }

    /// Completion check for a drained area, rate-limited to once per
    /// [`COMPLETION_CHECK_INTERVAL`]. Emits at most one event per window
    /// and records the completion timestamp exactly once.
    fn completion_check(&self) {
        let completed_at = {
            let mut state = self.state.lock();
            let due = state
                .last_completion_check
                .map_or(true, |at| at.elapsed() >= COMPLETION_CHECK_INTERVAL);
            if !due {
                return;
            }
            state.last_completion_check = Some(Instant::now());
            let at = *state.completed_at.get_or_insert_with(Utc::now);
            at
        };
        info!(instance = %self.name, "quest area complete");
        let _ = self.events.send(ControllerEvent::InstanceComplete {
            instance_name: self.name.clone(),
            completed_at,
        });
    }

    /// Serves one cell of the bootstrap phase, if it is still running.
    fn bootstrap_task(&self) -> Option<Task> {
        let mut state = self.state.lock();
        if state.bootstrap.is_done() {
            return None;
        }
        let cell = state.bootstrap.next_cell()?;
        let center = self.scheme.cell_center(cell);
        let near = self
            .scheme
            .cells_near(&center, BOOTSTRAP_CLEAR_RADIUS_METERS);
        state.bootstrap.clear_cells(&near);
        if state.bootstrap.is_done() {
            info!(instance = %self.name, "bootstrap finished; quest rotation begins on next poll");
        }
        Some(Task::scan(
            TaskAction::Bootstrap,
            center,
            self.min_level,
            self.max_level,
        ))
    }
}

#[async_trait]
impl JobController for AutoQuestController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_task(&self, request: &TaskRequest) -> Option<Task> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        // Bootstrap phase runs to exhaustion before any quest work.
        if let Some(task) = self.bootstrap_task() {
            return Some(task);
        }

        {
            let state = self.state.lock();
            if state.all.is_empty() {
                return None;
            }
        }

        // Refill the day's pool if it drained. Only a storage-confirmed
        // empty pool may count toward completion; an outage is just "no
        // data this round".
        let today_empty = self.state.lock().today.is_empty();
        if today_empty {
            match self.refresh_today().await {
                Some(0) => {
                    self.completion_check();
                    return None;
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Account gate: an exhausted account must rotate, not spin.
        let mut last_encounter = None;
        if let Some(username) = &request.account_username {
            match self.accounts.get_account(username).await {
                Ok(Some(account)) => {
                    if account.spins >= self.spin_limit {
                        info!(
                            instance = %self.name,
                            account = %username,
                            spins = account.spins,
                            "spin limit reached; requesting account switch"
                        );
                        return Some(Task::switch_account(self.min_level, self.max_level));
                    }
                    last_encounter = account.last_encounter;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(instance = %self.name, error = %err, "account lookup failed");
                    return None;
                }
            }
        }

        // Select the nearest pending point and sweep its neighbourhood.
        // Selection and removal are one atomic step under the state lock,
        // so two polls never receive the same point.
        let (point, drained) = {
            let mut state = self.state.lock();
            if state.today.is_empty() {
                return None;
            }
            let idx = match &last_encounter {
                Some((loc, _)) => {
                    let mut best = 0usize;
                    let mut best_dist = f64::MAX;
                    for (i, p) in state.today.iter().enumerate() {
                        let d = coord::planar_distance(loc, &p.coord);
                        if d < best_dist {
                            best_dist = d;
                            best = i;
                        }
                    }
                    best
                }
                None => 0,
            };
            let point = state.today.swap_remove(idx);
            state
                .today
                .retain(|p| coord::haversine_meters(&p.coord, &point.coord) > QUEST_PROXIMITY_METERS);
            *state.retries.entry(point.id.clone()).or_default() += 1;
            let drained = state.today.is_empty();
            (point, drained)
        };

        let now = Utc::now();
        let encounter_at = coord::estimated_encounter_time(last_encounter, &point.coord, now);
        if let Some(username) = &request.account_username {
            if let Err(err) = self.accounts.record_spin(username).await {
                warn!(instance = %self.name, error = %err, "spin recording failed");
            }
            if let Err(err) = self
                .accounts
                .set_last_encounter(username, point.coord, encounter_at)
                .await
            {
                warn!(instance = %self.name, error = %err, "encounter update failed");
            }
        }
        let delay = (encounter_at - now).num_seconds().max(0) as u64;

        // Eager refill so the next poll does not stall on an empty pool.
        if drained {
            self.refresh_today().await;
        }

        debug!(
            instance = %self.name,
            point = %point.id,
            target = %point.coord,
            delay,
            "dispatching quest scan"
        );
        Some(
            Task::scan(TaskAction::ScanQuest, point.coord, self.min_level, self.max_level)
                .with_delay(delay),
        )
    }

    async fn status(&self) -> String {
        let (ids, all_count, today_count) = {
            let state = self.state.lock();
            if !state.bootstrap.is_done() {
                return state.bootstrap.status_line();
            }
            (
                state.all.iter().map(|p| p.id.clone()).collect::<Vec<_>>(),
                state.all.len(),
                state.today.len(),
            )
        };
        if all_count == 0 {
            return "Quests: no points".to_string();
        }
        let memory_pct = (all_count - today_count) as f64 / all_count as f64 * 100.0;

        // The in-memory and storage views diverge while scan results are
        // still being written back, so report both.
        match self.map_data.pokestops_by_ids(&ids).await {
            Ok(stops) => {
                let scanned = stops.iter().filter(|s| s.has_quest).count();
                let storage_pct = scanned as f64 / all_count as f64 * 100.0;
                format!(
                    "Quests: memory {:.1}%, storage {:.1}%",
                    memory_pct, storage_pct
                )
            }
            Err(_) => format!("Quests: memory {:.1}%, storage n/a", memory_pct),
        }
    }

    async fn reload(&self) {
        info!(instance = %self.name, "reloading quest rotation");
        self.init().await;
    }

    fn stop(&self) {
        self.shutdown.cancel();
    }
}
