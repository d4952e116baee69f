//! Job controllers - per-instance task state machines
//!
//! Every live instance is served by exactly one controller implementing
//! [`JobController`]. The dispatcher routes each device poll to the
//! controller registered under the device's assigned instance name; the
//! controller consults its private pending-work state and answers with a
//! task or nothing.
//!
//! Controllers never call upward into the dispatcher. Cross-instance
//! effects (area exhausted, bootstrap handoff) travel as
//! [`ControllerEvent`]s over a channel the dispatcher owns.
//!
//! # Variants
//!
//! - [`AutoQuestController`] - daily quest rotation with a bootstrap phase
//! - [`BootstrapController`] - one-time spatial sweep of a new area
//! - [`TthFinderController`] - linear sweep over unconfirmed spawnpoints
//! - [`CircleController`] - cursor over a fixed or generated route
//!   (pokemon/raid/IV/leveling circling, dynamic routes)

mod auto_quest;
mod bootstrap;
mod circle;
mod midnight;
mod tth_finder;

pub use auto_quest::{AutoQuestController, QUEST_PROXIMITY_METERS};
pub use bootstrap::{BootstrapController, BOOTSTRAP_CLEAR_RADIUS_METERS};
pub use circle::{CircleController, CircleKind, RouteSource};
pub use midnight::seconds_until_local_midnight;
pub use tth_finder::TthFinderController;

use crate::task::{Task, TaskRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Capability contract shared by all controller variants.
///
/// `get_task` must never fault: every path terminates in `Some(task)` or
/// `None`, and a stopped controller answers `None`. The dispatcher
/// additionally unregisters a controller before stopping it, so polls
/// stop routing to it at all.
#[async_trait]
pub trait JobController: Send + Sync + 'static {
    /// The instance name this controller serves.
    fn name(&self) -> &str;

    /// Returns the next task for the polling device, or `None` when the
    /// area has nothing to hand out this round.
    async fn get_task(&self, request: &TaskRequest) -> Option<Task>;

    /// Human-readable progress line.
    async fn status(&self) -> String;

    /// Rebuilds pending-work state from current configuration and map
    /// data without destroying the controller identity.
    async fn reload(&self);

    /// Marks the controller inactive and halts its timers. Cooperative:
    /// an in-flight `get_task` may still complete.
    fn stop(&self);
}

/// Events a controller raises toward the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The instance's work area is exhausted for this cycle.
    InstanceComplete {
        instance_name: String,
        completed_at: DateTime<Utc>,
    },
    /// A device finished an area's bootstrap sweep and moves on.
    BootstrapComplete {
        device_uuid: String,
        next_instance: String,
    },
}

/// Channel half handed to every controller at construction.
pub type EventSender = mpsc::UnboundedSender<ControllerEvent>;

/// Creates a controller event channel.
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<ControllerEvent>) {
    mpsc::unbounded_channel()
}
