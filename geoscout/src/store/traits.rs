//! Collaborator store contracts.
//!
//! The scheduler core consumes these narrow async contracts; concrete
//! persistence lives outside the crate. All methods are fallible: a
//! transient failure is reported as [`StoreError`] and controllers treat
//! it as "no data this round" rather than crashing.

use crate::coord::Coordinate;
use crate::geofence::{BoundingBox, CellId};
use crate::store::models::{Account, Cell, Pokestop, Spawnpoint};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from collaborator stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The named entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Account state reads and the two scheduler-side writes.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Looks up an account by username.
    async fn get_account(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Records one spin against the account's cumulative count.
    async fn record_spin(&self, username: &str) -> Result<(), StoreError>;

    /// Updates the account's last-known encounter location and time.
    async fn set_last_encounter(
        &self,
        username: &str,
        coord: Coordinate,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Map-data reads the controllers schedule against.
#[async_trait]
pub trait MapDataStore: Send + Sync + 'static {
    /// Fetches pokestops by id; unknown ids are silently absent.
    async fn pokestops_by_ids(&self, ids: &[String]) -> Result<Vec<Pokestop>, StoreError>;

    /// All pokestops inside a bounding box.
    async fn pokestops_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<Pokestop>, StoreError>;

    /// Fetches known (already-scanned) cells by id.
    async fn cells_by_ids(&self, ids: &[CellId]) -> Result<Vec<Cell>, StoreError>;

    /// All known cells inside a bounding box.
    async fn cells_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<Cell>, StoreError>;

    /// Clears today's quest results on the given pokestops.
    async fn clear_quests(&self, ids: &[String]) -> Result<(), StoreError>;

    /// All spawnpoints inside a bounding box.
    async fn spawnpoints_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<Spawnpoint>, StoreError>;
}

/// Consumer of cross-instance scheduling events.
///
/// Chained-instance handoff and device auto-assignment live outside the
/// core; the dispatcher only notifies.
#[async_trait]
pub trait AssignmentSink: Send + Sync + 'static {
    /// An instance's work area is exhausted.
    async fn instance_complete(&self, instance_name: &str);

    /// A device was re-pointed at an instance (bootstrap handoff).
    async fn device_assigned(&self, device_uuid: &str, instance_name: &str);

    /// The device registry changed (add/remove/rename).
    async fn devices_changed(&self);
}

/// Sink that ignores every notification.
#[derive(Debug, Default, Clone)]
pub struct NullAssignmentSink;

#[async_trait]
impl AssignmentSink for NullAssignmentSink {
    async fn instance_complete(&self, _instance_name: &str) {}
    async fn device_assigned(&self, _device_uuid: &str, _instance_name: &str) {}
    async fn devices_changed(&self) {}
}
