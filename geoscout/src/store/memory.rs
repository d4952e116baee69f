//! In-memory reference implementations of the store contracts.
//!
//! These back the test suites and small single-process deployments.
//! Every operation can be switched to fail via [`MemoryMapStore::set_unavailable`]
//! to exercise the transient-failure paths.

use crate::coord::Coordinate;
use crate::geofence::{BoundingBox, CellId};
use crate::store::models::{Account, Cell, Pokestop, Spawnpoint};
use crate::store::traits::{AccountStore, AssignmentSink, MapDataStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory account store.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an account.
    pub fn seed_account(&self, account: Account) {
        self.accounts
            .lock()
            .insert(account.username.clone(), account);
    }

    /// Snapshot of an account for assertions.
    pub fn account(&self, username: &str) -> Option<Account> {
        self.accounts.lock().get(username).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_account(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.lock().get(username).cloned())
    }

    async fn record_spin(&self, username: &str) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        account.spins += 1;
        Ok(())
    }

    async fn set_last_encounter(
        &self,
        username: &str,
        coord: Coordinate,
        time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        account.last_encounter = Some((coord, time));
        Ok(())
    }
}

/// In-memory map-data store.
#[derive(Debug, Default)]
pub struct MemoryMapStore {
    pokestops: Mutex<HashMap<String, Pokestop>>,
    cells: Mutex<HashMap<CellId, Cell>>,
    spawnpoints: Mutex<HashMap<u64, Spawnpoint>>,
    unavailable: AtomicBool,
}

impl MemoryMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_pokestop(&self, stop: Pokestop) {
        self.pokestops.lock().insert(stop.id.clone(), stop);
    }

    pub fn seed_cell(&self, cell: Cell) {
        self.cells.lock().insert(cell.id, cell);
    }

    pub fn seed_spawnpoint(&self, sp: Spawnpoint) {
        self.spawnpoints.lock().insert(sp.id, sp);
    }

    /// Marks a pokestop's quest as scanned (or clears it).
    pub fn set_quest_found(&self, id: &str, found: bool) {
        if let Some(stop) = self.pokestops.lock().get_mut(id) {
            stop.has_quest = found;
        }
    }

    /// Simulates a storage outage; all operations fail while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MapDataStore for MemoryMapStore {
    async fn pokestops_by_ids(&self, ids: &[String]) -> Result<Vec<Pokestop>, StoreError> {
        self.check_available()?;
        let stops = self.pokestops.lock();
        Ok(ids.iter().filter_map(|id| stops.get(id).cloned()).collect())
    }

    async fn pokestops_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<Pokestop>, StoreError> {
        self.check_available()?;
        Ok(self
            .pokestops
            .lock()
            .values()
            .filter(|s| bbox.contains(&s.coord))
            .cloned()
            .collect())
    }

    async fn cells_by_ids(&self, ids: &[CellId]) -> Result<Vec<Cell>, StoreError> {
        self.check_available()?;
        let cells = self.cells.lock();
        Ok(ids.iter().filter_map(|id| cells.get(id).copied()).collect())
    }

    async fn cells_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<Cell>, StoreError> {
        self.check_available()?;
        Ok(self
            .cells
            .lock()
            .values()
            .filter(|c| bbox.contains(&c.center))
            .copied()
            .collect())
    }

    async fn clear_quests(&self, ids: &[String]) -> Result<(), StoreError> {
        self.check_available()?;
        let mut stops = self.pokestops.lock();
        for id in ids {
            if let Some(stop) = stops.get_mut(id) {
                stop.has_quest = false;
            }
        }
        Ok(())
    }

    async fn spawnpoints_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<Spawnpoint>, StoreError> {
        self.check_available()?;
        Ok(self
            .spawnpoints
            .lock()
            .values()
            .filter(|s| bbox.contains(&s.coord))
            .cloned()
            .collect())
    }
}

/// Assignment sink that records every notification, for assertions.
#[derive(Debug, Default)]
pub struct RecordingAssignmentSink {
    completed: Mutex<Vec<String>>,
    assigned: Mutex<Vec<(String, String)>>,
    device_changes: Mutex<usize>,
}

impl RecordingAssignmentSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed_instances(&self) -> Vec<String> {
        self.completed.lock().clone()
    }

    pub fn assignments(&self) -> Vec<(String, String)> {
        self.assigned.lock().clone()
    }

    pub fn device_change_count(&self) -> usize {
        *self.device_changes.lock()
    }
}

#[async_trait]
impl AssignmentSink for RecordingAssignmentSink {
    async fn instance_complete(&self, instance_name: &str) {
        self.completed.lock().push(instance_name.to_string());
    }

    async fn device_assigned(&self, device_uuid: &str, instance_name: &str) {
        self.assigned
            .lock()
            .push((device_uuid.to_string(), instance_name.to_string()));
    }

    async fn devices_changed(&self) {
        *self.device_changes.lock() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_account_spin_and_encounter() {
        let store = MemoryAccountStore::new();
        store.seed_account(Account::new("trainer1", 32));

        store.record_spin("trainer1").await.unwrap();
        store.record_spin("trainer1").await.unwrap();
        let when = Utc::now();
        store
            .set_last_encounter("trainer1", Coordinate::new(40.0, -74.0), when)
            .await
            .unwrap();

        let account = store.get_account("trainer1").await.unwrap().unwrap();
        assert_eq!(account.spins, 2);
        assert_eq!(account.last_encounter, Some((Coordinate::new(40.0, -74.0), when)));
    }

    #[tokio::test]
    async fn test_account_spin_unknown_user() {
        let store = MemoryAccountStore::new();
        assert!(matches!(
            store.record_spin("ghost").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_map_store_bbox_queries() {
        let store = MemoryMapStore::new();
        store.seed_pokestop(Pokestop::new("a", Coordinate::new(40.0, -74.0)));
        store.seed_pokestop(Pokestop::new("b", Coordinate::new(50.0, -74.0)));
        store.seed_spawnpoint(Spawnpoint::new(1, Coordinate::new(40.0, -74.0)));

        let bbox = BoundingBox {
            min_lat: 39.0,
            max_lat: 41.0,
            min_lon: -75.0,
            max_lon: -73.0,
        };
        assert_eq!(store.pokestops_in_bbox(&bbox).await.unwrap().len(), 1);
        assert_eq!(store.spawnpoints_in_bbox(&bbox).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_map_store_clear_quests() {
        let store = MemoryMapStore::new();
        store.seed_pokestop(Pokestop::new("a", Coordinate::new(40.0, -74.0)));
        store.set_quest_found("a", true);

        store.clear_quests(&["a".to_string()]).await.unwrap();
        let stops = store.pokestops_by_ids(&["a".to_string()]).await.unwrap();
        assert!(!stops[0].has_quest);
    }

    #[tokio::test]
    async fn test_map_store_outage() {
        let store = MemoryMapStore::new();
        store.set_unavailable(true);
        let bbox = BoundingBox {
            min_lat: 0.0,
            max_lat: 1.0,
            min_lon: 0.0,
            max_lon: 1.0,
        };
        assert!(store.pokestops_in_bbox(&bbox).await.is_err());
        store.set_unavailable(false);
        assert!(store.pokestops_in_bbox(&bbox).await.is_ok());
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingAssignmentSink::new();
        sink.instance_complete("area-1").await;
        sink.device_assigned("dev1", "area-2").await;
        sink.devices_changed().await;
        assert_eq!(sink.completed_instances(), vec!["area-1"]);
        assert_eq!(sink.assignments(), vec![("dev1".into(), "area-2".into())]);
        assert_eq!(sink.device_change_count(), 1);
    }
}
