//! The device-facing task shape.
//!
//! A task is the unit of work returned to a polling device. It is
//! transient: recomputed on every poll, never persisted. The shape
//! (action kind, coordinate, level bounds, delay) is the authoritative
//! protocol surface of the core.

use crate::coord::Coordinate;
use serde::{Deserialize, Serialize};

/// What the device should do at the target coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    ScanPokemon,
    ScanRaid,
    ScanQuest,
    ScanIv,
    Leveling,
    Bootstrap,
    /// The bound account is exhausted; the device must rotate accounts
    /// before asking again.
    SwitchAccount,
}

/// A work order returned to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub action: TaskAction,
    /// Target coordinate; absent for account rotation.
    pub coord: Option<Coordinate>,
    pub min_level: u8,
    pub max_level: u8,
    /// Seconds the device should wait before acting, to respect
    /// per-account cooldowns. Zero means act immediately.
    #[serde(default)]
    pub delay: u64,
}

impl Task {
    /// A scan task at a coordinate.
    pub fn scan(action: TaskAction, coord: Coordinate, min_level: u8, max_level: u8) -> Self {
        Self {
            action,
            coord: Some(coord),
            min_level,
            max_level,
            delay: 0,
        }
    }

    /// An account-rotation task.
    pub fn switch_account(min_level: u8, max_level: u8) -> Self {
        Self {
            action: TaskAction::SwitchAccount,
            coord: None,
            min_level,
            max_level,
            delay: 0,
        }
    }

    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }
}

/// A device's poll for work.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub device_uuid: String,
    /// The account currently bound to the device, if any.
    pub account_username: Option<String>,
    /// True on the device's first poll after (re)starting.
    pub is_startup: bool,
}

impl TaskRequest {
    pub fn new(device_uuid: impl Into<String>) -> Self {
        Self {
            device_uuid: device_uuid.into(),
            account_username: None,
            is_startup: false,
        }
    }

    pub fn with_account(mut self, username: impl Into<String>) -> Self {
        self.account_username = Some(username.into());
        self
    }

    pub fn startup(mut self) -> Self {
        self.is_startup = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_task_shape() {
        let task = Task::scan(TaskAction::ScanQuest, Coordinate::new(0.5, 0.5), 1, 40).with_delay(30);
        assert_eq!(task.action, TaskAction::ScanQuest);
        assert_eq!(task.coord, Some(Coordinate::new(0.5, 0.5)));
        assert_eq!(task.min_level, 1);
        assert_eq!(task.max_level, 40);
        assert_eq!(task.delay, 30);
    }

    #[test]
    fn test_switch_account_has_no_coordinate() {
        let task = Task::switch_account(1, 40);
        assert_eq!(task.action, TaskAction::SwitchAccount);
        assert!(task.coord.is_none());
        assert_eq!(task.delay, 0);
    }

    #[test]
    fn test_task_serializes_action_snake_case() {
        let task = Task::scan(TaskAction::ScanPokemon, Coordinate::new(1.0, 2.0), 0, 50);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["action"], "scan_pokemon");
    }

    #[test]
    fn test_request_builder() {
        let req = TaskRequest::new("dev1").with_account("trainer1").startup();
        assert_eq!(req.device_uuid, "dev1");
        assert_eq!(req.account_username.as_deref(), Some("trainer1"));
        assert!(req.is_startup);
    }
}
