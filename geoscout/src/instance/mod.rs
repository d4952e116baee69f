//! Instance configuration model
//!
//! An instance is a named, typed, geofenced unit of scheduling
//! configuration. Instances arrive as JSON documents; the dispatcher
//! resolves their area references and constructs the matching job
//! controller.

use crate::coord::Coordinate;
use crate::geofence::Polygon;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The enumerated instance types, each served by one controller variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceType {
    QuestRotation,
    Bootstrap,
    PokemonCircle,
    RaidCircle,
    SmartRaid,
    SpawnpointDiscovery,
    Leveling,
    DynamicRoute,
    IvScan,
    Custom,
}

/// Reference to a work area: either a named geofence resolved by the
/// dispatcher, or an inline vertex ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AreaRef {
    Named(String),
    Inline(Vec<Coordinate>),
}

/// Type-specific instance settings. All fields are optional in the
/// source document and fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceData {
    /// Minimum account level a task from this instance requires.
    pub min_level: u8,
    /// Maximum account level a task from this instance accepts.
    pub max_level: u8,
    /// UTC offset in seconds for the instance's local midnight.
    pub timezone_offset: i32,
    /// Spin count at which an account must be rotated out.
    pub spin_limit: u32,
    /// Per-point retry ceiling for quest rotation.
    pub quest_retry_limit: u8,
    /// Scan circle radius in metres, also the route spacing.
    pub circle_size: f64,
    /// Account group tag; accounts outside the group are not bound here.
    pub account_group: Option<String>,
    /// Pokemon ids an IV-scan instance watches for.
    pub iv_list: Vec<u16>,
    /// Explicit route for circle instances; generated when absent.
    pub route: Option<Vec<Coordinate>>,
    /// Instance a device moves to once this one's bootstrap finishes.
    pub on_complete_instance: Option<String>,
}

impl Default for InstanceData {
    fn default() -> Self {
        Self {
            min_level: 0,
            max_level: 50,
            timezone_offset: 0,
            spin_limit: 3500,
            quest_retry_limit: 5,
            circle_size: 70.0,
            account_group: None,
            iv_list: Vec::new(),
            route: None,
            on_complete_instance: None,
        }
    }
}

/// A named, typed, geofenced work assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Unique name; the join key between device assignment and
    /// controller lookup.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    /// Work area references, resolved when the instance starts.
    pub areas: Vec<AreaRef>,
    #[serde(default)]
    pub data: InstanceData,
}

impl InstanceConfig {
    pub fn new(name: impl Into<String>, kind: InstanceType, areas: Vec<AreaRef>) -> Self {
        Self {
            name: name.into(),
            kind,
            areas,
            data: InstanceData::default(),
        }
    }

    pub fn with_data(mut self, data: InstanceData) -> Self {
        self.data = data;
        self
    }

    /// Parses an instance document.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Validates type-specific requirements that serde cannot express.
    pub fn validate(&self) -> Result<(), InstanceError> {
        if self.areas.is_empty() {
            return Err(InstanceError::NoArea(self.name.clone()));
        }
        if self.kind == InstanceType::IvScan && self.data.iv_list.is_empty() {
            return Err(InstanceError::MissingIvList(self.name.clone()));
        }
        Ok(())
    }
}

/// Configuration errors that keep an instance inert.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InstanceError {
    #[error("instance {0} has no work area")]
    NoArea(String),
    #[error("instance {0} references unknown geofence {1}")]
    UnresolvedGeofence(String, String),
    #[error("instance {0} resolves to an empty polygon set")]
    EmptyPolygons(String),
    #[error("iv_scan instance {0} has no IV list")]
    MissingIvList(String),
}

/// Resolves an inline area reference into a polygon, if well-formed.
pub fn inline_polygon(area: &AreaRef) -> Option<Polygon> {
    match area {
        AreaRef::Inline(ring) => Polygon::new(ring.clone()),
        AreaRef::Named(_) => None,
    }
}
