//! Data models read and written through the collaborator stores.
//!
//! Only the fields the scheduler touches are modelled; persistence
//! schemas beyond these are out of scope.

use crate::coord::Coordinate;
use crate::geofence::CellId;
use chrono::{DateTime, Utc};

/// A game account with the state scheduling decisions depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub username: String,
    pub level: u8,
    /// Cumulative pokestop-visit count.
    pub spins: u32,
    /// Last known encounter location and time, if any.
    pub last_encounter: Option<(Coordinate, DateTime<Utc>)>,
    /// Warning marker set by the ingestion side.
    pub has_warning: bool,
    /// Ban marker set by the ingestion side.
    pub is_banned: bool,
}

impl Account {
    pub fn new(username: impl Into<String>, level: u8) -> Self {
        Self {
            username: username.into(),
            level,
            spins: 0,
            last_encounter: None,
            has_warning: false,
            is_banned: false,
        }
    }
}

/// A point of interest that can hold a daily quest result.
#[derive(Debug, Clone, PartialEq)]
pub struct Pokestop {
    pub id: String,
    pub coord: Coordinate,
    pub enabled: bool,
    /// Whether today's quest result has already been scanned in.
    pub has_quest: bool,
}

impl Pokestop {
    pub fn new(id: impl Into<String>, coord: Coordinate) -> Self {
        Self {
            id: id.into(),
            coord,
            enabled: true,
            has_quest: false,
        }
    }
}

/// A spawnpoint whose despawn timer may still be unconfirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Spawnpoint {
    pub id: u64,
    pub coord: Coordinate,
    /// Whether the despawn timer has been confirmed.
    pub has_tth: bool,
}

impl Spawnpoint {
    pub fn new(id: u64, coord: Coordinate) -> Self {
        Self {
            id,
            coord,
            has_tth: false,
        }
    }
}

/// A scanned spatial cell known to storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub id: CellId,
    pub center: Coordinate,
}
