//! Collaborator store contracts and in-memory reference implementations
//!
//! Persistence proper is out of scope for the scheduling core; these
//! traits are the narrow seams it reads and writes through.

mod memory;
mod models;
mod traits;

pub use memory::{MemoryAccountStore, MemoryMapStore, RecordingAssignmentSink};
pub use models::{Account, Cell, Pokestop, Spawnpoint};
pub use traits::{AccountStore, AssignmentSink, MapDataStore, NullAssignmentSink, StoreError};
