//! Route generation and optimization
//!
//! The generators produce candidate coordinate sequences for a geofenced
//! area; the optimizer reduces and orders them into a short traversal.

mod generator;
mod optimizer;

pub use generator::{bootstrap_route, poi_route, random_route};
pub use optimizer::{dedupe, nearest_neighbor_order, optimize, DEFAULT_DEDUPE_ATTEMPTS};
