//! GeoScout - work dispatch for fleets of geographic scanning devices
//!
//! This library coordinates remote scanning clients ("devices") that move
//! through geofenced areas collecting map data. Devices poll for work; the
//! answer depends on the instance the device is assigned to, that instance's
//! type-specific controller, the pool of not-yet-completed work inside the
//! area, and per-account usage limits.
//!
//! # High-Level API
//!
//! The [`dispatcher`] module provides the top-level entry point:
//!
//! ```ignore
//! use geoscout::device::Device;
//! use geoscout::dispatcher::Dispatcher;
//!
//! let dispatcher = Dispatcher::new(accounts, map_data, assignments, scheme);
//! dispatcher.start(configs).await;
//!
//! dispatcher.add_device(Device::new("device-1")).await;
//! dispatcher.assign_device("device-1", "north-park").await;
//! let task = dispatcher.get_task("device-1").await;
//! ```

pub mod controller;
pub mod coord;
pub mod device;
pub mod dispatcher;
pub mod geofence;
pub mod instance;
pub mod logging;
pub mod route;
pub mod store;
pub mod task;

/// Version of the GeoScout library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
