//! The dispatcher - instance registry, device registry, and event loop.
//!
//! The dispatcher owns every live [`JobController`] and the device
//! records that route polls to them. It is the only component that
//! touches more than one instance at a time: controllers signal
//! cross-instance effects over the event channel and the dispatcher
//! applies them (device handoff, sink notification).
//!
//! Locking discipline: each registry has its own mutex, lock scopes are
//! short, and no lock is ever held across an await point.

use crate::controller::{
    event_channel, AutoQuestController, BootstrapController, CircleController, CircleKind,
    ControllerEvent, EventSender, JobController, RouteSource, TthFinderController,
};
use crate::device::Device;
use crate::geofence::{CellScheme, Geofence, Polygon};
use crate::instance::{inline_polygon, AreaRef, InstanceConfig, InstanceError, InstanceType};
use crate::store::{AccountStore, AssignmentSink, MapDataStore};
use crate::task::{Task, TaskRequest};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Central coordinator for instances and devices.
pub struct Dispatcher {
    controllers: Mutex<HashMap<String, Arc<dyn JobController>>>,
    devices: Mutex<HashMap<String, Device>>,
    geofences: Mutex<HashMap<String, Geofence>>,
    accounts: Arc<dyn AccountStore>,
    map_data: Arc<dyn MapDataStore>,
    assignments: Arc<dyn AssignmentSink>,
    scheme: Arc<dyn CellScheme>,
    events_tx: EventSender,
    events_rx: Mutex<Option<UnboundedReceiver<ControllerEvent>>>,
}

impl Dispatcher {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        map_data: Arc<dyn MapDataStore>,
        assignments: Arc<dyn AssignmentSink>,
        scheme: Arc<dyn CellScheme>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = event_channel();
        Arc::new(Self {
            controllers: Mutex::new(HashMap::new()),
            devices: Mutex::new(HashMap::new()),
            geofences: Mutex::new(HashMap::new()),
            accounts,
            map_data,
            assignments,
            scheme,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Registers a named geofence for instances to reference.
    pub fn register_geofence(&self, fence: Geofence) {
        self.geofences.lock().insert(fence.name.clone(), fence);
    }

    /// Starts every given instance concurrently and waits for all of
    /// them. Individual failures are logged, never fatal.
    pub async fn start(self: &Arc<Self>, configs: Vec<InstanceConfig>) {
        let mut set = JoinSet::new();
        for config in configs {
            let this = Arc::clone(self);
            set.spawn(async move { this.add_instance(config).await });
        }
        while set.join_next().await.is_some() {}
        info!(instances = self.controllers.lock().len(), "startup complete");
    }

    /// Starts one instance. A configuration or resolution failure leaves
    /// the registry untouched and is logged; polls for the instance
    /// simply find no controller.
    pub async fn add_instance(&self, config: InstanceConfig) {
        let name = config.name.clone();
        match self.build_controller(&config).await {
            Ok(Some(controller)) => {
                let attached = {
                    let devices = self.devices.lock();
                    devices
                        .values()
                        .filter(|d| d.instance_name.as_deref() == Some(name.as_str()))
                        .count()
                };
                info!(instance = %name, devices = attached, "instance started");
                self.controllers.lock().insert(name, controller);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(instance = %name, error = %err, "instance failed to start");
            }
        }
    }

    /// Replaces a running instance with a new configuration.
    ///
    /// The new controller is fully built before the swap, devices
    /// working `old_name` are re-pointed at the new name, and only then
    /// is the old controller stopped. A concurrent poll lands on either
    /// the old or the new controller, never in a gap.
    pub async fn reload_instance(&self, old_name: &str, config: InstanceConfig) {
        let new_name = config.name.clone();
        let controller = match self.build_controller(&config).await {
            Ok(Some(controller)) => controller,
            Ok(None) => return,
            Err(err) => {
                warn!(
                    instance = %new_name,
                    error = %err,
                    "reload failed; previous instance kept"
                );
                return;
            }
        };

        let replaced = {
            let mut controllers = self.controllers.lock();
            controllers.insert(new_name.clone(), controller)
        };
        {
            let mut devices = self.devices.lock();
            for device in devices.values_mut() {
                if device.instance_name.as_deref() == Some(old_name) {
                    device.instance_name = Some(new_name.clone());
                }
            }
        }
        let old = if old_name != new_name {
            self.controllers.lock().remove(old_name)
        } else {
            None
        };
        for stale in replaced.into_iter().chain(old) {
            stale.stop();
        }
        info!(from = %old_name, to = %new_name, "instance reloaded");
    }

    /// Stops and unregisters an instance, detaching its devices.
    pub async fn remove_instance(&self, name: &str) {
        let Some(controller) = self.controllers.lock().remove(name) else {
            return;
        };
        controller.stop();
        {
            let mut devices = self.devices.lock();
            for device in devices.values_mut() {
                if device.instance_name.as_deref() == Some(name) {
                    device.instance_name = None;
                }
            }
        }
        info!(instance = %name, "instance removed");
        self.assignments.devices_changed().await;
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.controllers.lock().keys().cloned().collect()
    }

    /// Progress line of a running instance.
    pub async fn instance_status(&self, name: &str) -> Option<String> {
        let controller = self.controllers.lock().get(name).cloned()?;
        Some(controller.status().await)
    }

    /// Rebuilds one instance's pending-work state in place.
    pub async fn refresh_instance(&self, name: &str) {
        let controller = self.controllers.lock().get(name).cloned();
        if let Some(controller) = controller {
            controller.reload().await;
        }
    }

    pub async fn add_device(&self, device: Device) {
        info!(device = %device.uuid, "device registered");
        self.devices.lock().insert(device.uuid.clone(), device);
        self.assignments.devices_changed().await;
    }

    pub async fn remove_device(&self, uuid: &str) {
        if self.devices.lock().remove(uuid).is_some() {
            info!(device = %uuid, "device removed");
            self.assignments.devices_changed().await;
        }
    }

    /// Renames a device in place, keeping its assignment and account.
    /// Used when a client re-registers under a fresh identifier.
    pub async fn reload_device(&self, old_uuid: &str, new_uuid: &str) {
        let renamed = {
            let mut devices = self.devices.lock();
            match devices.remove(old_uuid) {
                Some(mut device) => {
                    device.uuid = new_uuid.to_string();
                    devices.insert(new_uuid.to_string(), device);
                    true
                }
                None => false,
            }
        };
        if renamed {
            info!(from = %old_uuid, to = %new_uuid, "device renamed");
            self.assignments.devices_changed().await;
        } else {
            warn!(device = %old_uuid, "rename for unknown device ignored");
        }
    }

    /// Points a known device at an instance.
    pub async fn assign_device(&self, uuid: &str, instance_name: &str) {
        let updated = {
            let mut devices = self.devices.lock();
            match devices.get_mut(uuid) {
                Some(device) => {
                    device.instance_name = Some(instance_name.to_string());
                    true
                }
                None => false,
            }
        };
        if updated {
            info!(device = %uuid, instance = %instance_name, "device assigned");
            self.assignments.device_assigned(uuid, instance_name).await;
        } else {
            warn!(device = %uuid, "assignment for unknown device ignored");
        }
    }

    /// Binds the account a device polls with (rotation outcome).
    pub fn set_device_account(&self, uuid: &str, username: Option<String>) {
        let mut devices = self.devices.lock();
        if let Some(device) = devices.get_mut(uuid) {
            device.account_username = username;
        }
    }

    pub fn device(&self, uuid: &str) -> Option<Device> {
        self.devices.lock().get(uuid).cloned()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.devices.lock().values().cloned().collect()
    }

    /// The controller currently serving a device, if any.
    pub fn controller_for(&self, uuid: &str) -> Option<Arc<dyn JobController>> {
        let instance = {
            let devices = self.devices.lock();
            devices.get(uuid)?.instance_name.clone()?
        };
        self.controllers.lock().get(&instance).cloned()
    }

    /// Answers a device poll: routes to the controller serving the
    /// device's instance, or `None` when the device is unassigned or the
    /// instance is not running.
    pub async fn get_task(&self, uuid: &str) -> Option<Task> {
        let (request, controller) = {
            let devices = self.devices.lock();
            let device = devices.get(uuid)?;
            let instance = device.instance_name.clone()?;
            let controller = self.controllers.lock().get(&instance).cloned()?;
            let mut request = TaskRequest::new(uuid);
            request.account_username = device.account_username.clone();
            (request, controller)
        };
        controller.get_task(&request).await
    }

    /// Drains controller events until cancelled, applying each:
    /// completions go to the assignment sink, bootstrap handoffs
    /// re-point the finishing device.
    pub async fn run_events(&self, cancel: CancellationToken) {
        let Some(mut rx) = self.events_rx.lock().take() else {
            warn!("event loop is already running");
            return;
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        ControllerEvent::InstanceComplete { instance_name, completed_at } => {
                            info!(instance = %instance_name, at = %completed_at, "instance complete");
                            self.assignments.instance_complete(&instance_name).await;
                        }
                        ControllerEvent::BootstrapComplete { device_uuid, next_instance } => {
                            self.assign_device(&device_uuid, &next_instance).await;
                        }
                    }
                }
            }
        }
        debug!("event loop stopped");
    }

    /// Resolves area references into concrete polygons.
    fn resolve_polygons(&self, config: &InstanceConfig) -> Result<Vec<Polygon>, InstanceError> {
        let mut polygons = Vec::new();
        for area in &config.areas {
            match area {
                AreaRef::Named(fence_name) => {
                    let fences = self.geofences.lock();
                    match fences.get(fence_name) {
                        Some(fence) => polygons.extend(fence.polygons.iter().cloned()),
                        None => {
                            return Err(InstanceError::UnresolvedGeofence(
                                config.name.clone(),
                                fence_name.clone(),
                            ))
                        }
                    }
                }
                AreaRef::Inline(_) => {
                    if let Some(polygon) = inline_polygon(area) {
                        polygons.push(polygon);
                    }
                }
            }
        }
        if polygons.is_empty() {
            return Err(InstanceError::EmptyPolygons(config.name.clone()));
        }
        Ok(polygons)
    }

    /// Builds and initializes the controller for a configuration.
    /// `Ok(None)` means the type is deliberately not scheduled.
    async fn build_controller(
        &self,
        config: &InstanceConfig,
    ) -> Result<Option<Arc<dyn JobController>>, InstanceError> {
        config.validate()?;
        if config.kind == InstanceType::Custom {
            warn!(instance = %config.name, "custom instance types are not scheduled");
            return Ok(None);
        }
        let polygons = self.resolve_polygons(config)?;
        let data = &config.data;

        let controller: Arc<dyn JobController> = match config.kind {
            InstanceType::QuestRotation => {
                let ctrl = Arc::new(AutoQuestController::new(
                    config.name.clone(),
                    polygons,
                    data.min_level,
                    data.max_level,
                    data.spin_limit,
                    data.quest_retry_limit,
                    data.timezone_offset,
                    self.scheme.clone(),
                    self.map_data.clone(),
                    self.accounts.clone(),
                    self.events_tx.clone(),
                ));
                ctrl.init().await;
                ctrl.start_daily_reset();
                ctrl
            }
            InstanceType::Bootstrap => {
                let ctrl = Arc::new(BootstrapController::new(
                    config.name.clone(),
                    polygons,
                    data.min_level,
                    data.max_level,
                    data.on_complete_instance.clone(),
                    self.scheme.clone(),
                    self.map_data.clone(),
                    self.events_tx.clone(),
                ));
                ctrl.init().await;
                ctrl
            }
            InstanceType::SpawnpointDiscovery => {
                let ctrl = Arc::new(TthFinderController::new(
                    config.name.clone(),
                    polygons,
                    data.min_level,
                    data.max_level,
                    self.map_data.clone(),
                    self.events_tx.clone(),
                ));
                ctrl.init().await;
                ctrl
            }
            kind => {
                let circle_kind = match kind {
                    InstanceType::PokemonCircle => CircleKind::Pokemon,
                    InstanceType::RaidCircle => CircleKind::Raid,
                    InstanceType::SmartRaid => CircleKind::SmartRaid,
                    InstanceType::IvScan => CircleKind::Iv,
                    InstanceType::Leveling => CircleKind::Leveling,
                    // Remaining kinds are handled above.
                    _ => CircleKind::Dynamic,
                };
                let source = match &data.route {
                    Some(route) => RouteSource::Static(route.clone()),
                    None if kind == InstanceType::DynamicRoute => RouteSource::Poi {
                        polygons,
                        circle_size: data.circle_size,
                    },
                    None => RouteSource::Grid {
                        polygons,
                        circle_size: data.circle_size,
                    },
                };
                let ctrl = Arc::new(CircleController::new(
                    config.name.clone(),
                    circle_kind,
                    source,
                    data.min_level,
                    data.max_level,
                    self.map_data.clone(),
                ));
                ctrl.init().await;
                ctrl
            }
        };
        Ok(Some(controller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coordinate;
    use crate::geofence::GridCellScheme;
    use crate::instance::InstanceData;
    use crate::store::{
        MemoryAccountStore, MemoryMapStore, NullAssignmentSink, RecordingAssignmentSink,
    };
    use crate::task::TaskAction;

    fn dispatcher_with(sink: Arc<dyn AssignmentSink>) -> Arc<Dispatcher> {
        Dispatcher::new(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryMapStore::new()),
            sink,
            Arc::new(GridCellScheme::default()),
        )
    }

    fn static_circle(name: &str, route: Vec<Coordinate>) -> InstanceConfig {
        let mut data = InstanceData::default();
        data.route = Some(route);
        InstanceConfig::new(
            name,
            InstanceType::PokemonCircle,
            vec![AreaRef::Inline(vec![
                Coordinate::new(40.00, -74.00),
                Coordinate::new(40.00, -73.99),
                Coordinate::new(40.01, -73.99),
                Coordinate::new(40.01, -74.00),
            ])],
        )
        .with_data(data)
    }

    #[tokio::test]
    async fn test_poll_routes_through_assignment() {
        let dispatcher = dispatcher_with(Arc::new(NullAssignmentSink));
        let route = vec![Coordinate::new(40.005, -73.995)];
        dispatcher.add_instance(static_circle("plaza", route.clone())).await;

        // Unknown and unassigned devices get nothing.
        assert!(dispatcher.get_task("ghost").await.is_none());
        dispatcher.add_device(Device::new("dev1")).await;
        assert!(dispatcher.get_task("dev1").await.is_none());

        dispatcher.assign_device("dev1", "plaza").await;
        let task = dispatcher.get_task("dev1").await.unwrap();
        assert_eq!(task.action, TaskAction::ScanPokemon);
        assert_eq!(task.coord, Some(route[0]));
    }

    #[tokio::test]
    async fn test_unresolved_geofence_keeps_instance_out() {
        let dispatcher = dispatcher_with(Arc::new(NullAssignmentSink));
        let config = InstanceConfig::new(
            "lost",
            InstanceType::Bootstrap,
            vec![AreaRef::Named("nowhere".into())],
        );
        dispatcher.add_instance(config).await;
        assert!(dispatcher.instance_names().is_empty());
    }

    #[tokio::test]
    async fn test_named_geofence_resolution() {
        let dispatcher = dispatcher_with(Arc::new(NullAssignmentSink));
        let polygon = Polygon::new(vec![
            Coordinate::new(40.00, -74.00),
            Coordinate::new(40.00, -73.99),
            Coordinate::new(40.01, -73.99),
            Coordinate::new(40.01, -74.00),
        ])
        .unwrap();
        dispatcher.register_geofence(Geofence::new("downtown", vec![polygon]));

        let config = InstanceConfig::new(
            "harbor",
            InstanceType::Bootstrap,
            vec![AreaRef::Named("downtown".into())],
        );
        dispatcher.add_instance(config).await;
        assert_eq!(dispatcher.instance_names(), vec!["harbor".to_string()]);
        let status = dispatcher.instance_status("harbor").await.unwrap();
        assert!(status.starts_with("Bootstrapping"));
    }

    #[tokio::test]
    async fn test_custom_type_is_skipped() {
        let dispatcher = dispatcher_with(Arc::new(NullAssignmentSink));
        let config = InstanceConfig::new(
            "odd",
            InstanceType::Custom,
            vec![AreaRef::Named("anything".into())],
        );
        dispatcher.add_instance(config).await;
        assert!(dispatcher.instance_names().is_empty());
    }

    #[tokio::test]
    async fn test_reload_repoints_devices_without_a_gap() {
        let dispatcher = dispatcher_with(Arc::new(NullAssignmentSink));
        let old_route = vec![Coordinate::new(40.001, -73.999)];
        let new_route = vec![Coordinate::new(40.009, -73.991)];
        dispatcher.add_instance(static_circle("plaza", old_route)).await;
        dispatcher.add_device(Device::new("dev1")).await;
        dispatcher.assign_device("dev1", "plaza").await;

        dispatcher
            .reload_instance("plaza", static_circle("plaza-v2", new_route.clone()))
            .await;

        assert_eq!(dispatcher.instance_names(), vec!["plaza-v2".to_string()]);
        assert_eq!(
            dispatcher.device("dev1").unwrap().instance_name.as_deref(),
            Some("plaza-v2")
        );
        let task = dispatcher.get_task("dev1").await.unwrap();
        assert_eq!(task.coord, Some(new_route[0]));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_instance() {
        let dispatcher = dispatcher_with(Arc::new(NullAssignmentSink));
        let route = vec![Coordinate::new(40.001, -73.999)];
        dispatcher.add_instance(static_circle("plaza", route.clone())).await;
        dispatcher.add_device(Device::new("dev1")).await;
        dispatcher.assign_device("dev1", "plaza").await;

        let broken = InstanceConfig::new(
            "plaza-v2",
            InstanceType::Bootstrap,
            vec![AreaRef::Named("nowhere".into())],
        );
        dispatcher.reload_instance("plaza", broken).await;

        assert_eq!(dispatcher.instance_names(), vec!["plaza".to_string()]);
        let task = dispatcher.get_task("dev1").await.unwrap();
        assert_eq!(task.coord, Some(route[0]));
    }

    #[tokio::test]
    async fn test_remove_instance_detaches_devices() {
        let sink = Arc::new(RecordingAssignmentSink::new());
        let dispatcher = dispatcher_with(sink.clone());
        dispatcher
            .add_instance(static_circle("plaza", vec![Coordinate::new(40.0, -74.0)]))
            .await;
        dispatcher.add_device(Device::new("dev1")).await;
        dispatcher.assign_device("dev1", "plaza").await;

        let changes_before = sink.device_change_count();
        dispatcher.remove_instance("plaza").await;

        assert!(dispatcher.instance_names().is_empty());
        assert!(dispatcher.device("dev1").unwrap().instance_name.is_none());
        assert!(dispatcher.get_task("dev1").await.is_none());
        assert_eq!(sink.device_change_count(), changes_before + 1);
    }

    #[tokio::test]
    async fn test_device_rename_keeps_assignment() {
        let sink = Arc::new(RecordingAssignmentSink::new());
        let dispatcher = dispatcher_with(sink.clone());
        let route = vec![Coordinate::new(40.001, -73.999)];
        dispatcher.add_instance(static_circle("plaza", route.clone())).await;
        dispatcher.add_device(Device::new("dev1")).await;
        dispatcher.assign_device("dev1", "plaza").await;

        let changes_before = sink.device_change_count();
        dispatcher.reload_device("dev1", "dev1-reborn").await;

        assert!(dispatcher.device("dev1").is_none());
        let device = dispatcher.device("dev1-reborn").unwrap();
        assert_eq!(device.uuid, "dev1-reborn");
        assert_eq!(device.instance_name.as_deref(), Some("plaza"));
        assert_eq!(sink.device_change_count(), changes_before + 1);

        let controller = dispatcher.controller_for("dev1-reborn").unwrap();
        assert_eq!(controller.name(), "plaza");
        let task = dispatcher.get_task("dev1-reborn").await.unwrap();
        assert_eq!(task.coord, Some(route[0]));

        // Renaming an unknown device is a no-op.
        dispatcher.reload_device("ghost", "ghost-2").await;
        assert!(dispatcher.device("ghost-2").is_none());
    }

    #[tokio::test]
    async fn test_parallel_startup_registers_all() {
        let dispatcher = dispatcher_with(Arc::new(NullAssignmentSink));
        let configs = (0..4)
            .map(|i| {
                static_circle(
                    &format!("plaza-{i}"),
                    vec![Coordinate::new(40.0, -74.0)],
                )
            })
            .collect();
        dispatcher.start(configs).await;

        let mut names = dispatcher.instance_names();
        names.sort();
        assert_eq!(names, vec!["plaza-0", "plaza-1", "plaza-2", "plaza-3"]);
    }
}
