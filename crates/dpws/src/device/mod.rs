// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device hosting: the entity that owns bindings, discovery data, and
//! the announcement lifecycle.

pub mod service;

pub use service::HostedService;

use std::sync::{Arc, Weak};
use std::thread;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::announce::{
    AnnouncementDispatcher, DiscoveryData, DiscoveryDataHandle, PendingAnnouncements,
    QualifiedType, SequenceCounter, UpdateCoalescer,
};
use crate::announce::coalescer::{CommitSink, ExclusiveGuard};
use crate::binding::{
    AutoBindingEngine, AutoBindingEntry, AutoBindingPolicy, BindingEventSink, BindingKey,
    BindingRegistry, CommunicationBinding, DiscoveryBinding, ObserverId, OutgoingDiscoveryInfo,
    RegistryObserver,
};
use crate::comm::CommunicationManager;
use crate::config::HostingConfig;
use crate::net::{MonitorPump, NetworkEvent, NetworkEventSink, NetworkMonitor, SystemMonitor};
use crate::{Error, Result};

/// Explicit context handed to a device at construction: the transport
/// collaborator and configuration. No global registries.
pub struct HostingContext {
    /// Transport layer.
    pub comm: Arc<dyn CommunicationManager>,

    /// Configuration.
    pub config: HostingConfig,
}

impl HostingContext {
    /// Create a context.
    pub fn new(comm: Arc<dyn CommunicationManager>, config: HostingConfig) -> Self {
        Self { comm, config }
    }
}

struct DeviceState {
    registry: BindingRegistry,
    data: DiscoveryDataHandle,
    /// Manually added transport addresses, announced alongside the ones
    /// derived from the current bindings.
    static_xaddrs: Vec<String>,
    services: Vec<(Arc<HostedService>, ObserverId)>,
    running: bool,
    pump: Option<MonitorPump>,
}

impl DeviceState {
    /// Recompute the announced transport address set from the static
    /// list plus the usable bindings.
    fn refresh_xaddrs(&mut self) {
        let mut xaddrs = self.static_xaddrs.clone();
        for binding in self.registry.communication_bindings() {
            xaddrs.push(binding.xaddr());
        }
        xaddrs.sort();
        xaddrs.dedup();
        if self.data.snapshot().xaddrs != xaddrs {
            self.data.make_mut().xaddrs = xaddrs;
        }
    }
}

struct DeviceShared {
    ctx: HostingContext,
    coalescer: UpdateCoalescer,
    dispatcher: AnnouncementDispatcher,
    state: Mutex<DeviceState>,
}

impl DeviceShared {
    /// Run a mutation under the exclusive lock, folding its announcement
    /// consequences into the current batch. The state mutex is dropped
    /// before the exclusive guard, so the commit never runs under it.
    fn with_batch<R>(&self, f: impl FnOnce(&mut DeviceState, &mut PendingAnnouncements) -> R) -> R {
        let _guard = self.coalescer.exclusive_lock();
        let mut batch = PendingAnnouncements::default();
        let result = {
            let mut state = self.state.lock();
            state.registry.notify_batch_start();
            let result = f(&mut state, &mut batch);
            state.registry.notify_batch_end();
            result
        };
        self.coalescer.note_batch(batch);
        result
    }

    /// Commit a completed batch: Bye to removed targets, then either a
    /// full Hello (something changed) or a targeted Hello to just the
    /// newly added infos. Announcement I/O runs outside the state mutex.
    fn commit(&self, batch: PendingAnnouncements) {
        let (bye_snapshot, hello) = {
            let mut state = self.state.lock();
            if !state.running {
                log::debug!("[Device] batch committed while stopped; no announcements");
                return;
            }
            let bye_snapshot = if batch.removed_infos.is_empty() {
                None
            } else {
                Some(state.data.snapshot())
            };
            let hello = if batch.changed {
                state.refresh_xaddrs();
                match batch.metadata_version_override {
                    Some(version) => state.data.set_version(version),
                    None => {
                        state.data.bump_version();
                    }
                }
                state.data.commit();
                Some((
                    state.data.snapshot(),
                    state.registry.usable_outgoing_infos(),
                ))
            } else if !batch.added_infos.is_empty() {
                Some((
                    state.data.snapshot(),
                    state.registry.outgoing_infos_by_key(&batch.added_infos),
                ))
            } else {
                None
            };
            (bye_snapshot, hello)
        };

        if let Some(snapshot) = bye_snapshot {
            self.dispatcher.announce_bye(snapshot, &batch.removed_infos);
        }
        if let Some((snapshot, targets)) = hello {
            self.dispatcher.announce_hello(snapshot, &targets);
        }
    }
}

struct DeviceCommit {
    shared: Weak<DeviceShared>,
}

impl CommitSink for DeviceCommit {
    fn commit(&self, batch: PendingAnnouncements) {
        if let Some(shared) = self.shared.upgrade() {
            shared.commit(batch);
        }
    }
}

/// Which registry partition an auto-binding engine feeds.
#[derive(Clone, Copy)]
enum EngineRole {
    /// Transport bindings, with discovery/outgoing expansion.
    Communication,
    /// Inbound discovery bindings plus outgoing infos.
    Discovery,
}

/// Bridges engine notifications into registry mutations. Runs on the
/// monitor pump thread; each callback is its own coalescer batch.
struct EngineTap {
    shared: Weak<DeviceShared>,
    role: EngineRole,
}

impl BindingEventSink for EngineTap {
    fn binding_available(&self, binding: &CommunicationBinding) {
        if !matches!(self.role, EngineRole::Communication) {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.with_batch(|state, batch| {
            if let Err(e) = state.registry.add_binding(binding.clone(), true, true, batch) {
                log::warn!("[Device] auto binding not added: {}", e);
            }
        });
    }

    fn binding_destroyed(&self, key: &BindingKey) {
        if !matches!(self.role, EngineRole::Communication) {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.with_batch(|state, batch| {
            state.registry.remove_binding(key, batch);
        });
    }

    fn discovery_binding_available(&self, binding: &DiscoveryBinding) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.with_batch(|state, batch| {
            if let Err(e) = state.registry.add_discovery_binding(binding.clone(), batch) {
                log::debug!("[Device] auto discovery binding not added: {}", e);
            }
        });
    }

    fn discovery_binding_destroyed(&self, key: &BindingKey) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.with_batch(|state, _batch| {
            state.registry.remove_discovery_binding(key);
        });
    }

    fn outgoing_info_available(&self, info: &OutgoingDiscoveryInfo) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.with_batch(|state, batch| {
            if let Err(e) = state.registry.add_outgoing_info(info.clone(), batch) {
                log::debug!("[Device] auto outgoing info not added: {}", e);
            }
        });
    }

    fn outgoing_info_destroyed(&self, key: &BindingKey) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        shared.with_batch(|state, batch| {
            state.registry.remove_outgoing_info(key, batch);
        });
    }
}

/// Delivers monitor events to every attached engine.
struct EngineFanout {
    engines: Vec<Arc<AutoBindingEngine>>,
}

impl NetworkEventSink for EngineFanout {
    fn handle_event(&self, event: NetworkEvent) {
        for engine in &self.engines {
            engine.handle_event(event.clone());
        }
    }
}

/// A hosted device: owns a binding registry, discovery data, and the
/// announcement machinery, and reacts to network changes while running.
pub struct Device {
    shared: Arc<DeviceShared>,
    uuid: Uuid,
}

impl Device {
    /// Create a stopped device with a fresh endpoint reference.
    pub fn new(ctx: HostingContext) -> Self {
        let uuid = Uuid::new_v4();
        let sequence = Arc::new(SequenceCounter::new());
        let dispatcher = AnnouncementDispatcher::new(
            Arc::clone(&ctx.comm),
            sequence,
            ctx.config.max_hello_types,
        );
        let registry = BindingRegistry::new(Arc::clone(&ctx.comm));
        let data = DiscoveryData {
            endpoint_reference: format!("urn:uuid:{}", uuid),
            metadata_version: 1,
            ..DiscoveryData::default()
        };

        let shared = Arc::new(DeviceShared {
            ctx,
            coalescer: UpdateCoalescer::new(),
            dispatcher,
            state: Mutex::new(DeviceState {
                registry,
                data: DiscoveryDataHandle::new(data),
                static_xaddrs: Vec::new(),
                services: Vec::new(),
                running: false,
                pump: None,
            }),
        });
        shared.coalescer.set_commit_sink(Arc::new(DeviceCommit {
            shared: Arc::downgrade(&shared),
        }));

        Self { shared, uuid }
    }

    /// Device uuid.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Endpoint reference (urn:uuid form).
    pub fn endpoint_reference(&self) -> String {
        format!("urn:uuid:{}", self.uuid)
    }

    /// Whether the device is currently running.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Whether any communication binding exists.
    pub fn has_communication_bindings(&self) -> bool {
        self.shared.state.lock().registry.has_communication_bindings()
    }

    /// Snapshot of the current discovery data.
    pub fn discovery_data(&self) -> Arc<DiscoveryData> {
        self.shared.state.lock().data.snapshot()
    }

    /// Snapshot of usable communication bindings.
    pub fn communication_bindings(&self) -> Vec<CommunicationBinding> {
        self.shared.state.lock().registry.communication_bindings()
    }

    /// Hold the update lock across several mutations so they coalesce
    /// into one announcement. Dropping the guard commits the batch.
    pub fn begin_update(&self) -> ExclusiveGuard<'_> {
        self.shared.coalescer.exclusive_lock()
    }

    /// Announce an additional type.
    pub fn add_type(&self, qualified_type: QualifiedType) {
        self.shared.with_batch(|state, batch| {
            state.data.make_mut().types.push(qualified_type);
            batch.changed = true;
        });
    }

    /// Replace the announced type list.
    pub fn set_types(&self, types: Vec<QualifiedType>) {
        self.shared.with_batch(|state, batch| {
            state.data.make_mut().types = types;
            batch.changed = true;
        });
    }

    /// Announce an additional static transport address.
    pub fn add_xaddr(&self, xaddr: impl Into<String>) {
        self.shared.with_batch(|state, batch| {
            state.static_xaddrs.push(xaddr.into());
            batch.changed = true;
        });
    }

    /// Replace the announced scopes.
    pub fn set_scopes(&self, scopes: Vec<String>) {
        self.shared.with_batch(|state, batch| {
            state.data.make_mut().scopes = scopes;
            batch.changed = true;
        });
    }

    /// Pin the metadata version for the current batch instead of letting
    /// the commit auto-increment it.
    pub fn set_metadata_version(&self, version: u64) {
        self.shared.with_batch(|_state, batch| {
            batch.changed = true;
            batch.metadata_version_override = Some(version);
        });
    }

    /// Add an explicit transport binding, deriving matching discovery
    /// bindings and outgoing infos from the transport layer.
    pub fn add_binding(&self, binding: CommunicationBinding) -> Result<()> {
        self.shared
            .with_batch(|state, batch| state.registry.add_binding(binding, true, true, batch))
    }

    /// Remove a transport binding.
    pub fn remove_binding(&self, key: &BindingKey) -> bool {
        self.shared
            .with_batch(|state, batch| state.registry.remove_binding(key, batch))
    }

    /// Report that a transport binding regained usability, e.g. its
    /// address came back. The binding is re-registered as it is, not
    /// re-created, and a Hello announces the restored surface.
    pub fn binding_up(&self, key: &BindingKey) -> bool {
        self.shared
            .with_batch(|state, batch| state.registry.binding_became_usable(key, batch))
    }

    /// Report that a transport binding temporarily lost usability. It is
    /// unregistered but kept for re-activation via [`Self::binding_up`].
    pub fn binding_down(&self, key: &BindingKey) -> bool {
        self.shared
            .with_batch(|state, batch| state.registry.binding_became_unusable(key, batch))
    }

    /// Report that an announcement target regained usability; it
    /// receives a targeted Hello.
    pub fn outgoing_info_up(&self, key: &BindingKey) -> bool {
        self.shared
            .with_batch(|state, batch| state.registry.outgoing_info_became_usable(key, batch))
    }

    /// Report that an announcement target lost usability; it receives a
    /// final Bye and is kept for re-activation.
    pub fn outgoing_info_down(&self, key: &BindingKey) -> bool {
        self.shared
            .with_batch(|state, batch| state.registry.outgoing_info_became_unusable(key, batch))
    }

    /// Snapshot of the usable announcement targets.
    pub fn outgoing_infos(&self) -> Vec<OutgoingDiscoveryInfo> {
        self.shared.state.lock().registry.usable_outgoing_infos()
    }

    /// Remove every binding; only legal while stopped.
    pub fn clear_bindings(&self) -> Result<()> {
        self.shared.with_batch(|state, _batch| state.registry.clear())
    }

    /// Host a service. Its id must be unique on this device; the service
    /// immediately sees the current transport surface and tracks it from
    /// then on.
    pub fn add_service(&self, service: Arc<HostedService>) -> Result<()> {
        self.shared.with_batch(|state, batch| {
            if state.services.iter().any(|(s, _)| s.id() == service.id()) {
                return Err(Error::DuplicateService(service.id().to_string()));
            }
            for binding in state.registry.communication_bindings() {
                service.binding_added(&binding);
            }
            let observer = state
                .registry
                .add_observer(Arc::clone(&service) as Arc<dyn RegistryObserver>);
            state.services.push((service, observer));
            batch.changed = true;
            Ok(())
        })
    }

    /// Detach a hosted service.
    pub fn remove_service(&self, id: &str) -> bool {
        self.shared.with_batch(|state, batch| {
            let Some(pos) = state.services.iter().position(|(s, _)| s.id() == id) else {
                return false;
            };
            let (service, observer) = state.services.remove(pos);
            state.registry.remove_observer(observer);
            service.detach();
            batch.changed = true;
            true
        })
    }

    /// Look up a hosted service.
    pub fn service(&self, id: &str) -> Option<Arc<HostedService>> {
        self.shared
            .state
            .lock()
            .services
            .iter()
            .find(|(s, _)| s.id() == id)
            .map(|(s, _)| Arc::clone(s))
    }

    /// Start with the system network monitor.
    pub fn start(&self) -> Result<()> {
        self.start_with_monitor(Box::new(SystemMonitor::new()))
    }

    /// Start the device.
    ///
    /// A device with no bindings configured gets defaults: one discovery
    /// multicast auto-binding and one communication auto-binding whose
    /// path is `/<uuid>`. The whole start is one coalescer batch, so
    /// exactly one Hello goes out when it completes.
    pub fn start_with_monitor(&self, monitor: Box<dyn NetworkMonitor>) -> Result<()> {
        let shared = &self.shared;
        let _guard = shared.coalescer.exclusive_lock();
        let mut batch = PendingAnnouncements::default();
        let result = {
            let mut state = shared.state.lock();
            if state.running {
                return Ok(());
            }
            state.registry.notify_batch_start();
            shared.dispatcher.sequence().reset();

            if !state.registry.has_communication_bindings()
                && state.registry.auto_bindings().is_empty()
            {
                if let Err(e) =
                    self.install_default_auto_bindings(&mut state, monitor.as_ref(), &mut batch)
                {
                    state.registry.notify_batch_end();
                    return Err(e);
                }
            }
            state.registry.start();
            state.running = true;
            batch.changed = true;

            let engines: Vec<Arc<AutoBindingEngine>> = state
                .registry
                .auto_bindings()
                .iter()
                .map(|entry| Arc::clone(&entry.engine))
                .collect();
            if !engines.is_empty() {
                state.pump = Some(MonitorPump::spawn(
                    monitor,
                    shared.ctx.config.monitor_poll_interval,
                    Arc::new(EngineFanout { engines }),
                ));
            }
            state.registry.notify_batch_end();
            log::info!("[Device] {} started", self.endpoint_reference());
            Ok(())
        };
        shared.coalescer.note_batch(batch);
        result
    }

    fn install_default_auto_bindings(
        &self,
        state: &mut DeviceState,
        monitor: &dyn NetworkMonitor,
        batch: &mut PendingAnnouncements,
    ) -> Result<()> {
        let cfg = &self.shared.ctx.config;
        let interfaces = monitor
            .current_interfaces()
            .map_err(|e| Error::Io(e.to_string()))?;

        // Communication auto-binding rooted at the device uuid
        let comm_policy = AutoBindingPolicy::new()
            .with_families(cfg.families.clone())
            .with_port(cfg.communication_port)
            .with_path(format!("/{}", self.uuid))
            .with_suppress_loopback(cfg.suppress_loopback)
            .with_suppress_multicast_disabled(cfg.suppress_multicast_disabled);
        let comm_engine = Arc::new(AutoBindingEngine::new(comm_policy));
        comm_engine.seed(interfaces.clone());
        let listener = comm_engine.register_listener(
            Arc::new(EngineTap {
                shared: Arc::downgrade(&self.shared),
                role: EngineRole::Communication,
            }),
            None,
            false,
        );
        for binding in comm_engine.bindings_for(listener) {
            if let Err(e) = state.registry.add_binding(binding, true, true, batch) {
                log::warn!("[Device] default binding not added: {}", e);
            }
        }
        state.registry.add_auto_binding(AutoBindingEntry {
            engine: comm_engine,
            listener,
            for_outgoing: false,
        });

        // Discovery multicast auto-binding
        let disc_policy = AutoBindingPolicy::new()
            .with_families(cfg.families.clone())
            .with_suppress_loopback(cfg.suppress_loopback)
            .with_suppress_multicast_disabled(cfg.suppress_multicast_disabled)
            .with_generate_discovery(true);
        let disc_engine = Arc::new(AutoBindingEngine::new(disc_policy));
        disc_engine.seed(interfaces);
        let listener = disc_engine.register_listener(
            Arc::new(EngineTap {
                shared: Arc::downgrade(&self.shared),
                role: EngineRole::Discovery,
            }),
            None,
            true,
        );
        // Materialize the listener cache so later transitions notify
        let _ = disc_engine.bindings_for(listener);
        for binding in disc_engine.discovery_bindings() {
            if let Err(e) = state.registry.add_discovery_binding(binding, batch) {
                log::debug!("[Device] default discovery binding skipped: {}", e);
            }
        }
        for info in disc_engine.outgoing_infos_for(listener) {
            if let Err(e) = state.registry.add_outgoing_info(info, batch) {
                log::debug!("[Device] default outgoing info skipped: {}", e);
            }
        }
        state.registry.add_auto_binding(AutoBindingEntry {
            engine: disc_engine,
            listener,
            for_outgoing: true,
        });
        Ok(())
    }

    /// Stop the device.
    ///
    /// Reads the teardown set under the shared lock, performs Bye and
    /// unregistration I/O with no lock held, then flips to stopped via a
    /// non-blocking exclusive attempt. On contention the whole sequence
    /// retries rather than deadlocking against an in-flight announcement;
    /// exhausting the retry budget is fatal and reported.
    pub fn stop(&self) -> Result<()> {
        let shared = &self.shared;
        let cfg = &shared.ctx.config;
        let mut io_done = false;

        for attempt in 0..cfg.stop_retries {
            let teardown = {
                let _read = shared.coalescer.shared_lock();
                let state = shared.state.lock();
                if !state.running {
                    return Ok(());
                }
                (
                    state.registry.communication_bindings(),
                    state.registry.discovery_bindings(),
                    state.registry.usable_outgoing_infos(),
                    state.data.snapshot(),
                )
            };

            if !io_done {
                let (bindings, discovery, infos, snapshot) = &teardown;
                shared.dispatcher.announce_bye(Arc::clone(snapshot), infos);
                for binding in bindings {
                    if let Err(e) = shared.ctx.comm.unregister_binding(binding) {
                        log::warn!("[Device] stop: unregister {} failed: {}", binding.key, e);
                    }
                }
                for binding in discovery {
                    if let Err(e) = shared.ctx.comm.unregister_discovery(binding) {
                        log::warn!("[Device] stop: unregister {} failed: {}", binding.key, e);
                    }
                }
                io_done = true;
            }

            if let Some(guard) = shared.coalescer.try_exclusive_lock() {
                let pump = {
                    let mut state = shared.state.lock();
                    state.running = false;
                    state.registry.mark_stopped();
                    state.pump.take()
                };
                drop(guard);
                // Joining the pump under the exclusive lock could deadlock
                // against a pump callback waiting for it
                drop(pump);
                log::info!("[Device] {} stopped", self.endpoint_reference());
                return Ok(());
            }

            log::debug!(
                "[Device] stop: update lock busy (attempt {}/{})",
                attempt + 1,
                cfg.stop_retries
            );
            thread::sleep(cfg.stop_retry_delay);
        }

        log::error!(
            "[Device] stop: update lock still contended after {} attempts; giving up",
            cfg.stop_retries
        );
        Err(Error::LockContention(
            "stop retries exhausted".to_string(),
        ))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                log::error!("[Device] stop on drop failed: {}", e);
            }
        }
    }
}
