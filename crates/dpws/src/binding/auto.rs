// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Auto-binding engine: materializes bindings from a policy and keeps
//! them correct as interfaces and addresses change.
//!
//! The engine maps each (interface, address-family) pair to at most one
//! logical binding. Bindings are held in reference-counted containers so
//! that a binding shared by several interfaces (multi-homed setups that
//! resolve to the same address) is destroyed only when the last interface
//! releases it.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::net::{
    AddressFamily, InterfaceFilter, NetworkEvent, NetworkEventSink, NetworkInterface,
};

use super::factory::EndpointFactory;
use super::types::{BindingKey, CommunicationBinding, DiscoveryBinding, OutgoingDiscoveryInfo};

/// Notifications raised by the engine toward one listener.
///
/// A single dispatcher object implements all capability methods; owners
/// that only care about a subset use [`FnSink`] and register closures for
/// the methods they need.
pub trait BindingEventSink: Send + Sync {
    /// A new transport binding was materialized.
    fn binding_available(&self, binding: &CommunicationBinding);

    /// A transport binding was destroyed.
    fn binding_destroyed(&self, key: &BindingKey);

    /// A discovery binding was materialized (discovery policies only).
    fn discovery_binding_available(&self, _binding: &DiscoveryBinding) {}

    /// A discovery binding was destroyed.
    fn discovery_binding_destroyed(&self, _key: &BindingKey) {}

    /// An outgoing discovery info was materialized.
    fn outgoing_info_available(&self, _info: &OutgoingDiscoveryInfo) {}

    /// An outgoing discovery info was destroyed.
    fn outgoing_info_destroyed(&self, _key: &BindingKey) {}
}

type BindingFn = Box<dyn Fn(&CommunicationBinding) + Send + Sync>;
type KeyFn = Box<dyn Fn(&BindingKey) + Send + Sync>;
type InfoFn = Box<dyn Fn(&OutgoingDiscoveryInfo) + Send + Sync>;

/// Closure-backed [`BindingEventSink`].
#[derive(Default)]
pub struct FnSink {
    on_binding_available: Option<BindingFn>,
    on_binding_destroyed: Option<KeyFn>,
    on_info_available: Option<InfoFn>,
    on_info_destroyed: Option<KeyFn>,
}

impl FnSink {
    /// Create an empty sink (all events ignored).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding-available handler.
    pub fn on_binding_available(
        mut self,
        f: impl Fn(&CommunicationBinding) + Send + Sync + 'static,
    ) -> Self {
        self.on_binding_available = Some(Box::new(f));
        self
    }

    /// Register a binding-destroyed handler.
    pub fn on_binding_destroyed(mut self, f: impl Fn(&BindingKey) + Send + Sync + 'static) -> Self {
        self.on_binding_destroyed = Some(Box::new(f));
        self
    }

    /// Register an outgoing-info-available handler.
    pub fn on_info_available(
        mut self,
        f: impl Fn(&OutgoingDiscoveryInfo) + Send + Sync + 'static,
    ) -> Self {
        self.on_info_available = Some(Box::new(f));
        self
    }

    /// Register an outgoing-info-destroyed handler.
    pub fn on_info_destroyed(mut self, f: impl Fn(&BindingKey) + Send + Sync + 'static) -> Self {
        self.on_info_destroyed = Some(Box::new(f));
        self
    }
}

impl BindingEventSink for FnSink {
    fn binding_available(&self, binding: &CommunicationBinding) {
        if let Some(f) = &self.on_binding_available {
            f(binding);
        }
    }

    fn binding_destroyed(&self, key: &BindingKey) {
        if let Some(f) = &self.on_binding_destroyed {
            f(key);
        }
    }

    fn outgoing_info_available(&self, info: &OutgoingDiscoveryInfo) {
        if let Some(f) = &self.on_info_available {
            f(info);
        }
    }

    fn outgoing_info_destroyed(&self, key: &BindingKey) {
        if let Some(f) = &self.on_info_destroyed {
            f(key);
        }
    }
}

/// Handle identifying one registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Policy from which bindings are generated.
#[derive(Clone, Debug)]
pub struct AutoBindingPolicy {
    /// Interfaces the policy applies to.
    pub interfaces: InterfaceFilter,

    /// Enabled address families.
    pub families: Vec<AddressFamily>,

    /// Exclude loopback interfaces while any matching non-loopback
    /// interface is up with an address in an enabled family.
    pub suppress_loopback: bool,

    /// Ignore interfaces without multicast capability outright.
    pub suppress_multicast_disabled: bool,

    /// Fixed port for generated bindings (0 = ephemeral).
    pub port: u16,

    /// Base path for generated bindings (listeners may override).
    pub path: String,

    /// Also generate inbound discovery bindings per interface.
    pub generate_discovery: bool,

    /// Credential reference passed through to generated bindings.
    pub credential_id: Option<u64>,

    /// Owning communication manager id stamped on generated bindings.
    pub comm_manager_id: u32,
}

impl Default for AutoBindingPolicy {
    fn default() -> Self {
        Self {
            interfaces: InterfaceFilter::all(),
            families: vec![AddressFamily::Ipv4],
            suppress_loopback: true,
            suppress_multicast_disabled: true,
            port: 0,
            path: "/".to_string(),
            generate_discovery: false,
            credential_id: None,
            comm_manager_id: 0,
        }
    }
}

impl AutoBindingPolicy {
    /// Create a policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface filter.
    pub fn with_interfaces(mut self, filter: InterfaceFilter) -> Self {
        self.interfaces = filter;
        self
    }

    /// Set the enabled address families.
    pub fn with_families(mut self, families: Vec<AddressFamily>) -> Self {
        self.families = families;
        self
    }

    /// Set loopback suppression.
    pub fn with_suppress_loopback(mut self, suppress: bool) -> Self {
        self.suppress_loopback = suppress;
        self
    }

    /// Set multicast-disabled suppression.
    pub fn with_suppress_multicast_disabled(mut self, suppress: bool) -> Self {
        self.suppress_multicast_disabled = suppress;
        self
    }

    /// Set the fixed port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the base path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Enable generation of inbound discovery bindings.
    pub fn with_generate_discovery(mut self, generate: bool) -> Self {
        self.generate_discovery = generate;
        self
    }
}

/// One materialized binding shared by every interface resolving to the
/// same address.
///
/// Lifetime invariant: the binding is destroyed if and only if the
/// reference count returns to zero; it is never destroyed while an
/// interface still maps to it.
#[derive(Clone, Debug)]
pub struct BindingContainer {
    /// The materialized binding (base path; listeners get rebased copies).
    pub binding: CommunicationBinding,

    /// Generated inbound discovery binding, if the policy asks for one.
    pub discovery: Option<DiscoveryBinding>,

    /// Generated outgoing discovery info (listeners opt in).
    pub outgoing: Option<OutgoingDiscoveryInfo>,

    /// Number of (interface, family) slots mapping to this container.
    pub ref_count: usize,

    /// Interfaces currently mapping to this container.
    pub interfaces: HashSet<String>,
}

struct ListenerEntry {
    sink: Arc<dyn BindingEventSink>,
    path: String,
    wants_outgoing: bool,
    materialized: bool,
    /// Per-listener materialized bindings, keyed by container address.
    bindings: HashMap<IpAddr, CommunicationBinding>,
    /// Per-listener outgoing infos, keyed by container address.
    infos: HashMap<IpAddr, OutgoingDiscoveryInfo>,
}

enum Transition {
    Created(BindingContainer),
    Destroyed(BindingContainer),
}

enum Notification {
    BindingAvailable(Arc<dyn BindingEventSink>, CommunicationBinding),
    BindingDestroyed(Arc<dyn BindingEventSink>, BindingKey),
    DiscoveryAvailable(Arc<dyn BindingEventSink>, DiscoveryBinding),
    DiscoveryDestroyed(Arc<dyn BindingEventSink>, BindingKey),
    InfoAvailable(Arc<dyn BindingEventSink>, OutgoingDiscoveryInfo),
    InfoDestroyed(Arc<dyn BindingEventSink>, BindingKey),
}

impl Notification {
    fn fire(self) {
        match self {
            Notification::BindingAvailable(sink, binding) => sink.binding_available(&binding),
            Notification::BindingDestroyed(sink, key) => sink.binding_destroyed(&key),
            Notification::DiscoveryAvailable(sink, binding) => {
                sink.discovery_binding_available(&binding)
            }
            Notification::DiscoveryDestroyed(sink, key) => sink.discovery_binding_destroyed(&key),
            Notification::InfoAvailable(sink, info) => sink.outgoing_info_available(&info),
            Notification::InfoDestroyed(sink, key) => sink.outgoing_info_destroyed(&key),
        }
    }
}

struct EngineState {
    interfaces: HashMap<String, NetworkInterface>,
    containers: HashMap<IpAddr, BindingContainer>,
    slots: HashMap<(String, AddressFamily), IpAddr>,
    listeners: HashMap<ListenerId, ListenerEntry>,
    next_listener_id: u64,
    total_created: u64,
    total_destroyed: u64,
}

/// Engine generating and destroying bindings for a policy as the network
/// changes.
///
/// All event entry points are safe to call from the monitor pump thread;
/// listener notifications are fired after internal state is updated and
/// the engine lock is released, so sinks may call back into the engine.
pub struct AutoBindingEngine {
    policy: AutoBindingPolicy,
    state: Mutex<EngineState>,
}

impl AutoBindingEngine {
    /// Create a new engine for a policy.
    pub fn new(policy: AutoBindingPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(EngineState {
                interfaces: HashMap::new(),
                containers: HashMap::new(),
                slots: HashMap::new(),
                listeners: HashMap::new(),
                next_listener_id: 1,
                total_created: 0,
                total_destroyed: 0,
            }),
        }
    }

    /// Get the policy.
    pub fn policy(&self) -> &AutoBindingPolicy {
        &self.policy
    }

    /// Seed the engine with an initial interface set.
    ///
    /// Equivalent to delivering one interface-up event per interface.
    pub fn seed(&self, interfaces: Vec<NetworkInterface>) {
        for iface in interfaces {
            self.interface_up(iface);
        }
    }

    /// Register a listener.
    ///
    /// `path` overrides the policy's base path for this listener's
    /// materialized bindings (service path suffix vs. device path).
    pub fn register_listener(
        &self,
        sink: Arc<dyn BindingEventSink>,
        path: Option<String>,
        wants_outgoing: bool,
    ) -> ListenerId {
        let mut state = self.state.lock();
        let id = ListenerId(state.next_listener_id);
        state.next_listener_id += 1;
        state.listeners.insert(
            id,
            ListenerEntry {
                sink,
                path: path.unwrap_or_else(|| self.policy.path.clone()),
                wants_outgoing,
                materialized: false,
                bindings: HashMap::new(),
                infos: HashMap::new(),
            },
        );
        id
    }

    /// Remove a listener; no further notifications are delivered to it.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.lock().listeners.remove(&id).is_some()
    }

    /// Current materialized bindings for a listener, ordered by key.
    ///
    /// The first call resolves the policy against the known interface set
    /// and caches; later calls return the cached set. Never fails: an
    /// unknown listener yields an empty sequence.
    pub fn bindings_for(&self, id: ListenerId) -> Vec<CommunicationBinding> {
        let mut state = self.state.lock();
        Self::materialize(&mut state, id);
        let Some(entry) = state.listeners.get(&id) else {
            log::warn!("[AutoBind] bindings_for: unknown listener {:?}", id);
            return Vec::new();
        };
        let mut bindings: Vec<CommunicationBinding> = entry.bindings.values().cloned().collect();
        bindings.sort_by(|a, b| a.key.cmp(&b.key));
        bindings
    }

    /// Current outgoing discovery infos for a listener, ordered by key.
    pub fn outgoing_infos_for(&self, id: ListenerId) -> Vec<OutgoingDiscoveryInfo> {
        let mut state = self.state.lock();
        Self::materialize(&mut state, id);
        let Some(entry) = state.listeners.get(&id) else {
            return Vec::new();
        };
        let mut infos: Vec<OutgoingDiscoveryInfo> = entry.infos.values().cloned().collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Current discovery bindings generated by this engine, ordered by key.
    pub fn discovery_bindings(&self) -> Vec<DiscoveryBinding> {
        let state = self.state.lock();
        let mut bindings: Vec<DiscoveryBinding> = state
            .containers
            .values()
            .filter_map(|c| c.discovery.clone())
            .collect();
        bindings.sort_by(|a, b| a.key.cmp(&b.key));
        bindings
    }

    /// An interface came up or changed shape.
    pub fn interface_up(&self, iface: NetworkInterface) {
        if !self.policy.interfaces.matches(&iface.name) {
            log::debug!("[AutoBind] ignoring interface {} (filter)", iface.name);
            return;
        }
        let notifications = {
            let mut state = self.state.lock();
            state.interfaces.insert(iface.name.clone(), iface);
            self.rebuild(&mut state)
        };
        fire(notifications);
    }

    /// An interface went down or disappeared.
    pub fn interface_down(&self, name: &str) {
        let notifications = {
            let mut state = self.state.lock();
            if state.interfaces.remove(name).is_none() {
                return;
            }
            self.rebuild(&mut state)
        };
        fire(notifications);
    }

    /// Addresses were added to an interface.
    pub fn addresses_added(&self, name: &str, addrs: &[IpAddr]) {
        self.update_addresses(name, addrs, &[]);
    }

    /// Addresses were removed from an interface.
    pub fn addresses_removed(&self, name: &str, addrs: &[IpAddr]) {
        self.update_addresses(name, &[], addrs);
    }

    /// Addresses were replaced on an interface.
    pub fn addresses_changed(&self, name: &str, added: &[IpAddr], removed: &[IpAddr]) {
        self.update_addresses(name, added, removed);
    }

    /// Multicast capability of an interface changed.
    pub fn multicast_capability_changed(&self, name: &str, capable: bool) {
        let notifications = {
            let mut state = self.state.lock();
            let Some(iface) = state.interfaces.get_mut(name) else {
                return;
            };
            if iface.multicast == capable {
                return;
            }
            iface.multicast = capable;
            self.rebuild(&mut state)
        };
        fire(notifications);
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> EngineStats {
        let state = self.state.lock();
        EngineStats {
            interfaces: state.interfaces.len(),
            containers: state.containers.len(),
            listeners: state.listeners.len(),
            total_created: state.total_created,
            total_destroyed: state.total_destroyed,
        }
    }

    /// Reference count of the container holding `addr`, if any.
    pub fn container_ref_count(&self, addr: &IpAddr) -> Option<usize> {
        self.state.lock().containers.get(addr).map(|c| c.ref_count)
    }

    fn update_addresses(&self, name: &str, added: &[IpAddr], removed: &[IpAddr]) {
        let notifications = {
            let mut state = self.state.lock();
            let Some(iface) = state.interfaces.get_mut(name) else {
                return;
            };
            iface.addresses.retain(|a| !removed.contains(a));
            for addr in added {
                if !iface.addresses.contains(addr) {
                    iface.addresses.push(*addr);
                }
            }
            self.rebuild(&mut state)
        };
        fire(notifications);
    }

    /// Materialize the cached binding set for one listener from the
    /// current containers. No notifications are fired.
    fn materialize(state: &mut EngineState, id: ListenerId) {
        let containers: Vec<BindingContainer> = state.containers.values().cloned().collect();
        let Some(entry) = state.listeners.get_mut(&id) else {
            return;
        };
        if entry.materialized {
            return;
        }
        for container in containers {
            let addr = container.binding.address;
            entry
                .bindings
                .insert(addr, container.binding.with_path(&entry.path));
            if entry.wants_outgoing {
                if let Some(info) = container.outgoing {
                    entry.infos.insert(addr, info);
                }
            }
        }
        entry.materialized = true;
    }

    /// Recompute the desired (interface, family) -> address mapping, diff
    /// it against current slots, and collect listener notifications for
    /// every actual container transition.
    fn rebuild(&self, state: &mut EngineState) -> Vec<Notification> {
        let desired = self.desired_slots(state);
        let mut transitions = Vec::new();

        // Release slots that are gone or now resolve elsewhere
        let stale: Vec<(String, AddressFamily)> = state
            .slots
            .iter()
            .filter(|(slot, addr)| desired.get(*slot) != Some(*addr))
            .map(|(slot, _)| slot.clone())
            .collect();
        for slot in stale {
            let addr = match state.slots.remove(&slot) {
                Some(addr) => addr,
                None => continue,
            };
            if let Some(container) = state.containers.get_mut(&addr) {
                container.interfaces.remove(&slot.0);
                container.ref_count = container.ref_count.saturating_sub(1);
                if container.ref_count == 0 {
                    let container = state
                        .containers
                        .remove(&addr)
                        .unwrap_or_else(|| unreachable!("container present above"));
                    state.total_destroyed += 1;
                    log::debug!(
                        "[AutoBind] binding destroyed: {} ({})",
                        container.binding.key,
                        slot.0
                    );
                    transitions.push(Transition::Destroyed(container));
                }
            }
        }

        // Acquire slots that are new or changed
        for (slot, addr) in &desired {
            if state.slots.get(slot) == Some(addr) {
                continue;
            }
            if let Some(container) = state.containers.get_mut(addr) {
                // Another interface already resolved to this binding
                container.ref_count += 1;
                container.interfaces.insert(slot.0.clone());
                state.slots.insert(slot.clone(), *addr);
                continue;
            }

            let iface = match state.interfaces.get(&slot.0) {
                Some(iface) => iface,
                None => continue,
            };
            let binding = match EndpointFactory::communication_binding(
                iface,
                slot.1,
                self.policy.port,
                &self.policy.path,
                self.policy.credential_id,
                self.policy.comm_manager_id,
            ) {
                Ok(binding) => binding,
                Err(e) => {
                    // Never abort processing of other interfaces
                    log::warn!("[AutoBind] binding construction failed on {}: {}", slot.0, e);
                    continue;
                }
            };

            let discovery = if self.policy.generate_discovery {
                EndpointFactory::discovery_binding(iface, slot.1).ok()
            } else {
                None
            };
            let outgoing = EndpointFactory::outgoing_info(iface, slot.1).ok();

            let mut interfaces = HashSet::new();
            interfaces.insert(slot.0.clone());
            let container = BindingContainer {
                binding,
                discovery,
                outgoing,
                ref_count: 1,
                interfaces,
            };
            log::debug!(
                "[AutoBind] binding available: {} ({})",
                container.binding.key,
                slot.0
            );
            state.containers.insert(*addr, container.clone());
            state.slots.insert(slot.clone(), *addr);
            state.total_created += 1;
            transitions.push(Transition::Created(container));
        }

        self.fan_out(state, transitions)
    }

    /// Compute which (interface, family) slots should currently be bound,
    /// applying the loopback and multicast selection rules.
    fn desired_slots(&self, state: &EngineState) -> HashMap<(String, AddressFamily), IpAddr> {
        let eligible: Vec<&NetworkInterface> = state
            .interfaces
            .values()
            .filter(|i| i.up)
            .filter(|i| i.multicast || !self.policy.suppress_multicast_disabled)
            .collect();

        // Prefer non-loopback; fall back to loopback only when no real
        // interface carries an address in any enabled family.
        let has_non_loopback = eligible.iter().any(|i| {
            !i.loopback
                && self
                    .policy
                    .families
                    .iter()
                    .any(|family| i.has_address_in(*family))
        });

        let mut desired = HashMap::new();
        for iface in eligible {
            if iface.loopback && self.policy.suppress_loopback && has_non_loopback {
                continue;
            }
            for family in &self.policy.families {
                if let Some(addr) = iface.first_address_in(*family) {
                    desired.insert((iface.name.clone(), *family), addr);
                }
            }
        }
        desired
    }

    /// Turn container transitions into per-listener notifications,
    /// updating listener caches. Exactly one notification per listener
    /// per actual transition.
    fn fan_out(&self, state: &mut EngineState, transitions: Vec<Transition>) -> Vec<Notification> {
        let mut notifications = Vec::new();

        for transition in transitions {
            match transition {
                Transition::Created(container) => {
                    let addr = container.binding.address;
                    for entry in state.listeners.values_mut().filter(|e| e.materialized) {
                        let binding = container.binding.with_path(&entry.path);
                        entry.bindings.insert(addr, binding.clone());
                        notifications
                            .push(Notification::BindingAvailable(entry.sink.clone(), binding));
                        if let Some(discovery) = &container.discovery {
                            notifications.push(Notification::DiscoveryAvailable(
                                entry.sink.clone(),
                                discovery.clone(),
                            ));
                        }
                        if entry.wants_outgoing {
                            if let Some(info) = &container.outgoing {
                                entry.infos.insert(addr, info.clone());
                                notifications.push(Notification::InfoAvailable(
                                    entry.sink.clone(),
                                    info.clone(),
                                ));
                            }
                        }
                    }
                }
                Transition::Destroyed(container) => {
                    let addr = container.binding.address;
                    for entry in state.listeners.values_mut().filter(|e| e.materialized) {
                        if let Some(binding) = entry.bindings.remove(&addr) {
                            notifications.push(Notification::BindingDestroyed(
                                entry.sink.clone(),
                                binding.key,
                            ));
                        }
                        if let Some(discovery) = &container.discovery {
                            notifications.push(Notification::DiscoveryDestroyed(
                                entry.sink.clone(),
                                discovery.key.clone(),
                            ));
                        }
                        if let Some(info) = entry.infos.remove(&addr) {
                            notifications
                                .push(Notification::InfoDestroyed(entry.sink.clone(), info.key));
                        }
                    }
                }
            }
        }

        notifications
    }
}

impl NetworkEventSink for AutoBindingEngine {
    fn handle_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::InterfaceUp(iface) => self.interface_up(iface),
            NetworkEvent::InterfaceDown(name) => self.interface_down(&name),
            NetworkEvent::AddressesAdded(name, addrs) => self.addresses_added(&name, &addrs),
            NetworkEvent::AddressesRemoved(name, addrs) => self.addresses_removed(&name, &addrs),
            NetworkEvent::AddressesChanged {
                name,
                added,
                removed,
            } => self.addresses_changed(&name, &added, &removed),
            NetworkEvent::MulticastCapabilityChanged(name, capable) => {
                self.multicast_capability_changed(&name, capable)
            }
        }
    }
}

fn fire(notifications: Vec<Notification>) {
    for notification in notifications {
        notification.fire();
    }
}

/// Statistics about an auto-binding engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStats {
    /// Known matching interfaces.
    pub interfaces: usize,

    /// Live binding containers.
    pub containers: usize,

    /// Registered listeners.
    pub listeners: usize,

    /// Containers created over the engine's lifetime.
    pub total_created: u64,

    /// Containers destroyed over the engine's lifetime.
    pub total_destroyed: u64,
}
