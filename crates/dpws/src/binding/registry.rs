// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-entity binding registry: the authoritative record of which
//! bindings a hosting entity exposes, partitioned by usability.
//!
//! The registry is the only code that talks to the transport layer's
//! registration surface. It is not internally locked; the owning entity
//! serializes access through its update coalescer and records the
//! announcement consequences of each mutation into a
//! [`PendingAnnouncements`] batch supplied by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use crate::announce::PendingAnnouncements;
use crate::comm::CommunicationManager;
use crate::{Error, Result};

use super::auto::{AutoBindingEngine, ListenerId};
use super::types::{BindingKey, CommunicationBinding, DiscoveryBinding, OutgoingDiscoveryInfo};

/// Observer of a registry's binding transitions, typically a hosted
/// service tracking its device's transport surface.
///
/// Observers are held behind opaque ids; removing one detaches it without
/// touching the others. All methods default to no-ops.
pub trait RegistryObserver: Send + Sync {
    /// A transport binding entered the registry.
    fn binding_added(&self, _binding: &CommunicationBinding) {}

    /// A transport binding left the registry.
    fn binding_removed(&self, _key: &BindingKey) {}

    /// A discovery binding entered the registry.
    fn discovery_binding_added(&self, _binding: &DiscoveryBinding) {}

    /// A discovery binding left the registry.
    fn discovery_binding_removed(&self, _key: &BindingKey) {}

    /// A binding moved into the usable partition.
    fn binding_up(&self, _key: &BindingKey) {}

    /// A binding moved into the not-usable partition.
    fn binding_down(&self, _key: &BindingKey) {}

    /// A batch of binding updates is beginning.
    fn start_batch(&self) {}

    /// The current batch of binding updates ended.
    fn stop_batch(&self) {}
}

/// Opaque observer handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// An auto-binding engine attached to this registry.
pub struct AutoBindingEntry {
    /// The generating engine.
    pub engine: Arc<AutoBindingEngine>,

    /// This registry's listener registration on the engine.
    pub listener: ListenerId,

    /// Whether the entry also feeds the outgoing-discovery-info partition.
    pub for_outgoing: bool,
}

/// Binding partitions for one hosting entity.
pub struct BindingRegistry {
    comm: Arc<dyn CommunicationManager>,
    running: bool,

    communication_up: HashMap<BindingKey, CommunicationBinding>,
    communication_down: HashMap<BindingKey, CommunicationBinding>,
    discovery_up: HashMap<BindingKey, DiscoveryBinding>,
    discovery_down: HashMap<BindingKey, DiscoveryBinding>,
    outgoing_up: HashMap<BindingKey, OutgoingDiscoveryInfo>,
    outgoing_down: HashMap<BindingKey, OutgoingDiscoveryInfo>,

    autos: Vec<AutoBindingEntry>,
    observers: Vec<(ObserverId, Arc<dyn RegistryObserver>)>,
    next_observer_id: u64,
}

impl BindingRegistry {
    /// Create an empty registry bound to a transport layer.
    pub fn new(comm: Arc<dyn CommunicationManager>) -> Self {
        Self {
            comm,
            running: false,
            communication_up: HashMap::new(),
            communication_down: HashMap::new(),
            discovery_up: HashMap::new(),
            discovery_down: HashMap::new(),
            outgoing_up: HashMap::new(),
            outgoing_down: HashMap::new(),
            autos: Vec::new(),
            observers: Vec::new(),
            next_observer_id: 1,
        }
    }

    /// Whether the owning entity is running (mutations register
    /// immediately instead of being deferred to start).
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Attach an observer.
    pub fn add_observer(&mut self, observer: Arc<dyn RegistryObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Tell observers a batch of updates is beginning, so they can defer
    /// recomputation until the batch ends.
    pub fn notify_batch_start(&self) {
        for (_, observer) in &self.observers {
            observer.start_batch();
        }
    }

    /// Tell observers the current batch of updates ended.
    pub fn notify_batch_end(&self) {
        for (_, observer) in &self.observers {
            observer.stop_batch();
        }
    }

    /// Detach an observer.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Add a transport binding.
    ///
    /// A usable binding is registered with the transport layer first and
    /// only filed in the usable partition once registration succeeded, so
    /// a failure leaves no trace. With `expand_discovery` /
    /// `expand_outgoing` set, matching discovery bindings and outgoing
    /// infos are derived from the transport layer and added recursively
    /// (derivation duplicates are skipped, not errors).
    pub fn add_binding(
        &mut self,
        binding: CommunicationBinding,
        expand_discovery: bool,
        expand_outgoing: bool,
        pending: &mut PendingAnnouncements,
    ) -> Result<()> {
        let key = binding.key.clone();
        if self.communication_up.contains_key(&key) || self.communication_down.contains_key(&key) {
            log::warn!("[Registry] duplicate binding rejected: {}", key);
            return Err(Error::DuplicateBinding(key.to_string()));
        }

        if binding.usable {
            if self.running {
                self.comm.register_binding(&binding).map_err(|e| {
                    log::error!("[Registry] registration failed for {}: {}", key, e);
                    e
                })?;
            }
            self.communication_up.insert(key.clone(), binding.clone());
            pending.changed = true;
        } else {
            self.communication_down.insert(key.clone(), binding.clone());
        }

        for (_, observer) in &self.observers {
            observer.binding_added(&binding);
        }

        if expand_discovery {
            for derived in self.comm.derive_discovery_bindings(&binding) {
                if let Err(e) = self.add_discovery_binding(derived, pending) {
                    log::debug!("[Registry] derived discovery binding skipped: {}", e);
                }
            }
        }
        if expand_outgoing {
            for derived in self
                .comm
                .derive_outgoing_infos(&binding, true, binding.credential_id)
            {
                if let Err(e) = self.add_outgoing_info(derived, pending) {
                    log::debug!("[Registry] derived outgoing info skipped: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Remove a transport binding from whichever partition holds it.
    ///
    /// Returns whether something was actually removed.
    pub fn remove_binding(&mut self, key: &BindingKey, pending: &mut PendingAnnouncements) -> bool {
        if let Some(binding) = self.communication_up.remove(key) {
            if self.running {
                if let Err(e) = self.comm.unregister_binding(&binding) {
                    log::warn!("[Registry] unregister failed for {}: {}", key, e);
                }
            }
            pending.changed = true;
        } else if self.communication_down.remove(key).is_none() {
            return false;
        }

        for (_, observer) in &self.observers {
            observer.binding_removed(key);
        }
        true
    }

    /// Add an inbound discovery binding.
    pub fn add_discovery_binding(
        &mut self,
        binding: DiscoveryBinding,
        _pending: &mut PendingAnnouncements,
    ) -> Result<()> {
        let key = binding.key.clone();
        if self.discovery_up.contains_key(&key) || self.discovery_down.contains_key(&key) {
            log::warn!("[Registry] duplicate discovery binding rejected: {}", key);
            return Err(Error::DuplicateBinding(key.to_string()));
        }

        if binding.usable {
            if self.running {
                self.comm.register_discovery(&binding).map_err(|e| {
                    log::error!("[Registry] discovery registration failed for {}: {}", key, e);
                    e
                })?;
            }
            self.discovery_up.insert(key.clone(), binding.clone());
        } else {
            self.discovery_down.insert(key.clone(), binding.clone());
        }

        for (_, observer) in &self.observers {
            observer.discovery_binding_added(&binding);
        }
        Ok(())
    }

    /// Remove an inbound discovery binding.
    pub fn remove_discovery_binding(&mut self, key: &BindingKey) -> bool {
        if let Some(binding) = self.discovery_up.remove(key) {
            if self.running {
                if let Err(e) = self.comm.unregister_discovery(&binding) {
                    log::warn!("[Registry] discovery unregister failed for {}: {}", key, e);
                }
            }
        } else if self.discovery_down.remove(key).is_none() {
            return false;
        }

        for (_, observer) in &self.observers {
            observer.discovery_binding_removed(key);
        }
        true
    }

    /// Add an outgoing discovery info.
    ///
    /// A usable info is recorded as newly added in the batch so the
    /// commit can Hello it without re-announcing to everyone else.
    pub fn add_outgoing_info(
        &mut self,
        info: OutgoingDiscoveryInfo,
        pending: &mut PendingAnnouncements,
    ) -> Result<()> {
        let key = info.key.clone();
        if self.outgoing_up.contains_key(&key) || self.outgoing_down.contains_key(&key) {
            log::warn!("[Registry] duplicate outgoing info rejected: {}", key);
            return Err(Error::DuplicateBinding(key.to_string()));
        }

        if info.usable {
            self.outgoing_up.insert(key.clone(), info);
            pending.added_infos.push(key);
        } else {
            self.outgoing_down.insert(key, info);
        }
        Ok(())
    }

    /// Remove an outgoing discovery info; a usable one is recorded in the
    /// batch so the commit sends it a Bye.
    pub fn remove_outgoing_info(
        &mut self,
        key: &BindingKey,
        pending: &mut PendingAnnouncements,
    ) -> bool {
        if let Some(info) = self.outgoing_up.remove(key) {
            pending.removed_infos.push(info);
            true
        } else {
            self.outgoing_down.remove(key).is_some()
        }
    }

    /// A binding temporarily regained its address: move it back to the
    /// usable partition and re-register without re-creating it.
    pub fn binding_became_usable(
        &mut self,
        key: &BindingKey,
        pending: &mut PendingAnnouncements,
    ) -> bool {
        let Some(mut binding) = self.communication_down.remove(key) else {
            return false;
        };
        binding.usable = true;
        if self.running {
            if let Err(e) = self.comm.register_binding(&binding) {
                log::error!("[Registry] re-registration failed for {}: {}", key, e);
                binding.usable = false;
                self.communication_down.insert(key.clone(), binding);
                return false;
            }
        }
        self.communication_up.insert(key.clone(), binding);
        pending.changed = true;

        for (_, observer) in &self.observers {
            observer.binding_up(key);
        }
        true
    }

    /// A binding lost its address: move it to the not-usable partition
    /// and unregister, keeping it around for later re-activation.
    pub fn binding_became_unusable(
        &mut self,
        key: &BindingKey,
        pending: &mut PendingAnnouncements,
    ) -> bool {
        let Some(mut binding) = self.communication_up.remove(key) else {
            return false;
        };
        if self.running {
            if let Err(e) = self.comm.unregister_binding(&binding) {
                log::warn!("[Registry] unregister failed for {}: {}", key, e);
            }
        }
        binding.usable = false;
        self.communication_down.insert(key.clone(), binding);
        pending.changed = true;

        for (_, observer) in &self.observers {
            observer.binding_down(key);
        }
        true
    }

    /// An outgoing info regained usability.
    pub fn outgoing_info_became_usable(
        &mut self,
        key: &BindingKey,
        pending: &mut PendingAnnouncements,
    ) -> bool {
        let Some(mut info) = self.outgoing_down.remove(key) else {
            return false;
        };
        info.usable = true;
        self.outgoing_up.insert(key.clone(), info);
        pending.added_infos.push(key.clone());
        true
    }

    /// An outgoing info lost usability; it receives a Bye on commit.
    pub fn outgoing_info_became_unusable(
        &mut self,
        key: &BindingKey,
        pending: &mut PendingAnnouncements,
    ) -> bool {
        let Some(mut info) = self.outgoing_up.remove(key) else {
            return false;
        };
        // Bye is still sendable at commit time: the batch keeps the
        // info's last usable shape
        pending.removed_infos.push(info.clone());
        info.usable = false;
        self.outgoing_down.insert(key.clone(), info);
        true
    }

    /// Attach an auto-binding entry.
    pub fn add_auto_binding(&mut self, entry: AutoBindingEntry) {
        self.autos.push(entry);
    }

    /// Attached auto-binding entries.
    pub fn auto_bindings(&self) -> &[AutoBindingEntry] {
        &self.autos
    }

    /// Attached auto-binding entries that feed the outgoing-info
    /// partition (the announcement-target generators).
    pub fn outgoing_auto_bindings(&self) -> impl Iterator<Item = &AutoBindingEntry> {
        self.autos.iter().filter(|entry| entry.for_outgoing)
    }

    /// Remove every binding and detach every observer and auto-binding
    /// listener. Only legal while the entity is stopped.
    pub fn clear(&mut self) -> Result<()> {
        if self.running {
            return Err(Error::InvalidState(
                "cannot clear bindings while running".to_string(),
            ));
        }
        // Detach listeners first so nothing dangles into cleared maps
        self.observers.clear();
        for entry in self.autos.drain(..) {
            entry.engine.remove_listener(entry.listener);
        }
        self.communication_up.clear();
        self.communication_down.clear();
        self.discovery_up.clear();
        self.discovery_down.clear();
        self.outgoing_up.clear();
        self.outgoing_down.clear();
        Ok(())
    }

    /// Flip to running and register every usable binding.
    ///
    /// A binding that fails to register is demoted to the not-usable
    /// partition and logged; start continues with the rest, keeping the
    /// usable partition consistent with what is actually registered.
    pub fn start(&mut self) {
        self.running = true;

        let keys: Vec<BindingKey> = self.communication_up.keys().cloned().collect();
        for key in keys {
            let binding = match self.communication_up.get(&key) {
                Some(binding) => binding.clone(),
                None => continue,
            };
            if let Err(e) = self.comm.register_binding(&binding) {
                log::error!("[Registry] start: registration failed for {}: {}", key, e);
                let mut binding = self
                    .communication_up
                    .remove(&key)
                    .unwrap_or_else(|| unreachable!("key read above"));
                binding.usable = false;
                self.communication_down.insert(key, binding);
            }
        }

        let keys: Vec<BindingKey> = self.discovery_up.keys().cloned().collect();
        for key in keys {
            let binding = match self.discovery_up.get(&key) {
                Some(binding) => binding.clone(),
                None => continue,
            };
            if let Err(e) = self.comm.register_discovery(&binding) {
                log::error!(
                    "[Registry] start: discovery registration failed for {}: {}",
                    key,
                    e
                );
                let mut binding = self
                    .discovery_up
                    .remove(&key)
                    .unwrap_or_else(|| unreachable!("key read above"));
                binding.usable = false;
                self.discovery_down.insert(key, binding);
            }
        }
    }

    /// Flip to stopped. Unregistration I/O is the caller's job (it runs
    /// outside the exclusive lock; see the owning entity's stop sequence).
    pub fn mark_stopped(&mut self) {
        self.running = false;
    }

    /// Whether any communication binding exists in either partition.
    pub fn has_communication_bindings(&self) -> bool {
        !self.communication_up.is_empty() || !self.communication_down.is_empty()
    }

    /// Snapshot of usable communication bindings.
    pub fn communication_bindings(&self) -> Vec<CommunicationBinding> {
        let mut bindings: Vec<CommunicationBinding> =
            self.communication_up.values().cloned().collect();
        bindings.sort_by(|a, b| a.key.cmp(&b.key));
        bindings
    }

    /// Snapshot of usable discovery bindings.
    pub fn discovery_bindings(&self) -> Vec<DiscoveryBinding> {
        let mut bindings: Vec<DiscoveryBinding> = self.discovery_up.values().cloned().collect();
        bindings.sort_by(|a, b| a.key.cmp(&b.key));
        bindings
    }

    /// Snapshot of usable outgoing discovery infos: the current Hello/Bye
    /// target set.
    pub fn usable_outgoing_infos(&self) -> Vec<OutgoingDiscoveryInfo> {
        let mut infos: Vec<OutgoingDiscoveryInfo> = self.outgoing_up.values().cloned().collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Usable outgoing infos matching a set of keys, in key order.
    pub fn outgoing_infos_by_key(&self, keys: &[BindingKey]) -> Vec<OutgoingDiscoveryInfo> {
        let mut infos: Vec<OutgoingDiscoveryInfo> = keys
            .iter()
            .filter_map(|key| self.outgoing_up.get(key).cloned())
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Partition sizes snapshot.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            communication_up: self.communication_up.len(),
            communication_down: self.communication_down.len(),
            discovery_up: self.discovery_up.len(),
            discovery_down: self.discovery_down.len(),
            outgoing_up: self.outgoing_up.len(),
            outgoing_down: self.outgoing_down.len(),
            auto_bindings: self.autos.len(),
            outgoing_auto_bindings: self.outgoing_auto_bindings().count(),
        }
    }
}

/// Partition sizes of a [`BindingRegistry`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Usable communication bindings.
    pub communication_up: usize,

    /// Not-usable communication bindings.
    pub communication_down: usize,

    /// Usable discovery bindings.
    pub discovery_up: usize,

    /// Not-usable discovery bindings.
    pub discovery_down: usize,

    /// Usable outgoing infos.
    pub outgoing_up: usize,

    /// Not-usable outgoing infos.
    pub outgoing_down: usize,

    /// Attached auto-binding entries.
    pub auto_bindings: usize,

    /// Auto-binding entries feeding the outgoing-info partition.
    pub outgoing_auto_bindings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::{ByeMessage, HelloMessage};
    use crate::comm::ProtocolVersion;
    use crate::net::AddressFamily;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MockComm {
        registered: Mutex<Vec<BindingKey>>,
        unregistered: Mutex<Vec<BindingKey>>,
        fail_register: AtomicBool,
        derive_discovery: AtomicBool,
        derive_outgoing: AtomicBool,
    }

    impl CommunicationManager for MockComm {
        fn register_binding(&self, binding: &CommunicationBinding) -> Result<()> {
            if self.fail_register.load(Ordering::SeqCst) {
                return Err(Error::Io("port in use".to_string()));
            }
            self.registered.lock().push(binding.key.clone());
            Ok(())
        }

        fn unregister_binding(&self, binding: &CommunicationBinding) -> Result<()> {
            self.unregistered.lock().push(binding.key.clone());
            Ok(())
        }

        fn register_discovery(&self, binding: &DiscoveryBinding) -> Result<()> {
            self.registered.lock().push(binding.key.clone());
            Ok(())
        }

        fn unregister_discovery(&self, binding: &DiscoveryBinding) -> Result<()> {
            self.unregistered.lock().push(binding.key.clone());
            Ok(())
        }

        fn derive_discovery_bindings(
            &self,
            binding: &CommunicationBinding,
        ) -> Vec<DiscoveryBinding> {
            if !self.derive_discovery.load(Ordering::SeqCst) {
                return Vec::new();
            }
            let group = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 3702);
            vec![DiscoveryBinding {
                key: BindingKey::discovery(&binding.interface, &group),
                interface: binding.interface.clone(),
                family: binding.family,
                group,
                usable: true,
            }]
        }

        fn derive_outgoing_infos(
            &self,
            binding: &CommunicationBinding,
            _include_xaddrs: bool,
            _credential_id: Option<u64>,
        ) -> Vec<OutgoingDiscoveryInfo> {
            if !self.derive_outgoing.load(Ordering::SeqCst) {
                return Vec::new();
            }
            let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 3702);
            vec![OutgoingDiscoveryInfo {
                key: BindingKey::outgoing(&binding.interface, &target),
                interface: binding.interface.clone(),
                family: binding.family,
                target,
                usable: true,
                proxies: Vec::new(),
            }]
        }

        fn supported_versions(&self) -> Vec<ProtocolVersion> {
            vec![ProtocolVersion::Dpws11]
        }

        fn send_hello(
            &self,
            _version: ProtocolVersion,
            _hello: &HelloMessage,
            _target: &OutgoingDiscoveryInfo,
        ) -> Result<()> {
            Ok(())
        }

        fn send_bye(
            &self,
            _version: ProtocolVersion,
            _bye: &ByeMessage,
            _target: &OutgoingDiscoveryInfo,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn binding(iface: &str, usable: bool) -> CommunicationBinding {
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        CommunicationBinding {
            key: BindingKey::endpoint(iface, &addr, 8080, "/dev"),
            interface: iface.to_string(),
            address: addr,
            family: AddressFamily::Ipv4,
            port: 8080,
            path: "/dev".to_string(),
            usable,
            credential_id: None,
            comm_manager_id: 1,
        }
    }

    fn outgoing(iface: &str, usable: bool) -> OutgoingDiscoveryInfo {
        let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 3702);
        OutgoingDiscoveryInfo {
            key: BindingKey::outgoing(iface, &target),
            interface: iface.to_string(),
            family: AddressFamily::Ipv4,
            target,
            usable,
            proxies: Vec::new(),
        }
    }

    fn registry() -> (BindingRegistry, Arc<MockComm>) {
        let comm = Arc::new(MockComm::default());
        (BindingRegistry::new(Arc::clone(&comm) as _), comm)
    }

    #[test]
    fn test_add_usable_binding_registers_when_running() {
        let (mut registry, comm) = registry();
        registry.start();
        let mut pending = PendingAnnouncements::default();

        registry
            .add_binding(binding("eth0", true), false, false, &mut pending)
            .expect("should add");

        assert_eq!(comm.registered.lock().len(), 1);
        assert!(pending.changed);
        assert_eq!(registry.stats().communication_up, 1);
    }

    #[test]
    fn test_add_binding_deferred_while_stopped() {
        let (mut registry, comm) = registry();
        let mut pending = PendingAnnouncements::default();

        registry
            .add_binding(binding("eth0", true), false, false, &mut pending)
            .expect("should add");

        // Filed as usable but not registered until start
        assert!(comm.registered.lock().is_empty());
        assert_eq!(registry.stats().communication_up, 1);

        registry.start();
        assert_eq!(comm.registered.lock().len(), 1);
    }

    #[test]
    fn test_add_unusable_binding_not_registered() {
        let (mut registry, comm) = registry();
        registry.start();
        let mut pending = PendingAnnouncements::default();

        registry
            .add_binding(binding("eth0", false), false, false, &mut pending)
            .expect("should add");

        assert!(comm.registered.lock().is_empty());
        assert!(!pending.changed);
        assert_eq!(registry.stats().communication_down, 1);
    }

    #[test]
    fn test_duplicate_binding_rejected_original_kept() {
        let (mut registry, _) = registry();
        let mut pending = PendingAnnouncements::default();

        registry
            .add_binding(binding("eth0", true), false, false, &mut pending)
            .expect("should add");
        let before = registry.stats();

        let err = registry.add_binding(binding("eth0", true), false, false, &mut pending);
        assert!(matches!(err, Err(Error::DuplicateBinding(_))));
        assert_eq!(registry.stats(), before);
    }

    #[test]
    fn test_registration_failure_rolls_back() {
        let (mut registry, comm) = registry();
        registry.start();
        comm.fail_register.store(true, Ordering::SeqCst);
        let mut pending = PendingAnnouncements::default();

        let err = registry.add_binding(binding("eth0", true), false, false, &mut pending);

        assert!(err.is_err());
        assert!(!pending.changed);
        assert_eq!(registry.stats().communication_up, 0);
        assert_eq!(registry.stats().communication_down, 0);
    }

    #[test]
    fn test_expansion_derives_discovery_and_outgoing() {
        let (mut registry, comm) = registry();
        comm.derive_discovery.store(true, Ordering::SeqCst);
        comm.derive_outgoing.store(true, Ordering::SeqCst);
        let mut pending = PendingAnnouncements::default();

        registry
            .add_binding(binding("eth0", true), true, true, &mut pending)
            .expect("should add");

        let stats = registry.stats();
        assert_eq!(stats.discovery_up, 1);
        assert_eq!(stats.outgoing_up, 1);
        assert_eq!(pending.added_infos.len(), 1);
    }

    #[test]
    fn test_remove_binding_unregisters_and_marks_changed() {
        let (mut registry, comm) = registry();
        registry.start();
        let b = binding("eth0", true);
        let key = b.key.clone();
        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(b, false, false, &mut pending)
            .expect("should add");

        let mut pending = PendingAnnouncements::default();
        assert!(registry.remove_binding(&key, &mut pending));
        assert!(pending.changed);
        assert_eq!(comm.unregistered.lock().len(), 1);
        assert!(!registry.remove_binding(&key, &mut pending));
    }

    #[test]
    fn test_up_down_transitions_move_partitions() {
        let (mut registry, comm) = registry();
        registry.start();
        let b = binding("eth0", true);
        let key = b.key.clone();
        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(b, false, false, &mut pending)
            .expect("should add");

        let mut pending = PendingAnnouncements::default();
        assert!(registry.binding_became_unusable(&key, &mut pending));
        assert_eq!(registry.stats().communication_down, 1);
        assert_eq!(comm.unregistered.lock().len(), 1);
        assert!(pending.changed);

        let mut pending = PendingAnnouncements::default();
        assert!(registry.binding_became_usable(&key, &mut pending));
        assert_eq!(registry.stats().communication_up, 1);
        // Registered twice: once on add, once on re-activation
        assert_eq!(comm.registered.lock().len(), 2);
    }

    #[test]
    fn test_reactivation_failure_keeps_binding_down() {
        let (mut registry, comm) = registry();
        registry.start();
        let b = binding("eth0", true);
        let key = b.key.clone();
        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(b, false, false, &mut pending)
            .expect("should add");
        registry.binding_became_unusable(&key, &mut pending);

        comm.fail_register.store(true, Ordering::SeqCst);
        let mut pending = PendingAnnouncements::default();
        assert!(!registry.binding_became_usable(&key, &mut pending));
        assert_eq!(registry.stats().communication_down, 1);
        assert!(!pending.changed);
    }

    #[test]
    fn test_outgoing_info_lifecycle() {
        let (mut registry, _) = registry();
        let info = outgoing("eth0", true);
        let key = info.key.clone();

        let mut pending = PendingAnnouncements::default();
        registry
            .add_outgoing_info(info, &mut pending)
            .expect("should add");
        assert_eq!(pending.added_infos, vec![key.clone()]);

        let mut pending = PendingAnnouncements::default();
        assert!(registry.outgoing_info_became_unusable(&key, &mut pending));
        assert_eq!(pending.removed_infos.len(), 1);
        assert!(pending.removed_infos[0].usable);

        let mut pending = PendingAnnouncements::default();
        assert!(registry.outgoing_info_became_usable(&key, &mut pending));
        assert_eq!(pending.added_infos, vec![key.clone()]);

        let mut pending = PendingAnnouncements::default();
        assert!(registry.remove_outgoing_info(&key, &mut pending));
        assert_eq!(pending.removed_infos.len(), 1);
    }

    #[test]
    fn test_clear_while_running_is_illegal() {
        let (mut registry, _) = registry();
        registry.start();
        assert!(matches!(registry.clear(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_clear_detaches_and_empties() {
        let (mut registry, _) = registry();
        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(binding("eth0", true), false, false, &mut pending)
            .expect("should add");
        registry.add_observer(Arc::new(CountingObserver::default()));

        registry.clear().expect("should clear");
        assert!(!registry.has_communication_bindings());
        assert_eq!(registry.stats(), RegistryStats::default());
    }

    #[test]
    fn test_outgoing_auto_bindings_tracked_separately() {
        use crate::binding::{AutoBindingPolicy, FnSink};

        let (mut registry, _) = registry();
        let engine = Arc::new(AutoBindingEngine::new(AutoBindingPolicy::new()));
        let comm_listener = engine.register_listener(Arc::new(FnSink::new()), None, false);
        let out_listener = engine.register_listener(Arc::new(FnSink::new()), None, true);

        registry.add_auto_binding(AutoBindingEntry {
            engine: Arc::clone(&engine),
            listener: comm_listener,
            for_outgoing: false,
        });
        registry.add_auto_binding(AutoBindingEntry {
            engine,
            listener: out_listener,
            for_outgoing: true,
        });

        assert_eq!(registry.stats().auto_bindings, 2);
        assert_eq!(registry.stats().outgoing_auto_bindings, 1);
        assert_eq!(registry.outgoing_auto_bindings().count(), 1);
    }

    #[test]
    fn test_start_demotes_failing_bindings() {
        let (mut registry, comm) = registry();
        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(binding("eth0", true), false, false, &mut pending)
            .expect("should add");

        comm.fail_register.store(true, Ordering::SeqCst);
        registry.start();

        assert_eq!(registry.stats().communication_up, 0);
        assert_eq!(registry.stats().communication_down, 1);
    }

    #[derive(Default)]
    struct CountingObserver {
        added: Mutex<Vec<BindingKey>>,
        removed: Mutex<Vec<BindingKey>>,
        ups: Mutex<Vec<BindingKey>>,
        downs: Mutex<Vec<BindingKey>>,
        batch_starts: std::sync::atomic::AtomicUsize,
        batch_ends: std::sync::atomic::AtomicUsize,
    }

    impl RegistryObserver for CountingObserver {
        fn binding_added(&self, binding: &CommunicationBinding) {
            self.added.lock().push(binding.key.clone());
        }

        fn binding_removed(&self, key: &BindingKey) {
            self.removed.lock().push(key.clone());
        }

        fn binding_up(&self, key: &BindingKey) {
            self.ups.lock().push(key.clone());
        }

        fn binding_down(&self, key: &BindingKey) {
            self.downs.lock().push(key.clone());
        }

        fn start_batch(&self) {
            self.batch_starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop_batch(&self) {
            self.batch_ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observers_see_transitions() {
        let (mut registry, _) = registry();
        registry.start();
        let observer = Arc::new(CountingObserver::default());
        registry.add_observer(observer.clone());

        let b = binding("eth0", true);
        let key = b.key.clone();
        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(b, false, false, &mut pending)
            .expect("should add");
        registry.binding_became_unusable(&key, &mut pending);
        registry.binding_became_usable(&key, &mut pending);
        registry.remove_binding(&key, &mut pending);

        assert_eq!(observer.added.lock().len(), 1);
        assert_eq!(observer.downs.lock().len(), 1);
        assert_eq!(observer.ups.lock().len(), 1);
        assert_eq!(observer.removed.lock().len(), 1);
    }

    #[test]
    fn test_batch_brackets_reach_observers() {
        let (mut registry, _) = registry();
        let observer = Arc::new(CountingObserver::default());
        registry.add_observer(observer.clone());

        registry.notify_batch_start();
        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(binding("eth0", true), false, false, &mut pending)
            .expect("should add");
        registry.notify_batch_end();

        assert_eq!(observer.batch_starts.load(Ordering::SeqCst), 1);
        assert_eq!(observer.batch_ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_removed_observer_not_notified() {
        let (mut registry, _) = registry();
        let observer = Arc::new(CountingObserver::default());
        let id = registry.add_observer(observer.clone());
        assert!(registry.remove_observer(id));

        let mut pending = PendingAnnouncements::default();
        registry
            .add_binding(binding("eth0", true), false, false, &mut pending)
            .expect("should add");
        assert!(observer.added.lock().is_empty());
    }

    #[test]
    fn test_outgoing_infos_by_key() {
        let (mut registry, _) = registry();
        let mut pending = PendingAnnouncements::default();
        let a = outgoing("eth0", true);
        let b = outgoing("eth1", true);
        let key_a = a.key.clone();
        registry.add_outgoing_info(a, &mut pending).expect("add a");
        registry.add_outgoing_info(b, &mut pending).expect("add b");

        let infos = registry.outgoing_infos_by_key(std::slice::from_ref(&key_a));
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].key, key_a);
    }
}
