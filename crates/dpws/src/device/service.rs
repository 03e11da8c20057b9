// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hosted services: consumers of a device's transport surface.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::binding::{BindingKey, CommunicationBinding, RegistryObserver};

/// A service hosted on a device.
///
/// The service does not own bindings; it mirrors its device's transport
/// surface rebased onto the service path, staying current by observing
/// the device's binding registry. Request dispatch is the transport
/// layer's job and not modeled here.
pub struct HostedService {
    id: String,
    path: String,
    /// Rebased bindings keyed by the device binding's key.
    bindings: Mutex<HashMap<BindingKey, CommunicationBinding>>,
}

impl HostedService {
    /// Create a service with an id and a path suffix (e.g. `/svc1`).
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Service id, unique within its device.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Service path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Snapshot of the service's current bindings, ordered by key.
    pub fn bindings(&self) -> Vec<CommunicationBinding> {
        let mut bindings: Vec<CommunicationBinding> =
            self.bindings.lock().values().cloned().collect();
        bindings.sort_by(|a, b| a.key.cmp(&b.key));
        bindings
    }

    /// Transport addresses of the service's usable bindings.
    pub fn xaddrs(&self) -> Vec<String> {
        let mut xaddrs: Vec<String> = self
            .bindings
            .lock()
            .values()
            .filter(|b| b.usable)
            .map(|b| b.xaddr())
            .collect();
        xaddrs.sort();
        xaddrs
    }

    /// Forget everything; called when the service is detached.
    pub fn detach(&self) {
        self.bindings.lock().clear();
    }
}

impl RegistryObserver for HostedService {
    fn binding_added(&self, binding: &CommunicationBinding) {
        let rebased = binding.with_path(&self.path);
        log::debug!("[Service {}] surface added: {}", self.id, rebased.key);
        self.bindings.lock().insert(binding.key.clone(), rebased);
    }

    fn binding_removed(&self, key: &BindingKey) {
        if self.bindings.lock().remove(key).is_some() {
            log::debug!("[Service {}] surface removed: {}", self.id, key);
        }
    }

    fn binding_up(&self, key: &BindingKey) {
        if let Some(binding) = self.bindings.lock().get_mut(key) {
            binding.usable = true;
        }
    }

    fn binding_down(&self, key: &BindingKey) {
        if let Some(binding) = self.bindings.lock().get_mut(key) {
            binding.usable = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::AddressFamily;
    use std::net::{IpAddr, Ipv4Addr};

    fn device_binding(usable: bool) -> CommunicationBinding {
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        CommunicationBinding {
            key: BindingKey::endpoint("eth0", &addr, 8080, "/dev"),
            interface: "eth0".to_string(),
            address: addr,
            family: AddressFamily::Ipv4,
            port: 8080,
            path: "/dev".to_string(),
            usable,
            credential_id: None,
            comm_manager_id: 1,
        }
    }

    #[test]
    fn test_service_rebases_device_bindings() {
        let service = HostedService::new("svc1", "/svc1");
        service.binding_added(&device_binding(true));

        let bindings = service.bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].path, "/svc1");
        assert_eq!(service.xaddrs(), vec!["http://10.0.0.5:8080/svc1"]);
    }

    #[test]
    fn test_service_tracks_removal() {
        let service = HostedService::new("svc1", "/svc1");
        let binding = device_binding(true);
        service.binding_added(&binding);
        service.binding_removed(&binding.key);
        assert!(service.bindings().is_empty());
    }

    #[test]
    fn test_up_down_toggles_usability() {
        let service = HostedService::new("svc1", "/svc1");
        let binding = device_binding(true);
        service.binding_added(&binding);

        service.binding_down(&binding.key);
        assert!(service.xaddrs().is_empty());

        service.binding_up(&binding.key);
        assert_eq!(service.xaddrs().len(), 1);
    }

    #[test]
    fn test_detach_clears() {
        let service = HostedService::new("svc1", "/svc1");
        service.binding_added(&device_binding(true));
        service.detach();
        assert!(service.bindings().is_empty());
    }
}
