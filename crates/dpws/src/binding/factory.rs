// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pure construction of bindings from interface + address + policy.

use std::net::SocketAddr;

use crate::config::{discovery_group, DISCOVERY_PORT};
use crate::net::{AddressFamily, NetworkInterface};
use crate::{Error, Result};

use super::types::{BindingKey, CommunicationBinding, DiscoveryBinding, OutgoingDiscoveryInfo};

/// Stateless factory for bindings and outgoing discovery infos.
///
/// All constructors are pure: the same inputs always yield the same
/// binding with the same key. Validation failures are reported as
/// configuration errors; the caller decides whether to skip or abort.
pub struct EndpointFactory;

impl EndpointFactory {
    /// Build a transport binding for an interface address.
    ///
    /// Fails if the interface carries no address in the requested family.
    pub fn communication_binding(
        iface: &NetworkInterface,
        family: AddressFamily,
        port: u16,
        path: &str,
        credential_id: Option<u64>,
        comm_manager_id: u32,
    ) -> Result<CommunicationBinding> {
        let address = iface.first_address_in(family).ok_or_else(|| {
            Error::BindingConstruction(format!(
                "interface {} has no {} address",
                iface.name, family
            ))
        })?;

        Ok(CommunicationBinding {
            key: BindingKey::endpoint(&iface.name, &address, port, path),
            interface: iface.name.clone(),
            address,
            family,
            port,
            path: path.to_string(),
            usable: iface.up,
            credential_id,
            comm_manager_id,
        })
    }

    /// Build an inbound discovery binding on the well-known group.
    pub fn discovery_binding(
        iface: &NetworkInterface,
        family: AddressFamily,
    ) -> Result<DiscoveryBinding> {
        if !iface.multicast {
            return Err(Error::BindingConstruction(format!(
                "interface {} is not multicast-capable",
                iface.name
            )));
        }

        let group = SocketAddr::new(discovery_group(family), DISCOVERY_PORT);
        Ok(DiscoveryBinding {
            key: BindingKey::discovery(&iface.name, &group),
            interface: iface.name.clone(),
            family,
            group,
            usable: iface.up,
        })
    }

    /// Build an outgoing discovery info targeting the well-known group.
    pub fn outgoing_info(
        iface: &NetworkInterface,
        family: AddressFamily,
    ) -> Result<OutgoingDiscoveryInfo> {
        if !iface.multicast {
            return Err(Error::BindingConstruction(format!(
                "interface {} is not multicast-capable",
                iface.name
            )));
        }

        let target = SocketAddr::new(discovery_group(family), DISCOVERY_PORT);
        Ok(OutgoingDiscoveryInfo {
            key: BindingKey::outgoing(&iface.name, &target),
            interface: iface.name.clone(),
            family,
            target,
            usable: iface.up,
            proxies: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn eth0() -> NetworkInterface {
        NetworkInterface::new("eth0", 2).with_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
    }

    #[test]
    fn test_communication_binding() {
        let b = EndpointFactory::communication_binding(
            &eth0(),
            AddressFamily::Ipv4,
            8080,
            "/dev",
            None,
            1,
        )
        .expect("should build");

        assert_eq!(b.interface, "eth0");
        assert_eq!(b.port, 8080);
        assert_eq!(b.path, "/dev");
        assert!(b.usable);
    }

    #[test]
    fn test_communication_binding_is_pure() {
        let a = EndpointFactory::communication_binding(
            &eth0(),
            AddressFamily::Ipv4,
            8080,
            "/dev",
            None,
            1,
        )
        .expect("should build");
        let b = EndpointFactory::communication_binding(
            &eth0(),
            AddressFamily::Ipv4,
            8080,
            "/dev",
            None,
            1,
        )
        .expect("should build");
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_communication_binding_missing_family() {
        let err =
            EndpointFactory::communication_binding(&eth0(), AddressFamily::Ipv6, 0, "/", None, 1);
        assert!(err.is_err());
    }

    #[test]
    fn test_communication_binding_down_interface() {
        let iface = eth0().with_up(false);
        let b = EndpointFactory::communication_binding(
            &iface,
            AddressFamily::Ipv4,
            0,
            "/dev",
            None,
            1,
        )
        .expect("should build");
        assert!(!b.usable);
    }

    #[test]
    fn test_discovery_binding() {
        let d = EndpointFactory::discovery_binding(&eth0(), AddressFamily::Ipv4)
            .expect("should build");
        assert_eq!(d.group.port(), DISCOVERY_PORT);
        assert!(d.group.ip().is_multicast());
    }

    #[test]
    fn test_discovery_binding_no_multicast() {
        let iface = eth0().with_multicast(false);
        assert!(EndpointFactory::discovery_binding(&iface, AddressFamily::Ipv4).is_err());
    }

    #[test]
    fn test_outgoing_info() {
        let info =
            EndpointFactory::outgoing_info(&eth0(), AddressFamily::Ipv4).expect("should build");
        assert!(info.usable);
        assert!(info.proxies.is_empty());
        assert!(info.target.ip().is_multicast());
    }
}
