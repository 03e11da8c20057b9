// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binding and outgoing-discovery-info types.

use std::net::{IpAddr, SocketAddr};

use crate::net::AddressFamily;

/// Opaque stable identity of a binding or outgoing discovery info.
///
/// Derived from interface + address + port + path for endpoint bindings,
/// or from the discovery domain for discovery-direction entries. Two
/// bindings with the same key are the same logical endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey(String);

impl BindingKey {
    /// Key for a transport endpoint.
    pub fn endpoint(iface: &str, addr: &IpAddr, port: u16, path: &str) -> Self {
        Self(format!("{}/{}:{}{}", iface, addr, port, path))
    }

    /// Key for a discovery domain on an interface.
    pub fn discovery(iface: &str, group: &SocketAddr) -> Self {
        Self(format!("disc/{}%{}", group, iface))
    }

    /// Key for an outgoing discovery domain on an interface.
    pub fn outgoing(iface: &str, group: &SocketAddr) -> Self {
        Self(format!("out/{}%{}", group, iface))
    }

    /// Raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A concrete transport endpoint through which application traffic is
/// received.
#[derive(Clone, Debug)]
pub struct CommunicationBinding {
    /// Stable identity.
    pub key: BindingKey,

    /// Interface the binding lives on.
    pub interface: String,

    /// Bound address.
    pub address: IpAddr,

    /// Address family of `address`.
    pub family: AddressFamily,

    /// Port (0 = ephemeral, assigned by the transport layer).
    pub port: u16,

    /// HTTP-style path component of the endpoint.
    pub path: String,

    /// Whether the binding is currently usable.
    pub usable: bool,

    /// Credential reference for the transport layer (None = plain).
    pub credential_id: Option<u64>,

    /// Owning communication manager id.
    pub comm_manager_id: u32,
}

impl CommunicationBinding {
    /// Transport socket address of this binding.
    pub fn transport_address(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Host address string (address without port/path).
    pub fn host_address(&self) -> String {
        match self.address {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        }
    }

    /// Transport address as an http URL string.
    pub fn xaddr(&self) -> String {
        format!("http://{}{}", self.transport_address(), self.path)
    }

    /// Copy of this binding rebased onto a different path.
    ///
    /// Used to materialize per-listener bindings; the key is rederived so
    /// bindings with different paths never collide.
    pub fn with_path(&self, path: &str) -> Self {
        let mut binding = self.clone();
        binding.path = path.to_string();
        binding.key = BindingKey::endpoint(&binding.interface, &binding.address, binding.port, path);
        binding
    }
}

/// An inbound discovery endpoint (multicast listener) on one interface.
#[derive(Clone, Debug)]
pub struct DiscoveryBinding {
    /// Stable identity.
    pub key: BindingKey,

    /// Interface the binding lives on.
    pub interface: String,

    /// Address family.
    pub family: AddressFamily,

    /// Multicast group and port to listen on.
    pub group: SocketAddr,

    /// Whether the binding is currently usable.
    pub usable: bool,
}

/// A discovery domain toward which Hello/Bye are sent.
///
/// Analogous to a binding but discovery-direction only; typically one per
/// interface and address family.
#[derive(Clone, Debug)]
pub struct OutgoingDiscoveryInfo {
    /// Stable identity.
    pub key: BindingKey,

    /// Interface announcements leave through.
    pub interface: String,

    /// Address family.
    pub family: AddressFamily,

    /// Multicast group and port announcements are sent to.
    pub target: SocketAddr,

    /// Whether announcements can currently be sent here.
    pub usable: bool,

    /// Static discovery proxies that also receive announcements.
    pub proxies: Vec<SocketAddr>,
}
