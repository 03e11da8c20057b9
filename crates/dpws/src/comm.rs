// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport collaborator interface.
//!
//! The hosting stack never opens sockets or serializes SOAP itself; it
//! drives a [`CommunicationManager`] that owns the wire. Everything here
//! is synchronous and expected to fail fast; retry policy lives on the
//! other side of the trait.

use crate::announce::{ByeMessage, HelloMessage};
use crate::binding::{CommunicationBinding, DiscoveryBinding, OutgoingDiscoveryInfo};
use crate::Result;

/// A discovery protocol version. One Hello/Bye is built and sent per
/// supported version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// WS-Discovery as profiled by DPWS 2006.
    Dpws2006,
    /// WS-Discovery 1.1 / DPWS 1.1.
    Dpws11,
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::Dpws2006 => write!(f, "DPWS2006"),
            ProtocolVersion::Dpws11 => write!(f, "DPWS1.1"),
        }
    }
}

/// Transport layer driven by the hosting stack.
pub trait CommunicationManager: Send + Sync {
    /// Activate a transport binding (open listener, claim port).
    fn register_binding(&self, binding: &CommunicationBinding) -> Result<()>;

    /// Deactivate a transport binding.
    fn unregister_binding(&self, binding: &CommunicationBinding) -> Result<()>;

    /// Activate an inbound discovery binding (join multicast group).
    fn register_discovery(&self, binding: &DiscoveryBinding) -> Result<()>;

    /// Deactivate an inbound discovery binding.
    fn unregister_discovery(&self, binding: &DiscoveryBinding) -> Result<()>;

    /// Discovery bindings matching a transport binding's interface.
    fn derive_discovery_bindings(&self, binding: &CommunicationBinding) -> Vec<DiscoveryBinding>;

    /// Outgoing discovery infos matching a transport binding's interface.
    ///
    /// `include_xaddrs` controls whether announcements through these infos
    /// carry the binding's transport address.
    fn derive_outgoing_infos(
        &self,
        binding: &CommunicationBinding,
        include_xaddrs: bool,
        credential_id: Option<u64>,
    ) -> Vec<OutgoingDiscoveryInfo>;

    /// Protocol versions this transport speaks.
    fn supported_versions(&self) -> Vec<ProtocolVersion>;

    /// Send a Hello toward one discovery domain.
    fn send_hello(
        &self,
        version: ProtocolVersion,
        hello: &HelloMessage,
        target: &OutgoingDiscoveryInfo,
    ) -> Result<()>;

    /// Send a Bye toward one discovery domain.
    fn send_bye(
        &self,
        version: ProtocolVersion,
        bye: &ByeMessage,
        target: &OutgoingDiscoveryInfo,
    ) -> Result<()>;
}
