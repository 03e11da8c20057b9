// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network change events consumed by the auto-binding engine.

use std::net::IpAddr;

use super::interface::NetworkInterface;

/// A network change event raised by a [`super::NetworkMonitor`].
///
/// Events for a single interface are delivered in the order the monitor
/// observed them; events for different interfaces may interleave.
#[derive(Clone, Debug)]
pub enum NetworkEvent {
    /// An interface came up (or became visible for the first time).
    InterfaceUp(NetworkInterface),

    /// An interface went down or disappeared.
    InterfaceDown(String),

    /// Addresses were added to an interface.
    AddressesAdded(String, Vec<IpAddr>),

    /// Addresses were removed from an interface.
    AddressesRemoved(String, Vec<IpAddr>),

    /// Addresses were replaced on an interface.
    AddressesChanged {
        /// Interface name.
        name: String,
        /// Addresses that appeared.
        added: Vec<IpAddr>,
        /// Addresses that disappeared.
        removed: Vec<IpAddr>,
    },

    /// Multicast capability of an interface changed.
    MulticastCapabilityChanged(String, bool),
}

impl NetworkEvent {
    /// Name of the interface this event concerns.
    pub fn interface_name(&self) -> &str {
        match self {
            NetworkEvent::InterfaceUp(iface) => &iface.name,
            NetworkEvent::InterfaceDown(name)
            | NetworkEvent::AddressesAdded(name, _)
            | NetworkEvent::AddressesRemoved(name, _)
            | NetworkEvent::MulticastCapabilityChanged(name, _) => name,
            NetworkEvent::AddressesChanged { name, .. } => name,
        }
    }

    /// Check if this is an interface-down event.
    pub fn is_down(&self) -> bool {
        matches!(self, NetworkEvent::InterfaceDown(_))
    }
}

/// Sink for network events.
///
/// Implemented by the auto-binding engine; the monitor pump delivers
/// every polled event here.
pub trait NetworkEventSink: Send + Sync {
    /// Handle one network event.
    fn handle_event(&self, event: NetworkEvent);
}
