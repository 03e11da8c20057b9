// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DPWS - Device Profile for Web Services hosting stack
//!
//! The binding lifecycle and network-reactive announcement engine of a
//! DPWS/WS-Discovery device host: devices announce themselves on the
//! network and re-announce whenever the set of usable endpoints changes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dpws::{Device, HostedService, HostingConfig, HostingContext, Result};
//! # fn transport() -> Arc<dyn dpws::CommunicationManager> { unimplemented!() }
//!
//! fn main() -> Result<()> {
//!     let ctx = HostingContext::new(transport(), HostingConfig::default());
//!     let device = Device::new(ctx);
//!     device.add_service(Arc::new(HostedService::new("svc1", "/svc1")))?;
//!
//!     // One Hello goes out; bindings are auto-generated per interface
//!     device.start()?;
//!
//!     // ... serve until shutdown; a Bye goes out on stop
//!     device.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                            Device                                  |
//! |   BindingRegistry | DiscoveryData | UpdateCoalescer | Dispatcher   |
//! +--------------------------------------------------------------------+
//! |                       Auto-binding layer                           |
//! |   AutoBindingEngine | EndpointFactory | reference-counted containers|
//! +--------------------------------------------------------------------+
//! |                       Network monitoring                           |
//! |   NetworkMonitor | MonitorPump | interface/address change events   |
//! +--------------------------------------------------------------------+
//! |              CommunicationManager (collaborator)                   |
//! |   socket/HTTP/UDP transports, SOAP serialization, Hello/Bye wire   |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Device`] | Hosting entity owning bindings and the announcement lifecycle |
//! | [`HostedService`] | Service mirroring its device's transport surface |
//! | [`AutoBindingEngine`] | Generates/destroys bindings as interfaces change |
//! | [`BindingRegistry`] | Partitioned authoritative record of an entity's bindings |
//! | [`UpdateCoalescer`] | Batches mutations into one Hello/Bye per update |
//! | [`CommunicationManager`] | Transport collaborator driven by the stack |
//!
//! ## Modules Overview
//!
//! - [`device`] - Device and hosted services (start here)
//! - [`binding`] - Binding types, factory, auto-generation, registry
//! - [`announce`] - Discovery data, sequencing, coalescing, Hello/Bye
//! - [`net`] - Interface model, change events, monitors
//! - [`config`] - Hosting configuration and discovery constants

/// Announcement engine (discovery data, coalescing, Hello/Bye fan-out).
pub mod announce;
/// Binding lifecycle (types, factory, auto-binding engine, registry).
pub mod binding;
/// Transport collaborator interface.
pub mod comm;
/// Hosting configuration and well-known discovery constants.
pub mod config;
/// Device hosting (devices and hosted services).
pub mod device;
/// Network interface monitoring.
pub mod net;

// Top-level re-exports
pub use announce::{
    AnnouncementDispatcher, AppSequence, ByeMessage, DiscoveryData, HelloMessage,
    PendingAnnouncements, QualifiedType, SequenceCounter, UpdateCoalescer,
};
pub use binding::{
    AutoBindingEngine, AutoBindingPolicy, BindingKey, BindingRegistry, CommunicationBinding,
    DiscoveryBinding, EndpointFactory, OutgoingDiscoveryInfo,
};
pub use comm::{CommunicationManager, ProtocolVersion};
pub use config::HostingConfig;
pub use device::{Device, HostedService, HostingContext};
pub use net::{NetworkEvent, NetworkInterface, NetworkMonitor, SystemMonitor};

/// Errors reported by the hosting stack.
///
/// Binding-level failures (transport registration, interface flaps) are
/// absorbed and logged where they occur; only illegal API usage and
/// exhausted recovery paths surface through this type.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A binding with this key already exists; the original is kept.
    DuplicateBinding(String),
    /// A service with this id is already hosted on the device.
    DuplicateService(String),
    /// Invalid state for the requested operation.
    InvalidState(String),
    /// A binding could not be constructed from the given interface/policy.
    BindingConstruction(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O failure reported by the transport layer.
    Io(String),

    // ========================================================================
    // Concurrency Errors
    // ========================================================================
    /// A lock could not be acquired within the retry budget.
    LockContention(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Configuration
            Error::DuplicateBinding(key) => write!(f, "Duplicate binding: {}", key),
            Error::DuplicateService(id) => write!(f, "Duplicate service id: {}", id),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::BindingConstruction(msg) => write!(f, "Binding construction failed: {}", msg),
            // Transport
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
            // Concurrency
            Error::LockContention(msg) => write!(f, "Lock contention: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
