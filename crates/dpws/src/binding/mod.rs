// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binding lifecycle: types, construction, auto-generation, and the
//! per-entity registry.
//!
//! A binding is a concrete endpoint (address, port, path, or discovery
//! group) through which traffic flows. Explicit bindings are supplied by
//! the owner; auto-bindings are generated from a policy by the
//! [`AutoBindingEngine`] as interfaces come and go.

pub mod auto;
pub mod factory;
pub mod registry;
pub mod types;

// Re-exports
pub use auto::{
    AutoBindingEngine, AutoBindingPolicy, BindingContainer, BindingEventSink, EngineStats, FnSink,
    ListenerId,
};
pub use factory::EndpointFactory;
pub use registry::{
    AutoBindingEntry, BindingRegistry, ObserverId, RegistryObserver, RegistryStats,
};
pub use types::{BindingKey, CommunicationBinding, DiscoveryBinding, OutgoingDiscoveryInfo};
