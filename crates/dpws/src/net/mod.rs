// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network interface monitoring.
//!
//! This module provides the consumed side of network change detection:
//!
//! - **Interface model**: name, index, flags, and per-family addresses
//! - **Change events**: interface up/down, address add/remove/change,
//!   multicast capability change
//! - **Monitors**: the [`NetworkMonitor`] trait plus a poll-based
//!   getifaddrs implementation and a background pump thread
//!
//! The auto-binding engine consumes these events; nothing here mutates
//! system state.

pub mod event;
pub mod interface;
pub mod monitor;
pub mod pump;
pub mod sys;

// Re-exports
pub use event::{NetworkEvent, NetworkEventSink};
pub use interface::{AddressFamily, InterfaceFilter, NetworkInterface};
pub use monitor::{diff_snapshots, NetworkMonitor, SystemMonitor};
pub use pump::MonitorPump;
pub use sys::{interface_index, system_interfaces};
