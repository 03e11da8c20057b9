// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hosting configuration and well-known discovery constants.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use crate::net::AddressFamily;

/// WS-Discovery IPv4 multicast group.
pub const DISCOVERY_GROUP_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// WS-Discovery IPv6 multicast group (link-local scope).
pub const DISCOVERY_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xc);

/// WS-Discovery UDP port.
pub const DISCOVERY_PORT: u16 = 3702;

/// Maximum number of types carried in a Hello.
///
/// Hello messages must stay within the discovery envelope size limit;
/// overflow types are dropped by priority, not wrapped.
pub const MAX_HELLO_TYPES: usize = 5;

/// Well-known discovery multicast group for an address family.
pub fn discovery_group(family: AddressFamily) -> IpAddr {
    match family {
        AddressFamily::Ipv4 => IpAddr::V4(DISCOVERY_GROUP_V4),
        AddressFamily::Ipv6 => IpAddr::V6(DISCOVERY_GROUP_V6),
    }
}

/// Configuration for a hosting stack instance.
#[derive(Clone, Debug)]
pub struct HostingConfig {
    /// Address families enabled by default for auto-bindings.
    pub families: Vec<AddressFamily>,

    /// Fixed port for auto-generated communication bindings (0 = ephemeral).
    pub communication_port: u16,

    /// Poll interval for the network monitor pump.
    pub monitor_poll_interval: Duration,

    /// Suppress loopback interfaces while a non-loopback interface is usable.
    pub suppress_loopback: bool,

    /// Ignore interfaces without multicast capability.
    pub suppress_multicast_disabled: bool,

    /// Maximum attempts for the stop sequence before giving up.
    pub stop_retries: u32,

    /// Delay between stop attempts.
    pub stop_retry_delay: Duration,

    /// Maximum number of types in a Hello message.
    pub max_hello_types: usize,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            families: vec![AddressFamily::Ipv4],
            communication_port: 0,
            monitor_poll_interval: Duration::from_secs(2),
            suppress_loopback: true,
            suppress_multicast_disabled: true,
            stop_retries: 16,
            stop_retry_delay: Duration::from_millis(50),
            max_hello_types: MAX_HELLO_TYPES,
        }
    }
}

impl HostingConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enabled address families.
    pub fn with_families(mut self, families: Vec<AddressFamily>) -> Self {
        self.families = families;
        self
    }

    /// Set the fixed communication port.
    pub fn with_communication_port(mut self, port: u16) -> Self {
        self.communication_port = port;
        self
    }

    /// Set the monitor poll interval.
    pub fn with_monitor_poll_interval(mut self, interval: Duration) -> Self {
        self.monitor_poll_interval = interval;
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

    /// Set the stop retry budget.
    pub fn with_stop_retries(mut self, retries: u32) -> Self {
        self.stop_retries = retries;
        self
    }
}
