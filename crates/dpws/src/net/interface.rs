// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network interface model and name filtering.

use std::net::IpAddr;

/// IP address family selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4.
    Ipv4,

    /// IPv6.
    Ipv6,
}

impl AddressFamily {
    /// Get the family of an address.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Check whether an address belongs to this family.
    pub fn matches(&self, addr: &IpAddr) -> bool {
        Self::of(addr) == *self
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Snapshot of one network interface as seen by the monitor.
#[derive(Clone, Debug)]
pub struct NetworkInterface {
    /// Interface name (e.g. "eth0").
    pub name: String,

    /// OS interface index (0 if unknown).
    pub index: u32,

    /// Interface is administratively and operationally up.
    pub up: bool,

    /// Interface is a loopback interface.
    pub loopback: bool,

    /// Interface is multicast-capable.
    pub multicast: bool,

    /// Addresses currently assigned to the interface.
    pub addresses: Vec<IpAddr>,
}

impl NetworkInterface {
    /// Create a new interface snapshot with no addresses.
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
            up: true,
            loopback: false,
            multicast: true,
            addresses: Vec::new(),
        }
    }

    /// Set the loopback flag.
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Set the multicast capability flag.
    pub fn with_multicast(mut self, multicast: bool) -> Self {
        self.multicast = multicast;
        self
    }

    /// Set the up flag.
    pub fn with_up(mut self, up: bool) -> Self {
        self.up = up;
        self
    }

    /// Add an address.
    pub fn with_address(mut self, addr: IpAddr) -> Self {
        if !self.addresses.contains(&addr) {
            self.addresses.push(addr);
        }
        self
    }

    /// Iterate addresses in a given family.
    pub fn addresses_in(&self, family: AddressFamily) -> impl Iterator<Item = &IpAddr> {
        self.addresses.iter().filter(move |a| family.matches(a))
    }

    /// First address in a given family, if any.
    pub fn first_address_in(&self, family: AddressFamily) -> Option<IpAddr> {
        self.addresses_in(family).next().copied()
    }

    /// Check whether the interface carries an address in the family.
    pub fn has_address_in(&self, family: AddressFamily) -> bool {
        self.addresses_in(family).next().is_some()
    }
}

/// Filter for network interface names.
#[derive(Clone, Debug, Default)]
pub struct InterfaceFilter {
    /// Include only these interfaces (empty = all).
    pub include: Vec<String>,

    /// Exclude these interfaces.
    pub exclude: Vec<String>,
}

impl InterfaceFilter {
    /// Create a filter that accepts all interfaces.
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific interfaces only.
    pub fn only(interfaces: Vec<String>) -> Self {
        Self {
            include: interfaces,
            ..Default::default()
        }
    }

    /// Add an interface to exclude.
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.exclude.push(name.into());
        self
    }

    /// Check if an interface name matches the filter.
    pub fn matches(&self, name: &str) -> bool {
        if self.exclude.iter().any(|e| e == name) {
            return false;
        }

        if !self.include.is_empty() {
            return self.include.iter().any(|i| i == name);
        }

        true
    }
}
