// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network monitor trait and the poll-based system implementation.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

use super::event::NetworkEvent;
use super::interface::{InterfaceFilter, NetworkInterface};
use super::sys;

/// Source of network change events.
///
/// Implementations observe the host's interfaces and report changes as
/// [`NetworkEvent`]s. The engine consumes this trait only; it never
/// manipulates interfaces itself.
pub trait NetworkMonitor: Send {
    /// Poll for changes since the last call.
    ///
    /// Returns an empty vec if nothing changed.
    fn poll_events(&mut self) -> io::Result<Vec<NetworkEvent>>;

    /// Get the current set of usable interfaces.
    fn current_interfaces(&self) -> io::Result<Vec<NetworkInterface>>;

    /// Get monitor name (for logging/debugging).
    fn name(&self) -> &str;

    /// Check if the monitor is event-based (non-blocking poll).
    fn is_event_based(&self) -> bool {
        false
    }
}

impl NetworkMonitor for Box<dyn NetworkMonitor> {
    fn poll_events(&mut self) -> io::Result<Vec<NetworkEvent>> {
        (**self).poll_events()
    }

    fn current_interfaces(&self) -> io::Result<Vec<NetworkInterface>> {
        (**self).current_interfaces()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_event_based(&self) -> bool {
        (**self).is_event_based()
    }
}

/// Poll-based monitor over getifaddrs.
///
/// Diffs successive interface snapshots into change events. Cross-platform
/// but less efficient than an event-based monitor.
pub struct SystemMonitor {
    /// Last snapshot by interface name.
    last: Option<HashMap<String, NetworkInterface>>,

    /// Interface name filter.
    filter: InterfaceFilter,
}

impl SystemMonitor {
    /// Create a new system monitor.
    pub fn new() -> Self {
        Self {
            last: None,
            filter: InterfaceFilter::all(),
        }
    }

    /// Set the interface filter.
    pub fn with_filter(mut self, filter: InterfaceFilter) -> Self {
        self.filter = filter;
        self
    }

    fn snapshot(&self) -> io::Result<HashMap<String, NetworkInterface>> {
        let interfaces = sys::system_interfaces()?;
        Ok(interfaces
            .into_iter()
            .filter(|i| self.filter.matches(&i.name))
            .map(|i| (i.name.clone(), i))
            .collect())
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor for SystemMonitor {
    fn poll_events(&mut self) -> io::Result<Vec<NetworkEvent>> {
        let current = self.snapshot()?;
        let events = match &self.last {
            Some(previous) => diff_snapshots(previous, &current),
            None => {
                // First poll - every up interface is "new"
                current
                    .values()
                    .filter(|i| i.up)
                    .map(|i| NetworkEvent::InterfaceUp(i.clone()))
                    .collect()
            }
        };

        self.last = Some(current);
        Ok(events)
    }

    fn current_interfaces(&self) -> io::Result<Vec<NetworkInterface>> {
        Ok(self.snapshot()?.into_values().filter(|i| i.up).collect())
    }

    fn name(&self) -> &str {
        "getifaddrs-poll"
    }
}

/// Compute change events between two interface snapshots.
pub fn diff_snapshots(
    previous: &HashMap<String, NetworkInterface>,
    current: &HashMap<String, NetworkInterface>,
) -> Vec<NetworkEvent> {
    let mut events = Vec::new();

    for (name, cur) in current {
        match previous.get(name) {
            None => {
                if cur.up {
                    events.push(NetworkEvent::InterfaceUp(cur.clone()));
                }
            }
            Some(prev) => {
                if prev.up && !cur.up {
                    events.push(NetworkEvent::InterfaceDown(name.clone()));
                    continue;
                }
                if !prev.up && cur.up {
                    events.push(NetworkEvent::InterfaceUp(cur.clone()));
                    continue;
                }
                if !cur.up {
                    continue;
                }

                if prev.multicast != cur.multicast {
                    events.push(NetworkEvent::MulticastCapabilityChanged(
                        name.clone(),
                        cur.multicast,
                    ));
                }

                let added: Vec<IpAddr> = cur
                    .addresses
                    .iter()
                    .filter(|a| !prev.addresses.contains(a))
                    .copied()
                    .collect();
                let removed: Vec<IpAddr> = prev
                    .addresses
                    .iter()
                    .filter(|a| !cur.addresses.contains(a))
                    .copied()
                    .collect();

                match (added.is_empty(), removed.is_empty()) {
                    (false, false) => events.push(NetworkEvent::AddressesChanged {
                        name: name.clone(),
                        added,
                        removed,
                    }),
                    (false, true) => {
                        events.push(NetworkEvent::AddressesAdded(name.clone(), added));
                    }
                    (true, false) => {
                        events.push(NetworkEvent::AddressesRemoved(name.clone(), removed));
                    }
                    (true, true) => {}
                }
            }
        }
    }

    for name in previous.keys() {
        if !current.contains_key(name) && previous[name].up {
            events.push(NetworkEvent::InterfaceDown(name.clone()));
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn v4(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn snap(interfaces: Vec<NetworkInterface>) -> HashMap<String, NetworkInterface> {
        interfaces
            .into_iter()
            .map(|i| (i.name.clone(), i))
            .collect()
    }

    #[test]
    fn test_diff_new_interface() {
        let prev = snap(vec![]);
        let cur = snap(vec![NetworkInterface::new("eth0", 2).with_address(v4(5))]);

        let events = diff_snapshots(&prev, &cur);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NetworkEvent::InterfaceUp(_)));
    }

    #[test]
    fn test_diff_interface_gone() {
        let prev = snap(vec![NetworkInterface::new("eth0", 2)]);
        let cur = snap(vec![]);

        let events = diff_snapshots(&prev, &cur);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], NetworkEvent::InterfaceDown(_)));
    }

    #[test]
    fn test_diff_interface_flapped_down() {
        let prev = snap(vec![NetworkInterface::new("eth0", 2)]);
        let cur = snap(vec![NetworkInterface::new("eth0", 2).with_up(false)]);

        let events = diff_snapshots(&prev, &cur);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_down());
    }

    #[test]
    fn test_diff_addresses_added() {
        let prev = snap(vec![NetworkInterface::new("eth0", 2).with_address(v4(5))]);
        let cur = snap(vec![NetworkInterface::new("eth0", 2)
            .with_address(v4(5))
            .with_address(v4(6))]);

        let events = diff_snapshots(&prev, &cur);
        assert_eq!(events.len(), 1);
        match &events[0] {
            NetworkEvent::AddressesAdded(name, addrs) => {
                assert_eq!(name, "eth0");
                assert_eq!(addrs, &vec![v4(6)]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_diff_addresses_changed() {
        let prev = snap(vec![NetworkInterface::new("eth0", 2).with_address(v4(5))]);
        let cur = snap(vec![NetworkInterface::new("eth0", 2).with_address(v4(6))]);

        let events = diff_snapshots(&prev, &cur);
        assert_eq!(events.len(), 1);
        match &events[0] {
            NetworkEvent::AddressesChanged {
                name,
                added,
                removed,
            } => {
                assert_eq!(name, "eth0");
                assert_eq!(added, &vec![v4(6)]);
                assert_eq!(removed, &vec![v4(5)]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_diff_multicast_capability() {
        let prev = snap(vec![NetworkInterface::new("eth0", 2).with_multicast(true)]);
        let cur = snap(vec![NetworkInterface::new("eth0", 2).with_multicast(false)]);

        let events = diff_snapshots(&prev, &cur);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            NetworkEvent::MulticastCapabilityChanged(_, false)
        ));
    }

    #[test]
    fn test_diff_no_change() {
        let prev = snap(vec![NetworkInterface::new("eth0", 2).with_address(v4(5))]);
        let cur = prev.clone();
        assert!(diff_snapshots(&prev, &cur).is_empty());
    }

    #[test]
    fn test_system_monitor_first_poll_reports_up() {
        let mut monitor = SystemMonitor::new();
        let events = monitor.poll_events().expect("poll should succeed");
        // Every event of the first poll is an InterfaceUp
        assert!(events
            .iter()
            .all(|e| matches!(e, NetworkEvent::InterfaceUp(_))));
    }

    #[test]
    fn test_system_monitor_second_poll_quiet() {
        let mut monitor = SystemMonitor::new();
        monitor.poll_events().expect("first poll");
        // Interfaces rarely change between two immediate polls
        let events = monitor.poll_events().expect("second poll");
        assert!(events.is_empty() || events.len() < 3);
    }

    #[test]
    fn test_system_monitor_name() {
        let monitor = SystemMonitor::new();
        assert_eq!(monitor.name(), "getifaddrs-poll");
        assert!(!monitor.is_event_based());
    }
}
