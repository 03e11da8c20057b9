// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OS interface enumeration via getifaddrs.

use std::io;

use super::interface::NetworkInterface;

/// Enumerate the system's network interfaces with their addresses and flags.
///
/// Interfaces that are not up are reported with `up = false` so that the
/// monitor can raise an interface-down event for them.
#[cfg(unix)]
pub fn system_interfaces() -> io::Result<Vec<NetworkInterface>> {
    use std::collections::HashMap;
    use std::ffi::CStr;
    use std::net::IpAddr;

    let mut interfaces: HashMap<String, NetworkInterface> = HashMap::new();
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY: getifaddrs fills `ifaddrs` with a heap-allocated list that
    // stays valid until the matching freeifaddrs call below.
    let ret = unsafe { libc::getifaddrs(&mut ifaddrs) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifa = ifaddrs;
    while !ifa.is_null() {
        // SAFETY: non-null per the loop condition, and the list has not
        // been freed yet.
        let entry = unsafe { &*ifa };

        // SAFETY: ifa_name is a NUL-terminated string owned by the list;
        // copied into an owned String before the list is freed.
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        let flags = entry.ifa_flags as i32;
        let iface = interfaces.entry(name.clone()).or_insert_with(|| {
            NetworkInterface::new(name.clone(), interface_index(&name).unwrap_or(0))
                .with_up(flags & libc::IFF_UP != 0)
                .with_loopback(flags & libc::IFF_LOOPBACK != 0)
                .with_multicast(flags & libc::IFF_MULTICAST != 0)
        });

        if !entry.ifa_addr.is_null() {
            // SAFETY: checked non-null; only sa_family is read here.
            let addr = unsafe { &*entry.ifa_addr };

            let ip_addr = match i32::from(addr.sa_family) {
                libc::AF_INET => {
                    let sockaddr_in = entry.ifa_addr as *const libc::sockaddr_in;
                    // SAFETY: sa_family says this sockaddr is a
                    // sockaddr_in, so the cast and read are in bounds.
                    let ip = unsafe { (*sockaddr_in).sin_addr.s_addr };
                    Some(IpAddr::V4(std::net::Ipv4Addr::from(u32::from_be(ip))))
                }
                libc::AF_INET6 => {
                    let sockaddr_in6 = entry.ifa_addr as *const libc::sockaddr_in6;
                    // SAFETY: sa_family says this sockaddr is a
                    // sockaddr_in6, so the cast and read are in bounds.
                    let ip = unsafe { (*sockaddr_in6).sin6_addr.s6_addr };
                    Some(IpAddr::V6(std::net::Ipv6Addr::from(ip)))
                }
                _ => None,
            };

            if let Some(ip) = ip_addr {
                if !iface.addresses.contains(&ip) {
                    iface.addresses.push(ip);
                }
            }
        }

        ifa = entry.ifa_next;
    }

    // SAFETY: frees the exact list getifaddrs handed out; nothing
    // borrows from it past this point.
    unsafe { libc::freeifaddrs(ifaddrs) };

    Ok(interfaces.into_values().collect())
}

#[cfg(not(unix))]
pub fn system_interfaces() -> io::Result<Vec<NetworkInterface>> {
    // Stub for non-Unix platforms
    Ok(Vec::new())
}

/// Get interface index from name.
#[cfg(unix)]
pub fn interface_index(name: &str) -> io::Result<u32> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid interface name"))?;

    // SAFETY: c_name is NUL-terminated and outlives the call.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };

    if index == 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(index)
}

#[cfg(not(unix))]
pub fn interface_index(_name: &str) -> io::Result<u32> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface index lookup not supported on this platform",
    ))
}
