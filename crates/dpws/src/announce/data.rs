// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery data: the announced identity of a hosting entity.

use std::sync::Arc;

/// A qualified type announced in Hello messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualifiedType {
    /// Namespace-qualified type name.
    pub name: String,

    /// Relative priority; higher-priority types survive truncation.
    pub priority: i32,
}

impl QualifiedType {
    /// Create a type with default priority 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// The announced identity of a device: endpoint reference, types, scopes,
/// transport addresses, and metadata version.
///
/// While the owning entity is running, this is copy-on-write: mutations go
/// through [`DiscoveryDataHandle`], which clones the inner data on the
/// first mutation of a batch so announcements built from the previous
/// snapshot stay consistent.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryData {
    /// Stable endpoint reference (urn:uuid form).
    pub endpoint_reference: String,

    /// Announced types.
    pub types: Vec<QualifiedType>,

    /// Announced scopes (absolute URIs).
    pub scopes: Vec<String>,

    /// Transport addresses (xAddrs) the entity is reachable on.
    pub xaddrs: Vec<String>,

    /// Metadata version; increases monotonically while the entity runs.
    pub metadata_version: u64,
}

/// Copy-on-write handle around [`DiscoveryData`].
pub struct DiscoveryDataHandle {
    data: Arc<DiscoveryData>,
    /// Whether the current mutation batch has touched the data.
    snapshotted: bool,
}

impl DiscoveryDataHandle {
    /// Wrap initial discovery data.
    pub fn new(data: DiscoveryData) -> Self {
        Self {
            data: Arc::new(data),
            snapshotted: false,
        }
    }

    /// Cheap shared snapshot for building announcements.
    pub fn snapshot(&self) -> Arc<DiscoveryData> {
        Arc::clone(&self.data)
    }

    /// Mutable access; clones the inner data whenever a snapshot is still
    /// held elsewhere, so in-flight announcements never see the mutation.
    pub fn make_mut(&mut self) -> &mut DiscoveryData {
        self.snapshotted = true;
        Arc::make_mut(&mut self.data)
    }

    /// Close the current mutation batch; the next mutation copies again.
    pub fn commit(&mut self) {
        self.snapshotted = false;
    }

    /// Whether the current batch has mutated the data.
    pub fn is_dirty(&self) -> bool {
        self.snapshotted
    }

    /// Bump the metadata version, returning the new value.
    pub fn bump_version(&mut self) -> u64 {
        let data = self.make_mut();
        data.metadata_version += 1;
        data.metadata_version
    }

    /// Set an explicit metadata version.
    pub fn set_version(&mut self, version: u64) {
        self.make_mut().metadata_version = version;
    }
}
