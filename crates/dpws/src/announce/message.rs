// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Immutable Hello/Bye announcement messages.
//!
//! Serialization to the wire format is the communication manager's job;
//! these types carry exactly what the serializer needs, already
//! truncated and sequenced.

use std::sync::Arc;

use super::data::DiscoveryData;
use super::sequence::AppSequence;

/// An announcement that a device became (or remains) reachable.
#[derive(Clone, Debug)]
pub struct HelloMessage {
    /// Snapshot of the announced discovery data (types already truncated).
    pub data: Arc<DiscoveryData>,

    /// Types announced, capped by priority; may be fewer than `data.types`.
    pub types: Vec<String>,

    /// Application sequence stamped on this message.
    pub sequence: AppSequence,
}

/// An announcement that a device is leaving the network.
///
/// Carries no types; receivers match on the endpoint reference alone.
#[derive(Clone, Debug)]
pub struct ByeMessage {
    /// Snapshot of the discovery data at send time.
    pub data: Arc<DiscoveryData>,

    /// Application sequence stamped on this message.
    pub sequence: AppSequence,
}

impl HelloMessage {
    /// Endpoint reference this Hello announces.
    pub fn endpoint_reference(&self) -> &str {
        &self.data.endpoint_reference
    }

    /// Metadata version carried by this Hello.
    pub fn metadata_version(&self) -> u64 {
        self.data.metadata_version
    }
}

impl ByeMessage {
    /// Endpoint reference this Bye retracts.
    pub fn endpoint_reference(&self) -> &str {
        &self.data.endpoint_reference
    }
}
