// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Announcement engine: discovery data, sequencing, coalescing, and
//! Hello/Bye fan-out.

pub mod coalescer;
pub mod data;
pub mod dispatcher;
pub mod message;
pub mod sequence;

// Re-exports
pub use coalescer::{CommitSink, PendingAnnouncements, UpdateCoalescer};
pub use data::{DiscoveryData, DiscoveryDataHandle, QualifiedType};
pub use dispatcher::AnnouncementDispatcher;
pub use message::{ByeMessage, HelloMessage};
pub use sequence::{AppSequence, SequenceCounter};
