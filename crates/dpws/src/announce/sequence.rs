// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monotonic application sequencing for discovery messages.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// An (epoch, counter) pair stamped on every outgoing discovery message.
///
/// Receivers use it to discard stale or reordered announcements: a pair
/// compares greater when its epoch is greater, or the epochs are equal
/// and its counter is greater.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct AppSequence {
    /// Instance epoch (wall-clock seconds at the owning entity's start).
    pub instance_id: u64,

    /// Message number within the epoch.
    pub message_number: u32,
}

/// Monotonic counter producing [`AppSequence`] values.
///
/// `reset` is called on every entity start; `next` is lock-free and safe
/// from any thread.
pub struct SequenceCounter {
    instance_id: AtomicU64,
    message_number: AtomicU32,
}

impl SequenceCounter {
    /// Create a counter with the current wall-clock epoch.
    pub fn new() -> Self {
        Self {
            instance_id: AtomicU64::new(wall_clock_seconds()),
            message_number: AtomicU32::new(0),
        }
    }

    /// Start a fresh epoch.
    ///
    /// The epoch never moves backwards even if the wall clock does, so
    /// sequences stay monotonic across restarts within one process.
    pub fn reset(&self) {
        let now = wall_clock_seconds();
        let previous = self.instance_id.load(Ordering::Acquire);
        let epoch = if now > previous { now } else { previous + 1 };
        self.instance_id.store(epoch, Ordering::Release);
        self.message_number.store(0, Ordering::Release);
    }

    /// Next sequence value.
    pub fn next(&self) -> AppSequence {
        AppSequence {
            instance_id: self.instance_id.load(Ordering::Acquire),
            message_number: self.message_number.fetch_add(1, Ordering::AcqRel) + 1,
        }
    }

    /// Current value without advancing.
    pub fn current(&self) -> AppSequence {
        AppSequence {
            instance_id: self.instance_id.load(Ordering::Acquire),
            message_number: self.message_number.load(Ordering::Acquire),
        }
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

fn wall_clock_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_is_strictly_increasing() {
        let counter = SequenceCounter::new();
        let mut previous = counter.next();
        for _ in 0..100 {
            let seq = counter.next();
            assert!(seq > previous);
            previous = seq;
        }
    }

    #[test]
    fn test_reset_starts_new_epoch() {
        let counter = SequenceCounter::new();
        let before = counter.next();
        counter.reset();
        let after = counter.next();
        assert!(after.instance_id > before.instance_id);
        assert_eq!(after.message_number, 1);
    }

    #[test]
    fn test_reset_never_moves_backwards() {
        let counter = SequenceCounter::new();
        let first = counter.next();
        // Two resets in the same wall-clock second must still advance
        counter.reset();
        counter.reset();
        let second = counter.next();
        assert!(second > first);
    }

    #[test]
    fn test_ordering_across_epochs() {
        let a = AppSequence {
            instance_id: 10,
            message_number: 99,
        };
        let b = AppSequence {
            instance_id: 11,
            message_number: 1,
        };
        assert!(b > a);
    }

    #[test]
    fn test_concurrent_next_unique() {
        use std::sync::Arc;

        let counter = Arc::new(SequenceCounter::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                (0..250).map(|_| counter.next()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<AppSequence> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread should not panic"))
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
