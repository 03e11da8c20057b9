// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Update coalescing: a reentrant exclusive/shared lock whose outermost
//! exclusive release commits the batched announcement side effects.
//!
//! Callers mutate metadata and bindings freely while holding the
//! exclusive lock (re-entering as needed); the coalescer accumulates what
//! the batch did and hands it to the commit sink exactly once, after the
//! lock is fully released, so announcement I/O never runs inside the
//! critical section.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::binding::{BindingKey, OutgoingDiscoveryInfo};

/// What one mutation batch did, from the announcer's point of view.
#[derive(Default)]
pub struct PendingAnnouncements {
    /// Announcement-relevant state changed; a full Hello is due.
    pub changed: bool,

    /// Explicit metadata version set during the batch (suppresses the
    /// automatic increment).
    pub metadata_version_override: Option<u64>,

    /// Outgoing infos added during the batch; if nothing else changed,
    /// only these receive a Hello.
    pub added_infos: Vec<BindingKey>,

    /// Outgoing infos removed during the batch; each receives one Bye.
    pub removed_infos: Vec<OutgoingDiscoveryInfo>,
}

impl PendingAnnouncements {
    /// Whether the batch requires no announcement traffic at all.
    pub fn is_empty(&self) -> bool {
        !self.changed && self.added_infos.is_empty() && self.removed_infos.is_empty()
    }
}

/// Receiver of a completed batch.
pub trait CommitSink: Send + Sync {
    /// Called once per non-empty batch, outside the coalescer's lock.
    fn commit(&self, batch: PendingAnnouncements);
}

impl<F> CommitSink for F
where
    F: Fn(PendingAnnouncements) + Send + Sync,
{
    fn commit(&self, batch: PendingAnnouncements) {
        self(batch)
    }
}

struct CoalescerState {
    owner: Option<ThreadId>,
    depth: u32,
    shared_count: u32,
    /// How many of the shared holds belong to the exclusive owner
    /// itself; those must not block the owner's re-entry.
    owner_shared: u32,
    pending: PendingAnnouncements,
}

impl CoalescerState {
    /// Shared holds that stand in the way of an exclusive acquisition
    /// by `me`.
    fn foreign_shared(&self, reentry: bool) -> u32 {
        if reentry {
            self.shared_count - self.owner_shared
        } else {
            self.shared_count
        }
    }
}

/// Reentrant exclusive/shared lock with deferred announcement commit.
pub struct UpdateCoalescer {
    state: Mutex<CoalescerState>,
    cond: Condvar,
    sink: Mutex<Option<Arc<dyn CommitSink>>>,
}

impl UpdateCoalescer {
    /// Create a coalescer with no commit sink; batches are discarded
    /// until one is set.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoalescerState {
                owner: None,
                depth: 0,
                shared_count: 0,
                owner_shared: 0,
                pending: PendingAnnouncements::default(),
            }),
            cond: Condvar::new(),
            sink: Mutex::new(None),
        }
    }

    /// Install the commit sink.
    pub fn set_commit_sink(&self, sink: Arc<dyn CommitSink>) {
        *self.sink.lock() = Some(sink);
    }

    /// Acquire the exclusive lock, blocking. Re-entrant on the same
    /// thread; side effects run when the outermost guard drops.
    pub fn exclusive_lock(&self) -> ExclusiveGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            let reentry = state.owner == Some(me);
            if state.foreign_shared(reentry) == 0 && (state.owner.is_none() || reentry) {
                state.owner = Some(me);
                state.depth += 1;
                return ExclusiveGuard { coalescer: self };
            }
            self.cond.wait(&mut state);
        }
    }

    /// Non-blocking exclusive acquisition; used by shutdown paths to
    /// avoid deadlocking against an in-progress batch.
    pub fn try_exclusive_lock(&self) -> Option<ExclusiveGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let reentry = state.owner == Some(me);
        if state.foreign_shared(reentry) == 0 && (state.owner.is_none() || reentry) {
            state.owner = Some(me);
            state.depth += 1;
            Some(ExclusiveGuard { coalescer: self })
        } else {
            None
        }
    }

    /// Acquire the shared lock, blocking. Multiple holders may coexist;
    /// the exclusive owner may also take it (reentrant read), and such
    /// holds do not block the owner's own exclusive re-entry.
    pub fn shared_lock(&self) -> SharedGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.owner.is_some() && state.owner != Some(me) {
            self.cond.wait(&mut state);
        }
        state.shared_count += 1;
        if state.owner == Some(me) {
            state.owner_shared += 1;
        }
        SharedGuard { coalescer: self }
    }

    /// Non-blocking shared acquisition.
    pub fn try_shared_lock(&self) -> Option<SharedGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner.is_none() || state.owner == Some(me) {
            state.shared_count += 1;
            if state.owner == Some(me) {
                state.owner_shared += 1;
            }
            Some(SharedGuard { coalescer: self })
        } else {
            None
        }
    }

    /// Record that announcement-relevant state changed.
    ///
    /// Must be called with the exclusive lock held; calls without it are
    /// logged and dropped.
    pub fn note_changed(&self) {
        self.with_pending(|pending| pending.changed = true);
    }

    /// Record an explicit metadata version for this batch.
    pub fn note_version_override(&self, version: u64) {
        self.with_pending(|pending| pending.metadata_version_override = Some(version));
    }

    /// Record a newly added outgoing info.
    pub fn note_info_added(&self, key: BindingKey) {
        self.with_pending(|pending| pending.added_infos.push(key));
    }

    /// Record a removed outgoing info.
    pub fn note_info_removed(&self, info: OutgoingDiscoveryInfo) {
        self.with_pending(|pending| pending.removed_infos.push(info));
    }

    /// Fold a locally accumulated batch into the pending one.
    pub fn note_batch(&self, batch: PendingAnnouncements) {
        self.with_pending(|pending| {
            pending.changed |= batch.changed;
            if batch.metadata_version_override.is_some() {
                pending.metadata_version_override = batch.metadata_version_override;
            }
            pending.added_infos.extend(batch.added_infos);
            pending.removed_infos.extend(batch.removed_infos);
        });
    }

    fn with_pending(&self, f: impl FnOnce(&mut PendingAnnouncements)) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            log::warn!("[Coalescer] pending-state update without exclusive lock; dropped");
            return;
        }
        f(&mut state.pending);
    }

    fn release_exclusive(&self) {
        let batch = {
            let mut state = self.state.lock();
            debug_assert_eq!(state.owner, Some(thread::current().id()));
            state.depth -= 1;
            if state.depth > 0 {
                return;
            }
            state.owner = None;
            // Shared guards the owner still holds become ordinary ones
            state.owner_shared = 0;
            self.cond.notify_all();
            std::mem::take(&mut state.pending)
        };

        if batch.is_empty() {
            return;
        }
        let sink = self.sink.lock().clone();
        match sink {
            Some(sink) => sink.commit(batch),
            None => log::debug!("[Coalescer] batch dropped: no commit sink installed"),
        }
    }

    fn release_shared(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        state.shared_count -= 1;
        if state.owner == Some(me) && state.owner_shared > 0 {
            state.owner_shared -= 1;
        }
        if state.shared_count == 0 {
            self.cond.notify_all();
        }
    }
}

impl Default for UpdateCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for the exclusive lock. Dropping the outermost guard commits
/// the batch.
pub struct ExclusiveGuard<'a> {
    coalescer: &'a UpdateCoalescer,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.coalescer.release_exclusive();
    }
}

/// Guard for the shared lock.
pub struct SharedGuard<'a> {
    coalescer: &'a UpdateCoalescer,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.coalescer.release_shared();
    }
}
