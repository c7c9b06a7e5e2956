//! Ack tracker family: three variants behind one dispatch enum.
//!
//! Modelled as a tagged enum rather than `dyn Trait` -- dispatch happens once per
//! message, so either would be correct, but the enum lets a source own its tracker
//! inline without heap-allocating a trait object.

pub(crate) mod store;

mod early;
mod late;
mod late_dynamic;
mod late_static;

pub use early::EarlyAckTracker;
pub use late_dynamic::LateDynamicAckTracker;
pub use late_static::LateStaticAckTracker;
pub use store::RecordId;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::bookmark::Bookmark;
use crate::internal_events::SourceInternalEvents;
use crate::window::FlowControlWindow;

/// The three outcomes a downstream pipe can report for a tracked message, surfacing
/// the error taxonomy at the ack boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckType {
    /// The message was durably handled.
    Processed,
    /// The downstream permanently abandoned the message; its bookmark must not be
    /// saved, but the slot is still freed in order.
    Aborted,
    /// The downstream hit a transient fault; the window is suspended, and credit for
    /// this and subsequent acks parks instead of reopening the window.
    Suspended,
}

pub(crate) type OnAllAcked = Box<dyn Fn() + Send + Sync>;

/// Which slot within a tracker a given [`AckHandle`] refers to.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Early-ack: there is only ever the one, reused, slot.
    Reused,
    /// Late-ack (static or dynamic): a specific record in the store.
    Numbered(RecordId),
}

/// A handle a tracked message carries so that, on ack, the downstream can find its
/// way back to the right slot without the core needing a raw pointer into the
/// tracker (the back-reference from a tracked record to its tracker).
///
/// Holds a strong [`Arc`] to the tracker. This is a deliberate, documented departure
/// from the original's non-owning back-pointer (see DESIGN.md): Rust's ownership
/// model makes a refcounted handle the safe default, and [`AckTracker::free`] still
/// enforces the "no free while records are live" invariant explicitly for callers
/// that tear a source down deterministically.
pub struct AckHandle {
    tracker: Arc<AckTracker>,
    slot: Slot,
}

impl AckHandle {
    /// Reports the outcome of processing this message to its tracker
    /// (`ack_tracker_manage_msg_ack` / the original's `manage_ack`).
    pub fn ack(self, ack_type: AckType, events: &dyn SourceInternalEvents) {
        events.emit_ack_received(ack_type);
        self.tracker.manage_ack(self.slot, ack_type, events);
    }
}

/// A bookmark reserved, but not yet committed, by [`AckTracker::request_bookmark`].
/// Dropping this without calling [`AckTracker::track`] leaves the slot pending for
/// the next `request_bookmark` call, mirroring both C trackers returning the same
/// `pending_ack_record` across repeated calls.
pub struct PendingBookmark<'a> {
    guard: MutexGuard<'a, Option<Bookmark>>,
}

impl std::ops::Deref for PendingBookmark<'_> {
    type Target = Bookmark;

    fn deref(&self) -> &Bookmark {
        self.guard.as_ref().expect("pending slot is always Some once materialized")
    }
}

impl std::ops::DerefMut for PendingBookmark<'_> {
    fn deref_mut(&mut self) -> &mut Bookmark {
        self.guard.as_mut().expect("pending slot is always Some once materialized")
    }
}

fn pending_ref(mutex: &Mutex<Option<Bookmark>>) -> PendingBookmark<'_> {
    let mut guard = mutex.lock();
    if guard.is_none() {
        *guard = Some(Bookmark::init());
    }
    PendingBookmark { guard }
}

/// The three ack-tracker variants, unified behind one set of operations.
pub enum AckTracker {
    Early(EarlyAckTracker),
    LateStatic(LateStaticAckTracker),
    LateDynamic(LateDynamicAckTracker),
}

impl AckTracker {
    pub fn new_early(window: Arc<FlowControlWindow>) -> Arc<Self> {
        Arc::new(Self::Early(EarlyAckTracker::new(window)))
    }

    pub fn new_late_static(window: Arc<FlowControlWindow>, capacity: usize) -> Arc<Self> {
        Arc::new(Self::LateStatic(LateStaticAckTracker::new(window, capacity)))
    }

    pub fn new_late_dynamic(window: Arc<FlowControlWindow>) -> Arc<Self> {
        Arc::new(Self::LateDynamic(LateDynamicAckTracker::new(window)))
    }

    /// Reserves (or re-returns) the slot for the next message's bookmark. Returns
    /// `None` when the store is full -- the caller must not inject a message in that
    /// case.
    pub fn request_bookmark(&self) -> Option<PendingBookmark<'_>> {
        match self {
            Self::Early(t) => Some(t.request_bookmark()),
            Self::LateStatic(t) => t.request_bookmark(),
            Self::LateDynamic(t) => t.request_bookmark(),
        }
    }

    /// Commits the pending slot and returns a handle the message carries until ack.
    pub fn track(self: &Arc<Self>) -> AckHandle {
        let slot = match self.as_ref() {
            Self::Early(t) => t.track(),
            Self::LateStatic(t) => t.track(),
            Self::LateDynamic(t) => t.track(),
        };
        AckHandle {
            tracker: Arc::clone(self),
            slot,
        }
    }

    fn manage_ack(&self, slot: Slot, ack_type: AckType, events: &dyn SourceInternalEvents) {
        match (self, slot) {
            (Self::Early(t), Slot::Reused) => t.manage_ack(ack_type, events),
            (Self::LateStatic(t), Slot::Numbered(id)) => t.manage_ack(id, ack_type, events),
            (Self::LateDynamic(t), Slot::Numbered(id)) => t.manage_ack(id, ack_type, events),
            _ => unreachable!("an AckHandle's slot kind always matches the tracker that issued it"),
        }
    }

    /// After this call, successful acks no longer persist a bookmark -- used when the
    /// source knows its position has been invalidated.
    pub fn disable_bookmark_saving(&self) {
        match self {
            Self::Early(_) => {}
            Self::LateStatic(t) => t.disable_bookmark_saving(),
            Self::LateDynamic(t) => t.disable_bookmark_saving(),
        }
    }

    /// Installs (replacing any previous) the callback fired when the store
    /// transitions to empty. A no-op for early-ack, which never holds records.
    pub fn set_on_all_acked(&self, callback: OnAllAcked) {
        match self {
            Self::Early(_) => {}
            Self::LateStatic(t) => t.set_on_all_acked(callback),
            Self::LateDynamic(t) => t.set_on_all_acked(callback),
        }
    }

    /// Current count of in-flight (tracked, unacked-or-not-yet-dropped) records.
    pub fn tracked_count(&self) -> usize {
        match self {
            Self::Early(_) => 0,
            Self::LateStatic(t) => t.tracked_count(),
            Self::LateDynamic(t) => t.tracked_count(),
        }
    }

    /// Tears the tracker down. Panics if records are still tracked -- a programming
    /// error (`free()` must refuse to run while records are still tracked).
    pub fn free(self) {
        let count = self.tracked_count();
        assert_eq!(
            count, 0,
            "freed an ack tracker with {count} record(s) still tracked, which is a programmer error"
        );
    }
}
