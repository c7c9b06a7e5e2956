//! Reliable, unbounded late-ack tracker.
//!
//! Used when the source supports dynamic window resizing: admission credit may grow
//! beyond the initial window, so the store must never refuse a push on capacity
//! grounds. Shares [`LateAckTrackerCore`] with the static variant, constructed with no
//! capacity bound.

use std::sync::Arc;

use super::late::LateAckTrackerCore;
use super::store::RecordId;
use super::{AckType, OnAllAcked, PendingBookmark, Slot};
use crate::internal_events::SourceInternalEvents;
use crate::window::FlowControlWindow;

pub struct LateDynamicAckTracker {
    core: LateAckTrackerCore,
}

impl LateDynamicAckTracker {
    pub fn new(window: Arc<FlowControlWindow>) -> Self {
        Self {
            core: LateAckTrackerCore::new(window, None),
        }
    }

    pub(super) fn request_bookmark(&self) -> Option<PendingBookmark<'_>> {
        self.core.request_bookmark()
    }

    pub(super) fn track(&self) -> Slot {
        self.core.track()
    }

    pub(super) fn manage_ack(&self, id: RecordId, ack_type: AckType, events: &dyn SourceInternalEvents) {
        self.core.manage_ack(id, ack_type, events);
    }

    pub(super) fn disable_bookmark_saving(&self) {
        self.core.disable_bookmark_saving();
    }

    pub(super) fn set_on_all_acked(&self, callback: OnAllAcked) {
        self.core.set_on_all_acked(callback);
    }

    pub(super) fn tracked_count(&self) -> usize {
        self.core.tracked_count()
    }
}
