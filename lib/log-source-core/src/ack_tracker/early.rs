//! Unreliable (early-ack) tracker.
//!
//! Grounded in `early_ack_tracker.c`: a single embedded record, reused for every
//! message, and `manage_ack` that unconditionally returns one unit of window
//! credit regardless of `ack_type` -- `Aborted` is handled exactly like
//! `Processed` in the original, since there is no position to withhold.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{pending_ref, AckType, PendingBookmark, Slot};
use crate::bookmark::Bookmark;
use crate::internal_events::SourceInternalEvents;
use crate::window::FlowControlWindow;

pub struct EarlyAckTracker {
    window: Arc<FlowControlWindow>,
    slot: Mutex<Option<Bookmark>>,
}

impl EarlyAckTracker {
    pub fn new(window: Arc<FlowControlWindow>) -> Self {
        Self {
            window,
            slot: Mutex::new(None),
        }
    }

    pub(super) fn request_bookmark(&self) -> PendingBookmark<'_> {
        pending_ref(&self.slot)
    }

    /// The embedded slot needs no commit step -- there is only ever the one record,
    /// so `track` just hands back a reference to it.
    pub(super) fn track(&self) -> Slot {
        Slot::Reused
    }

    pub(super) fn manage_ack(&self, ack_type: AckType, events: &dyn SourceInternalEvents) {
        self.window.adjust(1, events);
        if ack_type == AckType::Suspended {
            self.window.suspend(events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal_events::NoopInternalEvents;

    #[test]
    fn repeated_request_bookmark_returns_the_same_slot() {
        let tracker = EarlyAckTracker::new(Arc::new(FlowControlWindow::new(1, false)));
        {
            let mut bm = tracker.request_bookmark();
            bm.write_position(42u32);
        }
        let bm = tracker.request_bookmark();
        assert_eq!(bm.read_position::<u32>(), 42);
    }

    #[test]
    fn processed_ack_returns_one_credit() {
        let window = Arc::new(FlowControlWindow::new(1, false));
        let tracker = EarlyAckTracker::new(Arc::clone(&window));
        window.take(1, &NoopInternalEvents);
        assert_eq!(window.window_size(), 0);

        tracker.manage_ack(AckType::Processed, &NoopInternalEvents);
        assert_eq!(window.window_size(), 1);
    }

    #[test]
    fn aborted_ack_is_treated_like_processed() {
        let window = Arc::new(FlowControlWindow::new(1, false));
        let tracker = EarlyAckTracker::new(Arc::clone(&window));
        window.take(1, &NoopInternalEvents);

        tracker.manage_ack(AckType::Aborted, &NoopInternalEvents);
        assert_eq!(window.window_size(), 1);
    }

    #[test]
    fn suspended_ack_adjusts_then_parks_the_returned_credit() {
        let window = Arc::new(FlowControlWindow::new(1, false));
        let tracker = EarlyAckTracker::new(Arc::clone(&window));
        window.take(1, &NoopInternalEvents);

        tracker.manage_ack(AckType::Suspended, &NoopInternalEvents);
        assert_eq!(window.window_size(), 0);
        assert_eq!(window.suspended_window_size(), 1);
    }
}
