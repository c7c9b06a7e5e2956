//! Shared core for both late-ack variants.
//!
//! `late_ack_tracker.c` implements both the original's fixed-size ring and its
//! lazily-grown list with the *same* code, differing only in how records are
//! allocated -- the bounded-vs-unbounded choice is a property of the store, not of
//! the tracker logic. [`store::RecordStore`] already captures that, so `late_static`
//! and `late_dynamic` are thin constructors over this shared implementation
//! (see DESIGN.md).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::store::{RecordId, RecordStore};
use super::{pending_ref, AckType, OnAllAcked, PendingBookmark, Slot};
use crate::bookmark::Bookmark;
use crate::internal_events::SourceInternalEvents;
use crate::window::FlowControlWindow;

pub(super) struct LateAckTrackerCore {
    window: Arc<FlowControlWindow>,
    pending: Mutex<Option<Bookmark>>,
    store: Mutex<RecordStore>,
    bookmark_saving_enabled: AtomicBool,
    on_all_acked: Mutex<Option<OnAllAcked>>,
}

impl LateAckTrackerCore {
    pub(super) fn new(window: Arc<FlowControlWindow>, capacity: Option<usize>) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
            store: Mutex::new(RecordStore::new(capacity)),
            bookmark_saving_enabled: AtomicBool::new(true),
            on_all_acked: Mutex::new(None),
        }
    }

    /// Returns the pending slot, or `None` if the store has no room for another
    /// record -- which must coincide with the flow-control window being exhausted;
    /// if it doesn't, that's a bug.
    pub(super) fn request_bookmark(&self) -> Option<PendingBookmark<'_>> {
        if self.store.lock().is_full() {
            return None;
        }
        Some(pending_ref(&self.pending))
    }

    /// Commits the pending slot to the tail of the store.
    pub(super) fn track(&self) -> Slot {
        let bookmark = self
            .pending
            .lock()
            .take()
            .expect("track called without a prior request_bookmark");
        let id = self
            .store
            .lock()
            .push_tail(bookmark)
            .expect("request_bookmark already confirmed the store has room");
        Slot::Numbered(id)
    }

    pub(super) fn manage_ack(&self, id: RecordId, ack_type: AckType, events: &dyn SourceInternalEvents) {
        if ack_type == AckType::Suspended {
            self.window.suspend(events);
        }

        let (range_len, now_empty) = {
            let mut store = self.store.lock();
            store.mark_acked(id);

            let range_len = store.continual_acked_prefix_len();
            if range_len == 0 {
                return;
            }

            if ack_type != AckType::Aborted && self.bookmark_saving_enabled.load(Ordering::SeqCst) {
                if store.bookmark_at_prefix_end(range_len).save() {
                    events.emit_bookmark_saved();
                } else {
                    events.emit_persistence_failure();
                }
            }

            store.drop_prefix(range_len);
            (range_len, store.is_empty())
        };

        match ack_type {
            AckType::Suspended => self.window.adjust_when_suspended(range_len as i64),
            AckType::Processed | AckType::Aborted => {
                self.window.adjust(range_len as i64, events);
            }
        }

        if now_empty {
            events.emit_all_acked();
            if let Some(callback) = self.on_all_acked.lock().as_ref() {
                callback();
            }
        }
    }

    pub(super) fn disable_bookmark_saving(&self) {
        self.bookmark_saving_enabled.store(false, Ordering::SeqCst);
    }

    pub(super) fn set_on_all_acked(&self, callback: OnAllAcked) {
        *self.on_all_acked.lock() = Some(callback);
    }

    pub(super) fn tracked_count(&self) -> usize {
        self.store.lock().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal_events::NoopInternalEvents;

    fn track(core: &LateAckTrackerCore) -> RecordId {
        {
            let mut pending = core.request_bookmark().expect("store has room");
            pending.write_position::<u64>(0);
        }
        match core.track() {
            Slot::Numbered(id) => id,
            Slot::Reused => unreachable!(),
        }
    }

    #[test]
    fn out_of_order_acks_only_drain_the_continual_prefix() {
        // Acks can arrive out of order; only a contiguous acked prefix from the head drains.
        let window = Arc::new(FlowControlWindow::new(4, false));
        let core = LateAckTrackerCore::new(Arc::clone(&window), Some(4));
        let m1 = track(&core);
        let m2 = track(&core);
        let m3 = track(&core);
        let m4 = track(&core);
        window.take(4, &NoopInternalEvents);

        core.manage_ack(m2, AckType::Processed, &NoopInternalEvents);
        assert_eq!(core.tracked_count(), 4);
        core.manage_ack(m3, AckType::Processed, &NoopInternalEvents);
        assert_eq!(core.tracked_count(), 4);

        core.manage_ack(m1, AckType::Processed, &NoopInternalEvents);
        assert_eq!(core.tracked_count(), 1);
        assert_eq!(window.window_size(), 3);

        core.manage_ack(m4, AckType::Processed, &NoopInternalEvents);
        assert_eq!(core.tracked_count(), 0);
        assert_eq!(window.window_size(), 4);
    }

    #[test]
    fn aborted_ack_drops_without_saving_but_still_returns_credit() {
        // An aborted record at the head of the prefix: no save, but credit still returns.
        let window = Arc::new(FlowControlWindow::new(4, false));
        let core = LateAckTrackerCore::new(Arc::clone(&window), Some(4));
        let m1 = track(&core);
        let m2 = track(&core);
        window.take(2, &NoopInternalEvents);

        core.manage_ack(m1, AckType::Aborted, &NoopInternalEvents);
        assert_eq!(core.tracked_count(), 1);
        assert_eq!(window.window_size(), 1);

        core.manage_ack(m2, AckType::Processed, &NoopInternalEvents);
        assert_eq!(core.tracked_count(), 0);
        assert_eq!(window.window_size(), 2);
    }

    #[test]
    fn on_all_acked_fires_each_time_the_store_drains() {
        let window = Arc::new(FlowControlWindow::new(2, false));
        let core = LateAckTrackerCore::new(Arc::clone(&window), Some(2));
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        core.set_on_all_acked(Box::new(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));

        let m1 = track(&core);
        window.take(1, &NoopInternalEvents);
        core.manage_ack(m1, AckType::Processed, &NoopInternalEvents);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let m2 = track(&core);
        window.take(1, &NoopInternalEvents);
        core.manage_ack(m2, AckType::Processed, &NoopInternalEvents);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn disable_bookmark_saving_suppresses_future_saves() {
        use std::sync::atomic::AtomicUsize;

        let window = Arc::new(FlowControlWindow::new(1, false));
        let core = LateAckTrackerCore::new(Arc::clone(&window), Some(1));
        let saves = Arc::new(AtomicUsize::new(0));
        let saves2 = Arc::clone(&saves);

        {
            let mut pending = core.request_bookmark().unwrap();
            pending.install(
                Box::new(move |_, _| {
                    saves2.fetch_add(1, Ordering::SeqCst);
                    true
                }),
                Box::new(|_| {}),
            );
        }
        let id = match core.track() {
            Slot::Numbered(id) => id,
            Slot::Reused => unreachable!(),
        };

        core.disable_bookmark_saving();
        core.manage_ack(id, AckType::Processed, &NoopInternalEvents);
        assert_eq!(saves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn request_bookmark_returns_none_once_the_bounded_store_is_full() {
        let window = Arc::new(FlowControlWindow::new(1, false));
        let core = LateAckTrackerCore::new(Arc::clone(&window), Some(1));
        let _m1 = track(&core);
        assert!(core.request_bookmark().is_none());
    }

    #[test]
    fn repeated_request_bookmark_without_track_returns_the_same_pending_slot() {
        let window = Arc::new(FlowControlWindow::new(2, false));
        let core = LateAckTrackerCore::new(Arc::clone(&window), Some(2));
        {
            let mut pending = core.request_bookmark().unwrap();
            pending.write_position::<u64>(99);
        }
        let pending_again = core.request_bookmark().unwrap();
        assert_eq!(pending_again.read_position::<u64>(), 99);
    }
}
