//! Observability seam for the core.
//!
//! Mirrors `FileSourceInternalEvents` in `lib/file-source/src/internal_events.rs`:
//! one `emit_*` method per observable transition, so call sites never reach for
//! `tracing` macros directly. This keeps `msg_debug`/`msg_error` call sites in
//! `logsource.c` and `late_ack_tracker.c` testable without a subscriber, and lets a
//! test harness substitute a counting implementation (see `tests/scenarios.rs`).

use crate::ack_tracker::AckType;

/// Every internal event the core can raise has a corresponding method here.
pub trait SourceInternalEvents: Send + Sync {
    /// The window transitioned from having credit to being exhausted, or was
    /// explicitly suspended. Corresponds to `msg_debug("Source has been suspended", ...)`.
    fn emit_window_suspended(&self) {}

    /// The window transitioned from exhausted back to having credit. Corresponds to
    /// `log_source_wakeup` / `msg_debug("Source has been resumed", ...)`.
    fn emit_wakeup(&self) {}

    /// The window returned to its full initial size, i.e. the pipeline fully
    /// drained. Corresponds to `log_source_window_empty`.
    fn emit_window_empty(&self) {}

    /// A bookmark was durably persisted for the tail of an acked prefix.
    fn emit_bookmark_saved(&self) {}

    /// `bookmark.save` failed. This is logged and absorbed, never fatal -- the next
    /// successful save for a later record supersedes it.
    fn emit_persistence_failure(&self) {}

    /// The ack-record store transitioned to empty; `on_all_acked` is about to fire.
    fn emit_all_acked(&self) {}

    /// An ack of the given type was received for a message.
    fn emit_ack_received(&self, _ack_type: AckType) {}
}

/// Logs every transition through `tracing`, at the same levels the original source
/// uses (`msg_debug` for routine state changes, `msg_error` for persistence
/// failures).
#[derive(Clone, Copy, Default)]
pub struct TracingInternalEvents;

impl SourceInternalEvents for TracingInternalEvents {
    fn emit_window_suspended(&self) {
        tracing::debug!(message = "Source has been suspended.");
    }

    fn emit_wakeup(&self) {
        tracing::debug!(message = "Source has been resumed.");
    }

    fn emit_window_empty(&self) {
        tracing::debug!(message = "Source flow-control window is empty.");
    }

    fn emit_bookmark_saved(&self) {
        tracing::trace!(message = "Bookmark saved.");
    }

    fn emit_persistence_failure(&self) {
        tracing::error!(message = "Failed to persist bookmark; keeping the previous position.");
    }

    fn emit_all_acked(&self) {
        tracing::trace!(message = "All in-flight records acked.");
    }

    fn emit_ack_received(&self, ack_type: AckType) {
        tracing::trace!(message = "Received ack.", ack_type = ?ack_type);
    }
}

/// Discards every event. Used where a caller needs a `SourceInternalEvents` but has
/// no interest in observing transitions (unit tests of the window/store in
/// isolation).
#[derive(Clone, Copy, Default)]
pub struct NoopInternalEvents;

impl SourceInternalEvents for NoopInternalEvents {}
