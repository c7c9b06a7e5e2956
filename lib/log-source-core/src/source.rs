//! Source Core ingestion path.
//!
//! Grounded in `log_source_post` / `log_source_mangle_hostname` in `lib/logsource.c`:
//! a single synchronous call that mangles an ingested record, commits it to the ack
//! tracker and flow-control window, and hands it to a downstream pipe collaborator.
//! The transport, host resolver, downstream pipe and per-config queue callbacks are
//! all external collaborators, deliberately out of scope for this crate, modelled
//! here as traits so the core stays decoupled from any concrete transport.

use std::sync::Arc;
use std::time::Duration;

use crate::ack_tracker::{AckTracker, AckType};
use crate::bookmark::Bookmark;
use crate::internal_events::SourceInternalEvents;
use crate::options::{LogSourceOptions, StatsLevel};
use crate::stats::{DynamicCounterKind, SourceStats};
use crate::window::FlowControlWindow;

/// Resolves a transport-level sender address to a display hostname
/// (`resolve_sockaddr_to_hostname` in the original). An external collaborator: the
/// core never does DNS or socket introspection itself.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, sender_addr: &str) -> String;
}

/// A per-config callback consulted once per ingested record, after mangling. Mirrors
/// the original's unnamed "source-queue callbacks" -- returning `false` drops the
/// message.
pub trait QueueCallback: Send + Sync {
    fn on_enqueue(&self, record: &mut IngestedRecord) -> bool;
}

/// The downstream pipe a source forwards tracked records to.
pub trait Pipe: Send + Sync {
    fn queue(&self, record: IngestedRecord, handle: crate::ack_tracker::AckHandle);
}

/// The subset of a parsed record's fields the core's mangle rules observe or modify.
/// Everything message-format-specific (the parsed body, structured data, severity,
/// facility, ...) is out of scope and carried by the caller alongside this struct,
/// not through it.
#[derive(Debug, Clone)]
pub struct IngestedRecord {
    pub origin_stamp_unix: i64,
    pub receive_stamp_unix: i64,
    pub sender_addr: String,
    pub host_from: String,
    /// The prior `HOST` value, if the transport or an upstream hop already set one.
    pub host: Option<String>,
    pub program: Option<String>,
    /// Set by transports that know the sender is a local, un-chained source (the
    /// original's `LF_SIMPLE_HOSTNAME` flag).
    pub simple_hostname: bool,
    /// Set by transports that know the sender is local (`LF_LOCAL`).
    pub local: bool,
    pub tags: Vec<String>,
}

/// Clamps `s` to at most `max_len` bytes without splitting a multi-byte UTF-8
/// character, mirroring the original's raw byte-length HOST clamp
/// (`lib/logsource.c:200-206`) while staying panic-free on non-ASCII input --
/// `String::truncate` panics if `max_len` doesn't land on a char boundary.
fn truncate_at_char_boundary(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut boundary = max_len;
        while !s.is_char_boundary(boundary) {
            boundary -= 1;
        }
        s.truncate(boundary);
    }
    s
}

/// Ties together the ack tracker, flow-control window and stats for one source, and
/// implements the mangle-then-forward ingestion path.
pub struct LogSourceCore {
    options: LogSourceOptions,
    window: Arc<FlowControlWindow>,
    tracker: Arc<AckTracker>,
    stats: SourceStats,
    events: Arc<dyn SourceInternalEvents>,
    host_resolver: Arc<dyn HostResolver>,
    queue_callbacks: Vec<Arc<dyn QueueCallback>>,
    pipe: Arc<dyn Pipe>,
    threaded: bool,
}

impl LogSourceCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: impl Into<String>,
        options: LogSourceOptions,
        window: Arc<FlowControlWindow>,
        tracker: Arc<AckTracker>,
        events: Arc<dyn SourceInternalEvents>,
        host_resolver: Arc<dyn HostResolver>,
        queue_callbacks: Vec<Arc<dyn QueueCallback>>,
        pipe: Arc<dyn Pipe>,
        threaded: bool,
    ) -> Self {
        let stats_level = options.stats_level;
        Self {
            options,
            window,
            tracker,
            stats: SourceStats::new(source_id, stats_level),
            events,
            host_resolver,
            queue_callbacks,
            pipe,
            threaded,
        }
    }

    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }

    pub fn window(&self) -> &FlowControlWindow {
        &self.window
    }

    /// Ingests one record: reserves a bookmark slot, mangles the record's hostname
    /// and overrides, commits it to the tracker and window, then either hands it to
    /// the downstream pipe or drops it (per a queue callback's veto). Returns `false`
    /// for a dropped record, `true` once it has been forwarded.
    ///
    /// `write_position` fills in the transport's opaque position token; it runs
    /// while the slot is reserved but before the record is mangled, matching the
    /// original's "parsing is complete *before* `request_bookmark` is called"
    /// ordering constraint.
    pub fn post(&self, mut record: IngestedRecord, write_position: impl FnOnce(&mut Bookmark)) -> bool {
        assert!(
            self.window.free_to_send(),
            "post called while the flow-control window reports no credit, which is a programmer error"
        );

        let mut pending = self
            .tracker
            .request_bookmark()
            .expect("request_bookmark returned None even though the window reported free credit");
        write_position(&mut pending);
        drop(pending);

        self.mangle(&mut record);

        let handle = self.tracker.track();
        self.window.take(1, self.events.as_ref());
        self.record_dynamic_stats(&record);

        let mut dropped = false;
        for callback in &self.queue_callbacks {
            if !callback.on_enqueue(&mut record) {
                dropped = true;
                break;
            }
        }

        if dropped {
            handle.ack(AckType::Processed, self.events.as_ref());
        } else {
            self.stats.record_processed(record.receive_stamp_unix);
            self.pipe.queue(record, handle);
        }

        self.throttle_if_window_full();
        !dropped
    }

    fn record_dynamic_stats(&self, record: &IngestedRecord) {
        if self.options.stats_level < StatsLevel::Full {
            return;
        }
        self.stats.increment_dynamic(DynamicCounterKind::Host, record.host.as_deref().unwrap_or(&record.host_from));
        self.stats.increment_dynamic(DynamicCounterKind::Sender, &record.sender_addr);
        if let Some(program) = &record.program {
            self.stats.increment_dynamic(DynamicCounterKind::Program, program);
        }
    }

    /// After forwarding, yields briefly if the window is full and the rate-throttle
    /// heuristic suggests a sleep. Never blocks indefinitely, and is skipped entirely
    /// for non-threaded sources.
    fn throttle_if_window_full(&self) {
        if !self.threaded {
            return;
        }
        let sleep_nanos = self.window.window_full_sleep_nanos();
        if sleep_nanos > 0 && !self.window.free_to_send() {
            std::thread::sleep(Duration::from_nanos(sleep_nanos));
        }
    }

    /// Applies the observable mangle rules in order: timestamp substitution,
    /// hostname resolution/chaining, explicit overrides, then tagging.
    fn mangle(&self, record: &mut IngestedRecord) {
        if !self.options.keep_timestamp.unwrap_or(true) {
            record.origin_stamp_unix = record.receive_stamp_unix;
        }

        let resolved = self.host_resolver.resolve(&record.sender_addr);
        record.host_from = resolved.clone();

        let keep_hostname = self.options.keep_hostname.unwrap_or(false);
        let has_host = record.host.as_deref().is_some_and(|h| !h.is_empty());
        if !keep_hostname || !has_host {
            let host = if self.options.chain_hostnames.unwrap_or(false) {
                self.chain_hostname(record, &resolved)
            } else {
                resolved.clone()
            };
            record.host = Some(truncate_at_char_boundary(host, 255));
        }

        if let Some(program_override) = &self.options.program_override {
            record.program = Some(program_override.clone());
        }
        if let Some(host_override) = &self.options.host_override {
            record.host = Some(host_override.clone());
        }

        if let Some(source_group_tag) = &self.options.source_group_tag {
            record.tags.push(source_group_tag.clone());
        }
        record.tags.extend(self.options.tags.iter().cloned());
    }

    fn chain_hostname(&self, record: &IngestedRecord, resolved: &str) -> String {
        if record.simple_hostname {
            resolved.to_string()
        } else if record.local {
            let group_name = &self.options.group_name;
            format!("{group_name}@{resolved}")
        } else {
            match record.host.as_deref().filter(|h| !h.is_empty()) {
                None => format!("{resolved}/{resolved}"),
                Some(prior) => format!("{prior}/{resolved}"),
            }
        }
    }
}
