//! Per-source metrics.
//!
//! Grounded in `stats_register_counter`/`stats_cluster_logpipe_key_set` in
//! `lib/logsource.c` for the two fixed per-source counters, and in
//! `lib/vector-buffers/src/internal_events.rs`'s `DashMap`-backed dynamic-gauge
//! pattern for the per-(host, sender, program) counters that only exist above a
//! stats-level threshold. Key cardinality is bounded by which (host, sender,
//! program) tuples a source actually sees, the same way the original's dynamic
//! counters are bounded by the hash map it registers them in.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::LazyLock;

use dashmap::DashMap;
use metrics::counter;

use crate::options::StatsLevel;

/// The dynamic-counter tag a key is registered under, mirroring the
/// `{center, host, sender, program, source-group}` component-type tags the original
/// source keys its stats by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicCounterKind {
    Host,
    Sender,
    Program,
}

impl DynamicCounterKind {
    fn label(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Sender => "sender",
            Self::Program => "program",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DynamicCounterKey {
    kind: DynamicCounterKind,
    source_id: String,
    value: String,
}

static DYNAMIC_COUNTERS: LazyLock<DashMap<DynamicCounterKey, AtomicU64>> = LazyLock::new(DashMap::new);

/// Per-source fixed counters (`SC_TYPE_PROCESSED` / `SC_TYPE_STAMP` in the original),
/// plus the threshold above which dynamic per-key counters are registered at all.
pub struct SourceStats {
    source_id: String,
    stats_level: StatsLevel,
    processed: AtomicU64,
    last_message_seen_unix: AtomicI64,
}

impl SourceStats {
    pub fn new(source_id: impl Into<String>, stats_level: StatsLevel) -> Self {
        Self {
            source_id: source_id.into(),
            stats_level,
            processed: AtomicU64::new(0),
            last_message_seen_unix: AtomicI64::new(0),
        }
    }

    /// Called once per ingested message, after mangling. Always registered
    /// regardless of `stats_level` -- only the dynamic per-key counters are
    /// level-gated.
    pub fn record_processed(&self, received_at_unix: i64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.last_message_seen_unix.store(received_at_unix, Ordering::Relaxed);
        counter!("log_source_processed_total", "source_id" => self.source_id.clone()).increment(1);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn last_message_seen_unix(&self) -> i64 {
        self.last_message_seen_unix.load(Ordering::Relaxed)
    }

    /// Increments the dynamic counter for `(kind, value)`, scoped to this source. A
    /// no-op below `StatsLevel::Full`.
    pub fn increment_dynamic(&self, kind: DynamicCounterKind, value: &str) {
        if self.stats_level < StatsLevel::Full {
            return;
        }

        let key = DynamicCounterKey {
            kind,
            source_id: self.source_id.clone(),
            value: value.to_string(),
        };
        let entry = DYNAMIC_COUNTERS.entry(key).or_insert_with(|| AtomicU64::new(0));
        let new_value = entry.fetch_add(1, Ordering::Relaxed) + 1;

        counter!(
            "log_source_dynamic_total",
            "source_id" => self.source_id.clone(),
            "kind" => kind.label(),
            "value" => value.to_string()
        )
        .absolute(new_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_and_stamp_update_unconditionally() {
        let stats = SourceStats::new("s1", StatsLevel::Normal);
        stats.record_processed(1_700_000_000);
        stats.record_processed(1_700_000_100);
        assert_eq!(stats.processed(), 2);
        assert_eq!(stats.last_message_seen_unix(), 1_700_000_100);
    }

    #[test]
    fn dynamic_counters_are_gated_by_stats_level() {
        let stats = SourceStats::new("gated-source", StatsLevel::Normal);
        stats.increment_dynamic(DynamicCounterKind::Host, "example.com");
        assert!(!DYNAMIC_COUNTERS.contains_key(&DynamicCounterKey {
            kind: DynamicCounterKind::Host,
            source_id: "gated-source".to_string(),
            value: "example.com".to_string(),
        }));
    }

    #[test]
    fn dynamic_counters_accumulate_per_key_at_full_level() {
        let stats = SourceStats::new("full-source", StatsLevel::Full);
        stats.increment_dynamic(DynamicCounterKind::Program, "sshd");
        stats.increment_dynamic(DynamicCounterKind::Program, "sshd");
        let key = DynamicCounterKey {
            kind: DynamicCounterKind::Program,
            source_id: "full-source".to_string(),
            value: "sshd".to_string(),
        };
        assert_eq!(DYNAMIC_COUNTERS.get(&key).unwrap().load(Ordering::Relaxed), 2);
    }
}
