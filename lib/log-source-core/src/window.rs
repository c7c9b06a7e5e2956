//! Admission-control credit counter and suspend/resume dance.
//!
//! Grounded in `log_source_flow_control_*` / `_flow_control_rate_adjust` in
//! `logsource.c`: two atomic counters plus a nanosleep-throttle heuristic computed
//! from the measured ack rate. No lock is held around the counters themselves —
//! only `rate_adjust`'s bookkeeping (which touches a non-atomic `Instant`) takes a
//! short-lived mutex.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

#[cfg(not(test))]
use std::time::Instant;
#[cfg(test)]
use mock_instant::Instant;

use crate::internal_events::SourceInternalEvents;

/// Once the ack rate is measured over this many acks, `rate_adjust` recomputes the
/// throttle.
const RATE_SAMPLE_PERIOD: u64 = 1 << 14;

/// If the gap since the last sample exceeds this, the source is considered too slow
/// to benefit from the throttle and it is disabled.
const SLOW_SOURCE_THRESHOLD: Duration = Duration::from_secs(6);

/// A derived sleep longer than this means we'd rather go back to fully event-driven
/// behavior than busy-wait.
const MAX_USEFUL_SLEEP: Duration = Duration::from_millis(1);

/// Sleeps are clamped to this, regardless of the measured rate.
const MAX_THROTTLE_SLEEP: Duration = Duration::from_micros(100);

/// How many inter-ack gaps we wait out before looping back (`<< 3` in the original).
const THROTTLE_GAP_MULTIPLIER: u64 = 8;

#[derive(Default)]
struct RateState {
    last_ack_count: u64,
    last_sample_at: Option<Instant>,
}

/// The flow-control window a single log source owns.
///
/// `window_size` is the currently available admission credit; `suspended_window_size`
/// is credit parked while a downstream fault has the source suspended. The two halves
/// are tracked as separate atomics — a single packed 64-bit atomic would also satisfy
/// the contract, but separate counters read far more plainly and the ordering
/// contract only requires that no increment is lost across a suspend/resume cycle,
/// not that the two fields update in one instruction.
pub struct FlowControlWindow {
    initial_window_size: i64,
    window_size: AtomicI64,
    suspended_window_size: AtomicI64,
    forced_suspend: AtomicBool,
    threaded: bool,
    ack_count: AtomicU64,
    window_full_sleep_nsec: AtomicU64,
    rate: Mutex<RateState>,
}

impl FlowControlWindow {
    pub fn new(initial_window_size: i64, threaded: bool) -> Self {
        assert!(initial_window_size > 0, "initial window size must be positive");
        Self {
            initial_window_size,
            window_size: AtomicI64::new(initial_window_size),
            suspended_window_size: AtomicI64::new(0),
            forced_suspend: AtomicBool::new(false),
            threaded,
            ack_count: AtomicU64::new(0),
            window_full_sleep_nsec: AtomicU64::new(0),
            rate: Mutex::new(RateState::default()),
        }
    }

    pub fn initial_window_size(&self) -> i64 {
        self.initial_window_size
    }

    /// Admits `n` units of work, decrementing the available credit.
    ///
    /// The post-subtraction value must never go negative; a caller that calls `take`
    /// without having observed [`Self::free_to_send`] first is a programmer error.
    pub fn take(&self, n: i64, events: &dyn SourceInternalEvents) {
        let old = self.window_size.fetch_sub(n, Ordering::SeqCst);
        assert!(
            old - n >= 0,
            "flow-control window underflow: took {n} from {old}, which is a programmer error"
        );
        if old == n {
            events.emit_window_suspended();
        }
    }

    /// Credits `increment` back (plus any credit parked by a prior [`Self::suspend`]),
    /// and re-opens the window.
    pub fn adjust(&self, increment: i64, events: &dyn SourceInternalEvents) {
        let parked = self.suspended_window_size.swap(0, Ordering::SeqCst);
        let old = self.window_size.fetch_add(increment + parked, Ordering::SeqCst);
        if old == 0 {
            events.emit_wakeup();
        }
        if old + increment + parked == self.initial_window_size {
            events.emit_window_empty();
        }
        self.rate_adjust();
    }

    /// Like [`Self::adjust`], but for acks that complete while the window is
    /// suspended: the credit accumulates in `suspended_window_size` instead of
    /// re-opening the window.
    pub fn adjust_when_suspended(&self, increment: i64) {
        self.suspended_window_size.fetch_add(increment, Ordering::SeqCst);
    }

    /// Parks all currently available credit, setting `window_size` to zero. Used when
    /// a downstream component reports a transient fault.
    pub fn suspend(&self, events: &dyn SourceInternalEvents) {
        let current = self.window_size.swap(0, Ordering::SeqCst);
        self.suspended_window_size.store(current, Ordering::SeqCst);
        events.emit_window_suspended();
        self.rate_adjust();
    }

    /// Whether the source may currently admit more work.
    pub fn free_to_send(&self) -> bool {
        !self.forced_suspend.load(Ordering::SeqCst) && self.window_size.load(Ordering::SeqCst) > 0
    }

    pub fn set_forced_suspend(&self, forced: bool) {
        self.forced_suspend.store(forced, Ordering::SeqCst);
    }

    pub fn window_size(&self) -> i64 {
        self.window_size.load(Ordering::SeqCst)
    }

    pub fn suspended_window_size(&self) -> i64 {
        self.suspended_window_size.load(Ordering::SeqCst)
    }

    /// Nanoseconds the reader should sleep after a `take` that found the window full,
    /// per the rate-derived throttle. Zero means "don't sleep, go back to
    /// event-driven behavior". This heuristic is purely an optimisation; correctness
    /// never depends on it.
    pub fn window_full_sleep_nanos(&self) -> u64 {
        self.window_full_sleep_nsec.load(Ordering::Relaxed)
    }

    /// Measures the ack rate once every [`RATE_SAMPLE_PERIOD`] acks and derives
    /// [`Self::window_full_sleep_nanos`] from it. A no-op unless `threaded` was set
    /// at construction -- the throttle exists only to help a single hot reader
    /// thread yield briefly, never to coordinate across a multi-threaded fan-in.
    fn rate_adjust(&self) {
        if !self.threaded {
            return;
        }

        let cur = self.ack_count.fetch_add(1, Ordering::Relaxed) + 1;
        if cur % RATE_SAMPLE_PERIOD != 0 {
            return;
        }

        let mut rate = self.rate.lock();
        let now = Instant::now();
        let Some(last_sample_at) = rate.last_sample_at else {
            rate.last_sample_at = Some(now);
            rate.last_ack_count = cur;
            return;
        };

        if rate.last_ack_count >= cur.saturating_sub(RATE_SAMPLE_PERIOD - 1) {
            // Another thread already measured (close enough to) this span.
            return;
        }

        let elapsed = now.duration_since(last_sample_at);
        if elapsed > SLOW_SOURCE_THRESHOLD {
            self.window_full_sleep_nsec.store(0, Ordering::Relaxed);
            rate.last_sample_at = Some(now);
            rate.last_ack_count = cur;
            return;
        }

        let acked_since = cur - rate.last_ack_count;
        let per_ack = elapsed / acked_since as u32;

        // The disable check compares the raw per-ack gap, before the gap multiplier
        // is applied, matching the original's `if (window_full_sleep_nsec > 1e6)
        // disable; else <<= 3` ordering (`lib/logsource.c:111-117`).
        let sleep = if per_ack > MAX_USEFUL_SLEEP {
            Duration::ZERO
        } else {
            (per_ack * THROTTLE_GAP_MULTIPLIER as u32).min(MAX_THROTTLE_SLEEP)
        };

        self.window_full_sleep_nsec
            .store(sleep.as_nanos() as u64, Ordering::Relaxed);
        rate.last_sample_at = Some(now);
        rate.last_ack_count = cur;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal_events::NoopInternalEvents;

    #[test]
    fn take_decrements_and_refuses_to_go_negative() {
        let window = FlowControlWindow::new(2, false);
        window.take(1, &NoopInternalEvents);
        assert_eq!(window.window_size(), 1);
        assert!(window.free_to_send());
        window.take(1, &NoopInternalEvents);
        assert_eq!(window.window_size(), 0);
        assert!(!window.free_to_send());
    }

    #[test]
    #[should_panic(expected = "programmer error")]
    fn take_past_zero_panics() {
        let window = FlowControlWindow::new(1, false);
        window.take(1, &NoopInternalEvents);
        window.take(1, &NoopInternalEvents);
    }

    #[test]
    fn adjust_reopens_the_window_and_fires_window_empty_at_full_credit() {
        let window = FlowControlWindow::new(2, false);
        window.take(2, &NoopInternalEvents);
        assert_eq!(window.window_size(), 0);
        window.adjust(2, &NoopInternalEvents);
        assert_eq!(window.window_size(), 2);
    }

    #[test]
    fn suspend_then_adjust_when_suspended_then_adjust_round_trips_to_initial() {
        // Initial window 3, two in-flight messages consumed.
        let window = FlowControlWindow::new(3, false);
        window.take(1, &NoopInternalEvents);
        window.take(1, &NoopInternalEvents);
        assert_eq!(window.window_size(), 1);

        window.suspend(&NoopInternalEvents);
        assert_eq!(window.window_size(), 0);
        assert_eq!(window.suspended_window_size(), 1);

        window.adjust_when_suspended(1);
        assert_eq!(window.suspended_window_size(), 2);

        window.adjust(1, &NoopInternalEvents);
        assert_eq!(window.window_size(), window.initial_window_size());
        assert_eq!(window.suspended_window_size(), 0);
    }

    #[test]
    fn forced_suspend_blocks_admission_regardless_of_credit() {
        let window = FlowControlWindow::new(4, false);
        window.set_forced_suspend(true);
        assert!(!window.free_to_send());
        window.set_forced_suspend(false);
        assert!(window.free_to_send());
    }

    #[test]
    fn non_threaded_window_never_computes_a_throttle() {
        let window = FlowControlWindow::new(1, false);
        for _ in 0..(2 * RATE_SAMPLE_PERIOD) {
            window.adjust(0, &NoopInternalEvents);
        }
        assert_eq!(window.window_full_sleep_nanos(), 0);
    }

    #[test]
    fn rate_adjust_derives_a_nonzero_sleep_from_a_steady_fast_rate() {
        use mock_instant::MockClock;

        let window = FlowControlWindow::new(1, true);
        // First sampling period only establishes the baseline; the second derives a
        // rate from it. One microsecond per ack keeps every derived sleep well under
        // both the "too slow" and "not useful" disable thresholds.
        for _ in 0..(2 * RATE_SAMPLE_PERIOD) {
            MockClock::advance(Duration::from_micros(1));
            window.adjust(0, &NoopInternalEvents);
        }

        let sleep = window.window_full_sleep_nanos();
        assert!(sleep > 0, "a steady fast ack rate should derive a nonzero throttle");
        assert!(
            sleep <= MAX_THROTTLE_SLEEP.as_nanos() as u64,
            "derived sleep must stay within the configured clamp"
        );
    }

    #[test]
    fn rate_adjust_checks_the_raw_per_ack_gap_before_the_multiplier() {
        use mock_instant::MockClock;

        // 200us per ack is comfortably under MAX_USEFUL_SLEEP (1ms) on its own, but
        // multiplied by THROTTLE_GAP_MULTIPLIER (8) it would cross 1ms -- the disable
        // check must look at the raw gap, not the multiplied one, or this rate would
        // wrongly disable the throttle.
        let window = FlowControlWindow::new(1, true);
        for _ in 0..(2 * RATE_SAMPLE_PERIOD) {
            MockClock::advance(Duration::from_micros(200));
            window.adjust(0, &NoopInternalEvents);
        }

        let sleep = window.window_full_sleep_nanos();
        assert!(sleep > 0, "a 200us per-ack gap must not disable the throttle");
        assert_eq!(
            sleep,
            MAX_THROTTLE_SLEEP.as_nanos() as u64,
            "the multiplied gap (1.6ms) should clamp down to the throttle ceiling"
        );
    }

    #[test]
    fn rate_adjust_disables_the_throttle_once_the_source_goes_quiet() {
        use mock_instant::MockClock;

        let window = FlowControlWindow::new(1, true);
        for _ in 0..(2 * RATE_SAMPLE_PERIOD) {
            MockClock::advance(Duration::from_micros(1));
            window.adjust(0, &NoopInternalEvents);
        }
        assert!(window.window_full_sleep_nanos() > 0);

        // A gap far longer than the slow-source threshold between two samples means
        // the source has gone quiet; the throttle must be disabled rather than stay
        // pinned to a stale rate.
        MockClock::advance(SLOW_SOURCE_THRESHOLD + Duration::from_secs(1));
        for _ in 0..RATE_SAMPLE_PERIOD {
            window.adjust(0, &NoopInternalEvents);
        }
        assert_eq!(window.window_full_sleep_nanos(), 0);
    }
}
