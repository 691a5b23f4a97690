//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::MatchResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Directory lookup latency bucket boundaries (milliseconds)
/// Buckets: ≤5, ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000
const BUCKET_BOUNDS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for a check-in surface
pub struct Metrics {
    /// Resolutions started (monotonic)
    resolutions_total: AtomicU64,
    /// Bursts discarded on idle as too short or too long (monotonic)
    scans_discarded: AtomicU64,
    /// Completed bursts dropped because the guard was held (monotonic)
    guard_rejections: AtomicU64,
    /// Lookup/write completions dropped as stale (monotonic)
    stale_completions: AtomicU64,
    no_match_total: AtomicU64,
    single_match_total: AtomicU64,
    multiple_matches_total: AtomicU64,
    lookup_failures: AtomicU64,
    visits_recorded: AtomicU64,
    ledger_failures: AtomicU64,
    cancels_total: AtomicU64,
    /// Notifications dropped due to channel full (monotonic)
    notifications_dropped: AtomicU64,
    /// Lookup latency histogram buckets (reset on report)
    lookup_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    /// Sum of lookup latencies in ms (reset on report)
    lookup_latency_sum_ms: AtomicU64,
    /// Max lookup latency in ms (reset on report)
    lookup_latency_max_ms: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            resolutions_total: AtomicU64::new(0),
            scans_discarded: AtomicU64::new(0),
            guard_rejections: AtomicU64::new(0),
            stale_completions: AtomicU64::new(0),
            no_match_total: AtomicU64::new(0),
            single_match_total: AtomicU64::new(0),
            multiple_matches_total: AtomicU64::new(0),
            lookup_failures: AtomicU64::new(0),
            visits_recorded: AtomicU64::new(0),
            ledger_failures: AtomicU64::new(0),
            cancels_total: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            lookup_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            lookup_latency_sum_ms: AtomicU64::new(0),
            lookup_latency_max_ms: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_resolution_started(&self) {
        self.resolutions_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_scan_discarded(&self) {
        self.scans_discarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_guard_rejection(&self) {
        self.guard_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_completion(&self) {
        self.stale_completions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished directory lookup. `None` is a failed or timed-out
    /// lookup; its latency still counts.
    #[inline]
    pub fn record_lookup(&self, latency_ms: u64, result: Option<&MatchResult>) {
        self.lookup_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.lookup_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.lookup_latency_max_ms, latency_ms);

        let counter = match result {
            None => &self.lookup_failures,
            Some(MatchResult::NoMatch) => &self.no_match_total,
            Some(MatchResult::SingleMatch(_)) => &self.single_match_total,
            Some(MatchResult::MultipleMatches(_)) => &self.multiple_matches_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_visit(&self) {
        self.visits_recorded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ledger_failure(&self) {
        self.ledger_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cancel(&self) {
        self.cancels_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn guard_rejections(&self) -> u64 {
        self.guard_rejections.load(Ordering::Relaxed)
    }

    pub fn stale_completions(&self) -> u64 {
        self.stale_completions.load(Ordering::Relaxed)
    }

    pub fn visits_recorded(&self) -> u64 {
        self.visits_recorded.load(Ordering::Relaxed)
    }

    pub fn scans_discarded(&self) -> u64 {
        self.scans_discarded.load(Ordering::Relaxed)
    }

    /// Generate a report, resetting the periodic lookup latency counters
    pub fn report(&self) -> MetricsSummary {
        let lookup_buckets = swap_buckets(&self.lookup_latency_buckets);
        let lookup_sum = self.lookup_latency_sum_ms.swap(0, Ordering::Relaxed);
        let lookup_max = self.lookup_latency_max_ms.swap(0, Ordering::Relaxed);
        let lookups_since_report: u64 = lookup_buckets.iter().sum();

        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed.as_secs()
        };

        MetricsSummary {
            elapsed_secs,
            resolutions_total: self.resolutions_total.load(Ordering::Relaxed),
            scans_discarded: self.scans_discarded.load(Ordering::Relaxed),
            guard_rejections: self.guard_rejections.load(Ordering::Relaxed),
            stale_completions: self.stale_completions.load(Ordering::Relaxed),
            no_match_total: self.no_match_total.load(Ordering::Relaxed),
            single_match_total: self.single_match_total.load(Ordering::Relaxed),
            multiple_matches_total: self.multiple_matches_total.load(Ordering::Relaxed),
            lookup_failures: self.lookup_failures.load(Ordering::Relaxed),
            visits_recorded: self.visits_recorded.load(Ordering::Relaxed),
            ledger_failures: self.ledger_failures.load(Ordering::Relaxed),
            cancels_total: self.cancels_total.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            lookups_since_report,
            lookup_avg_ms: if lookups_since_report > 0 {
                lookup_sum / lookups_since_report
            } else {
                0
            },
            lookup_max_ms: lookup_max,
            lookup_p95_ms: percentile_from_buckets(&lookup_buckets, 0.95),
            lookup_buckets,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot produced by [`Metrics::report`]
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub elapsed_secs: u64,
    pub resolutions_total: u64,
    pub scans_discarded: u64,
    pub guard_rejections: u64,
    pub stale_completions: u64,
    pub no_match_total: u64,
    pub single_match_total: u64,
    pub multiple_matches_total: u64,
    pub lookup_failures: u64,
    pub visits_recorded: u64,
    pub ledger_failures: u64,
    pub cancels_total: u64,
    pub notifications_dropped: u64,
    pub lookups_since_report: u64,
    pub lookup_avg_ms: u64,
    pub lookup_max_ms: u64,
    pub lookup_p95_ms: u64,
    pub lookup_buckets: [u64; METRICS_NUM_BUCKETS],
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            elapsed_secs = %self.elapsed_secs,
            resolutions = %self.resolutions_total,
            discarded = %self.scans_discarded,
            guard_rejections = %self.guard_rejections,
            stale = %self.stale_completions,
            no_match = %self.no_match_total,
            single_match = %self.single_match_total,
            multiple_matches = %self.multiple_matches_total,
            visits = %self.visits_recorded,
            lookup_failures = %self.lookup_failures,
            ledger_failures = %self.ledger_failures,
            cancels = %self.cancels_total,
            notifications_dropped = %self.notifications_dropped,
            lookups = %self.lookups_since_report,
            lookup_avg_ms = %self.lookup_avg_ms,
            lookup_p95_ms = %self.lookup_p95_ms,
            lookup_max_ms = %self.lookup_max_ms,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemberId, MemberRef};

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(5), 0);
        assert_eq!(bucket_index(6), 1);
        assert_eq!(bucket_index(1000), 7);
        assert_eq!(bucket_index(60_000), 10);
    }

    #[test]
    fn test_record_lookup() {
        let metrics = Metrics::new();
        let member = MemberRef {
            id: MemberId(1),
            display_name: "Ana".to_string(),
            card_identifier: "12345678".to_string(),
        };

        metrics.record_lookup(20, Some(&MatchResult::NoMatch));
        metrics.record_lookup(40, Some(&MatchResult::SingleMatch(member)));
        metrics.record_lookup(90, Some(&MatchResult::NoMatch));
        // Timed-out lookup is the slowest and still lands in the histogram
        metrics.record_lookup(3010, None);

        let summary = metrics.report();
        assert_eq!(summary.no_match_total, 2);
        assert_eq!(summary.single_match_total, 1);
        assert_eq!(summary.lookup_failures, 1);
        assert_eq!(summary.lookups_since_report, 4);
        assert_eq!(summary.lookup_avg_ms, 790);
        assert_eq!(summary.lookup_max_ms, 3010);

        // Periodic counters reset, monotonic ones don't
        let summary = metrics.report();
        assert_eq!(summary.lookups_since_report, 0);
        assert_eq!(summary.lookup_max_ms, 0);
        assert_eq!(summary.no_match_total, 2);
    }

    #[test]
    fn test_report_empty() {
        let summary = Metrics::new().report();
        assert_eq!(summary.resolutions_total, 0);
        assert_eq!(summary.lookup_avg_ms, 0);
        assert_eq!(summary.lookup_p95_ms, 0);
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.record_guard_rejection();
        metrics.record_guard_rejection();
        metrics.record_stale_completion();
        metrics.record_visit();
        assert_eq!(metrics.guard_rejections(), 2);
        assert_eq!(metrics.stale_completions(), 1);
        assert_eq!(metrics.visits_recorded(), 1);
    }
}
