//! Shipper metrics for observability
//!
//! Counters for both sides of the queue: what producers submitted and lost
//! to backpressure, and what the delivery thread sent, retried and dropped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for shipper observability
///
/// # Example
///
/// ```
/// use bulk_log_shipper::ShipperMetrics;
///
/// let metrics = ShipperMetrics::new();
/// metrics.record_submitted();
/// metrics.record_dropped();
///
/// assert_eq!(metrics.submitted(), 1);
/// assert_eq!(metrics.dropped_count(), 1);
/// ```
#[derive(Debug)]
pub struct ShipperMetrics {
    /// Events handed to `submit`
    submitted: AtomicU64,

    /// Records that made it into the queue
    enqueued: AtomicU64,

    /// Records lost before reaching the queue (full or shut down)
    dropped_count: AtomicU64,

    /// Number of times a producer found the queue full
    queue_full_events: AtomicU64,

    /// Number of times a producer waited for space
    block_events: AtomicU64,

    /// Bulk requests answered with success
    batches_sent: AtomicU64,

    /// Records the endpoint accepted
    records_delivered: AtomicU64,

    /// Records the endpoint rejected inside a successful bulk response
    records_rejected: AtomicU64,

    /// Batches given up on after retries or a permanent error
    batches_dropped: AtomicU64,

    /// Records lost in the delivery thread (dropped batches, bad templates)
    records_lost: AtomicU64,

    /// Retry attempts made
    retries: AtomicU64,
}

impl ShipperMetrics {
    pub const fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            records_delivered: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            batches_dropped: AtomicU64::new(0),
            records_lost: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue_full_events(&self) -> u64 {
        self.queue_full_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn records_delivered(&self) -> u64 {
        self.records_delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn records_rejected(&self) -> u64 {
        self.records_rejected.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn records_lost(&self) -> u64 {
        self.records_lost.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_submitted(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_enqueued(&self) -> u64 {
        self.enqueued.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a dropped submission; returns the previous drop count
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped_count.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_queue_full(&self) -> u64 {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_block(&self) -> u64 {
        self.block_events.fetch_add(1, Ordering::Relaxed)
    }

    /// Record one successful bulk response
    #[inline]
    pub fn record_batch_sent(&self, delivered: usize, rejected: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.records_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.records_rejected
            .fetch_add(rejected as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch_dropped(&self, records: usize) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.records_lost.fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lost(&self, records: usize) {
        self.records_lost.fetch_add(records as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) -> u64 {
        self.retries.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of submissions dropped at the queue, as a percentage
    ///
    /// Returns 0.0 if nothing has been submitted.
    pub fn drop_rate(&self) -> f64 {
        let submitted = self.submitted() as f64;
        if submitted == 0.0 {
            0.0
        } else {
            (self.dropped_count() as f64 / submitted) * 100.0
        }
    }
}

impl Default for ShipperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ShipperMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            submitted: AtomicU64::new(self.submitted()),
            enqueued: AtomicU64::new(self.enqueued()),
            dropped_count: AtomicU64::new(self.dropped_count()),
            queue_full_events: AtomicU64::new(self.queue_full_events()),
            block_events: AtomicU64::new(self.block_events()),
            batches_sent: AtomicU64::new(self.batches_sent()),
            records_delivered: AtomicU64::new(self.records_delivered()),
            records_rejected: AtomicU64::new(self.records_rejected()),
            batches_dropped: AtomicU64::new(self.batches_dropped()),
            records_lost: AtomicU64::new(self.records_lost()),
            retries: AtomicU64::new(self.retries()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = ShipperMetrics::new();
        assert_eq!(metrics.submitted(), 0);
        assert_eq!(metrics.dropped_count(), 0);
        assert_eq!(metrics.records_delivered(), 0);
        assert_eq!(metrics.retries(), 0);
    }

    #[test]
    fn test_record_dropped_returns_previous() {
        let metrics = ShipperMetrics::new();
        assert_eq!(metrics.record_dropped(), 0);
        assert_eq!(metrics.record_dropped(), 1);
        assert_eq!(metrics.dropped_count(), 2);
    }

    #[test]
    fn test_batch_accounting() {
        let metrics = ShipperMetrics::new();
        metrics.record_batch_sent(8, 2);
        metrics.record_batch_sent(5, 0);
        metrics.record_batch_dropped(4);
        metrics.record_lost(1);

        assert_eq!(metrics.batches_sent(), 2);
        assert_eq!(metrics.records_delivered(), 13);
        assert_eq!(metrics.records_rejected(), 2);
        assert_eq!(metrics.batches_dropped(), 1);
        assert_eq!(metrics.records_lost(), 5);
    }

    #[test]
    fn test_drop_rate() {
        let metrics = ShipperMetrics::new();
        assert_eq!(metrics.drop_rate(), 0.0);

        for _ in 0..100 {
            metrics.record_submitted();
        }
        for _ in 0..10 {
            metrics.record_dropped();
        }
        let rate = metrics.drop_rate();
        assert!((9.9..=10.1).contains(&rate), "Drop rate was {}", rate);
    }

    #[test]
    fn test_metrics_clone_is_snapshot() {
        let metrics = ShipperMetrics::new();
        metrics.record_enqueued();

        let snapshot = metrics.clone();
        metrics.record_enqueued();

        assert_eq!(snapshot.enqueued(), 1);
        assert_eq!(metrics.enqueued(), 2);
    }
}
