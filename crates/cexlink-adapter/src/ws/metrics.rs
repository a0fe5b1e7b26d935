/*
[INPUT]:  Per-frame processing latency, byte counts, reconnect and error events
[OUTPUT]: PerformanceMetrics counters and point-in-time snapshots
[POS]:    WebSocket layer - per-connection throughput and health counters
[UPDATE]: When adding new counters to the connection snapshot
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Weight of the newest sample in the rolling latency average, in 1/1000ths.
const EWMA_WEIGHT_PER_MILLE: u64 = 100;

/// Lock-free counters written by the worker task and read by anyone.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    messages_processed: AtomicU64,
    bytes_received: AtomicU64,
    avg_latency_ns: AtomicU64,
    max_latency_ns: AtomicU64,
    reconnections: AtomicU64,
    errors: AtomicU64,
    parse_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub messages_processed: u64,
    pub bytes_received: u64,
    pub avg_latency: Duration,
    pub max_latency: Duration,
    pub reconnections: u64,
    pub errors: u64,
    pub parse_errors: u64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self, bytes: usize, latency: Duration) {
        let sample = latency.as_nanos().min(u128::from(u64::MAX)) as u64;
        let processed = self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.max_latency_ns.fetch_max(sample, Ordering::Relaxed);

        // single writer per connection, so load/store is enough here
        let avg = if processed == 0 {
            sample
        } else {
            let prev = self.avg_latency_ns.load(Ordering::Relaxed);
            let keep = 1000 - EWMA_WEIGHT_PER_MILLE;
            ((u128::from(prev) * u128::from(keep) + u128::from(sample) * u128::from(EWMA_WEIGHT_PER_MILLE))
                / 1000) as u64
        };
        self.avg_latency_ns.store(avg, Ordering::Relaxed);
    }

    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            avg_latency: Duration::from_nanos(self.avg_latency_ns.load(Ordering::Relaxed)),
            max_latency: Duration::from_nanos(self.max_latency_ns.load(Ordering::Relaxed)),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_average() {
        let metrics = PerformanceMetrics::new();
        metrics.record_message(10, Duration::from_micros(50));
        let snap = metrics.snapshot();
        assert_eq!(snap.messages_processed, 1);
        assert_eq!(snap.bytes_received, 10);
        assert_eq!(snap.avg_latency, Duration::from_micros(50));
        assert_eq!(snap.max_latency, Duration::from_micros(50));
    }

    #[test]
    fn average_moves_toward_new_samples() {
        let metrics = PerformanceMetrics::new();
        metrics.record_message(1, Duration::from_micros(100));
        metrics.record_message(1, Duration::from_micros(200));
        let snap = metrics.snapshot();
        assert_eq!(snap.avg_latency, Duration::from_micros(110));
        assert_eq!(snap.max_latency, Duration::from_micros(200));
    }

    #[test]
    fn counters_accumulate() {
        let metrics = PerformanceMetrics::new();
        metrics.record_reconnection();
        metrics.record_error();
        metrics.record_error();
        metrics.record_parse_error();
        let snap = metrics.snapshot();
        assert_eq!((snap.reconnections, snap.errors, snap.parse_errors), (1, 2, 1));
    }
}
