//! Consumption metrics with Prometheus text export.

use crate::event::EventKind;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-batch counts reported by a consumer after applying a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub upserts: u64,
    pub deletes: u64,
    pub markers: u64,
    pub weight: u64,
}

impl BatchSummary {
    /// Count one applied event.
    pub fn record(&mut self, kind: EventKind, weight: u32) {
        match kind {
            EventKind::Upsert => self.upserts += 1,
            EventKind::Delete => self.deletes += 1,
            EventKind::Marker => self.markers += 1,
        }
        self.weight += u64::from(weight);
    }

    /// Number of events in the batch.
    pub fn events(&self) -> u64 {
        self.upserts + self.deletes + self.markers
    }
}

/// Counters shared between a consumer and the pipeline driving it.
pub struct ConsumerMetrics {
    // === CONSUMER ===
    batches_consumed: AtomicU64,
    batches_failed: AtomicU64,
    upserts_total: AtomicU64,
    deletes_total: AtomicU64,
    markers_total: AtomicU64,
    weight_consumed_total: AtomicU64,

    // === PIPELINE ===
    batch_retries_total: AtomicU64,
    backpressure_total: AtomicU64,
}

impl ConsumerMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            batches_consumed: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            upserts_total: AtomicU64::new(0),
            deletes_total: AtomicU64::new(0),
            markers_total: AtomicU64::new(0),
            weight_consumed_total: AtomicU64::new(0),
            batch_retries_total: AtomicU64::new(0),
            backpressure_total: AtomicU64::new(0),
        }
    }

    /// Record a successfully applied batch.
    pub fn record_batch(&self, summary: &BatchSummary) {
        self.batches_consumed.fetch_add(1, Ordering::Relaxed);
        self.upserts_total
            .fetch_add(summary.upserts, Ordering::Relaxed);
        self.deletes_total
            .fetch_add(summary.deletes, Ordering::Relaxed);
        self.markers_total
            .fetch_add(summary.markers, Ordering::Relaxed);
        self.weight_consumed_total
            .fetch_add(summary.weight, Ordering::Relaxed);
    }

    /// Record a batch that was rejected or rolled back.
    pub fn record_batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pipeline retry of a failed batch.
    pub fn record_retry(&self) {
        self.batch_retries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an admission refused for lack of weight budget.
    pub fn record_backpressure(&self) {
        self.backpressure_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batches_consumed(&self) -> u64 {
        self.batches_consumed.load(Ordering::Relaxed)
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    pub fn backpressure_total(&self) -> u64 {
        self.backpressure_total.load(Ordering::Relaxed)
    }

    pub fn batch_retries_total(&self) -> u64 {
        self.batch_retries_total.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_consumed: self.batches_consumed(),
            batches_failed: self.batches_failed(),
            upserts_total: self.upserts_total.load(Ordering::Relaxed),
            deletes_total: self.deletes_total.load(Ordering::Relaxed),
            markers_total: self.markers_total.load(Ordering::Relaxed),
            weight_consumed_total: self.weight_consumed_total.load(Ordering::Relaxed),
            batch_retries_total: self.batch_retries_total.load(Ordering::Relaxed),
            backpressure_total: self.backpressure_total(),
        }
    }

    /// Export all metrics in Prometheus text format.
    ///
    /// # Example
    /// ```
    /// use ixstream_core::metrics::{BatchSummary, ConsumerMetrics};
    ///
    /// let metrics = ConsumerMetrics::new();
    /// metrics.record_batch(&BatchSummary { upserts: 2, ..Default::default() });
    /// let text = metrics.export_prometheus_text();
    /// assert!(text.contains("ixstream_events_total{kind=\"upsert\"} 2"));
    /// ```
    pub fn export_prometheus_text(&self) -> String {
        let s = self.snapshot();
        let mut output = String::with_capacity(1024);

        push_counter(
            &mut output,
            "ixstream_batches_consumed_total",
            "Batches applied by the consumer",
            s.batches_consumed,
        );
        push_counter(
            &mut output,
            "ixstream_batches_failed_total",
            "Batches rejected or rolled back",
            s.batches_failed,
        );

        output.push_str("# HELP ixstream_events_total Events applied by kind\n");
        output.push_str("# TYPE ixstream_events_total counter\n");
        for (kind, value) in [
            (EventKind::Upsert, s.upserts_total),
            (EventKind::Delete, s.deletes_total),
            (EventKind::Marker, s.markers_total),
        ] {
            output.push_str(&format!(
                "ixstream_events_total{{kind=\"{}\"}} {}\n",
                kind.as_str(),
                value
            ));
        }
        output.push('\n');

        push_counter(
            &mut output,
            "ixstream_weight_consumed_total",
            "Advisory event weight applied",
            s.weight_consumed_total,
        );
        push_counter(
            &mut output,
            "ixstream_batch_retries_total",
            "Failed batches retried by the pipeline",
            s.batch_retries_total,
        );
        push_counter(
            &mut output,
            "ixstream_backpressure_total",
            "Admissions refused for lack of weight budget",
            s.backpressure_total,
        );

        output
    }
}

impl Default for ConsumerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_counter(output: &mut String, name: &str, help: &str, value: u64) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} counter\n", name));
    output.push_str(&format!("{} {}\n", name, value));
    output.push('\n');
}

/// Serializable copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub batches_consumed: u64,
    pub batches_failed: u64,
    pub upserts_total: u64,
    pub deletes_total: u64,
    pub markers_total: u64,
    pub weight_consumed_total: u64,
    pub batch_retries_total: u64,
    pub backpressure_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_summary() {
        let mut summary = BatchSummary::default();
        summary.record(EventKind::Upsert, 10);
        summary.record(EventKind::Delete, 0);
        summary.record(EventKind::Marker, 0);
        summary.record(EventKind::Upsert, 5);

        assert_eq!(summary.upserts, 2);
        assert_eq!(summary.deletes, 1);
        assert_eq!(summary.markers, 1);
        assert_eq!(summary.weight, 15);
        assert_eq!(summary.events(), 4);
    }

    #[test]
    fn test_counters() {
        let metrics = ConsumerMetrics::new();
        let summary = BatchSummary {
            upserts: 3,
            deletes: 1,
            markers: 0,
            weight: 100,
        };

        metrics.record_batch(&summary);
        metrics.record_batch(&summary);
        metrics.record_batch_failed();
        metrics.record_retry();
        metrics.record_backpressure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_consumed, 2);
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.upserts_total, 6);
        assert_eq!(snapshot.deletes_total, 2);
        assert_eq!(snapshot.weight_consumed_total, 200);
        assert_eq!(snapshot.batch_retries_total, 1);
        assert_eq!(snapshot.backpressure_total, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = ConsumerMetrics::new();
        metrics.record_batch(&BatchSummary {
            upserts: 1,
            deletes: 2,
            markers: 3,
            weight: 0,
        });

        let text = metrics.export_prometheus_text();
        assert!(text.contains("# TYPE ixstream_batches_consumed_total counter"));
        assert!(text.contains("ixstream_batches_consumed_total 1"));
        assert!(text.contains("ixstream_events_total{kind=\"delete\"} 2"));
        assert!(text.contains("ixstream_events_total{kind=\"marker\"} 3"));
        assert!(text.contains("ixstream_backpressure_total 0"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(ConsumerMetrics::new().snapshot()).unwrap();
        assert_eq!(json["batches_consumed"], 0);
    }
}
