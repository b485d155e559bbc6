//! Prometheus metrics for the buffered pipeline.
//!
//! Each pipeline owns its registry, so several pipelines (or tests) can run
//! in one process without name collisions.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

/// Outcome label of one refill cycle.
pub const OUTCOME_ENQUEUED: &str = "enqueued";
pub const OUTCOME_NO_ENTRY: &str = "no_entry";
pub const OUTCOME_QUEUE_FULL: &str = "queue_full";
pub const OUTCOME_FAILED: &str = "failed";

/// Metric handles for one pipeline instance.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,

    /// Refill cycles, labeled by outcome.
    pub refill_cycles: CounterVec,

    /// Entries currently buffered.
    pub queue_depth: Gauge,

    /// Store errors seen by the refill worker, labeled by error kind.
    pub store_errors: CounterVec,

    /// Pairs dropped because rendering failed.
    pub render_failures: Counter,

    /// Time spent rendering one pair, in seconds.
    pub render_duration: Histogram,

    /// Identifier of the last enqueued pair.
    pub cursor: Gauge,

    /// Pairs handed to consumers.
    pub dequeued: Counter,
}

impl PipelineMetrics {
    /// Creates and registers all metrics on a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric definition is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let refill_cycles = CounterVec::new(
            Opts::new("rlduels_refill_cycles_total", "Refill cycles by outcome"),
            &["outcome"],
        )?;

        let queue_depth = Gauge::new("rlduels_queue_depth", "Number of buffered pairs")?;

        let store_errors = CounterVec::new(
            Opts::new("rlduels_store_errors_total", "Store errors in the refill worker"),
            &["kind"],
        )?;

        let render_failures = Counter::new(
            "rlduels_render_failures_total",
            "Pairs dropped because rendering failed",
        )?;

        let render_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rlduels_render_duration_seconds",
                "Time spent rendering one pair",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        let cursor = Gauge::new("rlduels_cursor", "Identifier of the last enqueued pair")?;

        let dequeued = Counter::new("rlduels_dequeued_total", "Pairs handed to consumers")?;

        registry.register(Box::new(refill_cycles.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(render_failures.clone()))?;
        registry.register(Box::new(render_duration.clone()))?;
        registry.register(Box::new(cursor.clone()))?;
        registry.register(Box::new(dequeued.clone()))?;

        Ok(Self {
            registry,
            refill_cycles,
            queue_depth,
            store_errors,
            render_failures,
            render_duration,
            cursor,
            dequeued,
        })
    }

    /// Counts one refill cycle.
    pub fn record_cycle(&self, outcome: &str) {
        self.refill_cycles.with_label_values(&[outcome]).inc();
    }

    /// Counts one store error.
    pub fn record_store_error(&self, kind: &str) {
        self.store_errors.with_label_values(&[kind]).inc();
    }

    /// Reads the cycle counter for an outcome.
    pub fn cycles(&self, outcome: &str) -> u64 {
        self.refill_cycles.with_label_values(&[outcome]).get() as u64
    }

    /// The registry these metrics live in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Exports all metrics in the Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }

        String::from_utf8(buffer)
            .unwrap_or_else(|e| format!("# Error converting metrics to string: {}\n", e))
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("queue_depth", &self.queue_depth.get())
            .field("cursor", &self.cursor.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_independent() {
        let a = PipelineMetrics::new().expect("metrics");
        let b = PipelineMetrics::new().expect("metrics");

        a.record_cycle(OUTCOME_ENQUEUED);
        a.record_cycle(OUTCOME_ENQUEUED);
        b.record_cycle(OUTCOME_NO_ENTRY);

        assert_eq!(a.cycles(OUTCOME_ENQUEUED), 2);
        assert_eq!(b.cycles(OUTCOME_ENQUEUED), 0);
        assert_eq!(b.cycles(OUTCOME_NO_ENTRY), 1);
    }

    #[test]
    fn test_export_contains_metric_names() {
        let metrics = PipelineMetrics::new().expect("metrics");
        metrics.record_store_error("connection_failure");
        metrics.queue_depth.set(2.0);
        metrics.render_duration.observe(0.3);

        let text = metrics.export();
        assert!(text.contains("rlduels_store_errors_total"));
        assert!(text.contains("kind=\"connection_failure\""));
        assert!(text.contains("rlduels_queue_depth 2"));
        assert!(text.contains("rlduels_render_duration_seconds"));
    }
}
