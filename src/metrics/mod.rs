//! Prometheus metrics for pipeline monitoring.
//!
//! # Example
//!
//! ```ignore
//! use rlduels::metrics::PipelineMetrics;
//!
//! let metrics = PipelineMetrics::new()?;
//! metrics.record_cycle(rlduels::metrics::OUTCOME_ENQUEUED);
//! println!("{}", metrics.export());
//! ```

pub mod prometheus;

pub use self::prometheus::{
    PipelineMetrics, OUTCOME_ENQUEUED, OUTCOME_FAILED, OUTCOME_NO_ENTRY, OUTCOME_QUEUE_FULL,
};
