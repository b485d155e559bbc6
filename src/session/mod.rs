//! Labeling sessions and preference export.
//!
//! A [`LabelingSession`] is the consumer side of the pipeline: it presents one
//! rendered pair at a time, writes the evaluator's answer back to the store,
//! and on termination exports every collected label as JSON.

pub mod export;
pub mod labeling;

pub use export::{preference_records, read_records, write_records, ExportError, PreferenceRecord};
pub use labeling::{LabelingSession, SessionError, SessionSettings};
