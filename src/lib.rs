//! rlduels: pairwise preference labeling for recorded RL trajectories.
//!
//! This library provides the pieces of a human-feedback labeling loop:
//! a store of trajectory pairs, a renderer that replays trajectories to
//! video, and a buffered pipeline that keeps rendered pairs ready for an
//! evaluator.

// Core modules
pub mod cli;
pub mod env;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod storage;
pub mod trajectory;

// Re-export commonly used error types
pub use error::{EnvError, PairError, RenderError, StoreError};
