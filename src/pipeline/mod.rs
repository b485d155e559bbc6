//! Buffered labeling pipeline.
//!
//! # Architecture
//!
//! - **BufferedPipeline**: bounded queue of rendered pairs, refilled by one
//!   background worker that walks the store in identifier order
//! - **PipelineOrchestrator**: builds the store and renderer from
//!   configuration and wires them into simulation and labeling sessions
//! - **Config**: configuration for all pipeline components
//!
//! # Pipeline Flow
//!
//! 1. **Fetch**: the worker asks the store for the next unprocessed pair
//!    after its cursor
//! 2. **Render**: both trajectories are replayed and encoded to video
//! 3. **Buffer**: the rendered pair is pushed into the queue and the cursor
//!    moves past it
//! 4. **Consume**: a labeling session dequeues the pair, records a
//!    preference or a skip and writes it back to the store
//!
//! # Example
//!
//! ```rust,ignore
//! use rlduels::pipeline::{PipelineConfig, PipelineOrchestrator};
//!
//! let config = PipelineConfig::from_yaml_file("config.yaml")?;
//! let orchestrator = PipelineOrchestrator::new(config).await?;
//!
//! orchestrator.simulate().await?;
//! let mut session = orchestrator.start_session().await?;
//! let pair = session.current_pair().await;
//! println!("pair {} from {}", pair.id, pair.env_name());
//! ```

pub mod buffered_queue;
pub mod config;
pub mod orchestrator;

pub use buffered_queue::{
    BufferedPipeline, BufferedPipelineConfig, CycleOutcome, PipelineError, PipelineStats,
};
pub use config::{ConfigError, EncoderKind, PipelineConfig};
pub use orchestrator::{build_renderer, OrchestratorError, PipelineOrchestrator};
