//! Rendering of trajectories into playable video artifacts.
//!
//! # Overview
//!
//! - **Reconstruct**: replay a trajectory in a live environment to regenerate
//!   its frames (seeded or unseeded mode)
//! - **Encode**: write the frames at `frame_rate * run_speed_factor` fps with a
//!   [`VideoEncoder`] (ffmpeg WebM or gzip raw frames)
//! - **Artifacts**: file handles owned by the pipeline until the labeling
//!   session releases them
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rlduels::env::EnvRegistry;
//! use rlduels::render::{ArtifactDir, FfmpegEncoder, FrameRenderer, Renderer};
//!
//! let renderer = FrameRenderer::new(
//!     EnvRegistry::default(),
//!     Arc::new(FfmpegEncoder::default()),
//!     ArtifactDir::new("./videos"),
//! )
//! .with_frame_rate(50.0);
//!
//! let video = renderer.render(&trajectory).await?;
//! println!("{}", video.path().display());
//! ```

pub mod artifacts;
pub mod encoder;
pub mod reconstruct;
pub mod renderer;

pub use artifacts::{ArtifactDir, VideoArtifact, ARTIFACT_PREFIX};
pub use encoder::{validate_frames, FfmpegEncoder, RawVideoEncoder, RawVideoHeader, VideoEncoder};
pub use reconstruct::reconstruct_frames;
pub use renderer::{render_pair, FrameRenderer, Renderer};
