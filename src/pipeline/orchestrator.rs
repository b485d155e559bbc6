//! Pipeline orchestrator for wiring store, renderer and sessions.
//!
//! This module provides the `PipelineOrchestrator` that coordinates:
//! - Opening the pair store named by the configuration
//! - Building the renderer with the configured encoder
//! - Simulating and storing new trajectory pairs
//! - Starting labeling sessions on a fresh buffered pipeline

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::env::EnvRegistry;
use crate::error::StoreError;
use crate::render::{ArtifactDir, FfmpegEncoder, FrameRenderer, RawVideoEncoder, Renderer, VideoEncoder};
use crate::session::{LabelingSession, SessionSettings};
use crate::storage::{open_store, LabelCounts, PairStore};
use crate::trajectory::{simulate_trajectory_pairs, PairId, SimulationError};

use super::buffered_queue::{BufferedPipeline, PipelineError};
use super::config::{ConfigError, EncoderKind, PipelineConfig};

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Pipeline startup error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Simulation error.
    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    /// A blocking task failed.
    #[error("Task failed: {0}")]
    Task(String),
}

/// Builds the renderer described by `config`.
pub fn build_renderer(config: &PipelineConfig, registry: EnvRegistry) -> FrameRenderer {
    let encoder: Arc<dyn VideoEncoder> = match config.encoder {
        EncoderKind::Ffmpeg => Arc::new(FfmpegEncoder::new(&config.ffmpeg_path)),
        EncoderKind::Raw => Arc::new(RawVideoEncoder::new()),
    };

    FrameRenderer::new(registry, encoder, ArtifactDir::new(&config.video_folder))
        .with_frame_rate(config.frame_rate)
        .with_run_speed_factor(config.run_speed_factor)
}

/// Main orchestrator that owns the shared components.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    registry: EnvRegistry,
    store: Arc<dyn PairStore>,
    renderer: Arc<dyn Renderer>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator from configuration.
    ///
    /// # Errors
    ///
    /// Returns `OrchestratorError` if the configuration is invalid or the
    /// store cannot be opened.
    pub async fn new(config: PipelineConfig) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let registry = EnvRegistry::default();
        let store = open_store(&config.database_url).await?;
        let renderer = Arc::new(build_renderer(&config, registry.clone()));

        Ok(Self {
            config,
            registry,
            store,
            renderer,
        })
    }

    /// Creates an orchestrator around existing components.
    pub fn with_components(
        config: PipelineConfig,
        store: Arc<dyn PairStore>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            config,
            registry: EnvRegistry::default(),
            store,
            renderer,
        }
    }

    /// Simulates `config.max_entries` pairs and stores them.
    ///
    /// Returns the identifiers in insertion order.
    pub async fn simulate(&self, seed: u64) -> Result<Vec<PairId>, OrchestratorError> {
        let registry = self.registry.clone();
        let env_name = self.config.env_name.clone();
        let n = self.config.max_entries;
        let max_steps = self.config.max_episode_steps;

        let drafts = tokio::task::spawn_blocking(move || {
            simulate_trajectory_pairs(&registry, &env_name, n, seed, max_steps)
        })
        .await
        .map_err(|e| OrchestratorError::Task(e.to_string()))??;

        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            ids.push(self.store.insert(draft).await?);
        }

        info!(
            env = %self.config.env_name,
            pairs = ids.len(),
            seed,
            "Simulated trajectory pairs"
        );
        Ok(ids)
    }

    /// Starts a buffered pipeline and a labeling session on top of it.
    ///
    /// Artifacts left in the video folder by an earlier run are removed
    /// first.
    pub async fn start_session(&self) -> Result<LabelingSession, OrchestratorError> {
        let artifacts = ArtifactDir::new(&self.config.video_folder);
        match artifacts.purge_stale().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Removed stale video artifacts"),
            Err(e) => warn!(error = %e, "Failed to purge stale video artifacts"),
        }

        let pipeline = BufferedPipeline::start(
            self.config.queue_config(),
            Arc::clone(&self.store),
            Arc::clone(&self.renderer),
        )?;

        let settings = SessionSettings {
            allow_ties: self.config.allow_ties,
            allow_skipping: self.config.allow_skipping,
            result_file: self.config.result_file.clone(),
        };

        Ok(LabelingSession::new(Arc::clone(&self.store), pipeline, settings))
    }

    /// Counts pairs by label state.
    pub async fn label_counts(&self) -> Result<LabelCounts, OrchestratorError> {
        Ok(self.store.label_counts().await?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the environment registry.
    pub fn registry(&self) -> &EnvRegistry {
        &self.registry
    }

    /// Returns the pair store.
    pub fn store(&self) -> &Arc<dyn PairStore> {
        &self.store
    }

    /// Returns the renderer.
    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig::default()
            .with_database_url("memory")
            .with_video_folder(dir.join("videos"))
            .with_encoder(EncoderKind::Raw)
            .with_max_queue_size(2)
            .with_poll_interval(Duration::from_millis(10))
            .with_result_file(dir.join("preferences.json"))
    }

    #[test]
    fn test_build_renderer_uses_config_fps() {
        let config = PipelineConfig::default()
            .with_frame_rate(30.0)
            .with_run_speed_factor(0.5);
        let renderer = build_renderer(&config, EnvRegistry::default());
        assert!((renderer.fps() - 15.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_simulate_stores_pairs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.max_entries = 3;
        cfg.max_episode_steps = 20;

        let orchestrator = PipelineOrchestrator::new(cfg).await.expect("orchestrator");
        let ids = orchestrator.simulate(1).await.expect("simulate");
        assert_eq!(ids, vec![PairId(1), PairId(2), PairId(3)]);

        let counts = orchestrator.label_counts().await.expect("counts");
        assert_eq!(counts.total, 3);
        assert_eq!(counts.pending, 3);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = PipelineOrchestrator::new(config(dir.path()).with_max_queue_size(0)).await;
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }
}
