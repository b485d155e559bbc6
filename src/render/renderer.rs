//! Trajectory renderer: replay, validate, encode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::artifacts::{ArtifactDir, VideoArtifact};
use super::encoder::VideoEncoder;
use super::reconstruct::reconstruct_frames;
use crate::env::{EnvRegistry, Environment};
use crate::error::RenderError;
use crate::trajectory::{Trajectory, TrajectoryPair};

/// Turns one trajectory into a playable artifact.
///
/// Implementations take the trajectory by shared reference and must leave
/// it untouched; any copy needed internally is the renderer's business.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Renders `trajectory` and returns the artifact handle.
    async fn render(&self, trajectory: &Trajectory) -> Result<VideoArtifact, RenderError>;
}

/// Renders both trajectories of a pair and attaches the artifacts.
///
/// If either render fails, the other artifact is deleted and nothing is
/// attached.
pub async fn render_pair(
    renderer: &dyn Renderer,
    pair: &mut TrajectoryPair,
) -> Result<(), RenderError> {
    let (first, second) = futures::join!(
        renderer.render(&pair.trajectory1),
        renderer.render(&pair.trajectory2)
    );

    match (first, second) {
        (Ok(video1), Ok(video2)) => {
            pair.video1 = Some(video1);
            pair.video2 = Some(video2);
            Ok(())
        }
        (Ok(orphan), Err(e)) | (Err(e), Ok(orphan)) => {
            orphan.delete().await;
            Err(e)
        }
        (Err(e), Err(_)) => Err(e),
    }
}

type EnvPool = HashMap<String, Vec<Box<dyn Environment>>>;

/// Renderer that replays trajectories in pooled environments.
///
/// Replay runs on the blocking thread pool so the async runtime never
/// stalls on simulation work.
pub struct FrameRenderer {
    registry: EnvRegistry,
    pool: Arc<Mutex<EnvPool>>,
    encoder: Arc<dyn VideoEncoder>,
    output: ArtifactDir,
    frame_rate: f64,
    run_speed_factor: f64,
}

impl FrameRenderer {
    /// Creates a renderer writing into `output` with the given encoder.
    pub fn new(
        registry: EnvRegistry,
        encoder: Arc<dyn VideoEncoder>,
        output: ArtifactDir,
    ) -> Self {
        Self {
            registry,
            pool: Arc::new(Mutex::new(HashMap::new())),
            encoder,
            output,
            frame_rate: 50.0,
            run_speed_factor: 1.0,
        }
    }

    /// Sets the recording frame rate.
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Sets the playback speed multiplier.
    pub fn with_run_speed_factor(mut self, factor: f64) -> Self {
        self.run_speed_factor = factor;
        self
    }

    /// Playback frame rate of produced videos.
    pub fn fps(&self) -> f64 {
        self.frame_rate * self.run_speed_factor
    }

    /// Output directory.
    pub fn output(&self) -> &ArtifactDir {
        &self.output
    }

    fn checkout(&self, env_name: &str) -> Result<Box<dyn Environment>, RenderError> {
        let pooled = self
            .pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(env_name)
            .and_then(Vec::pop);

        match pooled {
            Some(env) => Ok(env),
            None => {
                debug!(env = env_name, "Creating environment for rendering");
                Ok(self.registry.create(env_name)?)
            }
        }
    }

    fn checkin(&self, env: Box<dyn Environment>) {
        self.pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(env.name().to_string())
            .or_default()
            .push(env);
    }
}

#[async_trait]
impl Renderer for FrameRenderer {
    async fn render(&self, trajectory: &Trajectory) -> Result<VideoArtifact, RenderError> {
        if trajectory.is_empty() {
            return Err(RenderError::EmptyFrameSequence);
        }

        let started = Instant::now();
        let mut env = self.checkout(&trajectory.env_name)?;
        let owned = trajectory.clone();

        let (env, frames) = tokio::task::spawn_blocking(move || {
            let frames = reconstruct_frames(env.as_mut(), &owned);
            (env, frames)
        })
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?;
        self.checkin(env);
        let frames = frames?;

        self.output.ensure().await?;
        let path = self.output.next_path(self.encoder.extension());
        let frame_count = frames.len();

        if let Err(e) = self.encoder.encode(frames, self.fps(), &path).await {
            warn!(path = %path.display(), error = %e, "Video encoding failed");
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        debug!(
            env = %trajectory.env_name,
            frames = frame_count,
            path = %path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered trajectory"
        );
        Ok(VideoArtifact::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnvError;
    use crate::render::RawVideoEncoder;
    use crate::trajectory::{PairDraft, PairId, Reconstruction, Simulator};

    fn renderer(dir: &std::path::Path) -> FrameRenderer {
        FrameRenderer::new(
            EnvRegistry::default(),
            Arc::new(RawVideoEncoder::new()),
            ArtifactDir::new(dir),
        )
        .with_frame_rate(50.0)
        .with_run_speed_factor(2.0)
    }

    fn trajectory(seed: u64) -> Trajectory {
        let env = EnvRegistry::default().create("CartPole-v1").expect("env");
        Simulator::new(env).simulate_episode(seed, 60).expect("simulate")
    }

    #[test]
    fn test_fps_combines_rate_and_speed() {
        let r = renderer(std::path::Path::new("/tmp"));
        assert!((r.fps() - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_render_writes_artifact_without_mutating_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let r = renderer(dir.path());
        let input = trajectory(4);
        let before = input.clone();

        let first = r.render(&input).await.expect("render");
        let second = r.render(&input).await.expect("render");

        assert_eq!(input, before);
        assert!(first.exists());
        assert!(second.exists());
        assert_ne!(first.path(), second.path());

        let (header, _) = RawVideoEncoder::read(first.path()).expect("read");
        assert_eq!(header.frames, input.len());
        assert!((header.fps - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_render_empty_trajectory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = Trajectory::new("CartPole-v1", Reconstruction::seeded(vec![1]), vec![]);
        let err = renderer(dir.path()).render(&empty).await.expect_err("empty");
        assert!(matches!(err, RenderError::EmptyFrameSequence));
    }

    #[tokio::test]
    async fn test_render_unknown_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut input = trajectory(1);
        input.env_name = "Unknown-v0".to_string();
        let err = renderer(dir.path()).render(&input).await.expect_err("unknown");
        assert!(matches!(
            err,
            RenderError::Environment(EnvError::UnknownEnvironment(_))
        ));
    }

    #[tokio::test]
    async fn test_render_pair_attaches_both_videos() {
        let dir = tempfile::tempdir().expect("tempdir");
        let r = renderer(dir.path());
        let draft = PairDraft::new(trajectory(1), trajectory(2)).expect("draft");
        let mut pair = TrajectoryPair::from_draft(PairId(1), draft);

        render_pair(&r, &mut pair).await.expect("render pair");
        assert!(pair.has_videos());

        pair.delete_videos().await;
        assert!(!pair.has_videos());
        assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }

    #[tokio::test]
    async fn test_render_pair_cleans_up_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let r = renderer(dir.path());
        let empty = Trajectory::new("CartPole-v1", Reconstruction::seeded(vec![1]), vec![]);
        let draft = PairDraft::new(trajectory(1), empty).expect("draft");
        let mut pair = TrajectoryPair::from_draft(PairId(1), draft);

        let err = render_pair(&r, &mut pair).await.expect_err("second is empty");
        assert!(matches!(err, RenderError::EmptyFrameSequence));
        assert!(!pair.has_videos());
        let leftovers = std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }
}
