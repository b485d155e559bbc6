//! Trajectory data types for preference labeling.
//!
//! This module defines the transition/trajectory format recorded by the
//! simulator and the pair type that is the unit of labeling work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PairError;
use crate::render::VideoArtifact;

/// An environment observation vector.
pub type Observation = Vec<f64>;

/// An action taken by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Index into a discrete action space.
    Discrete(i64),

    /// Point in a continuous action space.
    Continuous(Vec<f64>),
}

/// A single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation before the action was taken.
    pub state: Observation,

    /// Action taken by the agent.
    pub action: Action,

    /// Reward received for this step.
    pub reward: f64,

    /// Whether the episode reached a terminal state.
    pub terminated: bool,

    /// Whether the episode was cut off by a time limit.
    pub truncated: bool,

    /// Observation after the action was taken.
    pub next_state: Observation,
}

impl Transition {
    /// Returns true if this step ended an episode for either reason.
    pub fn is_episode_boundary(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Metadata needed to reconstruct the frames of a trajectory.
///
/// Seeds form a queue: the first one is used for the initial reset and each
/// episode boundary consumes the next one. An empty list means the trajectory
/// is replayed from its recorded observations instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconstruction {
    /// Reset seeds in the order they were used.
    #[serde(default)]
    pub seeds: Vec<u64>,
}

impl Reconstruction {
    /// Metadata for a trajectory recorded from the given seeds.
    pub fn seeded(seeds: Vec<u64>) -> Self {
        Self { seeds }
    }

    /// Metadata for a trajectory without seeds.
    pub fn unseeded() -> Self {
        Self::default()
    }

    /// Returns true if a seed is available for exact reconstruction.
    pub fn is_seeded(&self) -> bool {
        !self.seeds.is_empty()
    }
}

/// A recorded sequence of transitions in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Name of the environment the trajectory was recorded in.
    pub env_name: String,

    /// Reconstruction metadata.
    #[serde(default)]
    pub reconstruction: Reconstruction,

    /// Steps in recording order.
    pub transitions: Vec<Transition>,
}

impl Trajectory {
    /// Creates a new trajectory.
    pub fn new(
        env_name: impl Into<String>,
        reconstruction: Reconstruction,
        transitions: Vec<Transition>,
    ) -> Self {
        Self {
            env_name: env_name.into(),
            reconstruction,
            transitions,
        }
    }

    /// Total reward accumulated across all transitions.
    pub fn total_reward(&self) -> f64 {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns true if the trajectory has no transitions.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Store-assigned pair identifier. Monotonic, so it doubles as a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairId(pub i64);

impl PairId {
    /// Returns the raw identifier value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PairId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// The evaluator's decision for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    /// The first trajectory is preferred.
    First,

    /// The second trajectory is preferred.
    Second,

    /// Neither trajectory is preferred.
    Indifferent,
}

impl Preference {
    /// Numeric encoding used by downstream reward-model training.
    pub fn score(self) -> f64 {
        match self {
            Preference::First => 0.0,
            Preference::Second => 1.0,
            Preference::Indifferent => 0.5,
        }
    }

    /// Stable name used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Preference::First => "first",
            Preference::Second => "second",
            Preference::Indifferent => "indifferent",
        }
    }

    /// Parses the storage name back into a preference.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "first" => Some(Preference::First),
            "second" => Some(Preference::Second),
            "indifferent" => Some(Preference::Indifferent),
            _ => None,
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two trajectories from the same environment, validated but not yet stored.
///
/// This is the only way to build pair content, so the same-environment
/// invariant holds for every pair a store ever sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairDraft {
    trajectory1: Trajectory,
    trajectory2: Trajectory,
}

impl PairDraft {
    /// Validates and bundles two trajectories.
    ///
    /// # Errors
    ///
    /// Returns `PairError::EnvironmentMismatch` if the environments differ.
    pub fn new(trajectory1: Trajectory, trajectory2: Trajectory) -> Result<Self, PairError> {
        if trajectory1.env_name != trajectory2.env_name {
            return Err(PairError::EnvironmentMismatch {
                first: trajectory1.env_name,
                second: trajectory2.env_name,
            });
        }
        Ok(Self {
            trajectory1,
            trajectory2,
        })
    }

    /// Shared environment name.
    pub fn env_name(&self) -> &str {
        &self.trajectory1.env_name
    }

    /// First trajectory.
    pub fn trajectory1(&self) -> &Trajectory {
        &self.trajectory1
    }

    /// Second trajectory.
    pub fn trajectory2(&self) -> &Trajectory {
        &self.trajectory2
    }

    /// Splits the draft into its trajectories.
    pub fn into_parts(self) -> (Trajectory, Trajectory) {
        (self.trajectory1, self.trajectory2)
    }
}

/// The unit of labeling work.
///
/// Label state is mutable and written back through the store. Video
/// artifacts are attached in memory by the pipeline and never persisted.
#[derive(Debug, Clone)]
pub struct TrajectoryPair {
    /// Store-assigned identifier.
    pub id: PairId,

    /// First trajectory.
    pub trajectory1: Trajectory,

    /// Second trajectory.
    pub trajectory2: Trajectory,

    /// Evaluator's decision, if any.
    pub preference: Option<Preference>,

    /// Whether the evaluator skipped this pair.
    pub skipped: bool,

    /// Rendered video of the first trajectory.
    pub video1: Option<VideoArtifact>,

    /// Rendered video of the second trajectory.
    pub video2: Option<VideoArtifact>,
}

impl TrajectoryPair {
    /// Builds a stored pair from a draft and its identifier.
    pub fn from_draft(id: PairId, draft: PairDraft) -> Self {
        let (trajectory1, trajectory2) = draft.into_parts();
        Self {
            id,
            trajectory1,
            trajectory2,
            preference: None,
            skipped: false,
            video1: None,
            video2: None,
        }
    }

    /// Shared environment name.
    pub fn env_name(&self) -> &str {
        &self.trajectory1.env_name
    }

    /// Records a preference.
    pub fn prefer(&mut self, preference: Preference) {
        self.preference = Some(preference);
    }

    /// Clears a recorded preference.
    pub fn undo_preference(&mut self) {
        self.preference = None;
    }

    /// Marks the pair as skipped.
    pub fn skip(&mut self) {
        self.skipped = true;
    }

    /// Returns true once the evaluator has decided or skipped.
    pub fn is_resolved(&self) -> bool {
        self.preference.is_some() || self.skipped
    }

    /// Returns true if both videos are attached.
    pub fn has_videos(&self) -> bool {
        self.video1.is_some() && self.video2.is_some()
    }

    /// Deletes both video files and detaches them.
    pub async fn delete_videos(&mut self) {
        for artifact in [self.video1.take(), self.video2.take()].into_iter().flatten() {
            artifact.delete().await;
        }
    }
}
