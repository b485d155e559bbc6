//! Trajectory recording types and the upstream pair producer.
//!
//! # Overview
//!
//! A trajectory is an ordered list of transitions, each holding:
//! - **State**: the observation before the action
//! - **Action**: what the agent did
//! - **Reward**: the step reward
//! - **Terminated / Truncated**: independent episode-end flags
//! - **Next state**: the observation after the action
//!
//! Two trajectories from the same environment form a [`PairDraft`]; once a
//! store assigns an identifier it becomes a [`TrajectoryPair`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use rlduels::env::EnvRegistry;
//! use rlduels::trajectory::simulate_trajectory_pairs;
//!
//! let drafts = simulate_trajectory_pairs(&EnvRegistry::default(), "CartPole-v1", 5, 42, 500)?;
//! for draft in drafts {
//!     store.insert(draft).await?;
//! }
//! ```

pub mod simulate;
pub mod types;

pub use simulate::{simulate_trajectory_pairs, SimulationError, Simulator};
pub use types::{
    Action, Observation, PairDraft, PairId, Preference, Reconstruction, Trajectory,
    TrajectoryPair, Transition,
};
