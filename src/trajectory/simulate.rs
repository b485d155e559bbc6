//! Random-policy rollouts that produce trajectories and pairs.
//!
//! This is the upstream producer used by the `simulate` command and by
//! tests. Recorded seeds let the renderer replay each episode exactly.

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::types::{PairDraft, Reconstruction, Trajectory, Transition};
use crate::env::{EnvRegistry, Environment, ResetSpec};
use crate::error::{EnvError, PairError};

/// Upper bound for seeds drawn at episode boundaries.
const MAX_BOUNDARY_SEED: u64 = 100;

/// Errors raised while simulating.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Environment(#[from] EnvError),

    #[error(transparent)]
    Pair(#[from] PairError),
}

/// Rolls out an environment with randomly sampled actions.
pub struct Simulator {
    env: Box<dyn Environment>,
}

impl Simulator {
    /// Creates a simulator driving the given environment.
    pub fn new(env: Box<dyn Environment>) -> Self {
        Self { env }
    }

    /// Records one episode, stopping at the first boundary or `max_steps`.
    pub fn simulate_episode(
        &mut self,
        seed: u64,
        max_steps: usize,
    ) -> Result<Trajectory, SimulationError> {
        let mut observation = self.env.reset(ResetSpec::Seed(seed))?;
        let mut transitions = Vec::new();

        for _ in 0..max_steps {
            let action = self.env.sample_action();
            let outcome = self.env.step(&action)?;
            let done = outcome.terminated || outcome.truncated;

            transitions.push(Transition {
                state: std::mem::replace(&mut observation, outcome.observation.clone()),
                action,
                reward: outcome.reward,
                terminated: outcome.terminated,
                truncated: outcome.truncated,
                next_state: outcome.observation,
            });

            if done {
                break;
            }
        }

        debug!(
            env = self.env.name(),
            seed,
            steps = transitions.len(),
            "Simulated episode"
        );

        Ok(Trajectory::new(
            self.env.name(),
            Reconstruction::seeded(vec![seed]),
            transitions,
        ))
    }

    /// Records exactly `steps` transitions, resetting at episode boundaries.
    ///
    /// Each boundary draws the next seed from an RNG seeded with `seed` and
    /// appends it to the reconstruction seed list.
    pub fn simulate_for_steps(
        &mut self,
        steps: usize,
        seed: u64,
    ) -> Result<Trajectory, SimulationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut seeds = vec![seed];
        let mut observation = self.env.reset(ResetSpec::Seed(seed))?;
        let mut transitions = Vec::with_capacity(steps);

        for _ in 0..steps {
            let action = self.env.sample_action();
            let outcome = self.env.step(&action)?;

            transitions.push(Transition {
                state: std::mem::replace(&mut observation, outcome.observation.clone()),
                action,
                reward: outcome.reward,
                terminated: outcome.terminated,
                truncated: outcome.truncated,
                next_state: outcome.observation,
            });

            if outcome.terminated || outcome.truncated {
                let next_seed = rng.random_range(0..MAX_BOUNDARY_SEED);
                observation = self.env.reset(ResetSpec::Seed(next_seed))?;
                seeds.push(next_seed);
            }
        }

        Ok(Trajectory::new(
            self.env.name(),
            Reconstruction::seeded(seeds),
            transitions,
        ))
    }
}

/// Simulates `n` pairs of single-episode trajectories in one environment.
///
/// Episode seeds are `seed, seed + 1, ...` so the output is reproducible.
pub fn simulate_trajectory_pairs(
    registry: &EnvRegistry,
    env_name: &str,
    n: usize,
    seed: u64,
    max_steps: usize,
) -> Result<Vec<PairDraft>, SimulationError> {
    let mut simulator = Simulator::new(registry.create(env_name)?);
    let mut drafts = Vec::with_capacity(n);

    for i in 0..n as u64 {
        let first = simulator.simulate_episode(seed + 2 * i, max_steps)?;
        let second = simulator.simulate_episode(seed + 2 * i + 1, max_steps)?;
        drafts.push(PairDraft::new(first, second)?);
    }

    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator() -> Simulator {
        Simulator::new(EnvRegistry::default().create("CartPole-v1").expect("cartpole"))
    }

    #[test]
    fn test_episode_is_reproducible() {
        let a = simulator().simulate_episode(7, 500).expect("simulate");
        let b = simulator().simulate_episode(7, 500).expect("simulate");
        assert_eq!(a, b);
        assert_eq!(a.reconstruction.seeds, vec![7]);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_episode_ends_at_boundary() {
        let trajectory = simulator().simulate_episode(3, 500).expect("simulate");
        let last = trajectory.transitions.last().expect("non-empty");
        assert!(last.is_episode_boundary());
        assert!(trajectory.transitions[..trajectory.len() - 1]
            .iter()
            .all(|t| !t.is_episode_boundary()));
    }

    #[test]
    fn test_states_chain() {
        let trajectory = simulator().simulate_episode(11, 50).expect("simulate");
        for window in trajectory.transitions.windows(2) {
            assert_eq!(window[0].next_state, window[1].state);
        }
    }

    #[test]
    fn test_fixed_steps_records_boundary_seeds() {
        let trajectory = simulator().simulate_for_steps(300, 5).expect("simulate");
        assert_eq!(trajectory.len(), 300);
        let boundaries = trajectory
            .transitions
            .iter()
            .filter(|t| t.is_episode_boundary())
            .count();
        assert_eq!(trajectory.reconstruction.seeds.len(), boundaries + 1);
    }

    #[test]
    fn test_simulate_pairs() {
        let drafts = simulate_trajectory_pairs(&EnvRegistry::default(), "CartPole-v1", 3, 42, 100)
            .expect("simulate");
        assert_eq!(drafts.len(), 3);
        assert!(drafts.iter().all(|d| d.env_name() == "CartPole-v1"));
    }

    #[test]
    fn test_simulate_pairs_unknown_env() {
        let err = simulate_trajectory_pairs(&EnvRegistry::default(), "Nope-v0", 1, 0, 10)
            .expect_err("unknown env");
        assert!(matches!(err, SimulationError::Environment(_)));
    }
}
