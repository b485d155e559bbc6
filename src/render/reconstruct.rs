//! Frame reconstruction from recorded trajectories.
//!
//! Frames are never stored. They are regenerated by replaying the
//! trajectory in a live environment, one frame per transition:
//!
//! - **Seeded**: reset with the first seed and step every recorded action.
//!   Each episode boundary resets with the next seed in the queue, which
//!   reproduces the recording exactly.
//! - **Unseeded**: reset to the first recorded state, step every action and
//!   reset to the recorded next state at episode boundaries. This is an
//!   approximation for environments without a reproducible seed.

use std::collections::VecDeque;

use crate::env::{Environment, Frame, ResetSpec};
use crate::error::RenderError;
use crate::trajectory::Trajectory;

/// Replays `trajectory` in `env` and returns the captured frames.
pub fn reconstruct_frames(
    env: &mut dyn Environment,
    trajectory: &Trajectory,
) -> Result<Vec<Frame>, RenderError> {
    if trajectory.is_empty() {
        return Err(RenderError::EmptyFrameSequence);
    }

    if trajectory.reconstruction.is_seeded() {
        replay_seeded(env, trajectory)
    } else {
        replay_unseeded(env, trajectory)
    }
}

fn replay_seeded(
    env: &mut dyn Environment,
    trajectory: &Trajectory,
) -> Result<Vec<Frame>, RenderError> {
    let mut seeds: VecDeque<u64> = trajectory.reconstruction.seeds.iter().copied().collect();
    // Exhausted queues keep reusing the last seed.
    let mut current = seeds.pop_front().ok_or(RenderError::EmptyFrameSequence)?;
    env.reset(ResetSpec::Seed(current))?;

    let mut frames = Vec::with_capacity(trajectory.len());
    for transition in &trajectory.transitions {
        env.step(&transition.action)?;
        frames.push(env.render());

        if transition.is_episode_boundary() {
            if let Some(next) = seeds.pop_front() {
                current = next;
            }
            env.reset(ResetSpec::Seed(current))?;
        }
    }

    Ok(frames)
}

fn replay_unseeded(
    env: &mut dyn Environment,
    trajectory: &Trajectory,
) -> Result<Vec<Frame>, RenderError> {
    env.reset(ResetSpec::State(&trajectory.transitions[0].state))?;

    let mut frames = Vec::with_capacity(trajectory.len());
    for transition in &trajectory.transitions {
        if transition.is_episode_boundary() {
            env.reset(ResetSpec::State(&transition.next_state))?;
        } else {
            env.step(&transition.action)?;
        }
        frames.push(env.render());
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvRegistry, StepOutcome};
    use crate::error::EnvError;
    use crate::trajectory::{Action, Observation, Reconstruction, Simulator, Transition};
    use ndarray::Array3;

    /// Records every call so tests can assert the replay protocol.
    #[derive(Default)]
    struct RecordingEnv {
        calls: Vec<String>,
    }

    impl Environment for RecordingEnv {
        fn name(&self) -> &str {
            "Recording-v0"
        }

        fn reset(&mut self, spec: ResetSpec<'_>) -> Result<Observation, EnvError> {
            match spec {
                ResetSpec::Seed(seed) => self.calls.push(format!("seed:{seed}")),
                ResetSpec::State(state) => self.calls.push(format!("state:{}", state[0])),
            }
            Ok(vec![0.0])
        }

        fn step(&mut self, action: &Action) -> Result<StepOutcome, EnvError> {
            self.calls.push(format!("step:{action:?}"));
            Ok(StepOutcome {
                observation: vec![0.0],
                reward: 0.0,
                terminated: false,
                truncated: false,
            })
        }

        fn render(&self) -> Frame {
            Array3::zeros((1, 1, 3))
        }

        fn sample_action(&mut self) -> Action {
            Action::Discrete(0)
        }
    }

    fn transition(tag: f64, terminated: bool, truncated: bool) -> Transition {
        Transition {
            state: vec![tag],
            action: Action::Discrete(tag as i64),
            reward: 1.0,
            terminated,
            truncated,
            next_state: vec![tag + 0.5],
        }
    }

    #[test]
    fn test_empty_trajectory_fails_before_reset() {
        let mut env = RecordingEnv::default();
        let trajectory = Trajectory::new("Recording-v0", Reconstruction::seeded(vec![1]), vec![]);
        assert!(matches!(
            reconstruct_frames(&mut env, &trajectory),
            Err(RenderError::EmptyFrameSequence)
        ));
        assert!(env.calls.is_empty());
    }

    #[test]
    fn test_seeded_consumes_seed_queue_at_boundaries() {
        let mut env = RecordingEnv::default();
        let trajectory = Trajectory::new(
            "Recording-v0",
            Reconstruction::seeded(vec![10, 20]),
            vec![
                transition(1.0, false, false),
                transition(2.0, true, false),
                transition(3.0, false, false),
                transition(4.0, false, true),
            ],
        );

        let frames = reconstruct_frames(&mut env, &trajectory).expect("replay");
        assert_eq!(frames.len(), 4);
        assert_eq!(
            env.calls,
            vec![
                "seed:10",
                "step:Discrete(1)",
                "step:Discrete(2)",
                "seed:20",
                "step:Discrete(3)",
                "step:Discrete(4)",
                "seed:20",
            ]
        );
    }

    #[test]
    fn test_unseeded_resets_to_recorded_states() {
        let mut env = RecordingEnv::default();
        let trajectory = Trajectory::new(
            "Recording-v0",
            Reconstruction::unseeded(),
            vec![
                transition(1.0, false, false),
                transition(2.0, true, false),
                transition(3.0, false, false),
            ],
        );

        let frames = reconstruct_frames(&mut env, &trajectory).expect("replay");
        assert_eq!(frames.len(), 3);
        assert_eq!(
            env.calls,
            vec!["state:1", "step:Discrete(1)", "state:2.5", "step:Discrete(3)"]
        );
    }

    #[test]
    fn test_seeded_replay_matches_recording() {
        let registry = EnvRegistry::default();
        let mut simulator = Simulator::new(registry.create("CartPole-v1").expect("env"));
        let trajectory = simulator.simulate_for_steps(120, 9).expect("simulate");

        let mut env = registry.create("CartPole-v1").expect("env");
        let frames = reconstruct_frames(env.as_mut(), &trajectory).expect("replay");
        assert_eq!(frames.len(), trajectory.len());

        let mut again = registry.create("CartPole-v1").expect("env");
        let frames_again = reconstruct_frames(again.as_mut(), &trajectory).expect("replay");
        assert_eq!(frames, frames_again);
    }
}
