//! Cart-pole balancing environment with a software renderer.
//!
//! Dynamics follow the classic Barto, Sutton & Anderson formulation with
//! Euler integration, a 500-step time limit and a reward of 1 per step.

use ndarray::Array3;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Environment, Frame, ResetSpec, StepOutcome};
use crate::error::EnvError;
use crate::trajectory::{Action, Observation};

/// Registered name of this environment.
pub const ENV_NAME: &str = "CartPole-v1";

const GRAVITY: f64 = 9.8;
const CART_MASS: f64 = 1.0;
const POLE_MASS: f64 = 0.1;
const TOTAL_MASS: f64 = CART_MASS + POLE_MASS;
const HALF_POLE_LENGTH: f64 = 0.5;
const POLE_MASS_LENGTH: f64 = POLE_MASS * HALF_POLE_LENGTH;
const FORCE_MAG: f64 = 10.0;
const TAU: f64 = 0.02;
const THETA_THRESHOLD: f64 = 12.0 * 2.0 * std::f64::consts::PI / 360.0;
const X_THRESHOLD: f64 = 2.4;
const MAX_EPISODE_STEPS: u32 = 500;

const SCREEN_WIDTH: usize = 300;
const SCREEN_HEIGHT: usize = 200;
const TRACK_ROW: usize = 150;
const CART_HALF_WIDTH: i64 = 15;
const CART_HALF_HEIGHT: i64 = 9;

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];
const POLE_COLOR: [u8; 3] = [202, 152, 101];
const AXLE_COLOR: [u8; 3] = [129, 132, 203];

/// Cart-pole environment.
#[derive(Debug, Clone)]
pub struct CartPole {
    state: [f64; 4],
    steps: u32,
    rng: ChaCha8Rng,
}

impl CartPole {
    /// Creates an environment in the upright rest state.
    pub fn new() -> Self {
        Self {
            state: [0.0; 4],
            steps: 0,
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    /// Current `[x, x_dot, theta, theta_dot]` state.
    pub fn state(&self) -> [f64; 4] {
        self.state
    }

    fn observation(&self) -> Observation {
        self.state.to_vec()
    }

    fn is_terminal(&self) -> bool {
        let [x, _, theta, _] = self.state;
        !(-X_THRESHOLD..=X_THRESHOLD).contains(&x)
            || !(-THETA_THRESHOLD..=THETA_THRESHOLD).contains(&theta)
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for CartPole {
    fn name(&self) -> &str {
        ENV_NAME
    }

    fn reset(&mut self, spec: ResetSpec<'_>) -> Result<Observation, EnvError> {
        match spec {
            ResetSpec::Seed(seed) => {
                self.rng = ChaCha8Rng::seed_from_u64(seed);
                for value in self.state.iter_mut() {
                    *value = self.rng.random_range(-0.05..0.05);
                }
            }
            ResetSpec::State(values) => {
                if values.len() != 4 {
                    return Err(EnvError::InvalidState {
                        expected: 4,
                        actual: values.len(),
                    });
                }
                self.state.copy_from_slice(values);
            }
        }
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<StepOutcome, EnvError> {
        let force = match action {
            Action::Discrete(1) => FORCE_MAG,
            Action::Discrete(0) => -FORCE_MAG,
            other => {
                return Err(EnvError::InvalidAction(format!(
                    "{ENV_NAME} expects Discrete(0) or Discrete(1), got {other:?}"
                )))
            }
        };

        let [x, x_dot, theta, theta_dot] = self.state;
        let (sin_theta, cos_theta) = theta.sin_cos();

        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin_theta) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (HALF_POLE_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos_theta / TOTAL_MASS;

        self.state = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        self.steps += 1;

        Ok(StepOutcome {
            observation: self.observation(),
            reward: 1.0,
            terminated: self.is_terminal(),
            truncated: self.steps >= MAX_EPISODE_STEPS,
        })
    }

    fn render(&self) -> Frame {
        let mut frame = Array3::from_elem((SCREEN_HEIGHT, SCREEN_WIDTH, 3), WHITE[0]);
        let scale = SCREEN_WIDTH as f64 / (2.0 * X_THRESHOLD);
        let [x, _, theta, _] = self.state;

        for col in 0..SCREEN_WIDTH as i64 {
            put_pixel(&mut frame, TRACK_ROW as i64, col, BLACK);
        }

        let cart_x = (x * scale + SCREEN_WIDTH as f64 / 2.0).round() as i64;
        let cart_y = TRACK_ROW as i64 - CART_HALF_HEIGHT;
        for row in (cart_y - CART_HALF_HEIGHT)..=(cart_y + CART_HALF_HEIGHT) {
            for col in (cart_x - CART_HALF_WIDTH)..=(cart_x + CART_HALF_WIDTH) {
                put_pixel(&mut frame, row, col, BLACK);
            }
        }

        let axle_y = cart_y - CART_HALF_HEIGHT / 2;
        let pole_len = scale * 2.0 * HALF_POLE_LENGTH;
        let samples = pole_len.ceil() as i64 * 2;
        for i in 0..=samples {
            let t = i as f64 / samples as f64 * pole_len;
            let px = (cart_x as f64 + t * theta.sin()).round() as i64;
            let py = (axle_y as f64 - t * theta.cos()).round() as i64;
            for dr in -2..=2 {
                for dc in -2..=2 {
                    put_pixel(&mut frame, py + dr, px + dc, POLE_COLOR);
                }
            }
        }

        for dr in -2..=2 {
            for dc in -2..=2 {
                put_pixel(&mut frame, axle_y + dr, cart_x + dc, AXLE_COLOR);
            }
        }

        frame
    }

    fn sample_action(&mut self) -> Action {
        Action::Discrete(self.rng.random_range(0..2))
    }
}

fn put_pixel(frame: &mut Frame, row: i64, col: i64, color: [u8; 3]) {
    if row < 0 || col < 0 || row >= SCREEN_HEIGHT as i64 || col >= SCREEN_WIDTH as i64 {
        return;
    }
    for (channel, value) in color.iter().enumerate() {
        frame[[row as usize, col as usize, channel]] = *value;
    }
}
