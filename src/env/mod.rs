//! Simulation environments used to record and replay trajectories.
//!
//! The renderer and the simulator talk to environments only through the
//! [`Environment`] capability trait. Concrete environments are created by
//! name through an [`EnvRegistry`], so callers choose implementations at
//! construction time.

pub mod cartpole;

use std::collections::HashMap;
use std::fmt;

use ndarray::Array3;

use crate::error::EnvError;
use crate::trajectory::{Action, Observation};

pub use cartpole::CartPole;

/// An RGB image laid out as height x width x channels.
pub type Frame = Array3<u8>;

/// How an environment should be reset.
#[derive(Debug, Clone, Copy)]
pub enum ResetSpec<'a> {
    /// Seed the environment's RNG and draw a fresh initial state.
    Seed(u64),

    /// Load an explicit observation as the current state.
    State(&'a [f64]),
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

/// Capability interface for a renderable simulation.
pub trait Environment: Send {
    /// Registered environment name.
    fn name(&self) -> &str;

    /// Resets the environment and returns the initial observation.
    fn reset(&mut self, spec: ResetSpec<'_>) -> Result<Observation, EnvError>;

    /// Applies an action.
    fn step(&mut self, action: &Action) -> Result<StepOutcome, EnvError>;

    /// Renders the current state.
    fn render(&self) -> Frame;

    /// Draws a random valid action.
    fn sample_action(&mut self) -> Action;
}

/// Constructor for a registered environment.
pub type EnvFactory = fn() -> Box<dyn Environment>;

/// Maps environment names to constructors.
#[derive(Clone)]
pub struct EnvRegistry {
    factories: HashMap<String, EnvFactory>,
}

impl EnvRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a constructor under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, factory: EnvFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Returns true if a constructor is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiates the environment registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `EnvError::UnknownEnvironment` if nothing is registered.
    pub fn create(&self, name: &str) -> Result<Box<dyn Environment>, EnvError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| EnvError::UnknownEnvironment(name.to_string()))
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(cartpole::ENV_NAME, || Box::new(CartPole::new()));
        registry
    }
}

impl fmt::Debug for EnvRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvRegistry")
            .field("names", &self.names())
            .finish()
    }
}
