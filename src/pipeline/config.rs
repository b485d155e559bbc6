//! Configuration for the labeling pipeline.
//!
//! Values come from defaults, an optional YAML file and `RLDUELS_*`
//! environment variables, applied in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::buffered_queue::BufferedPipelineConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for this schema.
    #[error("Invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Which video encoder renders trajectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    /// VP8 WebM through an ffmpeg child process.
    #[default]
    Ffmpeg,
    /// Gzip-compressed raw frames. Needs no external tools.
    Raw,
}

impl std::str::FromStr for EncoderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ffmpeg" | "webm" => Ok(EncoderKind::Ffmpeg),
            "raw" => Ok(EncoderKind::Raw),
            other => Err(format!("unknown encoder '{other}'")),
        }
    }
}

/// Configuration for store, renderer, pipeline and session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Storage settings
    /// SQLite path or URL, or `memory` for the in-process store.
    pub database_url: String,

    // Rendering settings
    /// Directory where rendered videos are written.
    pub video_folder: PathBuf,
    /// Recording frame rate.
    pub frame_rate: f64,
    /// Playback speed multiplier.
    pub run_speed_factor: f64,
    /// Video encoder.
    pub encoder: EncoderKind,
    /// ffmpeg executable used by the WebM encoder.
    pub ffmpeg_path: PathBuf,

    // Queue settings
    /// Maximum number of rendered pairs held in memory.
    pub max_queue_size: usize,
    /// Pause between refill cycles, in seconds.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    // Simulation settings
    /// Environment used by the `simulate` command.
    pub env_name: String,
    /// Number of pairs the `simulate` command creates.
    pub max_entries: usize,
    /// Step limit per simulated episode.
    pub max_episode_steps: usize,

    // Session settings
    /// Whether evaluators may answer "indifferent".
    pub allow_ties: bool,
    /// Whether evaluators may skip a pair.
    pub allow_skipping: bool,
    /// Where collected preferences are exported.
    pub result_file: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: "rlduels.db".to_string(),

            video_folder: PathBuf::from("./videos"),
            frame_rate: 50.0,
            run_speed_factor: 1.0,
            encoder: EncoderKind::Ffmpeg,
            ffmpeg_path: PathBuf::from("ffmpeg"),

            max_queue_size: 10,
            poll_interval: Duration::from_secs(1),

            env_name: "CartPole-v1".to_string(),
            max_entries: 10,
            max_episode_steps: 200,

            allow_ties: true,
            allow_skipping: true,
            result_file: PathBuf::from("preferences.json"),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a YAML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if the
    /// result fails validation.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parses YAML text. Missing keys keep their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Creates configuration from environment variables on top of defaults.
    ///
    /// See [`PipelineConfig::apply_env`] for the variables read.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overrides fields from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RLDUELS_DATABASE_URL`: store location (default: rlduels.db)
    /// - `RLDUELS_VIDEO_FOLDER`: output directory (default: ./videos)
    /// - `RLDUELS_FRAME_RATE`: recording frame rate (default: 50)
    /// - `RLDUELS_RUN_SPEED_FACTOR`: playback multiplier (default: 1.0)
    /// - `RLDUELS_ENCODER`: `ffmpeg` or `raw` (default: ffmpeg)
    /// - `RLDUELS_FFMPEG_PATH`: ffmpeg executable (default: ffmpeg)
    /// - `RLDUELS_MAX_QUEUE_SIZE`: buffered pairs (default: 10)
    /// - `RLDUELS_POLL_INTERVAL_SECS`: refill pause in seconds (default: 1)
    /// - `RLDUELS_ENV_NAME`: simulated environment (default: CartPole-v1)
    /// - `RLDUELS_MAX_ENTRIES`: pairs to simulate (default: 10)
    /// - `RLDUELS_MAX_EPISODE_STEPS`: step limit per episode (default: 200)
    /// - `RLDUELS_ALLOW_TIES`: accept "indifferent" (default: true)
    /// - `RLDUELS_ALLOW_SKIPPING`: accept skips (default: true)
    /// - `RLDUELS_RESULT_FILE`: export path (default: preferences.json)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the result
    /// fails validation.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("RLDUELS_DATABASE_URL") {
            self.database_url = val;
        }

        if let Ok(val) = std::env::var("RLDUELS_VIDEO_FOLDER") {
            self.video_folder = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("RLDUELS_FRAME_RATE") {
            self.frame_rate = parse_env_value(&val, "RLDUELS_FRAME_RATE")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_RUN_SPEED_FACTOR") {
            self.run_speed_factor = parse_env_value(&val, "RLDUELS_RUN_SPEED_FACTOR")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_ENCODER") {
            self.encoder = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "RLDUELS_ENCODER".to_string(),
                message,
            })?;
        }

        if let Ok(val) = std::env::var("RLDUELS_FFMPEG_PATH") {
            self.ffmpeg_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("RLDUELS_MAX_QUEUE_SIZE") {
            self.max_queue_size = parse_env_value(&val, "RLDUELS_MAX_QUEUE_SIZE")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_POLL_INTERVAL_SECS") {
            let secs: f64 = parse_env_value(&val, "RLDUELS_POLL_INTERVAL_SECS")?;
            self.poll_interval = seconds(secs, "RLDUELS_POLL_INTERVAL_SECS")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_ENV_NAME") {
            self.env_name = val;
        }

        if let Ok(val) = std::env::var("RLDUELS_MAX_ENTRIES") {
            self.max_entries = parse_env_value(&val, "RLDUELS_MAX_ENTRIES")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_MAX_EPISODE_STEPS") {
            self.max_episode_steps = parse_env_value(&val, "RLDUELS_MAX_EPISODE_STEPS")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_ALLOW_TIES") {
            self.allow_ties = parse_env_bool(&val, "RLDUELS_ALLOW_TIES")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_ALLOW_SKIPPING") {
            self.allow_skipping = parse_env_bool(&val, "RLDUELS_ALLOW_SKIPPING")?;
        }

        if let Ok(val) = std::env::var("RLDUELS_RESULT_FILE") {
            self.result_file = PathBuf::from(val);
        }

        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.frame_rate.is_nan() || self.frame_rate <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "frame_rate must be greater than 0".to_string(),
            ));
        }

        if self.run_speed_factor.is_nan() || self.run_speed_factor <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "run_speed_factor must be greater than 0".to_string(),
            ));
        }

        if self.max_queue_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_queue_size must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.env_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "env_name cannot be empty".to_string(),
            ));
        }

        if self.max_episode_steps == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_episode_steps must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Playback frame rate of rendered videos.
    pub fn fps(&self) -> f64 {
        self.frame_rate * self.run_speed_factor
    }

    /// Queue settings for [`super::BufferedPipeline`].
    pub fn queue_config(&self) -> BufferedPipelineConfig {
        BufferedPipelineConfig::new(self.max_queue_size).with_poll_interval(self.poll_interval)
    }

    /// Builder method to set the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the video folder.
    pub fn with_video_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.video_folder = path.into();
        self
    }

    /// Builder method to set the recording frame rate.
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Builder method to set the playback speed multiplier.
    pub fn with_run_speed_factor(mut self, factor: f64) -> Self {
        self.run_speed_factor = factor;
        self
    }

    /// Builder method to set the encoder.
    pub fn with_encoder(mut self, encoder: EncoderKind) -> Self {
        self.encoder = encoder;
        self
    }

    /// Builder method to set the queue size.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Builder method to set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder method to allow or forbid ties.
    pub fn with_allow_ties(mut self, allow: bool) -> Self {
        self.allow_ties = allow;
        self
    }

    /// Builder method to allow or forbid skipping.
    pub fn with_allow_skipping(mut self, allow: bool) -> Self {
        self.allow_skipping = allow;
        self
    }

    /// Builder method to set the export path.
    pub fn with_result_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_file = path.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

fn seconds(secs: f64, key: &str) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Durations as fractional seconds in YAML.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.database_url, "rlduels.db");
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.encoder, EncoderKind::Ffmpeg);
        assert!(config.allow_ties);
        assert!(config.allow_skipping);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_database_url("memory")
            .with_video_folder("/tmp/v")
            .with_frame_rate(30.0)
            .with_run_speed_factor(2.0)
            .with_encoder(EncoderKind::Raw)
            .with_max_queue_size(3)
            .with_poll_interval(Duration::from_millis(100))
            .with_allow_ties(false)
            .with_allow_skipping(false)
            .with_result_file("out.json");

        assert_eq!(config.database_url, "memory");
        assert_eq!(config.video_folder, PathBuf::from("/tmp/v"));
        assert!((config.fps() - 60.0).abs() < f64::EPSILON);
        assert_eq!(config.encoder, EncoderKind::Raw);
        assert!(!config.allow_ties);
        assert!(!config.allow_skipping);

        let queue = config.queue_config();
        assert_eq!(queue.capacity, 3);
        assert_eq!(queue.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_yaml_partial_overrides_defaults() {
        let config = PipelineConfig::from_yaml_str(
            "max_queue_size: 3\npoll_interval: 0.1\nencoder: raw\nallow_ties: false\n",
        )
        .expect("parse");

        assert_eq!(config.max_queue_size, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.encoder, EncoderKind::Raw);
        assert!(!config.allow_ties);
        assert_eq!(config.env_name, "CartPole-v1");
    }

    #[test]
    fn test_yaml_rejects_unknown_encoder() {
        let result = PipelineConfig::from_yaml_str("encoder: gif\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        let config = PipelineConfig::default().with_max_queue_size(4);
        std::fs::write(&path, serde_yaml::to_string(&config).expect("yaml")).expect("write");

        assert_eq!(PipelineConfig::from_yaml_file(&path).expect("read"), config);
    }

    #[test]
    fn test_validation_zero_queue() {
        let result = PipelineConfig::default().with_max_queue_size(0).validate();
        assert!(result.unwrap_err().to_string().contains("max_queue_size"));
    }

    #[test]
    fn test_validation_zero_poll_interval() {
        let result = PipelineConfig::default()
            .with_poll_interval(Duration::ZERO)
            .validate();
        assert!(result.unwrap_err().to_string().contains("poll_interval"));
    }

    #[test]
    fn test_validation_invalid_frame_rate() {
        let result = PipelineConfig::default().with_frame_rate(0.0).validate();
        assert!(result.unwrap_err().to_string().contains("frame_rate"));

        let result = PipelineConfig::default()
            .with_run_speed_factor(f64::NAN)
            .validate();
        assert!(result.unwrap_err().to_string().contains("run_speed_factor"));
    }

    #[test]
    fn test_parse_env_helpers() {
        assert_eq!(parse_env_value::<usize>("7", "K").expect("parse"), 7);
        assert!(parse_env_value::<usize>("x", "K").is_err());
        assert!(parse_env_bool("YES", "K").expect("bool"));
        assert!(!parse_env_bool("off", "K").expect("bool"));
        assert!(parse_env_bool("maybe", "K").is_err());
        assert!(seconds(-1.0, "K").is_err());
    }
}
