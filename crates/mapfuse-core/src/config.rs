//! Configuration loading and typed config structures for mapfuse.
//!
//! The canonical configuration lives in `mapfuse-config.yaml` next to the
//! binary's working directory. Every field has a default, so a missing file
//! or a partial file is fine; the defaults reproduce the planner constants
//! the cost model is tuned for.

use std::path::Path;

use mapfuse_nav::PlannerSettings;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FusionConfig {
    /// Agent vision.
    #[serde(default)]
    pub vision: VisionConfig,

    /// Planner tuning.
    #[serde(default)]
    pub planner: PlannerSettings,

    /// Strategist round timing and channel sizing.
    #[serde(default)]
    pub coordination: CoordinationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Recorded scenario to replay.
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl FusionConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `MAPFUSE_SCENARIO` overrides `scenario.path`
    /// - `MAPFUSE_BARRIER_TIMEOUT_MS` overrides `coordination.barrier_timeout_ms`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    /// Unparseable numbers are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MAPFUSE_SCENARIO") {
            self.scenario.path = val;
        }
        if let Some(ms) = std::env::var("MAPFUSE_BARRIER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.coordination.barrier_timeout_ms = ms;
        }
    }
}

/// Vision configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VisionConfig {
    /// Manhattan radius of the visibility window and initial lattice.
    #[serde(default = "default_vision_radius")]
    pub radius: i32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            radius: default_vision_radius(),
        }
    }
}

/// Coordination configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoordinationConfig {
    /// How long the coordinator waits for stragglers before running a
    /// round anyway, and how long an agent waits for the round.
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,

    /// Capacity of the check-in channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            barrier_timeout_ms: default_barrier_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Scenario configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioConfig {
    /// Path of the scenario JSON file.
    #[serde(default = "default_scenario_path")]
    pub path: String,

    /// Where to write the final graph snapshots, if anywhere.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            path: default_scenario_path(),
            snapshot_path: None,
        }
    }
}

const fn default_vision_radius() -> i32 {
    5
}

const fn default_barrier_timeout_ms() -> u64 {
    500
}

const fn default_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_scenario_path() -> String {
    "scenario.json".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FusionConfig::default();
        assert_eq!(config.vision.radius, 5);
        assert_eq!(config.planner.loop_window, 10);
        assert_eq!(config.planner.loop_min_distinct, 3);
        assert_eq!(config.coordination.channel_capacity, 64);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.scenario.snapshot_path, None);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
vision:
  radius: 4

planner:
  obstacle_base_cost: 16.0
  energy_decay: 0.01
  loop_window: 12
  loop_min_distinct: 4
  frontier_margin: 3

coordination:
  barrier_timeout_ms: 250
  channel_capacity: 8

logging:
  level: debug
  format: json

scenario:
  path: runs/two-agents.json
  snapshot_path: out/graphs.json
";
        let config = FusionConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.unwrap_or_default();
        assert_eq!(config.vision.radius, 4);
        assert_eq!(config.planner.loop_window, 12);
        assert_eq!(config.planner.frontier_margin, 3);
        assert_eq!(config.coordination.channel_capacity, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.scenario.snapshot_path.as_deref(), Some("out/graphs.json"));
    }

    #[test]
    fn parse_partial_yaml_uses_defaults() {
        let config = FusionConfig::parse("vision:\n  radius: 3\n").unwrap_or_default();
        assert_eq!(config.vision.radius, 3);
        assert_eq!(config.coordination.channel_capacity, 64);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = FusionConfig::parse("vision: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = FusionConfig::from_file(Path::new("/nonexistent/mapfuse-config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
