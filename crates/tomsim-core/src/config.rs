//! Configuration loading and typed config structures for the simulation.
//!
//! Configuration lives in an optional `tomsim.yaml`. Every section and field
//! carries a serde default, so an empty file (or no file at all) yields the
//! standard experiment: 60 ToM0 agents for a million initialization ticks,
//! then 30 agents of each order for 3.75 million scored ticks.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tomsim_agents::{NegotiationConfig, UNSUCCESSFUL_MEMORY};
use tomsim_types::ExperimentVariant;

/// Environment variable overriding `experiment.variant` (`1`, `2`,
/// `standard`, or `use_experience`).
pub const ENV_VARIANT: &str = "TOMSIM_VARIANT";
/// Environment variable overriding `export.file_stem`.
pub const ENV_FILE_STEM: &str = "TOMSIM_FILE_STEM";
/// Environment variable overriding `experiment.seed`.
pub const ENV_SEED: &str = "TOMSIM_SEED";
/// Environment variable overriding `observer.port`.
pub const ENV_OBSERVER_PORT: &str = "TOMSIM_OBSERVER_PORT";

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

    /// An environment override held a value that does not parse.
    #[error("invalid value {value:?} for {name}")]
    InvalidOverride {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// A value is out of its legal range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Experiment structure: phases, population sizes, evolution.
    #[serde(default)]
    pub experiment: ExperimentConfig,

    /// Arena geometry.
    #[serde(default)]
    pub arena: ArenaConfig,

    /// Reasoning and protocol parameters.
    #[serde(default)]
    pub negotiation: NegotiationConfig,

    /// Run loop pacing and mode.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Result file settings.
    #[serde(default)]
    pub export: ExportConfig,

    /// Observer HTTP server settings.
    #[serde(default)]
    pub observer: ObserverConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, and
    /// [`ConfigError::InvalidOverride`] or [`ConfigError::Invalid`] if a
    /// value is unusable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file), minus I/O.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML string without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] for malformed input.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `TOMSIM_*` environment variables on top of the loaded values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if a variable is set to an
    /// unparseable value.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up through `lookup`, which maps a variable
    /// name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for unparseable values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_VARIANT) {
            self.experiment.variant = parse_variant(&value).ok_or(ConfigError::InvalidOverride {
                name: ENV_VARIANT,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_FILE_STEM) {
            self.export.file_stem = value;
        }
        if let Some(value) = lookup(ENV_SEED) {
            let seed = value.parse().ok().ok_or_else(|| ConfigError::InvalidOverride {
                name: ENV_SEED,
                value: value.clone(),
            })?;
            self.experiment.seed = Some(seed);
        }
        if let Some(value) = lookup(ENV_OBSERVER_PORT) {
            self.observer.port = value.parse().ok().ok_or_else(|| ConfigError::InvalidOverride {
                name: ENV_OBSERVER_PORT,
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Reject values the simulation cannot run with, and force
    /// `pause_at_phase_change` off in headless mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.arena.size < 3 {
            return Err(ConfigError::Invalid(format!(
                "arena.size must be at least 3, got {}",
                self.arena.size
            )));
        }
        if self.arena.meeting_radius.is_nan() || self.arena.meeting_radius <= 0.0 {
            return Err(ConfigError::Invalid(String::from(
                "arena.meeting_radius must be positive",
            )));
        }
        if self.experiment.check_interval == 0 {
            return Err(ConfigError::Invalid(String::from(
                "experiment.check_interval must be positive",
            )));
        }
        if self.experiment.mutation_percent > 100 {
            return Err(ConfigError::Invalid(format!(
                "experiment.mutation_percent must be at most 100, got {}",
                self.experiment.mutation_percent
            )));
        }
        if self.experiment.unsuccessful_window > UNSUCCESSFUL_MEMORY {
            return Err(ConfigError::Invalid(format!(
                "experiment.unsuccessful_window must be at most {UNSUCCESSFUL_MEMORY}, got {}",
                self.experiment.unsuccessful_window
            )));
        }
        if self.negotiation.max_rounds == 0 {
            return Err(ConfigError::Invalid(String::from(
                "negotiation.max_rounds must be positive",
            )));
        }
        if !(0.0..=1.0).contains(&self.negotiation.learning_speed) {
            return Err(ConfigError::Invalid(String::from(
                "negotiation.learning_speed must lie in [0, 1]",
            )));
        }
        if self.export.sample_every == 0 {
            return Err(ConfigError::Invalid(String::from(
                "export.sample_every must be positive",
            )));
        }
        if self.runner.headless {
            self.runner.pause_at_phase_change = false;
        }
        Ok(())
    }
}

fn parse_variant(value: &str) -> Option<ExperimentVariant> {
    match value.trim() {
        "standard" => Some(ExperimentVariant::Standard),
        "use_experience" => Some(ExperimentVariant::UseExperience),
        other => other.parse().ok().and_then(ExperimentVariant::from_code),
    }
}

/// Experiment structure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExperimentConfig {
    /// Standard or use-experience variant.
    #[serde(default)]
    pub variant: ExperimentVariant,

    /// ToM0 agents created for the initialization phase.
    #[serde(default = "default_initial_agents")]
    pub initial_agents: u32,

    /// Agents of each order created when the scored phase begins.
    #[serde(default = "default_agents_per_order")]
    pub agents_per_order: u32,

    /// Length of the initialization phase in ticks.
    #[serde(default = "default_initialization_ticks")]
    pub initialization_ticks: u64,

    /// Length of the scored phase in ticks.
    #[serde(default = "default_scored_ticks")]
    pub scored_ticks: u64,

    /// Survival check period, in ticks of an agent's age.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Chance, in percent, that a replacement gets a random order.
    #[serde(default = "default_mutation_percent")]
    pub mutation_percent: u32,

    /// How many recent unsuccessful partners an initiator avoids.
    #[serde(default = "default_unsuccessful_window")]
    pub unsuccessful_window: usize,

    /// Random seed. Drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            variant: ExperimentVariant::default(),
            initial_agents: default_initial_agents(),
            agents_per_order: default_agents_per_order(),
            initialization_ticks: default_initialization_ticks(),
            scored_ticks: default_scored_ticks(),
            check_interval: default_check_interval(),
            mutation_percent: default_mutation_percent(),
            unsuccessful_window: default_unsuccessful_window(),
            seed: None,
        }
    }
}

/// Arena geometry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArenaConfig {
    /// Side length of the square arena.
    #[serde(default = "default_arena_size")]
    pub size: u32,

    /// Distance under which two agents meet.
    #[serde(default = "default_meeting_radius")]
    pub meeting_radius: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            size: default_arena_size(),
            meeting_radius: default_meeting_radius(),
        }
    }
}

/// Run loop pacing and mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerConfig {
    /// Real-time milliseconds between ticks (0 runs flat out).
    #[serde(default)]
    pub tick_interval_ms: u64,

    /// Run without the observer and exit once results are exported.
    #[serde(default)]
    pub headless: bool,

    /// Pause when the scored phase begins so an operator can inspect it.
    #[serde(default = "default_true")]
    pub pause_at_phase_change: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 0,
            headless: false,
            pause_at_phase_change: true,
        }
    }
}

/// Which population-history rows are exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    /// Every `sample_every`-th row.
    #[default]
    Sampled,
    /// Only the last two rows: the final tick and the closing row.
    Boundary,
}

/// Result file settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportConfig {
    /// Directory the result file is written to.
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,

    /// File name stem; the file is `{stem}_0.csv`.
    #[serde(default = "default_file_stem")]
    pub file_stem: String,

    /// Which history rows to write.
    #[serde(default)]
    pub history: HistoryMode,

    /// Sampling period for [`HistoryMode::Sampled`].
    #[serde(default = "default_sample_every")]
    pub sample_every: usize,
}

impl ExportConfig {
    /// Full path of the result file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}_0.csv", self.file_stem))
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
            file_stem: default_file_stem(),
            history: HistoryMode::default(),
            sample_every: default_sample_every(),
        }
    }
}

/// Observer HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Whether to serve the observer API.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

const fn default_initial_agents() -> u32 {
    60
}

const fn default_agents_per_order() -> u32 {
    30
}

const fn default_initialization_ticks() -> u64 {
    1_000_000
}

const fn default_scored_ticks() -> u64 {
    3_750_000
}

const fn default_check_interval() -> u64 {
    2500
}

const fn default_mutation_percent() -> u32 {
    2
}

const fn default_unsuccessful_window() -> usize {
    5
}

const fn default_arena_size() -> u32 {
    600
}

const fn default_meeting_radius() -> f64 {
    10.0
}

const fn default_true() -> bool {
    true
}

fn default_export_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_stem() -> String {
    String::from("result")
}

const fn default_sample_every() -> usize {
    5
}

fn default_observer_host() -> String {
    String::from("0.0.0.0")
}

const fn default_observer_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (String::from(*k), String::from(*v)))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_matches_the_standard_experiment() {
        let config = SimulationConfig::default();
        assert_eq!(config.experiment.initial_agents, 60);
        assert_eq!(config.experiment.agents_per_order, 30);
        assert_eq!(config.experiment.initialization_ticks, 1_000_000);
        assert_eq!(config.experiment.scored_ticks, 3_750_000);
        assert_eq!(config.experiment.check_interval, 2500);
        assert_eq!(config.experiment.mutation_percent, 2);
        assert_eq!(config.arena.size, 600);
        assert_eq!(config.negotiation.max_rounds, 50);
        assert_eq!(config.export.path(), PathBuf::from("./result_0.csv"));
        assert_eq!(config.observer.port, 8080);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn empty_yaml_is_valid() {
        let config = SimulationConfig::parse_without_env("").unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn parse_full_yaml() {
        let yaml = r#"
experiment:
  variant: use_experience
  initial_agents: 10
  agents_per_order: 4
  initialization_ticks: 500
  scored_ticks: 2000
  check_interval: 100
  mutation_percent: 5
  unsuccessful_window: 3
  seed: 99

arena:
  size: 200
  meeting_radius: 8.5

negotiation:
  learning_speed: 0.5
  max_rounds: 20

runner:
  tick_interval_ms: 10
  pause_at_phase_change: false

export:
  directory: "out"
  file_stem: "exp2"
  history: boundary

observer:
  enabled: false
  port: 9090
"#;
        let config = SimulationConfig::parse_without_env(yaml).unwrap();
        assert_eq!(config.experiment.variant, ExperimentVariant::UseExperience);
        assert_eq!(config.experiment.agents_per_order, 4);
        assert_eq!(config.experiment.seed, Some(99));
        assert_eq!(config.arena.size, 200);
        assert!((config.negotiation.learning_speed - 0.5).abs() < f64::EPSILON);
        assert!((config.negotiation.epsilon - 1e-6).abs() < f64::EPSILON);
        assert_eq!(config.negotiation.max_rounds, 20);
        assert!(!config.runner.pause_at_phase_change);
        assert_eq!(config.export.history, HistoryMode::Boundary);
        assert_eq!(config.export.sample_every, 5);
        assert_eq!(config.export.path(), PathBuf::from("out/exp2_0.csv"));
        assert!(!config.observer.enabled);
        assert_eq!(config.observer.host, "0.0.0.0");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = SimulationConfig::parse_without_env("experiment: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn overrides_replace_file_values() {
        let mut config = SimulationConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_VARIANT, "2"),
                (ENV_FILE_STEM, "run7"),
                (ENV_SEED, "1234"),
                (ENV_OBSERVER_PORT, "7000"),
            ]))
            .unwrap();
        assert_eq!(config.experiment.variant, ExperimentVariant::UseExperience);
        assert_eq!(config.export.file_stem, "run7");
        assert_eq!(config.experiment.seed, Some(1234));
        assert_eq!(config.observer.port, 7000);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn variant_override_accepts_names() {
        let mut config = SimulationConfig::default();
        config.experiment.variant = ExperimentVariant::UseExperience;
        config.apply_overrides(lookup(&[(ENV_VARIANT, "standard")])).unwrap();
        assert_eq!(config.experiment.variant, ExperimentVariant::Standard);
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = SimulationConfig::default();
        let result = config.apply_overrides(lookup(&[(ENV_SEED, "soon")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOverride { name: ENV_SEED, .. })
        ));
        let result = config.apply_overrides(lookup(&[(ENV_VARIANT, "3")]));
        assert!(matches!(result, Err(ConfigError::InvalidOverride { .. })));
    }

    #[test]
    fn headless_never_pauses_at_phase_change() {
        let mut config = SimulationConfig::default();
        config.runner.headless = true;
        assert!(config.validate().is_ok());
        assert!(!config.runner.pause_at_phase_change);
    }

    #[test]
    fn validation_rejects_zero_check_interval() {
        let mut config = SimulationConfig::default();
        config.experiment.check_interval = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validation_rejects_tiny_arena() {
        let mut config = SimulationConfig::default();
        config.arena.size = 2;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validation_rejects_window_beyond_memory() {
        let mut config = SimulationConfig::default();
        config.experiment.unsuccessful_window = UNSUCCESSFUL_MEMORY.saturating_add(1);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.experiment.unsuccessful_window = UNSUCCESSFUL_MEMORY;
        assert!(config.validate().is_ok());
    }
}
