//! Configuration management
//!
//! This module handles loading, validation, and management of the harness
//! configuration. Configuration is stored in TOML format at ~/.arena/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **simulator**: Wire connection, retry budgets and process launch settings
//! - **reasoning**: Reasoning service endpoints and healthcheck policy
//! - **session**: Per-utterance loop budget
//! - **evaluation**: Probe policy, outcome directory, restart cadence
//!
//! Every section falls back to defaults, so an empty file is a valid config.
//!
//! # Examples
//!
//! ```no_run
//! use arena_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Simulator: {}:{}", config.simulator.host, config.simulator.port);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Simulator connection and process settings
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Reasoning service settings
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Session loop settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Mission evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

/// Simulator wire connection and process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_simulator_host")]
    pub host: String,

    #[serde(default = "default_simulator_port")]
    pub port: u16,

    /// Connection attempts before the transport gives up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub connect_interval_ms: u64,

    /// Delay between send attempts while the connection is down
    #[serde(default = "default_retry_interval_ms")]
    pub send_retry_interval_ms: u64,

    /// Ticks to wait for a response before timing out
    #[serde(default = "default_response_timeout_ticks")]
    pub response_timeout_ticks: u64,

    #[serde(default = "default_retry_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,

    /// Simulator executable; when unset the simulator is managed externally
    #[serde(default)]
    pub executable: Option<PathBuf>,

    #[serde(default = "default_simulator_log_file")]
    pub log_file: PathBuf,

    /// X display the simulator renders to
    #[serde(default = "default_display")]
    pub display: u32,

    /// Grace period after launching the simulator process
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
}

impl SimulatorConfig {
    pub fn connect_interval(&self) -> Duration {
        Duration::from_millis(self.connect_interval_ms)
    }

    pub fn send_retry_interval(&self) -> Duration {
        Duration::from_millis(self.send_retry_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    /// Total time budget for one response
    pub fn response_timeout(&self) -> Duration {
        self.tick_interval()
            .saturating_mul(u32::try_from(self.response_timeout_ticks).unwrap_or(u32::MAX))
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: default_simulator_host(),
            port: default_simulator_port(),
            connect_attempts: default_connect_attempts(),
            connect_interval_ms: default_retry_interval_ms(),
            send_retry_interval_ms: default_retry_interval_ms(),
            response_timeout_ticks: default_response_timeout_ticks(),
            tick_interval_ms: default_retry_interval_ms(),
            liveness_interval_ms: default_liveness_interval_ms(),
            executable: None,
            log_file: default_simulator_log_file(),
            display: default_display(),
            startup_delay_secs: default_startup_delay_secs(),
        }
    }
}

/// Reasoning service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Base URL of the reasoning service
    #[serde(default = "default_reasoning_endpoint")]
    pub base_endpoint: String,

    #[serde(default = "default_healthcheck_path")]
    pub healthcheck_path: String,

    #[serde(default = "default_predict_path")]
    pub predict_path: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_healthcheck_attempts")]
    pub healthcheck_attempts: u32,

    #[serde(default = "default_healthcheck_interval_secs")]
    pub healthcheck_interval_secs: u64,

    /// Directory world-state snapshots are written to before each request
    #[serde(default = "default_world_state_dir")]
    pub world_state_dir: PathBuf,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_endpoint: default_reasoning_endpoint(),
            healthcheck_path: default_healthcheck_path(),
            predict_path: default_predict_path(),
            request_timeout_secs: default_request_timeout_secs(),
            healthcheck_attempts: default_healthcheck_attempts(),
            healthcheck_interval_secs: default_healthcheck_interval_secs(),
            world_state_dir: default_world_state_dir(),
        }
    }
}

/// Session loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Loop iterations allowed per utterance
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

/// Mission evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Directory outcome artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Readiness probes sent after loading a scene
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,

    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Restart the simulator after this many missions (0 disables)
    #[serde(default = "default_restart_after_num_sessions")]
    pub restart_after_num_sessions: usize,

    #[serde(default = "default_session_id_prefix")]
    pub session_id_prefix: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            probe_attempts: default_probe_attempts(),
            probe_interval_secs: default_probe_interval_secs(),
            restart_after_num_sessions: default_restart_after_num_sessions(),
            session_id_prefix: default_session_id_prefix(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.arena")
}

fn default_simulator_host() -> String {
    "127.0.0.1".to_string()
}

fn default_simulator_port() -> u16 {
    5000
}

fn default_connect_attempts() -> u32 {
    250
}

fn default_retry_interval_ms() -> u64 {
    100
}

fn default_response_timeout_ticks() -> u64 {
    6000
}

fn default_liveness_interval_ms() -> u64 {
    1000
}

fn default_simulator_log_file() -> PathBuf {
    PathBuf::from("~/.arena/logs/simulator.log")
}

fn default_display() -> u32 {
    1
}

fn default_startup_delay_secs() -> u64 {
    1
}

fn default_reasoning_endpoint() -> String {
    "http://0.0.0.0:5000".to_string()
}

fn default_healthcheck_path() -> String {
    "/healthcheck".to_string()
}

fn default_predict_path() -> String {
    "/v1/predict".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_healthcheck_attempts() -> u32 {
    40
}

fn default_healthcheck_interval_secs() -> u64 {
    5
}

fn default_world_state_dir() -> PathBuf {
    PathBuf::from("~/.arena/world_state")
}

fn default_max_iterations() -> usize {
    15
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("~/.arena/outcomes")
}

fn default_probe_attempts() -> u32 {
    10
}

fn default_probe_interval_secs() -> u64 {
    5
}

fn default_restart_after_num_sessions() -> usize {
    10
}

fn default_session_id_prefix() -> String {
    "T".to_string()
}

impl Config {
    /// Load configuration from the default location (~/.arena/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let defaults = Self::default();

        let toml_string = toml::to_string_pretty(&defaults)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = defaults;
        config.validate_and_process()?;
        Ok(config)
    }

    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".arena").join("config.toml"))
    }

    /// Validate values and expand ~ in every configured path
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.simulator.connect_attempts == 0 {
            return Err(EngineError::Config(
                "simulator.connect_attempts must be at least 1".to_string(),
            ));
        }
        if self.simulator.tick_interval_ms == 0 || self.simulator.response_timeout_ticks == 0 {
            return Err(EngineError::Config(
                "simulator response budget must be positive".to_string(),
            ));
        }
        if self.session.max_iterations == 0 {
            return Err(EngineError::Config(
                "session.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.evaluation.probe_attempts == 0 {
            return Err(EngineError::Config(
                "evaluation.probe_attempts must be at least 1".to_string(),
            ));
        }
        if !self.reasoning.base_endpoint.starts_with("http://")
            && !self.reasoning.base_endpoint.starts_with("https://")
        {
            return Err(EngineError::Config(format!(
                "Invalid reasoning endpoint '{}'",
                self.reasoning.base_endpoint
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.simulator.log_file = expand_path(&self.simulator.log_file)?;
        self.reasoning.world_state_dir = expand_path(&self.reasoning.world_state_dir)?;
        self.evaluation.output_dir = expand_path(&self.evaluation.output_dir)?;
        if let Some(executable) = &self.simulator.executable {
            self.simulator.executable = Some(expand_path(executable)?);
        }

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.simulator.port, 5000);
        assert_eq!(config.simulator.connect_attempts, 250);
        assert_eq!(config.session.max_iterations, 15);
        assert_eq!(config.evaluation.probe_attempts, 10);
        assert_eq!(
            config.simulator.response_timeout(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let toml = format!(
            "[core]\ndata_dir = \"{}\"\n",
            temp.path().join("data").display()
        );
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.reasoning.predict_path, "/v1/predict");
        assert!(temp.path().join("data").is_dir());
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let err = Config::from_toml_str("[core]\nlog_level = \"loud\"\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(msg) if msg.contains("loud")));
    }

    #[test]
    fn test_zero_iteration_budget_is_rejected() {
        let err = Config::from_toml_str("[session]\nmax_iterations = 0\n").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = expand_path(&PathBuf::from("~/test")).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.simulator.host, deserialized.simulator.host);
        assert_eq!(
            config.evaluation.session_id_prefix,
            deserialized.evaluation.session_id_prefix
        );
    }
}
