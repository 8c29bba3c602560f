//! TOML configuration file support.
//!
//! Loads from (in order):
//! 1. An explicit `--config` path
//! 2. `qvote.toml` next to the executable
//! 3. `~/.config/qvote/config.toml`
//! 4. Built-in defaults
//!
//! Environment variables (`QVOTE_DB`, `QVOTE_LOG_LEVEL`, `QVOTE_SEED`,
//! `QVOTE_PORT`) override file values; CLI arguments override both.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::adversary::{EveModel, DEFAULT_DECOHERENCE_FACTOR, DEFAULT_INTERCEPT_PROBABILITY};
use crate::error::{QvoteError, Result, ResultExt as _};
use crate::simulation::{SimulationParams, DEFAULT_CHSH_TRIALS, DEFAULT_QUBIT_COUNT};

// ---------------------------------------------------------------------------
// Config structs (map 1-to-1 with the TOML sections)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QvoteConfig {
    pub paths: PathsConfig,
    pub simulation: SimulationConfig,
    pub eve: EveConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub db: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub qubit_count: usize,
    pub chsh_trials: usize,
    /// Base seed for reproducible runs; unset means OS entropy per run.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EveConfig {
    pub intercept_probability: f64,
    pub decoherence_factor: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Path to a JSON-lines structured log file.  Empty string means no file
    /// logging.
    pub json_log_file: String,
    /// Whether to also output JSON to stdout (for container pipelines).
    pub json_stdout: bool,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from("qvote-audit.db"),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            qubit_count: DEFAULT_QUBIT_COUNT,
            chsh_trials: DEFAULT_CHSH_TRIALS,
            seed: None,
        }
    }
}

impl Default for EveConfig {
    fn default() -> Self {
        Self {
            intercept_probability: DEFAULT_INTERCEPT_PROBABILITY,
            decoherence_factor: DEFAULT_DECOHERENCE_FACTOR,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_log_file: String::new(),
            json_stdout: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl QvoteConfig {
    /// Try to load from a specific path.  Returns `Ok(default)` if the file
    /// does not exist; returns `Err` if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .ctx_config(&format!("read config file {}", path.display()))?;
        let cfg: QvoteConfig = toml::from_str(&text).ctx_config("parse config TOML")?;
        Ok(cfg)
    }

    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }

        if let Ok(exe) = std::env::current_exe() {
            let candidate = exe.with_file_name("qvote.toml");
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        if let Some(home) = std::env::var_os("HOME") {
            let candidate = PathBuf::from(home)
                .join(".config")
                .join("qvote")
                .join("config.toml");
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(db) = std::env::var("QVOTE_DB") {
            self.paths.db = PathBuf::from(db);
        }
        if let Ok(level) = std::env::var("QVOTE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(seed) = std::env::var("QVOTE_SEED") {
            self.simulation.seed = Some(seed.trim().parse().ctx_config("parse QVOTE_SEED")?);
        }
        if let Ok(port) = std::env::var("QVOTE_PORT") {
            self.server.port = port.trim().parse().ctx_config("parse QVOTE_PORT")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.simulation_params().validate()?;
        self.eve_model(true).validate()?;
        if self.server.host.trim().is_empty() {
            return Err(QvoteError::invalid("server.host", "must not be empty"));
        }
        Ok(())
    }

    pub fn simulation_params(&self) -> SimulationParams {
        SimulationParams {
            qubit_count: self.simulation.qubit_count,
            chsh_trials: self.simulation.chsh_trials,
        }
    }

    /// The configured adversary, switched on or off for one run.
    pub fn eve_model(&self, active: bool) -> EveModel {
        EveModel {
            active,
            intercept_probability: self.eve.intercept_probability,
            decoherence_factor: self.eve.decoherence_factor,
        }
    }
}
