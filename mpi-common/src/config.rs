//! Configuration loading and config file resolution
//!
//! # Settings Sources Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`MPI_LINKER_CONFIG`)
//! 3. User config file (`<config dir>/mpi-linker/config.toml`)
//! 4. System config file (`/etc/mpi-linker/config.toml`)
//! 5. Built-in defaults
//!
//! A missing config file is not fatal: a warning is logged and the built-in
//! defaults are used. `MPI_SIMILARITY_THRESHOLD` and `MPI_CENTRAL_ORGANIZATION`
//! override the file after it is read.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MPI_LINKER_CONFIG";
/// Environment override for the similarity threshold
pub const THRESHOLD_ENV_VAR: &str = "MPI_SIMILARITY_THRESHOLD";
/// Environment override for the central organization id
pub const CENTRAL_ORG_ENV_VAR: &str = "MPI_CENTRAL_ORGANIZATION";

const CONFIG_DIR_NAME: &str = "mpi-linker";
const CONFIG_FILE_NAME: &str = "config.toml";

/// How the change batch is written back to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// One atomic multi-record transaction; the batch fails as a whole
    Transaction,
    /// Sequential create/update calls, each outcome reported on its own
    BestEffort,
    /// Transaction when the store supports it, otherwise best effort
    Auto,
}

/// Top-level TOML document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkerConfig {
    #[serde(default)]
    pub linker: LinkerSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reconciliation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkerSettings {
    /// Scores at or above this value mean "same person"
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,

    /// Bounded wait for a single similarity computation
    #[serde(default = "default_scoring_timeout_ms")]
    pub scoring_timeout_ms: u64,

    /// Result cap for candidate searches
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Score all candidates of a phase concurrently
    #[serde(default = "default_true")]
    pub concurrent_scoring: bool,

    /// Stop reconciling similar candidates after the first link
    #[serde(default)]
    pub stop_after_first_link: bool,

    #[serde(default = "default_commit_mode")]
    pub commit_mode: CommitMode,

    /// Id of the organization that owns master records
    #[serde(default = "default_central_organization")]
    pub central_organization: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_threshold() -> f32 {
    0.95
}

fn default_scoring_timeout_ms() -> u64 {
    10_000
}

fn default_search_limit() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_commit_mode() -> CommitMode {
    CommitMode::Auto
}

fn default_central_organization() -> String {
    "Organization/central".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LinkerSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_threshold(),
            scoring_timeout_ms: default_scoring_timeout_ms(),
            search_limit: default_search_limit(),
            concurrent_scoring: true,
            stop_after_first_link: false,
            commit_mode: default_commit_mode(),
            central_organization: default_central_organization(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LinkerSettings {
    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_millis(self.scoring_timeout_ms)
    }
}

impl LinkerConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read a config file; a missing file yields defaults with a warning
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            warn!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(path = %path.display(), "Config file missing, using built-in defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(THRESHOLD_ENV_VAR) {
            let threshold = raw.trim().parse::<f32>().map_err(|e| {
                Error::Config(format!("{}='{}' is not a number: {}", THRESHOLD_ENV_VAR, raw, e))
            })?;
            info!(threshold, "Similarity threshold overridden from environment");
            self.linker.similarity_threshold = threshold;
        }

        if let Ok(org) = std::env::var(CENTRAL_ORG_ENV_VAR) {
            info!(organization = %org, "Central organization overridden from environment");
            self.linker.central_organization = org;
        }

        Ok(())
    }

    /// Reject values the linker cannot run with
    pub fn validate(&self) -> Result<()> {
        let s = &self.linker;
        if !(0.0..=1.0).contains(&s.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                s.similarity_threshold
            )));
        }
        if s.scoring_timeout_ms == 0 {
            return Err(Error::Config("scoring_timeout_ms must be positive".to_string()));
        }
        if s.search_limit == 0 {
            return Err(Error::Config("search_limit must be positive".to_string()));
        }
        if s.central_organization.trim().is_empty() {
            return Err(Error::Config("central_organization must not be empty".to_string()));
        }
        Ok(())
    }

    /// Resolve, read, override and validate in one step
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_arg);
        let mut config = Self::load_or_default(path.as_deref())?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Locate the config file following the priority order above
///
/// An explicit path (argument or environment) is returned even when it does
/// not exist, so the caller can report it; the default locations are only
/// returned when present.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(user_config) = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    // Priority 4: System config
    let system_config = PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}
