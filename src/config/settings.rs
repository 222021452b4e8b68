//! Process settings using Figment
//!
//! Settings are layered:
//! 1. Built-in defaults
//! 2. An optional TOML file (e.g. `script_filter.toml`)
//! 3. Environment variables prefixed with `SCRIPT_FILTER_`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! SCRIPT_FILTER_DATA_DIR=/usr/local/data
//! SCRIPT_FILTER_BACKEND=python
//! SCRIPT_FILTER_LOG_LEVEL=debug
//! SCRIPT_FILTER_MAX_OPERATIONS=500000
//! ```

use super::ConfigError;
use crate::scripting::rhai_engine::DEFAULT_MAX_OPERATIONS;
use crate::scripting::ScriptBackend;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Scripts directory, relative to the data directory.
pub const SCRIPTS_DIR: &str = "scripts";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SCRIPT_FILTER_";

/// Process-level filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Host data directory; scripts live in `<data_dir>/scripts`
    pub data_dir: PathBuf,
    /// Scripting backend used for new filters
    pub backend: ScriptBackend,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Operation budget per reading in a script call (Rhai backend)
    pub max_operations: u64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            backend: ScriptBackend::default(),
            log_level: "info".to_string(),
            max_operations: DEFAULT_MAX_OPERATIONS,
        }
    }
}

impl FilterSettings {
    /// Load settings from defaults and environment only.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment())
    }

    /// Load settings with a TOML file layered between defaults and environment.
    ///
    /// A missing file is not an error; its layer is simply empty.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(FilterSettings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX));
        Self::extract(figment)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(FilterSettings::default()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Self = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Directory scripts are imported from.
    pub fn scripts_path(&self) -> PathBuf {
        self.data_dir.join(SCRIPTS_DIR)
    }

    /// Validate settings after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Operation budget is non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.max_operations == 0 {
            return Err(ConfigError::Validation(
                "max_operations must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
