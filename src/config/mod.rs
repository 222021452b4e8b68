//! Configuration for the filter stage.
//!
//! Two distinct sources feed a filter:
//!
//! - [`ConfigCategory`]: the host's per-filter configuration category, a JSON
//!   object of named items (`script`, `config`, `enable`, ...). The host owns
//!   it; the filter reads a snapshot per configure cycle.
//! - [`FilterSettings`]: process-level settings (data directory, backend,
//!   log level, script limits) loaded with Figment from defaults, an optional
//!   TOML file and `SCRIPT_FILTER_` environment variables.

pub mod category;
pub mod settings;

pub use category::{ConfigCategory, ItemAttribute};
pub use settings::FilterSettings;

use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Category text is not valid JSON
    #[error("Invalid configuration category JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Category JSON is not an object
    #[error("Configuration category '{0}' is not a JSON object")]
    NotAnObject(String),

    /// Requested item is absent
    #[error("Configuration item '{item}' not found")]
    ItemNotFound {
        /// Item name
        item: String,
    },

    /// Requested attribute is absent from the item
    #[error("Attribute '{attribute}' not found in configuration item '{item}'")]
    AttributeNotFound {
        /// Item name
        item: String,
        /// Attribute name
        attribute: String,
    },

    /// Settings could not be extracted
    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Settings failed validation
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Load(Box::new(error))
    }
}
