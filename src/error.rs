//! Custom error types for the filter stage.
//!
//! This module defines the primary error type, `FilterError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur while loading a script, pushing configuration into it,
//! and moving readings across the scripting boundary.
//!
//! ## Error Hierarchy
//!
//! Load-time and configure-time failures are terminal for that configuration attempt:
//!
//! - **`ScriptNameMissing`**: the category has no script reference; the filter stays disabled.
//! - **`ScriptLoadFailed`**: the engine could not import the script unit.
//! - **`EntryPointNotFound`**: the script has no callable transform of the expected name.
//! - **`ConfigPushFailed`**: `set_filter_config` raised or did not return `true`.
//!
//! Per-batch failures discard that batch's output only:
//!
//! - **`MalformedResult`**: a result element is not a reading-shaped mapping.
//! - **`UnsupportedDatapointType`**: a datapoint value has no native representation.
//! - **`TransformRaised`**: the transform raised inside the engine.
//!
//! By using `#[from]`, configuration and engine construction errors convert
//! with the `?` operator.

use crate::config::ConfigError;
use crate::scripting::ScriptError;
use thiserror::Error;

/// Convenience alias for results using the filter error type.
pub type AppResult<T> = std::result::Result<T, FilterError>;

/// Errors raised by the script filter stage.
#[derive(Error, Debug)]
pub enum FilterError {
    /// The category has no `script` item
    #[error("Filter '{filter}' has no script configured")]
    ScriptNameMissing {
        /// Filter instance name
        filter: String,
    },

    /// Importing the script unit failed
    #[error("Script '{script}' failed to load: {message}")]
    ScriptLoadFailed {
        /// Logical script name
        script: String,
        /// Engine error description
        message: String,
    },

    /// The unit has no callable one-argument entry point
    #[error("Script '{script}' has no callable entry point '{entry_point}'")]
    EntryPointNotFound {
        /// Logical script name
        script: String,
        /// Function that was looked up
        entry_point: String,
    },

    /// The configuration entry point raised or did not return `true`
    #[error("Script '{script}' rejected its configuration: {reason}")]
    ConfigPushFailed {
        /// Logical script name
        script: String,
        /// What the entry point did instead
        reason: String,
    },

    /// The transform result is not a list of reading-shaped mappings
    #[error("Malformed result element {index}: {reason}")]
    MalformedResult {
        /// Position of the offending element
        index: usize,
        /// What was wrong with it
        reason: String,
    },

    /// A returned datapoint is not an integer, float or string
    #[error("Unsupported type '{found}' for datapoint '{datapoint}' in result element {index}")]
    UnsupportedDatapointType {
        /// Position of the offending element
        index: usize,
        /// Datapoint name
        datapoint: String,
        /// Engine type found
        found: String,
    },

    /// The transform raised
    #[error("Script '{script}' raised during transform: {message}")]
    TransformRaised {
        /// Logical script name
        script: String,
        /// Engine error description
        message: String,
    },

    /// Data path used without an active binding
    #[error("Filter '{0}' is not ready")]
    Disabled(String),

    /// Configuration category or settings error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Engine construction error
    #[error("Scripting error: {0}")]
    Script(#[from] ScriptError),
}

impl FilterError {
    /// True for failures that only discard the current batch.
    pub fn is_batch_error(&self) -> bool {
        matches!(
            self,
            FilterError::MalformedResult { .. }
                | FilterError::UnsupportedDatapointType { .. }
                | FilterError::TransformRaised { .. }
        )
    }
}
