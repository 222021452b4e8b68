//! Generic ScriptEngine Traits for Swappable Scripting Backends
//!
//! This module defines the foreign-function boundary between the filter and a
//! scripting engine. A backend (Rhai, Python/PyO3, or the in-memory mock used
//! in tests) implements three object-safe traits:
//!
//! 1. [`ScriptEngine`] - imports a script unit by its logical name
//! 2. [`ScriptModule`] - a loaded script unit; resolves named functions
//! 3. [`ScriptFunction`] - a callable taking a single positional argument
//!
//! # Ownership
//!
//! Modules and functions are owned handles. Dropping a handle releases the
//! engine-side object, so a binding can never be half-released: whoever owns
//! the `Box<dyn ScriptModule>` and `Box<dyn ScriptFunction>` pair owns the
//! whole binding.
//!
//! # Error Handling
//!
//! Engine-raised conditions are captured as an [`EngineException`] triple
//! (kind, message, traceback). Capturing the exception clears the engine's
//! own error state, so no error ever leaks into the next call.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use script_filter::scripting::{RhaiEngine, ScriptEngine, ScriptValue};
//!
//! let engine = RhaiEngine::new("/usr/local/data/scripts");
//! let module = engine.import_module("lab_script_offset")?;
//! let function = module.function("offset")?;
//! let result = function.call(ScriptValue::List(vec![]))?;
//! ```

use super::value::ScriptValue;
use std::fmt;

/// Placeholder used when an engine exception carries no readable message.
pub const NO_ERROR_DESCRIPTION: &str = "no error description.";

// =============================================================================
// Error Types
// =============================================================================

/// An exception raised inside the scripting engine.
///
/// Any of the three parts may be missing; the engine only guarantees that
/// something was raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineException {
    /// Exception type name (e.g. `ValueError`)
    pub kind: Option<String>,
    /// Exception value rendered as text
    pub message: Option<String>,
    /// Formatted traceback, if the engine provides one
    pub traceback: Option<String>,
}

impl EngineException {
    /// Exception carrying only a message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: Some(message.into()),
            traceback: None,
        }
    }

    /// Human-readable message, falling back to [`NO_ERROR_DESCRIPTION`].
    pub fn description(&self) -> &str {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(NO_ERROR_DESCRIPTION)
    }
}

impl fmt::Display for EngineException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kind) = &self.kind {
            write!(f, "{}: ", kind)?;
        }
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur at the scripting engine boundary
///
/// This enum provides a unified error type across different scripting backends,
/// making it easier to handle errors consistently regardless of which engine
/// is being used.
#[derive(Debug, Clone)]
pub enum ScriptError {
    /// Script unit could not be imported
    ImportError {
        /// Logical name of the unit
        module: String,
        /// What the engine raised
        exception: EngineException,
    },

    /// Compilation or parsing error
    CompilationError {
        /// Parser message
        message: String,
        /// Line of the error, when known
        line: Option<usize>,
        /// Column of the error, when known
        column: Option<usize>,
    },

    /// Runtime execution error raised by the script
    RuntimeError(EngineException),

    /// Named function not present in the module
    FunctionNotFound {
        /// Function name
        name: String,
    },

    /// Named attribute exists but cannot be called with one argument
    NotCallable {
        /// Attribute name
        name: String,
    },

    /// Backend-specific error (for errors unique to a particular engine)
    BackendError {
        /// Backend name
        backend: String,
        /// Error description
        message: String,
    },
}

impl ScriptError {
    /// Message suitable for a single-line diagnostic.
    pub fn description(&self) -> String {
        match self {
            ScriptError::ImportError { exception, .. } => exception.to_string(),
            ScriptError::RuntimeError(exception) => exception.to_string(),
            other => other.to_string(),
        }
    }

    /// Traceback of the underlying engine exception, if any.
    pub fn traceback(&self) -> Option<&str> {
        match self {
            ScriptError::ImportError { exception, .. } | ScriptError::RuntimeError(exception) => {
                exception.traceback.as_deref()
            }
            _ => None,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::ImportError { module, exception } => {
                write!(f, "Cannot import '{}': {}", module, exception)
            }
            ScriptError::CompilationError { message, line, column } => {
                write!(f, "Compilation error: {}", message)?;
                if let Some(line) = line {
                    write!(f, " at line {}", line)?;
                }
                if let Some(col) = column {
                    write!(f, ", column {}", col)?;
                }
                Ok(())
            }
            ScriptError::RuntimeError(exception) => {
                write!(f, "Runtime error: {}", exception)
            }
            ScriptError::FunctionNotFound { name } => {
                write!(f, "Function not found: {}", name)
            }
            ScriptError::NotCallable { name } => {
                write!(f, "Attribute is not callable: {}", name)
            }
            ScriptError::BackendError { backend, message } => {
                write!(f, "{} backend error: {}", backend, message)
            }
        }
    }
}

impl std::error::Error for ScriptError {}

// =============================================================================
// Engine Traits
// =============================================================================

/// Generic interface for scripting backends
///
/// # Thread Safety
///
/// Implementations must be Send + Sync so a filter can be shared between the
/// thread feeding readings and the thread delivering reconfigurations.
pub trait ScriptEngine: Send + Sync {
    /// Get the name of the scripting backend
    fn backend_name(&self) -> &str;

    /// File extension of script units for this backend, without the dot.
    fn script_extension(&self) -> &str;

    /// Import a script unit by logical name (not by file path).
    ///
    /// Importing runs the unit's top-level statements once.
    fn import_module(&self, logical_name: &str) -> Result<Box<dyn ScriptModule>, ScriptError>;
}

/// A loaded script unit.
pub trait ScriptModule: Send + Sync {
    /// Logical name the module was imported under.
    fn name(&self) -> &str;

    /// Resolve a callable attribute.
    ///
    /// Returns [`ScriptError::FunctionNotFound`] when no attribute of that name
    /// exists and [`ScriptError::NotCallable`] when it exists but cannot be
    /// invoked. A failed lookup leaves no pending engine error behind.
    fn function(&self, name: &str) -> Result<Box<dyn ScriptFunction>, ScriptError>;
}

/// A resolved script function.
pub trait ScriptFunction: Send + Sync {
    /// Function name within its module.
    fn name(&self) -> &str;

    /// Call the function with `arg` as its sole positional argument.
    fn call(&self, arg: ScriptValue) -> Result<ScriptValue, ScriptError>;
}

// =============================================================================
// Unit Tests
// =============================================================================
