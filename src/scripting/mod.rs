//! Scripting engine boundary.
//!
//! This module provides the engine-neutral interface the filter uses to load
//! script units and call their functions. Backends are swappable behind the
//! [`ScriptEngine`] trait.
//!
//! # Architecture
//!
//! ```text
//! ScriptEngine / ScriptModule / ScriptFunction traits
//!     ├── RhaiEngine  (embedded, always available)
//!     ├── PyO3Engine  (Python via PyO3, feature `scripting_python`)
//!     └── MockEngine  (in-memory, for tests)
//!
//! ScriptValue  - engine-neutral object graph crossing the boundary
//! runtime      - process-wide interpreter state (init once, teardown once)
//! ```
//!
//! # Choosing a Backend
//!
//! - **RhaiEngine**: Embedded scripting, zero external dependencies, fast startup
//! - **PyO3Engine**: Python backend, requires a Python installation

pub mod mock;
#[cfg(feature = "scripting_python")]
pub mod pyo3_engine;
pub mod rhai_engine;
pub mod runtime;
pub mod script_engine;
pub mod value;

#[cfg(feature = "scripting_python")]
pub use pyo3_engine::PyO3Engine;
pub use rhai_engine::RhaiEngine;
pub use script_engine::{
    EngineException, ScriptEngine, ScriptError, ScriptFunction, ScriptModule,
    NO_ERROR_DESCRIPTION,
};
pub use value::{ScriptMap, ScriptValue};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Available scripting backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptBackend {
    /// Embedded Rhai scripts (`.rhai`)
    #[default]
    Rhai,
    /// Python modules (`.py`), requires the `scripting_python` feature
    Python,
}

impl fmt::Display for ScriptBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptBackend::Rhai => write!(f, "rhai"),
            ScriptBackend::Python => write!(f, "python"),
        }
    }
}

/// Create the engine for `backend`, loading script units from `scripts_path`.
///
/// # Errors
///
/// Returns [`ScriptError::BackendError`] when the backend was not compiled in
/// or its interpreter cannot be initialised.
pub fn create_engine(
    backend: ScriptBackend,
    scripts_path: impl Into<PathBuf>,
    max_operations: u64,
) -> Result<Arc<dyn ScriptEngine>, ScriptError> {
    match backend {
        ScriptBackend::Rhai => Ok(Arc::new(RhaiEngine::with_limit(scripts_path, max_operations))),
        #[cfg(feature = "scripting_python")]
        ScriptBackend::Python => Ok(Arc::new(PyO3Engine::new(scripts_path)?)),
        #[cfg(not(feature = "scripting_python"))]
        ScriptBackend::Python => {
            let _ = scripts_path;
            Err(ScriptError::BackendError {
                backend: "Python".to_string(),
                message: "Feature 'scripting_python' is not enabled. Please build with --features scripting_python".to_string(),
            })
        }
    }
}
