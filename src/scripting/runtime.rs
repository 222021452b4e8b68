//! Process-wide scripting runtime state.
//!
//! Interpreter-level state (an embedded Python interpreter, its `sys.path`)
//! belongs to the process rather than to any filter instance. An embedded
//! interpreter is initialised once and never finalised, so this record keeps
//! which backends were initialised and which search paths were registered for
//! the life of the process. Engines still attach and detach so the number of
//! live engines is known.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

static RUNTIME: Lazy<Mutex<RuntimeState>> = Lazy::new(|| Mutex::new(RuntimeState::default()));

#[derive(Default)]
struct RuntimeState {
    attached: usize,
    initialised: HashSet<String>,
    search_paths: HashSet<PathBuf>,
}

/// Attachment of one engine to the process-wide runtime.
///
/// Dropping the handle detaches the engine.
#[derive(Debug)]
pub struct RuntimeHandle {
    backend: String,
}

impl RuntimeHandle {
    /// Backend this handle was attached for.
    pub fn backend(&self) -> &str {
        &self.backend
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        let mut state = RUNTIME.lock().unwrap_or_else(PoisonError::into_inner);
        state.attached = state.attached.saturating_sub(1);
        if state.attached == 0 {
            debug!(backend = %self.backend, "Last engine detached from script runtime");
        }
    }
}

/// Attach an engine that needs no interpreter initialisation.
pub fn attach(backend: &str) -> RuntimeHandle {
    attach_with(backend, || {})
}

/// Attach an engine, running `initialise` the first time `backend` attaches
/// in this process.
///
/// `initialise` runs with the runtime lock held, so concurrent first attaches
/// cannot both run it.
pub fn attach_with(backend: &str, initialise: impl FnOnce()) -> RuntimeHandle {
    let mut state = RUNTIME.lock().unwrap_or_else(PoisonError::into_inner);
    if state.initialised.insert(backend.to_string()) {
        initialise();
        info!(backend = %backend, "Script runtime initialised");
    }
    state.attached += 1;
    debug!(backend = %backend, attached = state.attached, "Engine attached to script runtime");
    RuntimeHandle {
        backend: backend.to_string(),
    }
}

/// Record a script search path.
///
/// Returns `true` only the first time `path` is registered in this process,
/// so process-global search lists are extended once.
pub fn register_search_path(path: &Path) -> bool {
    let mut state = RUNTIME.lock().unwrap_or_else(PoisonError::into_inner);
    state.search_paths.insert(path.to_path_buf())
}

/// Number of engines currently attached.
pub fn attached_engines() -> usize {
    RUNTIME.lock().unwrap_or_else(PoisonError::into_inner).attached
}
