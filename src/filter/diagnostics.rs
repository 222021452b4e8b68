//! Error translation for engine failures.

use crate::scripting::ScriptError;
use tracing::{debug, error};

/// Emit one diagnostic for an engine error.
///
/// The exception was already fetched (and the engine's error state cleared)
/// when the `ScriptError` was built; this only renders it.
pub fn log_script_error(filter: &str, script: &str, err: &ScriptError) {
    let description = err.description();
    error!(filter, script, error = %description, "Script error");
    if let Some(traceback) = err.traceback() {
        debug!(filter, script, traceback, "Script traceback");
    }
}
