//! Engine binding: the loaded script unit and its resolved transform.
//!
//! Loading is split in two steps so a failed entry-point lookup can never
//! leave a half-bound script behind:
//!
//! ```text
//! LoadedScript::load(engine, name)      import the unit by logical name
//!     .resolve_entry_point()            consume it into a ScriptBinding
//!     .push_config(blob)                optional `set_filter_config` hand-off
//! ```
//!
//! Both handles are owned boxes; dropping a [`LoadedScript`] or a
//! [`ScriptBinding`] releases everything it holds.

use super::diagnostics::log_script_error;
use super::script_name::ScriptName;
use crate::error::{AppResult, FilterError};
use crate::scripting::{ScriptEngine, ScriptError, ScriptFunction, ScriptMap, ScriptModule, ScriptValue};
use tracing::{debug, error};

/// Fixed name of the optional configuration entry point.
pub const DEFAULT_FILTER_CONFIG_METHOD: &str = "set_filter_config";

/// Key under which the configuration blob is passed.
pub const CONFIG_KEY: &str = "config";

/// Outcome of a configuration push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPush {
    /// `set_filter_config` returned `true`
    Applied,
    /// The script has no `set_filter_config`
    Skipped,
}

/// An imported script unit whose entry point is not resolved yet.
pub struct LoadedScript {
    filter: String,
    script: ScriptName,
    module: Box<dyn ScriptModule>,
}

impl LoadedScript {
    /// Import `script` by its logical name.
    ///
    /// # Errors
    ///
    /// [`FilterError::ScriptLoadFailed`] carrying the engine's error text.
    pub fn load(engine: &dyn ScriptEngine, filter: &str, script: ScriptName) -> AppResult<Self> {
        match engine.import_module(script.logical()) {
            Ok(module) => {
                debug!(filter, script = %script, backend = engine.backend_name(), "Script imported");
                Ok(Self {
                    filter: filter.to_string(),
                    script,
                    module,
                })
            }
            Err(err) => {
                log_script_error(filter, script.logical(), &err);
                Err(FilterError::ScriptLoadFailed {
                    script: script.logical().to_string(),
                    message: err.description(),
                })
            }
        }
    }

    /// Script this handle was loaded from.
    pub fn script(&self) -> &ScriptName {
        &self.script
    }

    /// Look up the transform function and bind it.
    ///
    /// On failure the module handle is dropped with `self`.
    ///
    /// # Errors
    ///
    /// [`FilterError::EntryPointNotFound`] if the entry point is absent or not callable.
    pub fn resolve_entry_point(self) -> AppResult<ScriptBinding> {
        match self.module.function(self.script.entry_point()) {
            Ok(function) => Ok(ScriptBinding {
                filter: self.filter,
                script: self.script,
                module: self.module,
                function,
            }),
            Err(err) => {
                log_script_error(&self.filter, self.script.logical(), &err);
                Err(FilterError::EntryPointNotFound {
                    script: self.script.logical().to_string(),
                    entry_point: self.script.entry_point().to_string(),
                })
            }
        }
    }
}

/// Live (module, function, script name) triple used to transform readings.
pub struct ScriptBinding {
    filter: String,
    script: ScriptName,
    module: Box<dyn ScriptModule>,
    function: Box<dyn ScriptFunction>,
}

impl ScriptBinding {
    /// Script this binding was resolved from.
    pub fn script(&self) -> &ScriptName {
        &self.script
    }

    /// Push the configuration blob through `set_filter_config`.
    ///
    /// The function receives `{"config": blob}` and must return boolean
    /// `true`. A module without the function is left unconfigured.
    ///
    /// # Errors
    ///
    /// [`FilterError::ConfigPushFailed`] if the call raised or returned
    /// anything but `true`.
    pub fn push_config(&self, blob: &str) -> AppResult<ConfigPush> {
        let function = match self.module.function(DEFAULT_FILTER_CONFIG_METHOD) {
            Ok(function) => function,
            Err(ScriptError::FunctionNotFound { .. } | ScriptError::NotCallable { .. }) => {
                debug!(filter = %self.filter, script = %self.script, "No configuration entry point");
                return Ok(ConfigPush::Skipped);
            }
            Err(err) => return Err(self.config_push_failed(&err)),
        };

        let mut arg = ScriptMap::with_capacity(1);
        arg.insert(CONFIG_KEY, blob);

        match function.call(ScriptValue::Map(arg)) {
            Ok(ScriptValue::Bool(true)) => Ok(ConfigPush::Applied),
            Ok(other) => {
                let reason = format!(
                    "{} returned {} instead of true",
                    DEFAULT_FILTER_CONFIG_METHOD, other
                );
                error!(filter = %self.filter, script = %self.script, error = %reason, "Script error");
                Err(FilterError::ConfigPushFailed {
                    script: self.script.logical().to_string(),
                    reason,
                })
            }
            Err(err) => Err(self.config_push_failed(&err)),
        }
    }

    /// Call the transform with the encoded batch as its only argument.
    ///
    /// # Errors
    ///
    /// [`FilterError::TransformRaised`] for any engine-raised condition.
    pub fn invoke(&self, readings: ScriptValue) -> AppResult<ScriptValue> {
        self.function.call(readings).map_err(|err| {
            log_script_error(&self.filter, self.script.logical(), &err);
            FilterError::TransformRaised {
                script: self.script.logical().to_string(),
                message: err.description(),
            }
        })
    }

    fn config_push_failed(&self, err: &ScriptError) -> FilterError {
        log_script_error(&self.filter, self.script.logical(), err);
        FilterError::ConfigPushFailed {
            script: self.script.logical().to_string(),
            reason: err.description(),
        }
    }
}

impl std::fmt::Debug for ScriptBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBinding")
            .field("filter", &self.filter)
            .field("module", &self.module.name())
            .field("function", &self.function.name())
            .finish()
    }
}
