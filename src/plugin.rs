//! Host plugin surface.
//!
//! The pipeline host discovers the filter through [`plugin_info`], creates
//! one [`FilterPlugin`] per configured filter instance, feeds it batches via
//! [`FilterPlugin::ingest`] and forwards category changes to
//! [`FilterPlugin::reconfigure`].

use crate::config::{ConfigCategory, FilterSettings};
use crate::error::AppResult;
use crate::filter::ScriptFilter;
use crate::reading::Reading;
use crate::scripting::{create_engine, ScriptEngine};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Name the host registers the plugin under.
pub const PLUGIN_NAME: &str = "script";
/// Plugin kind.
pub const PLUGIN_TYPE: &str = "filter";
/// Host plugin interface version.
pub const INTERFACE_VERSION: &str = "1.0.0";

/// Static description of the plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Plugin kind, serialized as `type`.
    #[serde(rename = "type")]
    pub plugin_type: &'static str,
    /// Host interface version.
    pub interface: &'static str,
    /// Default configuration category.
    pub config: Value,
}

/// Plugin information with the default configuration category.
pub fn plugin_info() -> PluginInfo {
    PluginInfo {
        name: PLUGIN_NAME,
        version: env!("CARGO_PKG_VERSION"),
        plugin_type: PLUGIN_TYPE,
        interface: INTERFACE_VERSION,
        config: default_config(),
    }
}

/// Default configuration category for a new filter instance.
pub fn default_config() -> Value {
    json!({
        "plugin": {
            "description": "Script filter plugin",
            "type": "string",
            "default": PLUGIN_NAME,
            "readonly": "true"
        },
        "enable": {
            "description": "A switch that can be used to enable or disable execution of the script filter.",
            "type": "boolean",
            "displayName": "Enabled",
            "default": "false"
        },
        "config": {
            "description": "Script configuration, passed to set_filter_config.",
            "type": "JSON",
            "displayName": "Configuration",
            "default": "{}"
        },
        "script": {
            "description": "Script to run; the file is named <category>_script_<function>.",
            "type": "script",
            "displayName": "Script to run",
            "default": ""
        }
    })
}

/// One filter instance as seen by the host.
#[derive(Debug)]
pub struct FilterPlugin {
    filter: ScriptFilter,
}

impl FilterPlugin {
    /// Create the filter with the engine selected in `settings`.
    ///
    /// A category without a script yields a disabled plugin; a script that
    /// fails to load or rejects its configuration fails `init`, aborting
    /// pipeline set-up.
    pub fn init(name: &str, config: ConfigCategory, settings: &FilterSettings) -> AppResult<Self> {
        let scripts_path = settings.scripts_path();
        let engine = create_engine(settings.backend, scripts_path.clone(), settings.max_operations)?;
        Self::with_engine(name, config, engine, scripts_path)
    }

    /// Create the filter on an existing engine.
    pub fn with_engine(
        name: &str,
        config: ConfigCategory,
        engine: Arc<dyn ScriptEngine>,
        filters_path: impl Into<PathBuf>,
    ) -> AppResult<Self> {
        let filter = ScriptFilter::new(name, config, engine, filters_path);
        if filter.set_script_name() {
            filter.try_configure()?;
        }
        info!(filter = name, phase = %filter.phase(), enabled = filter.is_enabled(), "Filter plugin initialised");
        Ok(Self { filter })
    }

    /// Filter one batch.
    pub fn ingest(&self, readings: Vec<Reading>) -> Vec<Reading> {
        self.filter.ingest(readings)
    }

    /// Apply a new configuration category.
    pub fn reconfigure(&self, new_config: &str) -> bool {
        self.filter.reconfigure(new_config)
    }

    /// The filter driven by this plugin.
    pub fn filter(&self) -> &ScriptFilter {
        &self.filter
    }

    /// Release the script binding.
    pub fn shutdown(self) {
        info!(filter = self.filter.name(), "Filter plugin shut down");
    }
}
