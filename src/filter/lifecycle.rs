//! Lifecycle manager for a script filter instance.
//!
//! # State Machine
//!
//! ```text
//! Unconfigured ──set_script_name──► ScriptResolved ──configure──► Loaded ──► Ready
//!       │                                 │                          │
//!       └── no script ──► Disabled ◄──────┴── import/entry point ────┴── config push
//! ```
//!
//! `reconfigure` tears the binding down and replays the whole sequence from
//! `Unconfigured` with the new category.
//!
//! # Locking
//!
//! One `RwLock` guards the configuration snapshot, the derived script name
//! and the binding. Reconfiguration holds the write lock for the full
//! teardown and rebuild; the data path holds the read lock from encode to
//! decode, so an invocation can never observe a released binding.

use super::binding::{LoadedScript, ScriptBinding};
use super::codec;
use super::config_channel::push_configuration;
use super::script_name::ScriptName;
use crate::config::{ConfigCategory, ItemAttribute};
use crate::error::{AppResult, FilterError};
use crate::reading::Reading;
use crate::scripting::{ScriptEngine, ScriptValue};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Category item naming the script file.
pub const SCRIPT_CONFIG_ITEM_NAME: &str = "script";

/// Category item switching the filter on and off.
pub const ENABLE_ITEM_NAME: &str = "enable";

/// Lifecycle phase of a filter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    /// No script name derived yet
    Unconfigured,
    /// Script name derived, nothing loaded
    ScriptResolved,
    /// Script unit imported, entry point not yet bound
    Loaded,
    /// Binding complete and configured
    Ready,
    /// Last configuration attempt failed or had no script
    Disabled,
}

impl fmt::Display for FilterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterPhase::Unconfigured => "unconfigured",
            FilterPhase::ScriptResolved => "script resolved",
            FilterPhase::Loaded => "loaded",
            FilterPhase::Ready => "ready",
            FilterPhase::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

struct FilterState {
    config: ConfigCategory,
    script: Option<ScriptName>,
    binding: Option<ScriptBinding>,
    phase: FilterPhase,
    enabled: bool,
}

impl FilterState {
    fn new(config: ConfigCategory) -> Self {
        let enabled = enable_switch(&config);
        Self {
            config,
            script: None,
            binding: None,
            phase: FilterPhase::Unconfigured,
            enabled,
        }
    }

    fn is_active(&self) -> bool {
        self.phase == FilterPhase::Ready && self.enabled
    }

    fn script_label(&self) -> &str {
        self.script.as_ref().map_or("", ScriptName::logical)
    }
}

/// `enable` item of the category; an absent item means enabled.
fn enable_switch(config: &ConfigCategory) -> bool {
    if !config.item_exists(ENABLE_ITEM_NAME) {
        return true;
    }
    config
        .value(ENABLE_ITEM_NAME)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(true)
}

/// A filter stage that transforms readings with a user script.
pub struct ScriptFilter {
    name: String,
    engine: Arc<dyn ScriptEngine>,
    filters_path: PathBuf,
    state: RwLock<FilterState>,
}

impl ScriptFilter {
    /// Create an unconfigured filter.
    ///
    /// `filters_path` is the directory the engine imports scripts from; it
    /// is only reported in diagnostics.
    pub fn new(
        name: impl Into<String>,
        config: ConfigCategory,
        engine: Arc<dyn ScriptEngine>,
        filters_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            engine,
            filters_path: filters_path.into(),
            state: RwLock::new(FilterState::new(config)),
        }
    }

    /// Filter instance name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory scripts are imported from.
    pub fn filters_path(&self) -> &Path {
        &self.filters_path
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> FilterPhase {
        self.read_state().phase
    }

    /// True when the filter is ready and its `enable` item is on.
    pub fn is_enabled(&self) -> bool {
        self.read_state().is_active()
    }

    /// Logical name of the resolved script, if any.
    pub fn script_name(&self) -> Option<String> {
        self.read_state().script.as_ref().map(|s| s.logical().to_string())
    }

    /// Derive the script to load from the `script` item's `file` attribute.
    ///
    /// Returns `false` and disables the filter when there is none.
    pub fn set_script_name(&self) -> bool {
        let mut state = self.write_state();
        self.resolve_script_name(&mut state)
    }

    /// Load the resolved script, bind its entry point and push configuration.
    ///
    /// Returns `false` and disables the filter on any failure; the host
    /// should abort pipeline set-up in that case.
    pub fn configure(&self) -> bool {
        self.try_configure().is_ok()
    }

    /// [`configure`](Self::configure) with the failure reported.
    pub fn try_configure(&self) -> AppResult<()> {
        let mut state = self.write_state();
        self.configure_state(&mut state)
    }

    /// Replace the configuration category and rebuild the binding.
    ///
    /// The write lock is held from teardown to the end of the rebuild.
    pub fn reconfigure(&self, new_config: &str) -> bool {
        let mut state = self.write_state();
        info!(filter = %self.name, "Reconfiguring filter");

        state.binding = None;
        state.script = None;
        state.phase = FilterPhase::Unconfigured;

        let category_name = state.config.name().to_string();
        match ConfigCategory::new(category_name, new_config) {
            Ok(config) => {
                state.enabled = enable_switch(&config);
                state.config = config;
            }
            Err(err) => {
                error!(filter = %self.name, error = %err, "Rejected new configuration, filter disabled");
                state.phase = FilterPhase::Disabled;
                return false;
            }
        }

        if !self.resolve_script_name(&mut state) {
            return false;
        }
        self.configure_state(&mut state).is_ok()
    }

    /// Take the configuration lock for a host-coordinated critical section.
    ///
    /// Dropping the returned guard (or calling [`FilterLock::unlock`])
    /// releases it.
    pub fn lock(&self) -> FilterLock<'_> {
        FilterLock {
            filter: self,
            state: self.write_state(),
        }
    }

    /// Build the engine-side list for a batch.
    pub fn create_readings_list(&self, readings: &[Reading]) -> ScriptValue {
        codec::encode(readings)
    }

    /// Rebuild readings from a transform result.
    ///
    /// Returns `None` (after logging) when the result cannot be decoded; the
    /// whole batch is discarded. Takes no lock, so it may be called while a
    /// [`FilterLock`] is held.
    pub fn get_filtered_readings(&self, result: ScriptValue) -> Option<Vec<Reading>> {
        match codec::decode(result) {
            Ok(readings) => Some(readings),
            Err(err) => {
                error!(filter = %self.name, error = %err, "Discarding filtered readings");
                None
            }
        }
    }

    /// Encode, invoke and decode one batch under the read lock.
    ///
    /// # Errors
    ///
    /// [`FilterError::Disabled`] when the filter is not active, otherwise any
    /// transform or decode error.
    pub fn transform(&self, readings: &[Reading]) -> AppResult<Vec<Reading>> {
        let state = self.read_state();
        self.transform_state(&state, readings)
    }

    /// Data-path entry used by the host.
    ///
    /// An inactive filter passes readings through unchanged. A failed
    /// transform is logged and yields no readings for this cycle.
    pub fn ingest(&self, readings: Vec<Reading>) -> Vec<Reading> {
        let state = self.read_state();
        if !state.is_active() {
            return readings;
        }
        match self.transform_state(&state, &readings) {
            Ok(filtered) => filtered,
            Err(err) => {
                self.log_discarded(&state, &err);
                Vec::new()
            }
        }
    }

    fn resolve_script_name(&self, state: &mut FilterState) -> bool {
        let reference = if state.config.item_exists(SCRIPT_CONFIG_ITEM_NAME) {
            state
                .config
                .item_attribute(SCRIPT_CONFIG_ITEM_NAME, ItemAttribute::File)
                .ok()
        } else {
            None
        };

        state.script = reference
            .as_deref()
            .and_then(|r| ScriptName::from_file_reference(r, self.engine.script_extension()));

        match &state.script {
            Some(script) => {
                debug!(
                    filter = %self.name,
                    script = script.logical(),
                    entry_point = script.entry_point(),
                    "Script name resolved"
                );
                state.phase = FilterPhase::ScriptResolved;
                true
            }
            None => {
                warn!(
                    filter = %self.name,
                    category = state.config.name(),
                    "Filter called without a script. Check 'script' item in category configuration. Filter has been disabled."
                );
                state.phase = FilterPhase::Disabled;
                false
            }
        }
    }

    fn configure_state(&self, state: &mut FilterState) -> AppResult<()> {
        state.binding = None;

        let Some(script) = state.script.clone() else {
            state.phase = FilterPhase::Disabled;
            return Err(FilterError::ScriptNameMissing {
                filter: self.name.clone(),
            });
        };

        match self.bind(state, script) {
            Ok(binding) => {
                info!(
                    filter = %self.name,
                    script = binding.script().logical(),
                    backend = self.engine.backend_name(),
                    "Script filter ready"
                );
                state.binding = Some(binding);
                state.phase = FilterPhase::Ready;
                Ok(())
            }
            Err(err) => {
                if matches!(err, FilterError::ScriptLoadFailed { .. }) {
                    error!(
                        filter = %self.name,
                        category = state.config.name(),
                        script = state.script_label(),
                        path = %self.filters_path.display(),
                        "Cannot import script"
                    );
                }
                error!(filter = %self.name, error = %err, "Filter disabled");
                state.phase = FilterPhase::Disabled;
                Err(err)
            }
        }
    }

    fn bind(&self, state: &mut FilterState, script: ScriptName) -> AppResult<ScriptBinding> {
        let loaded = LoadedScript::load(self.engine.as_ref(), &self.name, script)?;
        state.phase = FilterPhase::Loaded;
        let binding = loaded.resolve_entry_point()?;
        push_configuration(&binding, &state.config)?;
        Ok(binding)
    }

    fn transform_state(&self, state: &FilterState, readings: &[Reading]) -> AppResult<Vec<Reading>> {
        let binding = match &state.binding {
            Some(binding) if state.is_active() => binding,
            _ => return Err(FilterError::Disabled(self.name.clone())),
        };
        let input = codec::encode(readings);
        let output = binding.invoke(input)?;
        codec::decode(output)
    }

    fn log_discarded(&self, state: &FilterState, err: &FilterError) {
        error!(
            filter = %self.name,
            script = state.script_label(),
            error = %err,
            "Discarding filtered readings"
        );
    }

    fn read_state(&self) -> RwLockReadGuard<'_, FilterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, FilterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ScriptFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read_state();
        f.debug_struct("ScriptFilter")
            .field("name", &self.name)
            .field("backend", &self.engine.backend_name())
            .field("script", &state.script)
            .field("phase", &state.phase)
            .field("enabled", &state.enabled)
            .finish()
    }
}

/// Exclusive hold on a filter's configuration lock.
pub struct FilterLock<'a> {
    filter: &'a ScriptFilter,
    state: RwLockWriteGuard<'a, FilterState>,
}

impl FilterLock<'_> {
    /// Release the lock.
    pub fn unlock(self) {}

    /// Lifecycle phase seen under the lock.
    pub fn phase(&self) -> FilterPhase {
        self.state.phase
    }

    /// Whether the data path is active under the lock.
    pub fn is_enabled(&self) -> bool {
        self.state.is_active()
    }

    /// Same as [`ScriptFilter::transform`], under the held lock.
    pub fn transform(&self, readings: &[Reading]) -> AppResult<Vec<Reading>> {
        self.filter.transform_state(&self.state, readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::binding::DEFAULT_FILTER_CONFIG_METHOD;
    use crate::reading::{Datapoint, DatapointValue};
    use crate::scripting::mock::{raise, MockEngine, MockModuleDef};
    use crate::scripting::{ScriptMap, ScriptValue};
    use tracing_test::traced_test;

    const MODULE: &str = "MyCat_script_transform";

    fn category(extra: &str) -> ConfigCategory {
        let json = format!(
            r#"{{ "script": {{ "type": "script", "file": "/data/scripts/{}.py" }} {} }}"#,
            MODULE, extra
        );
        ConfigCategory::new("MyCat", &json).unwrap()
    }

    /// Transform adding the configured offset to every integer datapoint.
    fn offset_module() -> MockModuleDef {
        MockModuleDef::new()
            .function(DEFAULT_FILTER_CONFIG_METHOD, |globals, arg| {
                let blob = arg
                    .as_map()
                    .and_then(|m| m.get("config"))
                    .and_then(ScriptValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                let offset: i64 = serde_json::from_str::<serde_json::Value>(&blob)
                    .ok()
                    .and_then(|v| v.get("offset").and_then(serde_json::Value::as_i64))
                    .unwrap_or(0);
                globals.insert("offset", offset);
                Ok(ScriptValue::Bool(true))
            })
            .function("transform", |globals, readings| {
                let offset = globals.get("offset").and_then(ScriptValue::as_int).unwrap_or(0);
                let ScriptValue::List(items) = readings else {
                    return Err(raise("TypeError", "expected list"));
                };
                Ok(ScriptValue::List(
                    items.into_iter().map(|item| add_offset(item, offset)).collect(),
                ))
            })
    }

    fn add_offset(item: ScriptValue, offset: i64) -> ScriptValue {
        let map = match item {
            ScriptValue::Map(map) => map,
            other => return other,
        };
        let map: ScriptMap = map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    ScriptValue::Map(values) if key == "reading" => ScriptValue::Map(
                        values
                            .into_iter()
                            .map(|(name, v)| match v {
                                ScriptValue::Int(i) => (name, ScriptValue::Int(i + offset)),
                                other => (name, other),
                            })
                            .collect(),
                    ),
                    other => other,
                };
                (key, value)
            })
            .collect();
        ScriptValue::Map(map)
    }

    fn filter(engine: &Arc<MockEngine>, config: ConfigCategory) -> ScriptFilter {
        ScriptFilter::new("scale1", config, engine.clone(), "/data/scripts")
    }

    fn batch() -> Vec<Reading> {
        vec![Reading::new("lab1", Datapoint::new("power", 10_i64))]
    }

    #[test]
    fn test_ready_after_configure() {
        let engine = Arc::new(MockEngine::new().with_module(MODULE, offset_module()));
        let filter = filter(&engine, category(r#", "config": { "value": "{\"offset\": 5}" }"#));

        assert_eq!(filter.phase(), FilterPhase::Unconfigured);
        assert!(filter.set_script_name());
        assert_eq!(filter.phase(), FilterPhase::ScriptResolved);
        assert!(filter.configure());
        assert_eq!(filter.phase(), FilterPhase::Ready);
        assert!(filter.is_enabled());
        assert_eq!(filter.script_name().as_deref(), Some(MODULE));

        let out = filter.transform(&batch()).unwrap();
        assert_eq!(out[0].datapoint("power"), Some(&DatapointValue::Integer(15)));
    }

    #[traced_test]
    #[test]
    fn test_missing_script_disables_without_import() {
        let engine = Arc::new(MockEngine::new().with_module(MODULE, offset_module()));
        let filter = filter(&engine, ConfigCategory::new("MyCat", r#"{"config": {"value": "{}"}}"#).unwrap());

        assert!(!filter.set_script_name());
        assert_eq!(filter.phase(), FilterPhase::Disabled);
        assert!(!filter.configure());
        assert_eq!(engine.import_count(), 0);
        assert!(logs_contain("Filter called without a script"));
        assert!(logs_contain("MyCat"));
    }

    #[test]
    fn test_script_attribute_without_file() {
        let engine = Arc::new(MockEngine::new());
        let filter = filter(&engine, ConfigCategory::new("MyCat", r#"{"script": {"type": "script"}}"#).unwrap());
        assert!(!filter.set_script_name());
        assert_eq!(engine.import_count(), 0);
    }

    #[traced_test]
    #[test]
    fn test_import_failure_logs_path() {
        let engine = Arc::new(MockEngine::new());
        let filter = filter(&engine, category(""));
        assert!(filter.set_script_name());
        assert!(matches!(
            filter.try_configure(),
            Err(FilterError::ScriptLoadFailed { .. })
        ));
        assert_eq!(filter.phase(), FilterPhase::Disabled);
        assert!(logs_contain("Cannot import script"));
        assert!(logs_contain("/data/scripts"));
    }

    #[traced_test]
    #[test]
    fn test_config_rejection_releases_binding() {
        let engine = Arc::new(MockEngine::new().with_module(
            MODULE,
            MockModuleDef::new()
                .function("transform", |_, arg| Ok(arg))
                .function(DEFAULT_FILTER_CONFIG_METHOD, |_, _| Err(raise("ValueError", "bad config"))),
        ));
        let filter = filter(&engine, category(""));
        assert!(filter.set_script_name());
        assert!(!filter.configure());
        assert_eq!(filter.phase(), FilterPhase::Disabled);
        assert_eq!(engine.live_handles(), 0);
        assert!(logs_contain("ValueError: bad config"));
        assert!(logs_contain(MODULE));
    }

    #[test]
    fn test_enable_switch() {
        let engine = Arc::new(MockEngine::new().with_module(MODULE, offset_module()));
        let filter = filter(&engine, category(r#", "enable": { "value": "false" }"#));
        assert!(filter.set_script_name());
        assert!(filter.configure());
        assert_eq!(filter.phase(), FilterPhase::Ready);
        assert!(!filter.is_enabled());

        let input = batch();
        assert_eq!(filter.ingest(input.clone()), input);
        assert!(matches!(filter.transform(&input), Err(FilterError::Disabled(_))));
    }

    #[test]
    fn test_reconfigure_swaps_binding() {
        let engine = Arc::new(MockEngine::new().with_module(MODULE, offset_module()));
        let filter = filter(&engine, category(r#", "config": { "value": "{\"offset\": 1}" }"#));
        assert!(filter.set_script_name() && filter.configure());

        let new_config = format!(
            r#"{{ "script": {{ "file": "{}.py" }}, "config": {{ "value": "{{\"offset\": 100}}" }} }}"#,
            MODULE
        );
        assert!(filter.reconfigure(&new_config));
        assert_eq!(engine.import_count(), 2);
        assert_eq!(engine.live_handles(), 2);

        let out = filter.transform(&batch()).unwrap();
        assert_eq!(out[0].datapoint("power"), Some(&DatapointValue::Integer(110)));
    }

    #[traced_test]
    #[test]
    fn test_reconfigure_without_script_disables() {
        let engine = Arc::new(MockEngine::new().with_module(MODULE, offset_module()));
        let filter = filter(&engine, category(""));
        assert!(filter.set_script_name() && filter.configure());

        assert!(!filter.reconfigure(r#"{"config": {"value": "{}"}}"#));
        assert_eq!(filter.phase(), FilterPhase::Disabled);
        assert_eq!(filter.script_name(), None);
        assert_eq!(engine.live_handles(), 0);

        assert!(!filter.reconfigure("not json"));
        assert_eq!(filter.phase(), FilterPhase::Disabled);
    }

    #[traced_test]
    #[test]
    fn test_ingest_drops_batch_on_malformed_result() {
        let engine = Arc::new(MockEngine::new().with_module(
            MODULE,
            MockModuleDef::new().function("transform", |_, _| {
                let mut element = ScriptMap::new();
                element.insert("reading", ScriptMap::new());
                Ok(ScriptValue::List(vec![ScriptValue::Map(element)]))
            }),
        ));
        let filter = filter(&engine, category(""));
        assert!(filter.set_script_name() && filter.configure());
        assert!(filter.ingest(batch()).is_empty());
        assert!(logs_contain("Discarding filtered readings"));
    }

    #[test]
    fn test_data_path_operations() {
        let engine = Arc::new(MockEngine::new());
        let filter = filter(&engine, category(""));
        let list = filter.create_readings_list(&batch());
        let readings = filter.get_filtered_readings(list).unwrap();
        assert_eq!(readings[0].asset_name(), "lab1");
        assert!(filter.get_filtered_readings(ScriptValue::Int(1)).is_none());
    }

    #[test]
    fn test_lock_guards_transform() {
        let engine = Arc::new(MockEngine::new().with_module(MODULE, offset_module()));
        let filter = filter(&engine, category(""));
        assert!(filter.set_script_name() && filter.configure());

        let lock = filter.lock();
        assert_eq!(lock.phase(), FilterPhase::Ready);
        assert!(lock.is_enabled());
        assert_eq!(lock.transform(&batch()).unwrap().len(), 1);
        lock.unlock();

        assert!(filter.is_enabled());
    }
}
