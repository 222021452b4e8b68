//! In-memory scripting backend for tests.
//!
//! Script units are declared in Rust as sets of closures. The engine counts
//! imports and live module/function handles so tests can check that no
//! import was attempted, or that every handle was released.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = MockEngine::new().with_module(
//!     "MyCat_script_transform",
//!     MockModuleDef::new()
//!         .function("transform", |_globals, readings| Ok(readings))
//!         .function("set_filter_config", |globals, config| {
//!             globals.insert("config", config);
//!             Ok(ScriptValue::Bool(true))
//!         }),
//! );
//! ```

use super::script_engine::{
    EngineException, ScriptEngine, ScriptError, ScriptFunction, ScriptModule,
};
use super::value::{ScriptMap, ScriptValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Body of a mock script function: module globals and the single argument.
pub type MockFn =
    Arc<dyn Fn(&mut ScriptMap, ScriptValue) -> Result<ScriptValue, ScriptError> + Send + Sync>;

/// Declaration of one mock script unit.
#[derive(Clone, Default)]
pub struct MockModuleDef {
    functions: HashMap<String, MockFn>,
    attributes: HashSet<String>,
    import_error: Option<String>,
}

impl MockModuleDef {
    /// Module with no functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callable function.
    pub fn function<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut ScriptMap, ScriptValue) -> Result<ScriptValue, ScriptError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(body));
        self
    }

    /// Add a non-callable attribute.
    pub fn attribute(mut self, name: &str) -> Self {
        self.attributes.insert(name.to_string());
        self
    }

    /// Make every import of this unit fail with `message`.
    pub fn failing_import(mut self, message: &str) -> Self {
        self.import_error = Some(message.to_string());
        self
    }
}

#[derive(Default)]
struct Counters {
    imports: AtomicUsize,
    live_handles: AtomicUsize,
}

/// Handle counter guard; decrements on drop.
struct LiveHandle(Arc<Counters>);

impl LiveHandle {
    fn new(counters: &Arc<Counters>) -> Self {
        counters.live_handles.fetch_add(1, Ordering::SeqCst);
        Self(counters.clone())
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.0.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock implementation of [`ScriptEngine`].
#[derive(Default)]
pub struct MockEngine {
    modules: Mutex<HashMap<String, MockModuleDef>>,
    counters: Arc<Counters>,
}

impl MockEngine {
    /// Empty engine with no modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script unit under a logical name.
    pub fn with_module(self, name: &str, def: MockModuleDef) -> Self {
        self.set_module(name, def);
        self
    }

    /// Register or replace a script unit.
    pub fn set_module(&self, name: &str, def: MockModuleDef) {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), def);
    }

    /// Number of import attempts so far, failed ones included.
    pub fn import_count(&self) -> usize {
        self.counters.imports.load(Ordering::SeqCst)
    }

    /// Number of module and function handles not yet released.
    pub fn live_handles(&self) -> usize {
        self.counters.live_handles.load(Ordering::SeqCst)
    }
}

impl ScriptEngine for MockEngine {
    fn backend_name(&self) -> &str {
        "Mock"
    }

    fn script_extension(&self) -> &str {
        "py"
    }

    fn import_module(&self, logical_name: &str) -> Result<Box<dyn ScriptModule>, ScriptError> {
        self.counters.imports.fetch_add(1, Ordering::SeqCst);

        let def = self
            .modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(logical_name)
            .cloned()
            .ok_or_else(|| ScriptError::ImportError {
                module: logical_name.to_string(),
                exception: EngineException {
                    kind: Some("ImportError".to_string()),
                    message: Some(format!("No module named {}", logical_name)),
                    traceback: None,
                },
            })?;

        if let Some(message) = &def.import_error {
            return Err(ScriptError::ImportError {
                module: logical_name.to_string(),
                exception: EngineException::from_message(message.clone()),
            });
        }

        Ok(Box::new(MockModule {
            name: logical_name.to_string(),
            def,
            globals: Arc::new(Mutex::new(ScriptMap::new())),
            counters: self.counters.clone(),
            _live: LiveHandle::new(&self.counters),
        }))
    }
}

struct MockModule {
    name: String,
    def: MockModuleDef,
    globals: Arc<Mutex<ScriptMap>>,
    counters: Arc<Counters>,
    _live: LiveHandle,
}

impl ScriptModule for MockModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn function(&self, name: &str) -> Result<Box<dyn ScriptFunction>, ScriptError> {
        match self.def.functions.get(name) {
            Some(body) => Ok(Box::new(MockFunction {
                name: name.to_string(),
                body: body.clone(),
                globals: self.globals.clone(),
                _live: LiveHandle::new(&self.counters),
            })),
            None if self.def.attributes.contains(name) => Err(ScriptError::NotCallable {
                name: name.to_string(),
            }),
            None => Err(ScriptError::FunctionNotFound {
                name: name.to_string(),
            }),
        }
    }
}

struct MockFunction {
    name: String,
    body: MockFn,
    globals: Arc<Mutex<ScriptMap>>,
    _live: LiveHandle,
}

impl ScriptFunction for MockFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, arg: ScriptValue) -> Result<ScriptValue, ScriptError> {
        let mut globals = self.globals.lock().unwrap_or_else(PoisonError::into_inner);
        (self.body)(&mut globals, arg)
    }
}

/// Raised-exception error as a mock function would return it.
pub fn raise(kind: &str, message: &str) -> ScriptError {
    ScriptError::RuntimeError(EngineException {
        kind: Some(kind.to_string()),
        message: Some(message.to_string()),
        traceback: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_counted_and_released() {
        let engine = MockEngine::new().with_module(
            "m",
            MockModuleDef::new().function("f", |_, arg| Ok(arg)),
        );
        let module = engine.import_module("m").unwrap();
        let function = module.function("f").unwrap();
        assert_eq!(engine.live_handles(), 2);
        assert_eq!(function.call(ScriptValue::Int(1)).unwrap(), ScriptValue::Int(1));

        drop(module);
        // The function keeps module globals alive but not the module handle
        assert_eq!(engine.live_handles(), 1);
        drop(function);
        assert_eq!(engine.live_handles(), 0);
        assert_eq!(engine.import_count(), 1);
    }

    #[test]
    fn test_globals_shared_within_module() {
        let engine = MockEngine::new().with_module(
            "m",
            MockModuleDef::new()
                .function("set", |globals, arg| {
                    globals.insert("v", arg);
                    Ok(ScriptValue::Bool(true))
                })
                .function("get", |globals, _| {
                    Ok(globals.get("v").cloned().unwrap_or(ScriptValue::Unit))
                }),
        );
        let module = engine.import_module("m").unwrap();
        module.function("set").unwrap().call(ScriptValue::Int(9)).unwrap();
        assert_eq!(
            module.function("get").unwrap().call(ScriptValue::Unit).unwrap(),
            ScriptValue::Int(9)
        );
    }

    #[test]
    fn test_lookup_and_import_failures() {
        let engine = MockEngine::new()
            .with_module("m", MockModuleDef::new().attribute("value"))
            .with_module("bad", MockModuleDef::new().failing_import("SyntaxError: invalid syntax"));

        assert!(matches!(engine.import_module("nope"), Err(ScriptError::ImportError { .. })));
        assert!(matches!(engine.import_module("bad"), Err(ScriptError::ImportError { .. })));
        let module = engine.import_module("m").unwrap();
        assert!(matches!(module.function("value"), Err(ScriptError::NotCallable { .. })));
        assert!(matches!(module.function("other"), Err(ScriptError::FunctionNotFound { .. })));
        assert_eq!(engine.import_count(), 3);
    }
}
