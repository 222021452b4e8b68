//! Rhai Implementation of the ScriptEngine Traits
//!
//! This module provides a `RhaiEngine` backend using the Rhai scripting
//! language. Rhai is a fast, embedded scripting language with Rust-like syntax
//! and needs nothing installed on the host.
//!
//! # Script Units
//!
//! A logical name `N` is imported from `<scripts dir>/N.rhai`. Importing
//! compiles the file and runs its top-level statements once. Functions that
//! take exactly one parameter are resolvable entry points.
//!
//! # Module State
//!
//! Rhai functions cannot see global variables, so every function of one
//! imported module is called with the same persistent object map bound to
//! `this`. A configuration entry point stores what it needs there and the
//! transform reads it back:
//!
//! ```text
//! fn set_filter_config(configuration) {
//!     this.config = parse_json(configuration.config);
//!     true
//! }
//!
//! fn transform(readings) {
//!     let offset = this.config.offset;
//!     for i in 0..readings.len() {
//!         readings[i].reading.power += offset;
//!     }
//!     readings
//! }
//! ```
//!
//! # Safety Limits
//!
//! - Maximum operations per list element (default 100,000). A call whose
//!   argument is a list of `n` readings may run `n` times the budget; any
//!   other call, and a module's top-level statements, get a single budget.
//! - Bounded expression depth, call depth, string/array/map sizes

use super::script_engine::{
    EngineException, ScriptEngine, ScriptError, ScriptFunction, ScriptModule,
};
use super::value::{ScriptMap, ScriptValue};
use rhai::{Array, CallFnOptions, Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Default operation budget per list element of a script call.
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

thread_local! {
    // Number of budgets granted to the evaluation running on this thread.
    static BUDGET_UNITS: Cell<u64> = const { Cell::new(1) };
}

/// Grants `units` operation budgets to calls on this thread until dropped.
struct BudgetScope {
    previous: u64,
}

impl BudgetScope {
    fn enter(units: u64) -> Self {
        let previous = BUDGET_UNITS.with(|cell| cell.replace(units.max(1)));
        Self { previous }
    }
}

impl Drop for BudgetScope {
    fn drop(&mut self) {
        BUDGET_UNITS.with(|cell| cell.set(self.previous));
    }
}

/// Operations allowed for an evaluation on this thread.
fn operation_limit(max_operations: u64) -> u64 {
    max_operations.saturating_mul(BUDGET_UNITS.with(Cell::get))
}

// =============================================================================
// RhaiEngine Implementation
// =============================================================================

/// Rhai-based implementation of [`ScriptEngine`]
///
/// The underlying Rhai `Engine` is shared (read-only) by every module this
/// backend imports; Rhai's `sync` feature makes it `Send + Sync`.
pub struct RhaiEngine {
    engine: Arc<Engine>,
    scripts_path: PathBuf,
}

impl RhaiEngine {
    /// Create a new RhaiEngine with default safety settings
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let engine = RhaiEngine::new("/usr/local/data/scripts");
    /// ```
    pub fn new(scripts_path: impl Into<PathBuf>) -> Self {
        Self::with_limit(scripts_path, DEFAULT_MAX_OPERATIONS)
    }

    /// Create a new RhaiEngine with custom operation limit
    ///
    /// # Arguments
    ///
    /// * `scripts_path` - Directory holding `.rhai` script units
    /// * `max_operations` - Operation budget per list element of a call
    pub fn with_limit(scripts_path: impl Into<PathBuf>, max_operations: u64) -> Self {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(16);
        engine.set_max_string_size(1_000_000);
        engine.set_max_array_size(100_000);
        engine.set_max_map_size(10_000);

        // Configure safety limits to prevent infinite loops
        engine.on_progress(move |count| {
            let limit = operation_limit(max_operations);
            if count > limit {
                Some(format!("Safety limit exceeded: maximum {} operations", limit).into())
            } else {
                None
            }
        });

        engine.register_fn("parse_json", parse_json);

        Self {
            engine: Arc::new(engine),
            scripts_path: scripts_path.into(),
        }
    }

    /// Directory `.rhai` units are read from.
    pub fn scripts_path(&self) -> &Path {
        &self.scripts_path
    }

    fn script_file(&self, logical_name: &str) -> PathBuf {
        self.scripts_path
            .join(format!("{}.{}", logical_name, self.script_extension()))
    }
}

impl ScriptEngine for RhaiEngine {
    fn backend_name(&self) -> &str {
        "Rhai"
    }

    fn script_extension(&self) -> &str {
        "rhai"
    }

    fn import_module(&self, logical_name: &str) -> Result<Box<dyn ScriptModule>, ScriptError> {
        let path = self.script_file(logical_name);
        let source = std::fs::read_to_string(&path).map_err(|e| ScriptError::ImportError {
            module: logical_name.to_string(),
            exception: EngineException {
                kind: Some("ModuleNotFound".to_string()),
                message: Some(format!("{}: {}", path.display(), e)),
                traceback: None,
            },
        })?;

        let ast = self
            .engine
            .compile(&source)
            .map_err(|e| import_error(logical_name, convert_rhai_error(e.into())))?;

        // Top-level statements run once, like a module body on import
        let mut scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| import_error(logical_name, convert_rhai_error(e)))?;

        debug!(module = %logical_name, path = %path.display(), "Imported Rhai script");

        Ok(Box::new(RhaiModule {
            name: logical_name.to_string(),
            engine: self.engine.clone(),
            ast: Arc::new(ast),
            state: Arc::new(Mutex::new(Dynamic::from_map(Map::new()))),
        }))
    }
}

struct RhaiModule {
    name: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
    state: Arc<Mutex<Dynamic>>,
}

impl ScriptModule for RhaiModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn function(&self, name: &str) -> Result<Box<dyn ScriptFunction>, ScriptError> {
        let mut overloads = self.ast.iter_functions().filter(|f| f.name == name).peekable();
        if overloads.peek().is_none() {
            return Err(ScriptError::FunctionNotFound {
                name: name.to_string(),
            });
        }
        if !overloads.any(|f| f.params.len() == 1) {
            return Err(ScriptError::NotCallable {
                name: name.to_string(),
            });
        }

        Ok(Box::new(RhaiFunction {
            name: name.to_string(),
            engine: self.engine.clone(),
            ast: self.ast.clone(),
            state: self.state.clone(),
        }))
    }
}

struct RhaiFunction {
    name: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
    state: Arc<Mutex<Dynamic>>,
}

impl ScriptFunction for RhaiFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, arg: ScriptValue) -> Result<ScriptValue, ScriptError> {
        let units = match &arg {
            ScriptValue::List(items) => u64::try_from(items.len()).unwrap_or(u64::MAX),
            _ => 1,
        };
        let _budget = BudgetScope::enter(units);

        let mut this = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut scope = Scope::new();
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(&mut *this);

        let result: Dynamic = self
            .engine
            .call_fn_with_options(options, &mut scope, &self.ast, &self.name, (to_dynamic(arg),))
            .map_err(convert_rhai_error)?;

        Ok(from_dynamic(result))
    }
}

// =============================================================================
// Value Conversion
// =============================================================================

/// Convert a [`ScriptValue`] into a Rhai `Dynamic`.
pub fn to_dynamic(value: ScriptValue) -> Dynamic {
    match value {
        ScriptValue::Unit | ScriptValue::Opaque(_) => Dynamic::UNIT,
        ScriptValue::Bool(b) => Dynamic::from_bool(b),
        ScriptValue::Int(i) => Dynamic::from_int(i),
        ScriptValue::Float(x) => Dynamic::from_float(x),
        ScriptValue::Str(s) => Dynamic::from(s),
        ScriptValue::List(items) => {
            Dynamic::from_array(items.into_iter().map(to_dynamic).collect::<Array>())
        }
        ScriptValue::Map(map) => {
            let mut rhai_map = Map::new();
            for (key, value) in map {
                rhai_map.insert(key.into(), to_dynamic(value));
            }
            Dynamic::from_map(rhai_map)
        }
    }
}

/// Convert a Rhai `Dynamic` into a [`ScriptValue`].
///
/// Types with no counterpart (timestamps, function pointers, custom types,
/// characters) become [`ScriptValue::Opaque`].
pub fn from_dynamic(value: Dynamic) -> ScriptValue {
    let type_name = value.type_name().to_string();

    if value.is_unit() {
        return ScriptValue::Unit;
    }
    if let Ok(b) = value.as_bool() {
        return ScriptValue::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return ScriptValue::Int(i);
    }
    if let Ok(x) = value.as_float() {
        return ScriptValue::Float(x);
    }
    if value.is_string() {
        return value
            .into_string()
            .map(ScriptValue::Str)
            .unwrap_or(ScriptValue::Opaque(type_name));
    }
    if value.is_array() {
        return match value.into_array() {
            Ok(items) => ScriptValue::List(items.into_iter().map(from_dynamic).collect()),
            Err(_) => ScriptValue::Opaque(type_name),
        };
    }
    if value.is_map() {
        return match value.try_cast::<Map>() {
            Some(map) => {
                let mut converted = ScriptMap::with_capacity(map.len());
                for (key, item) in map {
                    converted.insert(key.to_string(), from_dynamic(item));
                }
                ScriptValue::Map(converted)
            }
            None => ScriptValue::Opaque(type_name),
        };
    }

    ScriptValue::Opaque(type_name)
}

/// `parse_json(text)` as exposed to scripts.
fn parse_json(text: &str) -> Result<Dynamic, Box<EvalAltResult>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))?;
    rhai::serde::to_dynamic(value)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn import_error(module: &str, error: ScriptError) -> ScriptError {
    let exception = match error {
        ScriptError::RuntimeError(exception) => exception,
        other => EngineException {
            kind: Some("ImportError".to_string()),
            message: Some(other.to_string()),
            traceback: None,
        },
    };
    ScriptError::ImportError {
        module: module.to_string(),
        exception,
    }
}

/// Convert Rhai's EvalAltResult to our ScriptError type
fn convert_rhai_error(error: Box<EvalAltResult>) -> ScriptError {
    let position = error.position();
    let traceback = (!position.is_none()).then(|| position.to_string());

    match *error {
        EvalAltResult::ErrorParsing(parse_error, pos) => ScriptError::CompilationError {
            message: format!("{}", parse_error),
            line: pos.line(),
            column: pos.position(),
        },
        EvalAltResult::ErrorRuntime(value, _) => ScriptError::RuntimeError(EngineException {
            kind: Some("ErrorRuntime".to_string()),
            message: Some(value.to_string()),
            traceback,
        }),
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => convert_rhai_error(inner),
        EvalAltResult::ErrorTerminated(token, _) => ScriptError::RuntimeError(EngineException {
            kind: Some("ErrorTerminated".to_string()),
            message: Some(token.to_string()),
            traceback,
        }),
        EvalAltResult::ErrorFunctionNotFound(signature, _) => {
            ScriptError::RuntimeError(EngineException {
                kind: Some("ErrorFunctionNotFound".to_string()),
                message: Some(format!("Function not found: {}", signature)),
                traceback,
            })
        }
        other => ScriptError::RuntimeError(EngineException {
            kind: None,
            message: Some(format!("{}", other)),
            traceback,
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
