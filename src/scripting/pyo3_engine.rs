//! Python Implementation of the ScriptEngine Traits (PyO3)
//!
//! Script units are ordinary Python modules imported by name. The scripts
//! directory is prepended to `sys.path` once per process (see
//! [`runtime::register_search_path`](super::runtime::register_search_path)).
//!
//! Module globals give Python scripts their own persistent state, so a
//! configuration stored by `set_filter_config` is visible to the transform
//! function without any help from this side.
//!
//! # Error Handling
//!
//! Raised exceptions arrive as `PyErr`; fetching one clears the interpreter's
//! error indicator. The exception type, value and formatted traceback are
//! copied into an [`EngineException`] before the `PyErr` is dropped.

use super::runtime::{self, RuntimeHandle};
use super::script_engine::{
    EngineException, ScriptEngine, ScriptError, ScriptFunction, ScriptModule,
};
use super::value::{ScriptMap, ScriptValue};
use pyo3::prelude::*;
use pyo3::types::{
    PyBool, PyDict, PyFloat, PyInt, PyList, PyModule, PyString, PyTracebackMethods, PyTuple,
};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Python-based implementation of [`ScriptEngine`]
pub struct PyO3Engine {
    scripts_path: PathBuf,
    _runtime: RuntimeHandle,
}

impl PyO3Engine {
    /// Attach to the embedded interpreter and make `scripts_path` importable.
    pub fn new(scripts_path: impl Into<PathBuf>) -> Result<Self, ScriptError> {
        let scripts_path = scripts_path.into();
        let runtime = runtime::attach_with("Python", pyo3::prepare_freethreaded_python);

        if runtime::register_search_path(&scripts_path) {
            Python::with_gil(|py| {
                prepend_sys_path(py, &scripts_path).map_err(|e| convert_py_err(py, e))
            })?;
            debug!(path = %scripts_path.display(), "Added scripts directory to sys.path");
        }

        Ok(Self {
            scripts_path,
            _runtime: runtime,
        })
    }

    /// Directory prepended to `sys.path`.
    pub fn scripts_path(&self) -> &Path {
        &self.scripts_path
    }
}

fn prepend_sys_path(py: Python<'_>, path: &Path) -> PyResult<()> {
    let sys = py.import("sys")?;
    let sys_path = sys.getattr("path")?;
    sys_path.call_method1("insert", (0, path.to_string_lossy().into_owned()))?;
    Ok(())
}

impl ScriptEngine for PyO3Engine {
    fn backend_name(&self) -> &str {
        "Python"
    }

    fn script_extension(&self) -> &str {
        "py"
    }

    fn import_module(&self, logical_name: &str) -> Result<Box<dyn ScriptModule>, ScriptError> {
        Python::with_gil(|py| {
            let module = py.import(logical_name).map_err(|e| {
                let exception = match convert_py_err(py, e) {
                    ScriptError::RuntimeError(exception) => exception,
                    other => EngineException::from_message(other.to_string()),
                };
                ScriptError::ImportError {
                    module: logical_name.to_string(),
                    exception,
                }
            })?;

            Ok(Box::new(PyO3Module {
                name: logical_name.to_string(),
                module: module.unbind(),
            }) as Box<dyn ScriptModule>)
        })
    }
}

struct PyO3Module {
    name: String,
    module: Py<PyModule>,
}

impl ScriptModule for PyO3Module {
    fn name(&self) -> &str {
        &self.name
    }

    fn function(&self, name: &str) -> Result<Box<dyn ScriptFunction>, ScriptError> {
        Python::with_gil(|py| {
            // The AttributeError is consumed here, leaving no pending exception
            let attribute = self.module.bind(py).getattr(name).map_err(|_| {
                ScriptError::FunctionNotFound {
                    name: name.to_string(),
                }
            })?;
            if !attribute.is_callable() {
                return Err(ScriptError::NotCallable {
                    name: name.to_string(),
                });
            }
            Ok(Box::new(PyO3Function {
                name: name.to_string(),
                function: attribute.unbind(),
            }) as Box<dyn ScriptFunction>)
        })
    }
}

struct PyO3Function {
    name: String,
    function: Py<PyAny>,
}

impl ScriptFunction for PyO3Function {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, arg: ScriptValue) -> Result<ScriptValue, ScriptError> {
        Python::with_gil(|py| {
            let arg = to_python(py, &arg).map_err(|e| convert_py_err(py, e))?;
            let result = self
                .function
                .bind(py)
                .call1((arg,))
                .map_err(|e| convert_py_err(py, e))?;
            Ok(from_python(&result))
        })
    }
}

// =============================================================================
// Value Conversion
// =============================================================================

fn to_python<'py>(py: Python<'py>, value: &ScriptValue) -> PyResult<Bound<'py, PyAny>> {
    let object = match value {
        ScriptValue::Unit | ScriptValue::Opaque(_) => py.None().into_bound(py),
        ScriptValue::Bool(b) => PyBool::new(py, *b).to_owned().into_any(),
        ScriptValue::Int(i) => i.into_pyobject(py)?.into_any(),
        ScriptValue::Float(x) => PyFloat::new(py, *x).into_any(),
        ScriptValue::Str(s) => PyString::new(py, s).into_any(),
        ScriptValue::List(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(to_python(py, item)?)?;
            }
            list.into_any()
        }
        ScriptValue::Map(map) => {
            let dict = PyDict::new(py);
            for (key, item) in map.iter() {
                dict.set_item(key, to_python(py, item)?)?;
            }
            dict.into_any()
        }
    };
    Ok(object)
}

fn from_python(value: &Bound<'_, PyAny>) -> ScriptValue {
    if value.is_none() {
        return ScriptValue::Unit;
    }
    // bool is a subclass of int, so it must be checked first
    if let Ok(b) = value.downcast::<PyBool>() {
        return ScriptValue::Bool(b.is_true());
    }
    if let Ok(i) = value.downcast::<PyInt>() {
        return match i.extract::<i64>() {
            Ok(i) => ScriptValue::Int(i),
            Err(_) => ScriptValue::Opaque("int (out of range)".to_string()),
        };
    }
    if let Ok(x) = value.downcast::<PyFloat>() {
        return ScriptValue::Float(x.value());
    }
    if let Ok(s) = value.downcast::<PyString>() {
        return ScriptValue::Str(s.to_string_lossy().into_owned());
    }
    if let Ok(list) = value.downcast::<PyList>() {
        return ScriptValue::List(list.iter().map(|item| from_python(&item)).collect());
    }
    if let Ok(tuple) = value.downcast::<PyTuple>() {
        return ScriptValue::List(tuple.iter().map(|item| from_python(&item)).collect());
    }
    if let Ok(dict) = value.downcast::<PyDict>() {
        let mut map = ScriptMap::with_capacity(dict.len());
        for (key, item) in dict.iter() {
            let key = key
                .str()
                .map(|k| k.to_string_lossy().into_owned())
                .unwrap_or_default();
            map.insert(key, from_python(&item));
        }
        return ScriptValue::Map(map);
    }

    let type_name = value
        .get_type()
        .name()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "object".to_string());
    ScriptValue::Opaque(type_name)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Copy a fetched Python exception into a [`ScriptError`].
fn convert_py_err(py: Python<'_>, error: PyErr) -> ScriptError {
    let kind = error.get_type(py).name().ok().map(|name| name.to_string());
    let message = error
        .value(py)
        .str()
        .ok()
        .map(|text| text.to_string_lossy().into_owned());
    let traceback = error.traceback(py).and_then(|tb| tb.format().ok());

    ScriptError::RuntimeError(EngineException {
        kind,
        message,
        traceback,
    })
}
