//! Common test utilities for script_filter integration tests
//!
//! This module provides reusable test helpers for:
//! - Building readings and configuration categories
//! - Script directories on disk for the Rhai backend
//! - Mock script units for the in-memory backend

#![allow(dead_code)] // Utilities may not all be used by every test binary

use script_filter::config::ConfigCategory;
use script_filter::filter::DEFAULT_FILTER_CONFIG_METHOD;
use script_filter::scripting::mock::{raise, MockModuleDef};
use script_filter::scripting::{ScriptMap, ScriptValue};
use script_filter::{Datapoint, DatapointValue, Reading};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Logical name of the mock transform unit.
pub const MOCK_MODULE: &str = "MyCat_script_transform";

/// Build a reading from `(name, value)` pairs.
pub fn reading(asset: &str, values: &[(&str, DatapointValue)]) -> Reading {
    let datapoints = values
        .iter()
        .map(|(name, value)| Datapoint::new(*name, value.clone()))
        .collect();
    Reading::from_datapoints(asset, datapoints).unwrap()
}

/// A batch with integer, float and string datapoints across two assets.
pub fn sample_batch() -> Vec<Reading> {
    let mut first = reading(
        "lab1",
        &[
            ("power", DatapointValue::Integer(10)),
            ("ratio", DatapointValue::Float(0.5)),
            ("state", DatapointValue::String("on".to_string())),
        ],
    );
    first.set_id(1);
    first.set_timestamp(1_700_000_000_000_000);
    first.set_user_timestamp(1_700_000_000_000_001);

    let mut second = reading("lab2", &[("power", DatapointValue::Integer(20))]);
    second.set_id(2);

    vec![first, second]
}

/// Category JSON text with optional `script` file and `config` value.
pub fn category_json(script_file: Option<&str>, config: Option<&str>) -> String {
    let mut items = json!({
        "plugin": { "type": "string", "default": "script" },
        "enable": { "type": "boolean", "default": "false", "value": "true" }
    });
    if let Some(file) = script_file {
        items["script"] = json!({ "type": "script", "default": "", "file": file });
    }
    if let Some(config) = config {
        items["config"] = json!({ "type": "JSON", "default": "{}", "value": config });
    }
    items.to_string()
}

pub fn category(script_file: Option<&str>, config: Option<&str>) -> ConfigCategory {
    ConfigCategory::new("MyCat", &category_json(script_file, config)).unwrap()
}

/// Temporary data directory with the given files under `scripts/`.
pub fn data_dir(scripts: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    let scripts_dir = dir.path().join("scripts");
    fs::create_dir_all(&scripts_dir).unwrap();
    for (file, source) in scripts {
        fs::write(scripts_dir.join(file), source).unwrap();
    }
    dir
}

/// One of the sample scripts shipped in `scripts/`.
pub fn sample_script(file: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts").join(file);
    fs::read_to_string(path).unwrap()
}

/// Mock unit adding `config.offset` to every integer datapoint.
///
/// The transform raises if it runs before `set_filter_config`, so it can
/// only succeed on a fully configured binding.
pub fn offset_module() -> MockModuleDef {
    MockModuleDef::new()
        .function(DEFAULT_FILTER_CONFIG_METHOD, |globals, arg| {
            let blob = arg
                .as_map()
                .and_then(|m| m.get("config"))
                .and_then(ScriptValue::as_str)
                .unwrap_or_default()
                .to_string();
            globals.insert("config", blob.as_str());
            let offset = serde_json::from_str::<serde_json::Value>(&blob)
                .ok()
                .and_then(|v| v.get("offset").and_then(serde_json::Value::as_i64));
            match offset {
                Some(offset) => {
                    globals.insert("offset", offset);
                    Ok(ScriptValue::Bool(true))
                }
                None => Ok(ScriptValue::Bool(false)),
            }
        })
        .function("transform", |globals, readings| {
            let Some(offset) = globals.get("offset").and_then(ScriptValue::as_int) else {
                return Err(raise("NameError", "name 'offset' is not defined"));
            };
            let ScriptValue::List(items) = readings else {
                return Err(raise("TypeError", "readings must be a list"));
            };
            Ok(ScriptValue::List(
                items.into_iter().map(|item| shift(item, offset)).collect(),
            ))
        })
}

/// Mock unit that stamps the configuration blob it was given into every
/// reading as a `pushed_config` datapoint.
pub fn config_recorder_module() -> MockModuleDef {
    MockModuleDef::new()
        .function(DEFAULT_FILTER_CONFIG_METHOD, |globals, arg| {
            if let Some(blob) = arg.as_map().and_then(|m| m.get("config")).cloned() {
                globals.insert("config", blob);
            }
            Ok(ScriptValue::Bool(true))
        })
        .function("transform", |globals, readings| {
            let config = globals.get("config").cloned().unwrap_or(ScriptValue::Unit);
            let items = match readings {
                ScriptValue::List(items) => items,
                other => return Ok(other),
            };
            let items = items
                .into_iter()
                .map(|item| match item {
                    ScriptValue::Map(mut object) => {
                        if let Some(ScriptValue::Map(mut values)) = object.remove("reading") {
                            values.insert("pushed_config", config.clone());
                            object.insert("reading", values);
                        }
                        ScriptValue::Map(object)
                    }
                    other => other,
                })
                .collect();
            Ok(ScriptValue::List(items))
        })
}

fn shift(item: ScriptValue, offset: i64) -> ScriptValue {
    let object = match item {
        ScriptValue::Map(object) => object,
        other => return other,
    };
    let object: ScriptMap = object
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
    ScriptValue::Map(object)
}
