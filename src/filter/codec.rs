//! Record codec: native readings to and from the engine object graph.
//!
//! Each reading crosses the boundary as a mapping:
//!
//! ```text
//! {
//!   "asset_code": "lab1",
//!   "reading": { "power_set1": 5980, "ratio": 0.5 },
//!   "id": 12,
//!   "uuid": "4a0f...",
//!   "ts": 1700000000000000,
//!   "user_ts": 1700000000000000
//! }
//! ```
//!
//! `asset_code` and `reading` are required on the way back; `id`, `uuid`, `ts`
//! and `user_ts` override the host defaults only when present and correctly
//! typed. A batch either decodes completely or not at all.

use crate::error::{AppResult, FilterError};
use crate::reading::{Datapoint, DatapointValue, Reading};
use crate::scripting::{ScriptMap, ScriptValue};
use tracing::debug;

/// Key holding the asset name.
pub const ASSET_CODE: &str = "asset_code";
/// Key holding the datapoint mapping.
pub const READING: &str = "reading";
/// Key holding the reading id.
pub const ID: &str = "id";
/// Key holding the reading UUID.
pub const UUID: &str = "uuid";
/// Key holding the reading timestamp (µs).
pub const TS: &str = "ts";
/// Key holding the user timestamp (µs).
pub const USER_TS: &str = "user_ts";

/// Build the engine-side list for a batch, preserving order.
pub fn encode(readings: &[Reading]) -> ScriptValue {
    ScriptValue::List(readings.iter().map(encode_reading).collect())
}

fn encode_reading(reading: &Reading) -> ScriptValue {
    let datapoints: ScriptMap = reading
        .datapoints()
        .iter()
        .map(|dp| (dp.name.as_str(), encode_value(&dp.value)))
        .collect();

    let mut object = ScriptMap::with_capacity(6);
    object.insert(ASSET_CODE, reading.asset_name());
    object.insert(READING, datapoints);
    object.insert(ID, saturating_int(ID, reading.id()));
    object.insert(UUID, reading.uuid());
    object.insert(TS, saturating_int(TS, reading.timestamp()));
    object.insert(USER_TS, saturating_int(USER_TS, reading.user_timestamp()));
    ScriptValue::Map(object)
}

fn encode_value(value: &DatapointValue) -> ScriptValue {
    match value {
        DatapointValue::Integer(v) => ScriptValue::Int(*v),
        DatapointValue::Float(v) => ScriptValue::Float(*v),
        DatapointValue::String(v) => ScriptValue::Str(v.clone()),
    }
}

/// Engine integers are signed; values past `i64::MAX` do not survive a round trip.
fn saturating_int(key: &str, value: u64) -> ScriptValue {
    match i64::try_from(value) {
        Ok(v) => ScriptValue::Int(v),
        Err(_) => {
            debug!(key, value, "Metadata value saturated to i64::MAX on encode");
            ScriptValue::Int(i64::MAX)
        }
    }
}

/// Rebuild native readings from a transform result.
///
/// # Errors
///
/// [`FilterError::MalformedResult`] when the result is not a list of
/// reading-shaped mappings, [`FilterError::UnsupportedDatapointType`] when a
/// datapoint holds anything but an integer, float or string. Either way no
/// reading of the batch is returned.
pub fn decode(result: ScriptValue) -> AppResult<Vec<Reading>> {
    let elements = match result {
        ScriptValue::List(elements) => elements,
        other => {
            return Err(FilterError::MalformedResult {
                index: 0,
                reason: format!("expected a list of readings, found {}", other.type_name()),
            })
        }
    };

    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| decode_reading(index, element))
        .collect()
}

fn decode_reading(index: usize, element: ScriptValue) -> AppResult<Reading> {
    let malformed = |reason: String| FilterError::MalformedResult { index, reason };

    let mut object = match element {
        ScriptValue::Map(object) => object,
        other => {
            return Err(malformed(format!(
                "expected a mapping, found {}",
                other.type_name()
            )))
        }
    };

    let asset_code = match object.remove(ASSET_CODE) {
        Some(ScriptValue::Str(asset_code)) => asset_code,
        Some(other) => {
            return Err(malformed(format!(
                "'{}' must be a string, found {}",
                ASSET_CODE,
                other.type_name()
            )))
        }
        None => return Err(malformed(format!("missing '{}'", ASSET_CODE))),
    };

    let datapoints = match object.remove(READING) {
        Some(ScriptValue::Map(values)) => values,
        Some(other) => {
            return Err(malformed(format!(
                "'{}' must be a mapping, found {}",
                READING,
                other.type_name()
            )))
        }
        None => return Err(malformed(format!("missing '{}'", READING))),
    };

    let datapoints = datapoints
        .into_iter()
        .map(|(name, value)| {
            let value = decode_value(value).map_err(|found| FilterError::UnsupportedDatapointType {
                index,
                datapoint: name.clone(),
                found,
            })?;
            Ok(Datapoint { name, value })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let mut reading = Reading::from_datapoints(asset_code, datapoints)
        .ok_or_else(|| malformed(format!("empty '{}' or '{}'", ASSET_CODE, READING)))?;

    merge_metadata(&mut reading, &object);
    Ok(reading)
}

/// Resolve a datapoint scalar: integer, then float, then string.
fn decode_value(value: ScriptValue) -> Result<DatapointValue, String> {
    match value {
        ScriptValue::Int(v) => Ok(DatapointValue::Integer(v)),
        ScriptValue::Bool(v) => Ok(DatapointValue::Integer(i64::from(v))),
        ScriptValue::Float(v) => Ok(DatapointValue::Float(v)),
        ScriptValue::Str(v) => Ok(DatapointValue::String(v)),
        other => Err(other.type_name().to_string()),
    }
}

/// Lenient merge of the optional metadata keys.
fn merge_metadata(reading: &mut Reading, object: &ScriptMap) {
    if let Some(id) = unsigned(object, ID) {
        reading.set_id(id);
    }
    if let Some(uuid) = object.get(UUID).and_then(ScriptValue::as_str) {
        reading.set_uuid(uuid);
    }
    if let Some(ts) = unsigned(object, TS) {
        reading.set_timestamp(ts);
    }
    if let Some(user_ts) = unsigned(object, USER_TS) {
        reading.set_user_timestamp(user_ts);
    }
}

fn unsigned(object: &ScriptMap, key: &str) -> Option<u64> {
    object
        .get(key)
        .and_then(ScriptValue::as_int)
        .and_then(|v| u64::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn sample() -> Vec<Reading> {
        let mut first = Reading::from_datapoints(
            "lab1",
            vec![
                Datapoint::new("count", 42_i64),
                Datapoint::new("ratio", 0.25),
                Datapoint::new("state", "on"),
            ],
        )
        .unwrap();
        first.set_id(7);
        first.set_uuid("1f0e2d3c-0000-4000-8000-000000000001");
        first.set_timestamp(1_700_000_000_000_000);
        first.set_user_timestamp(1_700_000_000_000_123);

        let mut second = Reading::new("lab2", Datapoint::new("power", -5_i64));
        second.set_id(8);
        vec![first, second]
    }

    fn element(pairs: Vec<(&str, ScriptValue)>) -> ScriptValue {
        ScriptValue::Map(pairs.into_iter().collect())
    }

    fn datapoints(pairs: Vec<(&str, ScriptValue)>) -> ScriptValue {
        ScriptValue::Map(pairs.into_iter().collect())
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let readings = sample();
        let decoded = decode(encode(&readings)).unwrap();
        assert_eq!(decoded, readings);
    }

    #[test]
    fn test_encode_shape() {
        let encoded = encode(&sample());
        let ScriptValue::List(items) = encoded else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 2);
        let first = items[0].as_map().unwrap();
        let keys: Vec<&str> = first.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![ASSET_CODE, READING, ID, UUID, TS, USER_TS]);
        let values = first.get(READING).and_then(ScriptValue::as_map).unwrap();
        assert_eq!(values.get("count"), Some(&ScriptValue::Int(42)));
        assert_eq!(values.get("ratio"), Some(&ScriptValue::Float(0.25)));
        assert_eq!(values.get("state"), Some(&ScriptValue::Str("on".to_string())));
    }

    #[test]
    #[traced_test]
    fn test_encode_saturates_large_unsigned() {
        let mut reading = Reading::new("a", Datapoint::new("x", 1_i64));
        reading.set_id(u64::MAX);
        let ScriptValue::List(items) = encode(&[reading]) else {
            panic!("expected list");
        };
        assert_eq!(items[0].as_map().unwrap().get(ID), Some(&ScriptValue::Int(i64::MAX)));
        assert!(logs_contain("saturated"));
    }

    #[test]
    fn test_order_follows_engine_list() {
        let result = ScriptValue::List(vec![
            element(vec![
                (ASSET_CODE, "b".into()),
                (READING, datapoints(vec![("x", 1_i64.into())])),
            ]),
            element(vec![
                (ASSET_CODE, "a".into()),
                (READING, datapoints(vec![("x", 2_i64.into())])),
            ]),
        ]);
        let decoded = decode(result).unwrap();
        let assets: Vec<&str> = decoded.iter().map(Reading::asset_name).collect();
        assert_eq!(assets, vec!["b", "a"]);
    }

    #[test]
    fn test_empty_list_decodes_to_no_readings() {
        assert!(decode(ScriptValue::List(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_elements_drop_the_batch() {
        let good = element(vec![
            (ASSET_CODE, "ok".into()),
            (READING, datapoints(vec![("x", 1_i64.into())])),
        ]);
        let cases = vec![
            element(vec![(READING, datapoints(vec![("x", 1_i64.into())]))]),
            element(vec![(ASSET_CODE, "a".into())]),
            element(vec![(ASSET_CODE, "a".into()), (READING, 5_i64.into())]),
            element(vec![(ASSET_CODE, 5_i64.into()), (READING, datapoints(vec![("x", 1_i64.into())]))]),
            element(vec![(ASSET_CODE, "a".into()), (READING, datapoints(vec![]))]),
            ScriptValue::Str("not a reading".into()),
        ];

        for bad in cases {
            let result = decode(ScriptValue::List(vec![good.clone(), bad.clone()]));
            assert!(
                matches!(result, Err(FilterError::MalformedResult { index: 1, .. })),
                "expected malformed result for {}",
                bad
            );
        }
    }

    #[test]
    fn test_non_list_result_is_malformed() {
        assert!(matches!(
            decode(ScriptValue::Unit),
            Err(FilterError::MalformedResult { index: 0, .. })
        ));
    }

    #[test]
    fn test_unsupported_datapoint_type() {
        for value in [
            ScriptValue::Unit,
            ScriptValue::List(vec![]),
            ScriptValue::Map(ScriptMap::new()),
            ScriptValue::Opaque("datetime".into()),
        ] {
            let result = decode(ScriptValue::List(vec![element(vec![
                (ASSET_CODE, "a".into()),
                (READING, datapoints(vec![("ok", 1_i64.into()), ("bad", value)])),
            ])]));
            match result {
                Err(FilterError::UnsupportedDatapointType { index, datapoint, .. }) => {
                    assert_eq!(index, 0);
                    assert_eq!(datapoint, "bad");
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[test]
    fn test_bool_decodes_as_integer() {
        let decoded = decode(ScriptValue::List(vec![element(vec![
            (ASSET_CODE, "a".into()),
            (READING, datapoints(vec![("on", true.into()), ("off", false.into())])),
        ])]))
        .unwrap();
        assert_eq!(decoded[0].datapoint("on"), Some(&DatapointValue::Integer(1)));
        assert_eq!(decoded[0].datapoint("off"), Some(&DatapointValue::Integer(0)));
    }

    #[test]
    fn test_lenient_metadata_merge() {
        let decoded = decode(ScriptValue::List(vec![
            element(vec![
                (ASSET_CODE, "defaults".into()),
                (READING, datapoints(vec![("x", 1_i64.into())])),
            ]),
            element(vec![
                (ASSET_CODE, "mistyped".into()),
                (READING, datapoints(vec![("x", 1_i64.into())])),
                (ID, "12".into()),
                (UUID, 5_i64.into()),
                (TS, 1.5.into()),
                (USER_TS, (-4_i64).into()),
            ]),
            element(vec![
                (ASSET_CODE, "typed".into()),
                (READING, datapoints(vec![("x", 1_i64.into())])),
                (ID, 12_i64.into()),
                (UUID, "u-1".into()),
                (TS, 100_i64.into()),
                (USER_TS, 200_i64.into()),
            ]),
        ]))
        .unwrap();

        for reading in &decoded[..2] {
            assert_eq!(reading.id(), 0);
            assert!(uuid::Uuid::parse_str(reading.uuid()).is_ok());
            assert!(reading.timestamp() > 0);
            assert!(reading.user_timestamp() > 0);
        }

        let typed = &decoded[2];
        assert_eq!(typed.id(), 12);
        assert_eq!(typed.uuid(), "u-1");
        assert_eq!(typed.timestamp(), 100);
        assert_eq!(typed.user_timestamp(), 200);
    }
}
