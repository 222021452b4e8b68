//! Native reading records handled by the filter stage.
//!
//! A [`Reading`] is one sensor measurement as produced by the pipeline: the
//! asset it belongs to, an ordered set of named scalar [`Datapoint`]s and the
//! host-assigned metadata (id, uuid, two timestamps).
//!
//! # JSON Form
//!
//! ```text
//! {
//!   "asset_code": "lab1",
//!   "readings": [ { "name": "power_set1", "value": 5980 } ],
//!   "id": 12,
//!   "uuid": "4a0f...",
//!   "ts": 1700000000000000,
//!   "user_ts": 1700000000000000
//! }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Datapoint Values
// =============================================================================

/// Scalar value carried by a datapoint.
///
/// Only flat scalars cross the scripting boundary; nested structures are
/// not representable here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatapointValue {
    /// Signed integer value
    Integer(i64),
    /// Double-precision floating point value
    Float(f64),
    /// Text value
    String(String),
}

impl DatapointValue {
    /// Short name of the value's tag, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            DatapointValue::Integer(_) => "integer",
            DatapointValue::Float(_) => "float",
            DatapointValue::String(_) => "string",
        }
    }
}

impl fmt::Display for DatapointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatapointValue::Integer(v) => write!(f, "{}", v),
            DatapointValue::Float(v) => write!(f, "{}", v),
            DatapointValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for DatapointValue {
    fn from(value: i64) -> Self {
        DatapointValue::Integer(value)
    }
}

impl From<f64> for DatapointValue {
    fn from(value: f64) -> Self {
        DatapointValue::Float(value)
    }
}

impl From<&str> for DatapointValue {
    fn from(value: &str) -> Self {
        DatapointValue::String(value.to_string())
    }
}

impl From<String> for DatapointValue {
    fn from(value: String) -> Self {
        DatapointValue::String(value)
    }
}

/// A single named scalar value within a reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Datapoint name (e.g., "temperature")
    pub name: String,
    /// Datapoint value
    pub value: DatapointValue,
}

impl Datapoint {
    /// Create a datapoint from a name and anything convertible to a value.
    pub fn new(name: impl Into<String>, value: impl Into<DatapointValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Reading
// =============================================================================

/// One sensor measurement record.
///
/// # Fields
///
/// * `asset_name` - Source of the measurement (physical or logical asset)
/// * `datapoints` - Ordered named values, at least one for transform output
/// * `id` - Host-assigned numeric id
/// * `uuid` - Globally unique identifier
/// * `timestamp` - Reading timestamp, microseconds since the Unix epoch
/// * `user_timestamp` - User-supplied timestamp, microseconds since the Unix epoch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "asset_code")]
    asset_name: String,
    #[serde(rename = "readings")]
    datapoints: Vec<Datapoint>,
    #[serde(default)]
    id: u64,
    #[serde(default = "new_uuid")]
    uuid: String,
    #[serde(rename = "ts", default = "now_micros")]
    timestamp: u64,
    #[serde(rename = "user_ts", default = "now_micros")]
    user_timestamp: u64,
}

impl Reading {
    /// Create a reading from its first datapoint.
    ///
    /// Metadata is filled with host defaults: id 0, a fresh v4 uuid and the
    /// current time for both timestamps.
    pub fn new(asset_name: impl Into<String>, datapoint: Datapoint) -> Self {
        let now = now_micros();
        Self {
            asset_name: asset_name.into(),
            datapoints: vec![datapoint],
            id: 0,
            uuid: new_uuid(),
            timestamp: now,
            user_timestamp: now,
        }
    }

    /// Create a reading from a list of datapoints.
    ///
    /// Returns `None` when the asset name or the datapoint list is empty.
    pub fn from_datapoints(asset_name: impl Into<String>, datapoints: Vec<Datapoint>) -> Option<Self> {
        let asset_name = asset_name.into();
        let mut datapoints = datapoints.into_iter();
        let first = datapoints.next()?;
        if asset_name.is_empty() {
            return None;
        }
        let mut reading = Self::new(asset_name, first);
        reading.datapoints.extend(datapoints);
        Some(reading)
    }

    /// Append a datapoint.
    pub fn add_datapoint(&mut self, datapoint: Datapoint) {
        self.datapoints.push(datapoint);
    }

    /// Asset the reading belongs to.
    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    /// Datapoints in insertion order.
    pub fn datapoints(&self) -> &[Datapoint] {
        &self.datapoints
    }

    /// Look up a datapoint value by name.
    pub fn datapoint(&self, name: &str) -> Option<&DatapointValue> {
        self.datapoints
            .iter()
            .find(|dp| dp.name == name)
            .map(|dp| &dp.value)
    }

    /// Host-assigned reading id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reading UUID.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Reading timestamp in µs since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// User timestamp in µs since the Unix epoch.
    pub fn user_timestamp(&self) -> u64 {
        self.user_timestamp
    }

    /// Set the reading id.
    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    /// Set the reading UUID.
    pub fn set_uuid(&mut self, uuid: impl Into<String>) {
        self.uuid = uuid.into();
    }

    /// Set the reading timestamp.
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Set the user timestamp.
    pub fn set_user_timestamp(&mut self, user_timestamp: u64) {
        self.user_timestamp = user_timestamp;
    }
}

fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

fn now_micros() -> u64 {
    u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default()
}
