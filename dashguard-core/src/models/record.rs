//! Canonical analytics records and upstream response normalization.
//!
//! The analytics endpoint answers `{"data": …}` where `…` has been observed
//! in three shapes. [`ResponseShape`] names them; [`normalize_payload`] folds
//! any of them into a flat list of [`SourceRecord`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Field names that carry the source/ad-set name, in lookup order.
const NAME_FIELDS: &[&str] = &["source", "sourceName", "source_name", "name"];

// ============================================================================
// Source Record
// ============================================================================

/// One normalized analytics row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Ad-set name (renamed from the upstream source field).
    pub adset_name: String,
    /// Revenue, coerced to a number.
    pub revenue: f64,
    /// Earnings per lead.
    #[serde(default)]
    pub epl: f64,
    /// Earnings per click.
    #[serde(default)]
    pub epc: f64,
}

impl SourceRecord {
    /// Creates a record with zeroed optional metrics.
    pub fn new(adset_name: impl Into<String>, revenue: f64) -> Self {
        Self {
            adset_name: adset_name.into(),
            revenue,
            epl: 0.0,
            epc: 0.0,
        }
    }

    /// Builds a record from one upstream row.
    ///
    /// Returns `None` when the row carries no usable name.
    pub fn from_row(row: &Map<String, Value>) -> Option<Self> {
        let adset_name = NAME_FIELDS
            .iter()
            .filter_map(|field| row.get(*field))
            .find_map(|value| match value {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })?;

        Some(Self {
            adset_name,
            revenue: coerce_number(row.get("revenue")),
            epl: coerce_number(row.get("epl")),
            epc: coerce_number(row.get("epc")),
        })
    }

    /// Name with collapsed whitespace, trimmed and lower-cased.
    ///
    /// Used as the join key against ad-set names downstream.
    pub fn normalized_name(&self) -> String {
        self.adset_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Coerces a JSON value to `f64`; anything non-numeric becomes `0.0`.
fn coerce_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if number.is_finite() { number } else { 0.0 }
}

// ============================================================================
// Response Shape
// ============================================================================

/// The shapes the upstream `data` field can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// `data` is a list of records.
    Records(Vec<Value>),
    /// `data` is an object whose values are all records.
    Keyed(Map<String, Value>),
    /// `data` is an object with a nested `statistics` list.
    Statistics(Vec<Value>),
    /// `data` is a single record object.
    Single(Map<String, Value>),
    /// `data` is null.
    Empty,
}

impl ResponseShape {
    /// Classifies the value of a response's `data` field.
    pub fn classify(data: &Value) -> Result<Self, CoreError> {
        match data {
            Value::Null => Ok(Self::Empty),
            Value::Array(items) => Ok(Self::Records(items.clone())),
            Value::Object(map) => {
                if let Some(Value::Array(stats)) = map.get("statistics") {
                    return Ok(Self::Statistics(stats.clone()));
                }
                if !map.is_empty() && map.values().all(Value::is_object) {
                    Ok(Self::Keyed(map.clone()))
                } else {
                    Ok(Self::Single(map.clone()))
                }
            }
            other => Err(CoreError::InvalidData(format!(
                "unexpected data type: {}",
                json_type_name(other)
            ))),
        }
    }

    /// Flattens the shape into the raw rows it contains.
    pub fn into_rows(self) -> Vec<Value> {
        match self {
            Self::Records(items) | Self::Statistics(items) => items,
            Self::Keyed(map) => map.into_iter().map(|(_, v)| v).collect(),
            Self::Single(map) => vec![Value::Object(map)],
            Self::Empty => Vec::new(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalizes a full upstream response (`{"data": …}`) into source records.
///
/// Rows without a name are dropped.
///
/// # Errors
///
/// Returns [`CoreError::MissingData`] when the payload has no `data` field and
/// [`CoreError::InvalidData`] when `data` is neither a list, an object nor null.
pub fn normalize_payload(payload: &Value) -> Result<Vec<SourceRecord>, CoreError> {
    let data = payload.get("data").ok_or(CoreError::MissingData)?;
    let shape = ResponseShape::classify(data)?;

    Ok(shape
        .into_rows()
        .iter()
        .filter_map(Value::as_object)
        .filter_map(SourceRecord::from_row)
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
