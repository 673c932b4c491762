//! Canonical JSON-safe cell values.
//!
//! Dataframe cells come in a zoo of physical types (Int32, UInt64, Float32,
//! owned and borrowed strings ...). Everything that leaves the engine, either
//! as JSON or as a CSV field, goes through [`normalize`] first so callers only
//! ever see null, integer, float, bool or string.

use std::borrow::Cow;
use std::fmt;

use polars::prelude::AnyValue;
use serde::Serialize;

/// Text that reads as a missing value.
pub const NA_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "#N/A", "#NA",
    "<NA>", "#N/A N/A", "-1.#IND", "1.#IND", "-1.#QNAN", "1.#QNAN",
];

pub fn is_missing(cell: &str) -> bool {
    NA_MARKERS.contains(&cell)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl NormalizedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, NormalizedValue::Null)
    }

    /// Field text for CSV output; missing values become empty fields.
    pub fn to_csv_field(&self) -> Cow<'_, str> {
        match self {
            NormalizedValue::Null => Cow::Borrowed(""),
            NormalizedValue::Text(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        }
    }
}

impl fmt::Display for NormalizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedValue::Null => Ok(()),
            NormalizedValue::Int(v) => write!(f, "{}", v),
            NormalizedValue::Float(v) => write!(f, "{}", v),
            NormalizedValue::Bool(v) => write!(f, "{}", v),
            NormalizedValue::Text(v) => f.write_str(v),
        }
    }
}

fn float(v: f64) -> NormalizedValue {
    if v.is_finite() {
        NormalizedValue::Float(v)
    } else {
        NormalizedValue::Null
    }
}

/// Collapses a dataframe cell into a [`NormalizedValue`]. Never fails.
pub fn normalize(value: &AnyValue<'_>) -> NormalizedValue {
    match value {
        AnyValue::Null => NormalizedValue::Null,
        AnyValue::Boolean(v) => NormalizedValue::Bool(*v),
        AnyValue::Int32(v) => NormalizedValue::Int(*v as i64),
        AnyValue::Int64(v) => NormalizedValue::Int(*v),
        AnyValue::UInt32(v) => NormalizedValue::Int(*v as i64),
        AnyValue::UInt64(v) => match i64::try_from(*v) {
            Ok(v) => NormalizedValue::Int(v),
            Err(_) => float(*v as f64),
        },
        AnyValue::Float32(v) => float(*v as f64),
        AnyValue::Float64(v) => float(*v),
        AnyValue::String(v) => NormalizedValue::Text(v.to_string()),
        AnyValue::StringOwned(v) => NormalizedValue::Text(v.to_string()),
        // Narrow integer widths and exotic types land here
        other => match other.extract::<i64>() {
            Some(v) if other.dtype().is_integer() => NormalizedValue::Int(v),
            _ => NormalizedValue::Text(other.to_string()),
        },
    }
}

/// Raw cell text: NA markers become null, everything else stays text.
pub fn normalize_text(cell: &str) -> NormalizedValue {
    if is_missing(cell) {
        NormalizedValue::Null
    } else {
        NormalizedValue::Text(cell.to_string())
    }
}
