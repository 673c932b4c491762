use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d+$").expect("valid integer pattern"));
static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("valid float pattern")
});

/// Standardizes one header: trim, lowercase, spaces to underscores.
pub fn standardize_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Standardizes a header row. Names that collide after standardization get
/// `_1`, `_2` ... suffixes so the frame keeps unique column names.
pub fn standardize_columns(names: &[String]) -> Vec<String> {
    let mut existing_names = HashSet::new();
    names
        .iter()
        .map(|name| {
            let original_name = standardize_column_name(name);
            let mut cleaned = original_name.clone();
            let mut counter = 1;
            while !existing_names.insert(cleaned.clone()) {
                cleaned = format!("{}_{}", original_name, counter);
                counter += 1;
            }
            cleaned
        })
        .collect()
}

pub fn is_integer_text(s: &str) -> bool {
    INTEGER.is_match(s.trim())
}

pub fn is_float_text(s: &str) -> bool {
    FLOAT.is_match(s.trim())
}

pub fn is_bool_text(s: &str) -> bool {
    matches!(s.trim(), "true" | "false" | "True" | "False" | "TRUE" | "FALSE")
}

/// Parses a cell as a number, tolerating surrounding whitespace.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if is_float_text(trimmed) {
        trimmed.parse::<f64>().ok()
    } else {
        None
    }
}

/// Float view of a column when every non-missing value is numeric.
///
/// Numeric columns are cast directly. Text columns qualify only when each
/// non-missing cell parses and at least one such cell exists; a single bad
/// cell disqualifies the whole column.
pub fn numeric_view(series: &Series) -> PolarsResult<Option<Series>> {
    if series.dtype().is_numeric() {
        return series.cast(&DataType::Float64).map(Some);
    }
    if series.dtype() != &DataType::String {
        return Ok(None);
    }

    let mut parsed: Vec<Option<f64>> = Vec::with_capacity(series.len());
    let mut seen_value = false;
    for cell in series.str()?.into_iter() {
        match cell {
            None => parsed.push(None),
            Some(raw) => match parse_number(raw) {
                Some(value) => {
                    seen_value = true;
                    parsed.push(Some(value));
                }
                None => return Ok(None),
            },
        }
    }

    Ok(seen_value.then(|| Series::new(series.name(), parsed)))
}

pub fn is_date_string(s: &str) -> bool {
    let s = s.trim();
    const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

    DATE_FORMATS.iter().any(|format| NaiveDate::parse_from_str(s, format).is_ok())
        || DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(s, format).is_ok())
}

/// Best-effort dtype label from the non-missing values of a probe sample.
///
/// Every value must agree for a specific label; anything mixed is `object`.
pub fn detect_column_type<'a>(values: impl IntoIterator<Item = &'a str>) -> &'static str {
    let (mut total, mut ints, mut floats, mut bools, mut dates) = (0usize, 0usize, 0usize, 0usize, 0usize);

    for value in values {
        total += 1;
        if is_integer_text(value) {
            ints += 1;
            floats += 1;
        } else if is_float_text(value) {
            floats += 1;
        } else if is_bool_text(value) {
            bools += 1;
        } else if is_date_string(value) {
            dates += 1;
        }
    }

    match () {
        _ if total == 0 => "object",
        _ if ints == total => "int64",
        _ if floats == total => "float64",
        _ if bools == total => "bool",
        _ if dates == total => "datetime64",
        _ => "object",
    }
}
