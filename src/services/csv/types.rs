use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use smallvec::SmallVec;

use super::normalize::NormalizedValue;

pub const SAMPLE_SIZE: usize = 3;
pub const UNIQUE_CAP: usize = 1000;
pub const UNIQUE_SENTINEL: &str = "1000+";
pub const LARGE_FILE_ROWS: usize = 50_000;

/// Distinct-value count that collapses to `"1000+"` once the cap is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueCount {
    Exact(usize),
    Capped,
}

impl UniqueCount {
    pub fn from_count(count: usize) -> Self {
        if count < UNIQUE_CAP {
            UniqueCount::Exact(count)
        } else {
            UniqueCount::Capped
        }
    }
}

impl Serialize for UniqueCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            UniqueCount::Exact(n) => serializer.serialize_u64(*n as u64),
            UniqueCount::Capped => serializer.serialize_str(UNIQUE_SENTINEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub dtype: String,
    pub missing_count: usize,
    pub missing_percentage: f64,
    pub unique_values: UniqueCount,
    pub sample_values: SmallVec<[NormalizedValue; SAMPLE_SIZE]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` with fewer than two values.
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

/// Quality report for one file.
///
/// `duplicate_rows` is extrapolated from a bounded sample and is approximate;
/// every other count is exact over the full file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub total_rows: usize,
    pub total_columns: usize,
    pub total_cells: usize,
    pub missing_cells: usize,
    pub missing_percentage: f64,
    pub duplicate_rows: usize,
    pub memory_usage: f64,
    pub is_large_file: bool,
    #[serde(serialize_with = "ordered_map")]
    pub column_analysis: Vec<(String, ColumnProfile)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<BTreeMap<String, NumericSummary>>,
}

impl QualityReport {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.column_analysis
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, profile)| profile)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.column_analysis.iter().map(|(name, _)| name.as_str())
    }
}

fn ordered_map<S: Serializer>(
    columns: &[(String, ColumnProfile)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(columns.iter().map(|(name, profile)| (name, profile)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    Drop,
    FillMean,
    FillMedian,
    FillMode,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    pub handle_missing: MissingStrategy,
    pub trim_whitespace: bool,
    pub convert_types: bool,
    pub standardize_columns: bool,
    pub remove_duplicates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformSummary {
    pub output_path: String,
    pub rows_processed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_removed: Option<usize>,
    pub columns: Vec<String>,
}

/// Terminal value of one transform run. Errors are values here, not faults.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransformResult {
    Success(TransformSummary),
    Error { error: String },
}

impl TransformResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransformResult::Success(_))
    }

    pub fn summary(&self) -> Option<&TransformSummary> {
        match self {
            TransformResult::Success(summary) => Some(summary),
            TransformResult::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub rows_processed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unique_count_switches_to_sentinel_at_cap() {
        assert_eq!(UniqueCount::from_count(999), UniqueCount::Exact(999));
        assert_eq!(UniqueCount::from_count(1000), UniqueCount::Capped);
        assert_eq!(serde_json::to_value(UniqueCount::Capped).unwrap(), json!("1000+"));
        assert_eq!(serde_json::to_value(UniqueCount::Exact(7)).unwrap(), json!(7));
    }

    #[test]
    fn transform_config_defaults_missing_fields() {
        let config: TransformConfig =
            serde_json::from_value(json!({"handle_missing": "fill_median", "trim_whitespace": true}))
                .unwrap();
        assert_eq!(config.handle_missing, MissingStrategy::FillMedian);
        assert!(config.trim_whitespace);
        assert!(!config.remove_duplicates);

        let config: TransformConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.handle_missing, MissingStrategy::None);
    }

    #[test]
    fn transform_result_is_tagged_by_status() {
        let ok = TransformResult::Success(TransformSummary {
            output_path: "out.csv".into(),
            rows_processed: 4,
            rows_removed: None,
            columns: vec!["a".into()],
        });
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["rows_processed"], 4);
        assert!(value.get("rows_removed").is_none());

        let err = TransformResult::Error { error: "boom".into() };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"status": "error", "error": "boom"})
        );
    }

    fn profile(dtype: &str) -> ColumnProfile {
        ColumnProfile {
            dtype: dtype.to_string(),
            missing_count: 0,
            missing_percentage: 0.0,
            unique_values: UniqueCount::Exact(0),
            sample_values: SmallVec::new(),
        }
    }

    #[test]
    fn column_analysis_serializes_as_ordered_map() {
        let report = QualityReport {
            total_rows: 0,
            total_columns: 2,
            total_cells: 0,
            missing_cells: 0,
            missing_percentage: 0.0,
            duplicate_rows: 0,
            memory_usage: 0.0,
            is_large_file: false,
            column_analysis: vec![
                ("zeta".into(), profile("int64")),
                ("alpha".into(), profile("object")),
            ],
            statistics: None,
        };
        let text = serde_json::to_string(&report).unwrap();
        assert!(text.find("\"zeta\"").unwrap() < text.find("\"alpha\"").unwrap());
        assert!(!text.contains("statistics"));
        assert_eq!(report.column("alpha").unwrap().dtype, "object");
    }
}
