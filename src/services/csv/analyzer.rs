use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use polars::prelude::*;
use smallvec::SmallVec;

use super::normalize::{normalize_text, NormalizedValue};
use super::reader::{ChunkedReader, RowBatch};
use super::types::*;
use super::utils::{detect_column_type, numeric_view};
use super::{DEFAULT_CHUNK_SIZE, PROBE_ROWS, STATISTICS_ROWS, UNIQUE_TRACKING_BATCHES};
use crate::error::EngineError;

/// Runs one column-level step, substituting `fallback` if it fails.
///
/// A single unreadable column must not cost the caller the report on every
/// other column, so failures stop here and are only logged.
fn or_degrade<T>(
    column: &str,
    field: &'static str,
    fallback: T,
    step: impl FnOnce() -> Result<T, EngineError>,
) -> T {
    match step() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(column, field, error = %e, "Column analysis step failed, using fallback");
            fallback
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

#[derive(Debug, Default)]
struct ColumnAccumulator {
    missing: usize,
    distinct: HashSet<String>,
    samples: SmallVec<[NormalizedValue; SAMPLE_SIZE]>,
}

impl ColumnAccumulator {
    fn observe<'a>(&mut self, cells: impl Iterator<Item = Option<&'a str>>, track_distinct: bool) {
        for cell in cells {
            match cell {
                None => self.missing += 1,
                Some(value) => {
                    if track_distinct && self.distinct.len() < UNIQUE_CAP && !self.distinct.contains(value) {
                        self.distinct.insert(value.to_string());
                    }
                    if self.samples.len() < SAMPLE_SIZE {
                        self.samples.push(normalize_text(value));
                    }
                }
            }
        }
    }

    fn into_profile(self, dtype: String, total_rows: usize) -> ColumnProfile {
        ColumnProfile {
            dtype,
            missing_count: self.missing,
            missing_percentage: percentage(self.missing, total_rows),
            unique_values: UniqueCount::from_count(self.distinct.len()),
            sample_values: self.samples,
        }
    }
}

/// Builds quality reports from bounded-memory passes over a CSV file.
#[derive(Debug, Clone)]
pub struct QualityAnalyzer {
    chunk_size: usize,
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl QualityAnalyzer {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }

    /// Produces the quality report for `path`.
    ///
    /// Row, cell and missing counts are exact. The duplicate count is
    /// extrapolated from the first `sample_size` rows.
    ///
    /// # Errors
    ///
    /// `EmptyInput` when the file has no header, `MalformedInput` when a
    /// record cannot be parsed, `Io` when the file cannot be read. A header
    /// with no data rows is not an error: every count is simply zero.
    pub fn analyze(&self, path: &Path, sample_size: usize) -> Result<QualityReport, EngineError> {
        let start = std::time::Instant::now();
        tracing::info!(path = %path.display(), chunk_size = self.chunk_size, "Starting CSV quality analysis");

        let dtypes = self.probe_dtypes(path)?;

        let mut batches = ChunkedReader::new(path).batch_size(self.chunk_size).batches()?;
        let columns = batches.columns().to_vec();
        let mut accumulators: Vec<ColumnAccumulator> = columns.iter().map(|_| ColumnAccumulator::default()).collect();
        let mut total_rows = 0usize;

        for (index, batch) in batches.by_ref().enumerate() {
            let batch = batch?;
            total_rows += batch.len();
            let track_distinct = index < UNIQUE_TRACKING_BATCHES;
            for (idx, accumulator) in accumulators.iter_mut().enumerate() {
                accumulator.observe(batch.column_cells(idx), track_distinct);
            }
            tracing::debug!(batch = index, rows = total_rows, "Scanned batch");
        }

        if total_rows == 0 {
            tracing::warn!(path = %path.display(), "CSV has a header but no data rows");
        }

        let duplicate_rows = match self.estimate_duplicates(path, sample_size, total_rows) {
            Ok(estimate) => estimate,
            Err(e) => {
                tracing::warn!(error = %e, "Duplicate estimation failed, reporting 0");
                0
            }
        };

        let column_analysis: Vec<(String, ColumnProfile)> = columns
            .iter()
            .zip(accumulators)
            .enumerate()
            .map(|(idx, (name, accumulator))| {
                let dtype = dtypes.get(idx).cloned().unwrap_or_else(|| "object".to_string());
                (name.clone(), accumulator.into_profile(dtype, total_rows))
            })
            .collect();

        let total_columns = columns.len();
        let total_cells = total_rows * total_columns;
        let missing_cells = column_analysis.iter().map(|(_, p)| p.missing_count).sum();
        let memory_usage = std::fs::metadata(path)
            .map(|m| round2(m.len() as f64 / 1024.0 / 1024.0))
            .unwrap_or(0.0);

        tracing::info!(
            rows = total_rows,
            columns = total_columns,
            missing_cells,
            duplicate_rows,
            "Analysis completed in {:?}",
            start.elapsed()
        );

        Ok(QualityReport {
            total_rows,
            total_columns,
            total_cells,
            missing_cells,
            missing_percentage: percentage(missing_cells, total_cells),
            duplicate_rows,
            memory_usage,
            is_large_file: total_rows > LARGE_FILE_ROWS,
            column_analysis,
            statistics: None,
        })
    }

    /// [`analyze`](Self::analyze) plus numeric summaries over a bounded prefix.
    pub fn analyze_with_statistics(&self, path: &Path, sample_size: usize) -> Result<QualityReport, EngineError> {
        let mut report = self.analyze(path, sample_size)?;
        let statistics = match numeric_statistics(path) {
            Ok(statistics) => statistics,
            Err(e) => {
                tracing::warn!(error = %e, "Statistics pass failed, reporting none");
                BTreeMap::new()
            }
        };
        report.statistics = Some(statistics);
        Ok(report)
    }

    /// Column dtype labels from the first rows, read as text.
    fn probe_dtypes(&self, path: &Path) -> Result<Vec<String>, EngineError> {
        let probe = ChunkedReader::new(path).batch_size(PROBE_ROWS).limit(PROBE_ROWS).read_all()?;
        let columns = probe.columns().to_vec();
        let frame = probe.into_frame()?;

        Ok(columns
            .iter()
            .map(|name| {
                or_degrade(name, "dtype", "object".to_string(), || {
                    let values = frame.column(name)?.str()?;
                    Ok(detect_column_type(values.into_iter().flatten()).to_string())
                })
            })
            .collect())
    }

    /// Extrapolates the duplicate count from a lenient leading sample.
    fn estimate_duplicates(&self, path: &Path, sample_size: usize, total_rows: usize) -> Result<usize, EngineError> {
        let limit = sample_size.min(total_rows);
        if limit == 0 {
            return Ok(0);
        }

        let sample = ChunkedReader::new(path)
            .lenient(true)
            .batch_size(limit)
            .limit(limit)
            .read_all()?;
        let sampled = sample.len();
        if sampled == 0 {
            return Ok(0);
        }

        let duplicates = count_duplicates(sample)?;
        let estimate = (duplicates as f64 * (total_rows as f64 / sampled as f64)) as usize;
        tracing::debug!(sampled, duplicates, estimate, "Estimated duplicate rows");
        Ok(estimate.min(total_rows))
    }
}

/// Rows that repeat an earlier row exactly.
fn count_duplicates(batch: RowBatch) -> Result<usize, EngineError> {
    let rows = batch.len();
    let unique = batch
        .into_frame()?
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    Ok(rows - unique.height())
}

fn summarize(series: &Series) -> Result<Option<NumericSummary>, EngineError> {
    let Some(values) = numeric_view(series)? else {
        return Ok(None);
    };
    let floats = values.f64()?;
    let (min, max) = floats
        .into_iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    match (floats.mean(), floats.median()) {
        (Some(mean), Some(median)) => Ok(Some(NumericSummary {
            mean,
            median,
            std: floats.std(1).filter(|s| s.is_finite()),
            min,
            max,
        })),
        _ => Ok(None),
    }
}

/// mean/median/std/min/max for every numeric column of a bounded prefix.
fn numeric_statistics(path: &Path) -> Result<BTreeMap<String, NumericSummary>, EngineError> {
    let frame = ChunkedReader::new(path)
        .lenient(true)
        .batch_size(STATISTICS_ROWS)
        .limit(STATISTICS_ROWS)
        .read_all()?
        .into_frame()?;

    let mut statistics = BTreeMap::new();
    for series in frame.get_columns() {
        match summarize(series) {
            Ok(Some(summary)) => {
                statistics.insert(series.name().to_string(), summary);
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(column = series.name(), error = %e, "Skipping statistics for column"),
        }
    }
    Ok(statistics)
}
