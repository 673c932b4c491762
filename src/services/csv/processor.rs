use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use polars::prelude::*;

use super::reader::ChunkedReader;
use super::types::*;
use super::utils::{is_integer_text, numeric_view, parse_number, standardize_columns};
use super::writer::FrameWriter;
use super::DEFAULT_CHUNK_SIZE;
use crate::error::EngineError;
use crate::services::progress::{write_progress, ProgressStore, PROGRESS_TTL};

/// Sibling output file: `data.csv` becomes `data_processed.csv`.
pub fn output_path_for(path: &Path) -> Result<PathBuf, EngineError> {
    let stem = path.file_stem().ok_or_else(|| {
        EngineError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Input path has no file name: {}", path.display()),
        ))
    })?;
    let extension = path.extension().map_or("csv".into(), |ext| ext.to_string_lossy());
    Ok(path.with_file_name(format!("{}_processed.{}", stem.to_string_lossy(), extension)))
}

#[derive(Debug, Clone, Copy)]
enum FillStatistic {
    Mean,
    Median,
}

/// Applies cleaning options to a CSV file and writes the result next to it.
#[derive(Debug, Clone)]
pub struct TransformEngine {
    chunk_size: usize,
    progress_ttl: Duration,
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, PROGRESS_TTL)
    }
}

impl TransformEngine {
    pub fn new(chunk_size: usize, progress_ttl: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            progress_ttl,
        }
    }

    /// Runs one transform to completion.
    ///
    /// Never fails and never unwinds: errors and panics both come back as
    /// [`TransformResult::Error`]. A failed run may leave a partial output file.
    pub fn transform(&self, path: &Path, config: &TransformConfig, progress: &dyn ProgressStore) -> TransformResult {
        let start = std::time::Instant::now();
        tracing::info!(path = %path.display(), ?config, "Starting CSV transform");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(path, config, progress)));
        match outcome {
            Ok(Ok(summary)) => {
                tracing::info!(
                    rows_processed = summary.rows_processed,
                    output = %summary.output_path,
                    "Transform completed in {:?}",
                    start.elapsed()
                );
                TransformResult::Success(summary)
            }
            Ok(Err(e)) => {
                tracing::error!(path = %path.display(), error = %e, "Transform failed");
                TransformResult::Error { error: e.to_string() }
            }
            Err(payload) => {
                let error = panic_message(payload);
                tracing::error!(path = %path.display(), error = %error, "Transform panicked");
                TransformResult::Error { error }
            }
        }
    }

    fn run(&self, path: &Path, config: &TransformConfig, progress: &dyn ProgressStore) -> Result<TransformSummary, EngineError> {
        if config.remove_duplicates {
            self.run_whole(path, config, progress)
        } else {
            self.run_streaming(path, config, progress)
        }
    }

    /// Duplicate removal needs every row at once.
    fn run_whole(&self, path: &Path, config: &TransformConfig, progress: &dyn ProgressStore) -> Result<TransformSummary, EngineError> {
        tracing::info!("Processing duplicates, loading full file");
        let table = ChunkedReader::new(path).batch_size(self.chunk_size).read_all()?;
        let source_columns = table.columns().to_vec();
        let original_rows = table.len();

        let mut frame = table
            .into_frame()?
            .lazy()
            .unique_stable(None, UniqueKeepStrategy::First)
            .collect()?;
        let rows_processed = frame.height();

        if config.standardize_columns {
            frame.set_column_names(&standardize_columns(&source_columns))?;
        }
        let frame = apply_cell_options(frame, config)?;
        let columns: Vec<String> = frame.get_column_names().iter().map(|name| name.to_string()).collect();

        let output = output_path_for(path)?;
        let mut writer = FrameWriter::create(&output, &columns)?;
        writer.write_frame(&frame)?;
        let output = writer.finish()?;
        write_progress(progress, path, rows_processed, self.progress_ttl);

        Ok(TransformSummary {
            output_path: output.display().to_string(),
            rows_processed,
            rows_removed: Some(original_rows - rows_processed),
            columns,
        })
    }

    fn run_streaming(&self, path: &Path, config: &TransformConfig, progress: &dyn ProgressStore) -> Result<TransformSummary, EngineError> {
        let mut batches = ChunkedReader::new(path).batch_size(self.chunk_size).batches()?;
        let columns = if config.standardize_columns {
            standardize_columns(batches.columns())
        } else {
            batches.columns().to_vec()
        };

        let output = output_path_for(path)?;
        let mut writer = FrameWriter::create(&output, &columns)?;
        let mut rows_processed = 0usize;

        for (index, batch) in batches.by_ref().enumerate() {
            let mut frame = batch?.into_frame()?;
            if config.standardize_columns {
                frame.set_column_names(&columns)?;
            }
            let frame = apply_cell_options(frame, config)?;
            rows_processed += writer.write_frame(&frame)?;
            write_progress(progress, path, rows_processed, self.progress_ttl);
            tracing::debug!(batch = index, rows_processed, "Wrote batch");
        }

        let output = writer.finish()?;
        Ok(TransformSummary {
            output_path: output.display().to_string(),
            rows_processed,
            rows_removed: None,
            columns,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "transform panicked".to_string()
    }
}

fn map_columns(frame: DataFrame, f: impl Fn(&Series) -> PolarsResult<Series>) -> PolarsResult<DataFrame> {
    let columns = frame.get_columns().iter().map(f).collect::<PolarsResult<Vec<_>>>()?;
    DataFrame::new(columns)
}

/// Per-cell options, in order: missing values, whitespace, types.
///
/// Fill statistics come from `frame` alone. In streaming mode that is one
/// batch, so mean/median fills depend on the batch size.
pub fn apply_cell_options(frame: DataFrame, config: &TransformConfig) -> Result<DataFrame, EngineError> {
    let mut frame = match config.handle_missing {
        MissingStrategy::Drop => frame.drop_nulls::<String>(None)?,
        MissingStrategy::FillMean => map_columns(frame, |s| fill_numeric(s, FillStatistic::Mean))?,
        MissingStrategy::FillMedian => map_columns(frame, |s| fill_numeric(s, FillStatistic::Median))?,
        MissingStrategy::FillMode => map_columns(frame, fill_mode)?,
        MissingStrategy::None => frame,
    };

    if config.trim_whitespace {
        frame = map_columns(frame, trim_text)?;
    }
    if config.convert_types {
        frame = map_columns(frame, coerce_numeric)?;
    }
    Ok(frame)
}

fn fill_numeric(series: &Series, statistic: FillStatistic) -> PolarsResult<Series> {
    if series.null_count() == 0 {
        return Ok(series.clone());
    }
    let Some(values) = numeric_view(series)? else {
        return Ok(series.clone());
    };
    let floats = values.f64()?;
    let fill = match statistic {
        FillStatistic::Mean => floats.mean(),
        FillStatistic::Median => floats.median(),
    };
    let Some(fill) = fill else {
        return Ok(series.clone());
    };

    let filled: Float64Chunked = floats.into_iter().map(|v| Some(v.unwrap_or(fill))).collect();
    Ok(filled.into_series().with_name(series.name()))
}

/// Most frequent non-missing text; ties go to the smallest value.
fn mode_of(values: &StringChunked) -> Option<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.into_iter().flatten() {
        *counts.entry(value).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(value, _)| value)
}

fn fill_mode(series: &Series) -> PolarsResult<Series> {
    if series.null_count() == 0 || series.dtype() != &DataType::String {
        return Ok(series.clone());
    }
    let values = series.str()?;
    let Some(mode) = mode_of(values) else {
        return Ok(series.clone());
    };

    let filled: StringChunked = values.into_iter().map(|v| Some(v.unwrap_or(mode))).collect();
    Ok(filled.into_series().with_name(series.name()))
}

fn trim_text(series: &Series) -> PolarsResult<Series> {
    if series.dtype() != &DataType::String {
        return Ok(series.clone());
    }
    let trimmed: StringChunked = series.str()?.into_iter().map(|v| v.map(str::trim)).collect();
    Ok(trimmed.into_series().with_name(series.name()))
}

/// Integer if every value is an integer, else float if every value is a
/// number, else the column is returned untouched.
fn coerce_numeric(series: &Series) -> PolarsResult<Series> {
    if series.dtype() != &DataType::String {
        return Ok(series.clone());
    }
    let values = series.str()?;

    let ints: Option<Int64Chunked> = values
        .into_iter()
        .map(|v| match v {
            None => Some(None),
            Some(raw) if is_integer_text(raw) => raw.trim().parse::<i64>().ok().map(Some),
            Some(_) => None,
        })
        .collect();
    if let Some(ints) = ints {
        return Ok(ints.into_series().with_name(series.name()));
    }

    let floats: Option<Float64Chunked> = values
        .into_iter()
        .map(|v| match v {
            None => Some(None),
            Some(raw) => parse_number(raw).map(Some),
        })
        .collect();
    match floats {
        Some(floats) => Ok(floats.into_series().with_name(series.name())),
        None => Ok(series.clone()),
    }
}
