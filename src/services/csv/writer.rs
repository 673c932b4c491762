use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use polars::prelude::*;

use super::normalize::{normalize, NormalizedValue};
use crate::error::EngineError;

/// CSV output that receives frames one after another.
///
/// The file is truncated and the header written on creation; every
/// [`write_frame`](Self::write_frame) appends rows only.
pub struct FrameWriter {
    writer: Writer<BufWriter<File>>,
    path: PathBuf,
    rows_written: usize,
}

impl FrameWriter {
    pub fn create(path: impl AsRef<Path>, header: &[String]) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(BufWriter::new(file));
        writer.write_record(header).map_err(EngineError::from_write)?;

        Ok(Self {
            writer,
            path,
            rows_written: 0,
        })
    }

    /// Appends every row of `frame` and flushes. Returns the rows written.
    pub fn write_frame(&mut self, frame: &DataFrame) -> Result<usize, EngineError> {
        let columns = frame.get_columns();
        let mut fields: Vec<String> = Vec::with_capacity(columns.len());

        for row_idx in 0..frame.height() {
            fields.clear();
            for series in columns {
                let value = match series.get(row_idx) {
                    Ok(value) => normalize(&value),
                    Err(e) => {
                        tracing::warn!(column = series.name(), row = row_idx, error = %e, "Unreadable cell written as empty");
                        NormalizedValue::Null
                    }
                };
                fields.push(value.to_csv_field().into_owned());
            }
            self.writer.write_record(&fields).map_err(EngineError::from_write)?;
        }

        self.writer.flush()?;
        self.rows_written += frame.height();
        Ok(frame.height())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn finish(mut self) -> Result<PathBuf, EngineError> {
        self.writer.flush()?;
        Ok(self.path)
    }
}
