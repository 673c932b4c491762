use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::normalize::{normalize, NormalizedValue};
use super::processor::apply_cell_options;
use super::reader::ChunkedReader;
use super::types::TransformConfig;
use crate::error::EngineError;

pub const PREVIEW_ROWS: usize = 10;

/// First rows of a file with lexically typed, JSON-safe values.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<NormalizedValue>>,
}

/// One preview row as a `{column: value}` map in header order.
struct RowMap<'a> {
    columns: &'a [String],
    values: &'a [NormalizedValue],
}

impl Serialize for RowMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Preview {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows.iter().map(|values| RowMap {
            columns: &self.columns,
            values,
        }))
    }
}

/// Reads up to `rows` records leniently, skipping malformed ones, and types
/// each column the way `convert_types` would.
pub fn preview(path: &Path, rows: usize) -> Result<Preview, EngineError> {
    let batch = ChunkedReader::new(path).lenient(true).batch_size(rows).limit(rows).read_all()?;
    let columns = batch.columns().to_vec();

    let typed = TransformConfig { convert_types: true, ..Default::default() };
    let frame = apply_cell_options(batch.into_frame()?, &typed)?;

    let mut records = Vec::with_capacity(frame.height());
    for row_idx in 0..frame.height() {
        let values = frame
            .get_columns()
            .iter()
            .map(|series| series.get(row_idx).map(|value| normalize(&value)))
            .collect::<Result<Vec<_>, _>>()?;
        records.push(values);
    }

    Ok(Preview { columns, rows: records })
}
