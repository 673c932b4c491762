//! Lazy, restartable batch reader over a CSV file.
//!
//! A [`ChunkedReader`] is only a description of a read (path, batch size,
//! strictness, row limit). Every call to [`ChunkedReader::batches`] re-opens
//! the file, so the analyzer can make several independent passes.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use polars::prelude::*;

use super::normalize::is_missing;
use super::DEFAULT_CHUNK_SIZE;
use crate::error::EngineError;

/// One cell of a batch: `None` when the source text was empty or an NA marker.
pub type Cell = Option<String>;

#[derive(Debug, Clone)]
pub struct ChunkedReader {
    path: PathBuf,
    batch_size: usize,
    lenient: bool,
    limit: Option<usize>,
}

impl ChunkedReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            batch_size: DEFAULT_CHUNK_SIZE,
            lenient: false,
            limit: None,
        }
    }

    /// Sets the maximum rows per batch. Zero is treated as one.
    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    /// Skip malformed records instead of failing the read.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Stop after `rows` data rows have been yielded.
    pub fn limit(mut self, rows: usize) -> Self {
        self.limit = Some(rows);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the file and reads the header row.
    ///
    /// # Errors
    ///
    /// `EngineError::EmptyInput` if the file has no header or only blank ones,
    /// `EngineError::MalformedInput` if the header cannot be decoded.
    pub fn batches(&self) -> Result<Batches, EngineError> {
        let file = File::open(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers = reader.headers()?.clone();
        if headers.iter().all(|name| name.trim().is_empty()) {
            return Err(EngineError::EmptyInput);
        }
        let columns: Arc<[String]> = dedupe_headers(&headers).into();

        tracing::debug!(
            path = %self.path.display(),
            columns = columns.len(),
            batch_size = self.batch_size,
            lenient = self.lenient,
            "Opened CSV for batched read"
        );

        Ok(Batches {
            reader,
            columns,
            record: StringRecord::new(),
            batch_size: self.batch_size,
            lenient: self.lenient,
            remaining: self.limit,
            skipped: 0,
            done: false,
        })
    }

    /// Reads every remaining row into a single batch.
    pub fn read_all(&self) -> Result<RowBatch, EngineError> {
        let mut batches = self.batches()?;
        let mut all = RowBatch::empty(batches.columns.clone());
        for batch in batches.by_ref() {
            all.rows.extend(batch?.rows);
        }
        Ok(all)
    }
}

/// Pandas-style disambiguation: `a, a, a` becomes `a, a.1, a.2`.
fn dedupe_headers(headers: &StringRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .map(|name| {
            let mut candidate = name.to_string();
            let mut counter = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}.{}", name, counter);
                counter += 1;
            }
            candidate
        })
        .collect()
}

/// Iterator over the batches of one open file.
pub struct Batches {
    reader: csv::Reader<BufReader<File>>,
    columns: Arc<[String]>,
    record: StringRecord,
    batch_size: usize,
    lenient: bool,
    remaining: Option<usize>,
    skipped: usize,
    done: bool,
}

impl Batches {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records dropped so far in lenient mode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn next_row(&mut self) -> Result<Option<Vec<Cell>>, EngineError> {
        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => return Ok(None),
                Ok(true) if self.record.len() == self.columns.len() => {
                    return Ok(Some(
                        self.record
                            .iter()
                            .map(|cell| if is_missing(cell) { None } else { Some(cell.to_string()) })
                            .collect(),
                    ));
                }
                Ok(true) => {
                    let line = self.record.position().map_or(0, |p| p.line());
                    if !self.lenient {
                        return Err(EngineError::malformed(
                            line,
                            format!(
                                "expected {} fields, found {}",
                                self.columns.len(),
                                self.record.len()
                            ),
                        ));
                    }
                    tracing::debug!(line, fields = self.record.len(), "Skipping malformed record");
                    self.skipped += 1;
                }
                Err(e) if self.lenient && !e.is_io_error() => {
                    tracing::debug!(error = %e, "Skipping undecodable record");
                    self.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Iterator for Batches {
    type Item = Result<RowBatch, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let want = match self.remaining {
            Some(0) => {
                self.done = true;
                return None;
            }
            Some(n) => n.min(self.batch_size),
            None => self.batch_size,
        };

        let mut batch = RowBatch::empty(self.columns.clone());
        batch.rows.reserve(want.min(4096));
        while batch.rows.len() < want {
            match self.next_row() {
                Ok(Some(row)) => batch.rows.push(row),
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= batch.rows.len();
        }

        if batch.rows.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// Rows of one batch, aligned with the file's column list.
#[derive(Debug, Clone)]
pub struct RowBatch {
    columns: Arc<[String]>,
    rows: Vec<Vec<Cell>>,
}

impl RowBatch {
    pub fn empty(columns: Arc<[String]>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of column `idx`, top to bottom.
    pub fn column_cells(&self, idx: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows.iter().map(move |row| row[idx].as_deref())
    }

    /// Converts into a dataframe of text columns.
    pub fn into_frame(self) -> Result<DataFrame, EngineError> {
        let width = self.columns.len();
        let mut values: Vec<Vec<Cell>> = (0..width).map(|_| Vec::with_capacity(self.rows.len())).collect();
        for row in self.rows {
            for (idx, cell) in row.into_iter().enumerate() {
                values[idx].push(cell);
            }
        }

        let series = self
            .columns
            .iter()
            .zip(values)
            .map(|(name, cells)| Series::new(name, cells))
            .collect::<Vec<_>>();

        Ok(DataFrame::new(series)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn splits_into_bounded_batches_in_order() {
        let file = csv_file("id\n1\n2\n3\n4\n5\n");
        let reader = ChunkedReader::new(file.path()).batch_size(2);

        let sizes: Vec<usize> = reader.batches().unwrap().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let first: Vec<_> = reader
            .batches()
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .column_cells(0)
            .map(|c| c.map(str::to_string))
            .collect();
        assert_eq!(first, vec![Some("1".to_string()), Some("2".to_string())]);
    }

    #[test]
    fn restarts_from_the_beginning() {
        let file = csv_file("a,b\n1,2\n3,4\n");
        let reader = ChunkedReader::new(file.path());

        let first_pass: usize = reader.batches().unwrap().map(|b| b.unwrap().len()).sum();
        let second_pass: usize = reader.batches().unwrap().map(|b| b.unwrap().len()).sum();
        assert_eq!(first_pass, 2);
        assert_eq!(second_pass, 2);
    }

    #[test]
    fn na_markers_read_as_missing() {
        let file = csv_file("a,b,c\n,NA,x\n");
        let batch = ChunkedReader::new(file.path()).read_all().unwrap();
        assert_eq!(batch.rows()[0], vec![None, None, Some("x".to_string())]);
    }

    #[test]
    fn strict_mode_rejects_wrong_field_count() {
        let file = csv_file("a,b\n1,2\n3,4,5\n6,7\n");
        let err = ChunkedReader::new(file.path()).read_all().unwrap_err();
        match err {
            EngineError::MalformedInput { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lenient_mode_skips_wrong_field_count() {
        let file = csv_file("a,b\n1,2\n3,4,5\n6,7\n");
        let reader = ChunkedReader::new(file.path()).lenient(true);
        let mut batches = reader.batches().unwrap();
        let rows: usize = batches.by_ref().map(|b| b.unwrap().len()).sum();
        assert_eq!(rows, 2);
        assert_eq!(batches.skipped(), 1);
    }

    #[test]
    fn limit_caps_total_rows_across_batches() {
        let file = csv_file("a\n1\n2\n3\n4\n5\n6\n7\n");
        let reader = ChunkedReader::new(file.path()).batch_size(3).limit(5);
        let sizes: Vec<usize> = reader.batches().unwrap().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![3, 2]);
    }

    #[test]
    fn empty_file_has_no_header() {
        let file = csv_file("");
        assert!(matches!(
            ChunkedReader::new(file.path()).batches(),
            Err(EngineError::EmptyInput)
        ));
    }

    #[test]
    fn whitespace_only_file_has_no_header() {
        let file = csv_file("   \n");
        assert!(matches!(
            ChunkedReader::new(file.path()).batches(),
            Err(EngineError::EmptyInput)
        ));
    }

    #[test]
    fn invalid_utf8_is_malformed_unless_lenient() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"a,b\n1,2\n\xff\xfe,3\n4,5\n").unwrap();
        file.flush().unwrap();

        match ChunkedReader::new(file.path()).read_all().unwrap_err() {
            EngineError::MalformedInput { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }

        let mut batches = ChunkedReader::new(file.path()).lenient(true).batches().unwrap();
        let rows: usize = batches.by_ref().map(|b| b.unwrap().len()).sum();
        assert_eq!(rows, 2);
        assert_eq!(batches.skipped(), 1);
    }

    #[test]
    fn header_only_file_yields_no_batches() {
        let file = csv_file("a,b\n");
        let mut batches = ChunkedReader::new(file.path()).batches().unwrap();
        assert_eq!(batches.columns(), &["a".to_string(), "b".to_string()]);
        assert!(batches.next().is_none());
    }

    #[test]
    fn duplicate_headers_are_disambiguated() {
        let file = csv_file("a,a,b,a\n1,2,3,4\n");
        let batches = ChunkedReader::new(file.path()).batches().unwrap();
        assert_eq!(batches.columns(), &["a", "a.1", "b", "a.2"]);
    }

    #[test]
    fn batch_converts_to_text_frame() {
        let file = csv_file("name,age\nann,31\nbob,\n");
        let df = ChunkedReader::new(file.path()).read_all().unwrap().into_frame().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names(), &["name", "age"]);
        let age = df.column("age").unwrap();
        assert_eq!(age.dtype(), &DataType::String);
        assert_eq!(age.null_count(), 1);
    }
}
