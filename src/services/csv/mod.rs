pub mod analyzer;
pub mod normalize;
pub mod preview;
pub mod processor;
pub mod reader;
pub mod types;
pub mod utils;
pub mod writer;

pub use analyzer::QualityAnalyzer;
pub use preview::{preview, Preview, PREVIEW_ROWS};
pub use processor::{output_path_for, TransformEngine};
pub use reader::{ChunkedReader, RowBatch};

/// Rows per batch for full scans and streaming transforms.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
/// Rows sampled for duplicate estimation.
pub const DEFAULT_SAMPLE_SIZE: usize = 10_000;
pub const PROBE_ROWS: usize = 1_000;
pub const STATISTICS_ROWS: usize = 10_000;
/// Distinct values are only tracked in this many leading batches.
pub const UNIQUE_TRACKING_BATCHES: usize = 3;
