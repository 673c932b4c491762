use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::csv::types::{TransformConfig, TransformResult};
use crate::services::csv::Preview;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub file_id: String,
    #[serde(default)]
    pub sample_size: Option<usize>,
    /// Adds numeric summaries to the report.
    #[serde(default)]
    pub statistics: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreprocessRequest {
    pub file_id: String,
    #[serde(default)]
    pub options: TransformConfig,
}

#[derive(Debug, Serialize)]
pub struct PreprocessResponse {
    pub message: String,
    pub task_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatusResponse {
    Queued { rows_processed: usize },
    Processing { rows_processed: usize },
    Completed { result: TransformResult },
    Failed { error: String },
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub file_id: String,
    pub columns: Vec<String>,
    pub preview: Preview,
}
