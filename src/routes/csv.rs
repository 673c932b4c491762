use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::{
    error::{AppError, EngineError},
    models::{AnalyzeRequest, PreprocessRequest, PreprocessResponse, PreviewResponse, TaskStatusResponse},
    services::{
        csv::{output_path_for, preview, types::QualityReport, PREVIEW_ROWS},
        jobs::{JobStatus, TransformJob},
        progress::read_progress,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/csv/analyze", post(analyze_csv))
        .route("/csv/preprocess", post(preprocess_csv))
        .route("/csv/task-status/:task_id", get(task_status))
        .route("/csv/preview/:file_id", get(preview_csv))
        .route("/csv/download/:file_id", get(download_processed))
        .layer(cors)
}

/// Maps a file id to a file inside the upload directory.
fn resolve_upload(state: &AppState, file_id: &str) -> Result<PathBuf, AppError> {
    if file_id.is_empty() || file_id.contains(['/', '\\']) || file_id.contains("..") {
        return Err(AppError::InvalidInput(format!("Invalid file id: {:?}", file_id)));
    }
    let path = state.config.upload_dir.join(file_id);
    if !path.is_file() {
        return Err(AppError::NotFound("File not found or expired".to_string()));
    }
    Ok(path)
}

async fn analyze_csv(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<QualityReport>, AppError> {
    let start = std::time::Instant::now();
    let path = resolve_upload(&state, &request.file_id)?;

    let file_size = tokio::fs::metadata(&path).await.map_err(EngineError::from)?.len();
    if file_size > state.config.max_file_size {
        return Err(AppError::InvalidInput(format!(
            "File size exceeds {}MB limit",
            state.config.max_file_size / 1024 / 1024
        )));
    }

    let analyzer = state.analyzer.clone();
    let sample_size = request.sample_size.unwrap_or(state.config.analysis_sample_size);
    let with_statistics = request.statistics;
    tracing::info!(file_id = %request.file_id, sample_size, with_statistics, "Analyzing CSV");

    let report = tokio::task::spawn_blocking(move || {
        if with_statistics {
            analyzer.analyze_with_statistics(&path, sample_size)
        } else {
            analyzer.analyze(&path, sample_size)
        }
    })
    .await
    .map_err(|e| AppError::Internal(format!("Analysis task failed: {}", e)))??;

    tracing::info!(file_id = %request.file_id, rows = report.total_rows, "Analysis served in {:?}", start.elapsed());
    Ok(Json(report))
}

async fn preprocess_csv(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PreprocessRequest>,
) -> Result<(StatusCode, Json<PreprocessResponse>), AppError> {
    let input = resolve_upload(&state, &request.file_id)?;
    let handle = state.jobs.submit(TransformJob { input, config: request.options });

    Ok((
        StatusCode::ACCEPTED,
        Json(PreprocessResponse {
            message: "Preprocessing started".to_string(),
            task_id: handle.id,
            status: "queued",
        }),
    ))
}

async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    let not_found = || AppError::NotFound(format!("Task not found: {}", task_id));
    let id = Uuid::parse_str(&task_id).map_err(|_| not_found())?;
    let status = state.jobs.status(&id).ok_or_else(not_found)?;

    let rows_processed = |input: &std::path::Path| {
        read_progress(state.progress.as_ref(), input).map_or(0, |record| record.rows_processed)
    };

    let response = match status {
        JobStatus::Queued { input, .. } => TaskStatusResponse::Queued { rows_processed: rows_processed(&input) },
        JobStatus::Processing { input, .. } => TaskStatusResponse::Processing { rows_processed: rows_processed(&input) },
        JobStatus::Completed { result, .. } => TaskStatusResponse::Completed { result },
        JobStatus::Failed { error, .. } => TaskStatusResponse::Failed { error },
    };
    Ok(Json(response))
}

async fn preview_csv(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<PreviewResponse>, AppError> {
    let path = resolve_upload(&state, &file_id)?;

    let head = tokio::task::spawn_blocking(move || preview(&path, PREVIEW_ROWS))
        .await
        .map_err(|e| AppError::Internal(format!("Preview task failed: {}", e)))??;

    Ok(Json(PreviewResponse {
        file_id,
        columns: head.columns.clone(),
        preview: head,
    }))
}

async fn download_processed(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let input = resolve_upload(&state, &file_id)?;
    let processed = output_path_for(&input)?;
    if !processed.is_file() {
        return Err(AppError::NotFound("Processed file not found".to_string()));
    }

    let body = tokio::fs::read(&processed).await.map_err(EngineError::from)?;
    tracing::info!(file_id = %file_id, bytes = body.len(), "Serving processed CSV");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"processed_{}\"", file_id)),
        ],
        body,
    ))
}
