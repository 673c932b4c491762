//! HTTP surface tests driven through the router with `oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use data_cleanser::{config::Config, routes, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn create_test_router(dir: &TempDir) -> Router {
    let config = Config {
        upload_dir: dir.path().to_path_buf(),
        chunk_size: 2,
        ..Config::default()
    };
    routes::router(Arc::new(AppState::new(config)))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let response = create_test_router(&dir).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_analyze_uploaded_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.csv"), "a,b\n1,2\n3,\n5,6\n").unwrap();

    let response = create_test_router(&dir)
        .oneshot(post_json("/csv/analyze", json!({ "file_id": "data.csv" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["total_rows"], 3);
    assert_eq!(report["missing_cells"], 1);
    assert_eq!(report["column_analysis"]["b"]["missing_count"], 1);
    assert!(report.get("statistics").is_none());
}

#[tokio::test]
async fn test_analyze_with_statistics() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.csv"), "x\n1\n2\n3\n").unwrap();

    let response = create_test_router(&dir)
        .oneshot(post_json("/csv/analyze", json!({ "file_id": "data.csv", "statistics": true })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["statistics"]["x"]["mean"], 2.0);
}

#[tokio::test]
async fn test_analyze_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let response = create_test_router(&dir)
        .oneshot(post_json("/csv/analyze", json!({ "file_id": "nope.csv" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "File not found or expired");
}

#[tokio::test]
async fn test_analyze_rejects_path_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let response = create_test_router(&dir)
        .oneshot(post_json("/csv/analyze", json!({ "file_id": "../etc/passwd" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.csv"), "a,b\n1,2\n3\n").unwrap();

    let response = create_test_router(&dir)
        .oneshot(post_json("/csv/analyze", json!({ "file_id": "bad.csv" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_router(&dir);

    let response = app.clone().oneshot(get("/csv/task-status/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let uri = format!("/csv/task-status/{}", uuid::Uuid::new_v4());
    let response = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_preprocess_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("people.csv"), "First Name,Age\n ann ,30\nbob,\n ann ,30\n").unwrap();
    let app = create_test_router(&dir);

    let response = app
        .clone()
        .oneshot(post_json(
            "/csv/preprocess",
            json!({
                "file_id": "people.csv",
                "options": { "trim_whitespace": true, "standardize_columns": true, "remove_duplicates": true }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "queued");
    let task_id = accepted["task_id"].as_str().unwrap().to_string();

    let mut status = Value::Null;
    for _ in 0..200 {
        let response = app.clone().oneshot(get(&format!("/csv/task-status/{task_id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        status = body_json(response).await;
        if status["status"] == "completed" || status["status"] == "failed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(status["status"], "completed", "{status}");
    let result = &status["result"];
    assert_eq!(result["status"], "success");
    assert_eq!(result["rows_processed"], 2);
    assert_eq!(result["rows_removed"], 1);
    assert_eq!(result["columns"], json!(["first_name", "age"]));

    let output = std::fs::read_to_string(dir.path().join("people_processed.csv")).unwrap();
    assert_eq!(output, "first_name,age\nann,30\nbob,\n");
}

#[tokio::test]
async fn test_preprocess_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let response = create_test_router(&dir)
        .oneshot(post_json("/csv/preprocess", json!({ "file_id": "gone.csv" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_preview_types_first_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut content = String::from("id,name\n");
    for i in 0..15 {
        content.push_str(&format!("{i},n{i}\n"));
    }
    std::fs::write(dir.path().join("wide.csv"), content).unwrap();

    let response = create_test_router(&dir).oneshot(get("/csv/preview/wide.csv")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["columns"], json!(["id", "name"]));
    let rows = body["preview"].as_array().unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0], json!({"id": 0, "name": "n0"}));
}

#[tokio::test]
async fn test_preview_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.csv"), "").unwrap();

    let response = create_test_router(&dir).oneshot(get("/csv/preview/empty.csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_before_and_after_processing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.csv"), "a\n1\n").unwrap();
    let app = create_test_router(&dir);

    let response = app.clone().oneshot(get("/csv/download/data.csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Processed file not found");

    std::fs::write(dir.path().join("data_processed.csv"), "a\n1\n").unwrap();
    let response = app.clone().oneshot(get("/csv/download/data.csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"processed_data.csv\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"a\n1\n");

    let response = app.oneshot(get("/csv/download/gone.csv")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
