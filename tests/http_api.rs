// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use docqa::config::ExtractConfig;
use docqa::embedding::{ChunkConfig, HashProvider, SharedEmbedder};
use docqa::index::{ArtifactPaths, IndexBackend};
use docqa::ingest::IngestPipeline;
use docqa::rag::{IngestMode, RetrievalOrchestrator, GATEWAY_UNAVAILABLE_ANSWER, NO_CONTEXT_ANSWER};
use docqa::server::{router, AppState};

const BOUNDARY: &str = "docqa-test-boundary";

fn app(dir: &TempDir) -> Router {
    let embedder = Arc::new(SharedEmbedder::new(Box::new(HashProvider::new(32))));
    let orchestrator = RetrievalOrchestrator::new(
        ArtifactPaths::in_dir(dir.path().join("index")),
        IndexBackend::BruteForce,
        embedder,
    );
    orchestrator.reload().unwrap();
    let pipeline = IngestPipeline::new(
        Arc::new(orchestrator),
        ChunkConfig::default(),
        ExtractConfig::default(),
    );
    let state = AppState::new(Arc::new(pipeline), IngestMode::Replace, dir.path().join("uploads"));
    router(state, 1024 * 1024)
}

fn upload_request(file_name: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::post("/upload_pdf")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn query_request(question: &str) -> Request<Body> {
    Request::post("/query")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "question": question }).to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_reports_running() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "docqa API is running.");
}

#[tokio::test]
async fn query_before_any_upload_has_no_context() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir).oneshot(query_request("what is this?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["answer"], NO_CONTEXT_ANSWER);
}

#[tokio::test]
async fn upload_rejects_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir)
        .oneshot(upload_request("picture.png", "binary"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["detail"], "File must be a PDF, TXT or MD document.");
}

#[tokio::test]
async fn upload_blank_document_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let response = app(&dir)
        .oneshot(upload_request("blank.txt", "   "))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["detail"].as_str().unwrap().contains("No text extracted"));
}

#[tokio::test]
async fn upload_then_query_and_status() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let response = app
        .clone()
        .oneshot(upload_request("notes.txt", "the launch window opens in march"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["chunks_count"], 1);
    assert_eq!(body["message"], "notes.txt processed and indexed successfully.");

    // No gateway is configured, so retrieval succeeds but generation is skipped.
    let response = app
        .clone()
        .oneshot(query_request("when does the launch window open"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["answer"], GATEWAY_UNAVAILABLE_ANSWER);

    let response = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["rows"], 1);
    assert_eq!(body["documents"][0], "notes.txt");
    assert_eq!(body["generation_available"], false);

    let leftovers = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
    assert_eq!(leftovers, 0);
}
