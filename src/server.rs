// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP API: upload documents and ask questions about them.
//!
//! Handlers never block the runtime. Extraction, embedding, search and the
//! gateway call all run on `spawn_blocking` threads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::extract::is_supported;
use crate::ingest::{IngestPipeline, NoTextExtracted};
use crate::rag::{CorpusStatus, IngestMode};

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<IngestPipeline>,
    ingest_mode: IngestMode,
    uploads_dir: PathBuf,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>, ingest_mode: IngestMode, uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            ingest_mode,
            uploads_dir: uploads_dir.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    chunks_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
}

/// Builds the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/upload_pdf", post(upload_pdf))
        .route("/query", post(query))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves `app` on `bind` until Ctrl+C.
pub async fn serve(bind: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let addr = listener.local_addr().context("failed to read bound address")?;
    tracing::info!(%addr, "docqa listening");
    println!("docqa listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for shutdown signal");
            }
        })
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "docqa API is running.".to_string(),
    })
}

async fn status(State(state): State<AppState>) -> Json<CorpusStatus> {
    Json(state.pipeline.orchestrator().status())
}

async fn upload_pdf(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("Invalid multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = field
            .file_name()
            .and_then(|name| Path::new(name).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| bad_request("Uploaded file has no name."))?;
        if !is_supported(Path::new(&name)) {
            return Err(bad_request("File must be a PDF, TXT or MD document."));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|err| bad_request(format!("Failed to read upload: {err}")))?;

        let staged = staged_path(&state.uploads_dir, &name);
        tokio::fs::create_dir_all(&state.uploads_dir)
            .await
            .map_err(|err| internal_error(err.into()))?;
        tokio::fs::write(&staged, &bytes)
            .await
            .map_err(|err| internal_error(err.into()))?;
        tracing::info!(document = %name, bytes = bytes.len(), "processing upload");

        let pipeline = state.pipeline.clone();
        let mode = state.ingest_mode;
        let display = name.clone();
        let result = tokio::task::spawn_blocking(move || {
            let result = pipeline.ingest_document(&staged, &display, mode);
            if let Err(err) = std::fs::remove_file(&staged) {
                tracing::debug!(error = %err, path = %staged.display(), "failed to remove staged upload");
            }
            result
        })
        .await
        .map_err(|err| internal_error(err.into()))?;

        return match result {
            Ok(report) => Ok(Json(UploadResponse {
                message: format!("{name} processed and indexed successfully."),
                chunks_count: report.chunks,
            })),
            Err(err) if err.downcast_ref::<NoTextExtracted>().is_some() => Err(bad_request(err.to_string())),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), document = %name, "upload failed");
                Err(internal_error(err))
            }
        };
    }

    Err(bad_request("Missing 'file' field."))
}

async fn query(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Result<Json<QueryResponse>, ApiError> {
    let pipeline = state.pipeline.clone();
    let answer = tokio::task::spawn_blocking(move || pipeline.orchestrator().answer_query(&request.question))
        .await
        .map_err(|err| internal_error(err.into()))?
        .map_err(|err| internal_error(err.into()))?;
    Ok(Json(QueryResponse { answer }))
}

fn staged_path(dir: &Path, name: &str) -> PathBuf {
    let seq = UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
    dir.join(format!("{}-{}-{}", std::process::id(), seq, name))
}

fn bad_request(detail: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

fn internal_error(err: anyhow::Error) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            detail: format!("{err:#}"),
        }),
    )
}
