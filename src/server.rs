//! HTTP API server.
//!
//! Exposes the RAG engine over a JSON HTTP API for the development
//! frontend: document upload and management on one side, query and chat
//! on the other.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Service descriptor with the endpoint map |
//! | `GET`    | `/health` | Backend and store reachability probes |
//! | `POST`   | `/upload` | Multipart document upload + ingestion |
//! | `POST`   | `/query` | Ask a question against the index |
//! | `POST`   | `/chat` | Ask with prior conversation turns |
//! | `GET`    | `/documents` | List uploaded files |
//! | `DELETE` | `/clear` | Drop the index and every uploaded file |
//! | `GET`    | `/stats` | Chunk count, index readiness, model names |
//!
//! # Error Contract
//!
//! Error responses are JSON:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `payload_too_large` (413), `internal` (500).
//! Query and chat are the exception: engine-level failures there surface
//! inside a 200 response as the answer text, per the engine's failure
//! contract.
//!
//! # CORS
//!
//! Only the two local development frontend origins are allowed.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::engine::RagEngine;
use crate::extract;
use crate::models::{
    ChatRequest, DeleteResponse, DocumentEntry, DocumentInfo, DocumentListResponse,
    HealthResponse, QueryRequest, QueryResponse, StatsResponse, UploadResponse,
};

/// Frontend origins allowed by the CORS layer.
const ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];

/// Extra room on top of the configured file limit for multipart framing.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Arc<RagEngine>,
}

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(settings: Arc<Settings>, engine: Arc<RagEngine>) -> anyhow::Result<()> {
    let bind_addr = settings.bind_addr();
    let app = router(AppState { settings, engine });

    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router with all routes, body limit, and CORS applied.
pub fn router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = ALLOWED_ORIGINS
        .iter()
        .map(|o| HeaderValue::from_static(o))
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.settings.max_file_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/chat", post(handle_chat))
        .route("/documents", get(handle_documents))
        .route("/clear", delete(handle_clear))
        .route("/stats", get(handle_stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn payload_too_large(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "payload_too_large".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Ragbox API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "upload": "/upload",
            "query": "/query",
            "chat": "/chat",
            "documents": "/documents",
            "clear": "/clear",
            "stats": "/stats",
        },
    }))
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.engine.health().await;
    let healthy = report.backend.is_ok() && report.store.is_ok();

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        ollama_connected: report.backend.is_ok(),
        store_connected: report.store.is_ok(),
        model: state.engine.model_name().to_string(),
    })
}

// ============ POST /upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|n| n.to_string())
            .ok_or_else(|| bad_request("file field is missing a filename"))?;

        // Reads past the body limit fail here
        let bytes = field.bytes().await.map_err(|_| {
            payload_too_large(format!(
                "File size exceeds maximum allowed size of {} bytes",
                state.settings.max_file_size
            ))
        })?;

        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("missing multipart field: file"))?;

    if bytes.len() as u64 > state.settings.max_file_size {
        return Err(payload_too_large(format!(
            "File size exceeds maximum allowed size of {} bytes",
            state.settings.max_file_size
        )));
    }

    // Client-supplied names may carry directory components; only the final
    // component is used for the stored file.
    let filename = Path::new(&filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| bad_request("invalid filename"))?;

    let extension = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if !extract::is_supported_extension(extension) {
        return Err(bad_request(format!(
            "File type '{}' not supported. Allowed types: {}",
            extension,
            extract::SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let file_size = bytes.len() as u64;
    let file_path: PathBuf = state.settings.upload_dir.join(&filename);
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| internal(format!("Failed to store upload: {}", e)))?;

    let report = match state.engine.ingest(&[&file_path]).await {
        Ok(report) => report,
        Err(e) => {
            // Compensate: drop the file whose ingestion failed
            let _ = tokio::fs::remove_file(&file_path).await;
            return Err(internal(format!("Error processing document: {}", e)));
        }
    };

    Ok(Json(UploadResponse {
        success: true,
        message: format!("Document '{}' uploaded and processed successfully", filename),
        document: Some(DocumentInfo {
            filename,
            size: file_size,
            upload_time: chrono::Utc::now().to_rfc3339(),
            num_chunks: Some(report.num_chunks),
        }),
    }))
}

// ============ POST /query ============

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    request.validate().map_err(bad_request)?;

    let response = state.engine.query(&request.query, request.top_k, &[]).await;
    Ok(Json(response))
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    request.validate().map_err(bad_request)?;

    let response = state
        .engine
        .query(&request.query, request.top_k, &request.history)
        .await;
    Ok(Json(response))
}

// ============ GET /documents ============

async fn handle_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(&state.settings.upload_dir)
        .min_depth(1)
        .max_depth(1)
    {
        let entry = entry.map_err(|e| internal(format!("Error listing documents: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let meta = entry
            .metadata()
            .map_err(|e| internal(format!("Error listing documents: {}", e)))?;
        let modified = meta
            .modified()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
            .unwrap_or_default();

        documents.push(DocumentEntry {
            filename: entry.file_name().to_string_lossy().to_string(),
            size: meta.len(),
            upload_time: modified,
        });
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));

    let stats = state
        .engine
        .stats()
        .await
        .map_err(|e| internal(format!("Error listing documents: {}", e)))?;

    Ok(Json(DocumentListResponse {
        total_documents: documents.len(),
        total_chunks: stats.num_chunks,
        documents,
    }))
}

// ============ DELETE /clear ============

async fn handle_clear(
    State(state): State<AppState>,
) -> Result<Json<DeleteResponse>, AppError> {
    state
        .engine
        .clear()
        .await
        .map_err(|e| internal(format!("Error clearing documents: {}", e)))?;

    let mut deleted_count = 0usize;
    for entry in WalkDir::new(&state.settings.upload_dir)
        .min_depth(1)
        .max_depth(1)
    {
        let entry = entry.map_err(|e| internal(format!("Error clearing documents: {}", e)))?;
        if entry.file_type().is_file() {
            tokio::fs::remove_file(entry.path())
                .await
                .map_err(|e| internal(format!("Error clearing documents: {}", e)))?;
            deleted_count += 1;
        }
    }

    Ok(Json(DeleteResponse {
        success: true,
        message: "All documents cleared successfully".to_string(),
        deleted_count,
    }))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = state
        .engine
        .stats()
        .await
        .map_err(|e| internal(format!("Error reading stats: {}", e)))?;
    Ok(Json(stats))
}
