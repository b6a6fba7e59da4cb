//! API request and response models.
//!
//! These types define the JSON wire format of the HTTP surface and carry
//! their own validation rules, so handlers can reject bad input before any
//! backend work happens.

use serde::{Deserialize, Serialize};

/// Bounds on the number of retrieved chunks per query.
pub const TOP_K_MIN: usize = 1;
pub const TOP_K_MAX: usize = 10;

fn default_top_k() -> usize {
    3
}

/// Request body for `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl QueryRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_query_fields(&self.query, self.top_k)
    }
}

/// A single prior conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Request body for `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_query_fields(&self.query, self.top_k)
    }
}

fn validate_query_fields(query: &str, top_k: usize) -> Result<(), String> {
    if query.is_empty() {
        return Err("query must not be empty".to_string());
    }
    if !(TOP_K_MIN..=TOP_K_MAX).contains(&top_k) {
        return Err(format!(
            "top_k must be between {} and {}",
            TOP_K_MIN, TOP_K_MAX
        ));
    }
    Ok(())
}

/// Response body for `POST /query` and `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub metadata: serde_json::Value,
}

/// Metadata about an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub size: u64,
    pub upload_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_chunks: Option<usize>,
}

/// Response body for `POST /upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentInfo>,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"healthy"` when every component probe passed, else `"degraded"`.
    pub status: String,
    pub ollama_connected: bool,
    pub store_connected: bool,
    pub model: String,
}

/// Response body for `DELETE /clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
}

/// One entry in the `GET /documents` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub filename: String,
    pub size: u64,
    pub upload_time: String,
}

/// Response body for `GET /documents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentEntry>,
    pub total_documents: usize,
    pub total_chunks: i64,
}

/// Response body for `GET /stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub num_chunks: i64,
    pub index_ready: bool,
    pub model: String,
    pub embedding_model: String,
}
