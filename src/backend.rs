//! Language backend abstraction and the Ollama implementation.
//!
//! The engine talks to its embedding/generation backend through the
//! [`LanguageBackend`] trait, so tests can inject a stub and the HTTP
//! client stays out of the orchestration logic.
//!
//! [`OllamaBackend`] calls an Ollama-compatible server:
//! - `POST /api/embeddings` with `{model, prompt}` for embedding vectors
//! - `POST /api/generate` with `{model, prompt, ...}` for completions
//!
//! There is no retry or backoff; a transient failure surfaces immediately
//! to the caller. Generation calls carry a fixed generous timeout.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Settings;

/// Fixed timeout on backend HTTP calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Sampling temperature for answer generation.
const GENERATION_TEMPERATURE: f32 = 0.7;

/// Embedding and text-generation backend used by the engine.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    /// Generation model identifier.
    fn model_name(&self) -> &str;
    /// Embedding model identifier.
    fn embedding_model_name(&self) -> &str;
    /// Embed a single text into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// Generate a completion for a prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
    /// Minimal liveness check against the generation endpoint.
    async fn probe(&self) -> Result<()>;
}

// ============ Wire types ============

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

// ============ Ollama backend ============

/// [`LanguageBackend`] over an Ollama-compatible HTTP API.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OllamaBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.ollama_base_url.clone(),
            model: settings.ollama_model.clone(),
            embedding_model: settings.ollama_embedding_model.clone(),
        })
    }

    async fn generate(&self, prompt: &str, options: Option<GenerateOptions>) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama generate error {}: {}", status, text);
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl LanguageBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn embedding_model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama embeddings error {}: {}", status, text);
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            bail!("Ollama returned an empty embedding");
        }
        Ok(parsed.embedding)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(
            prompt,
            Some(GenerateOptions {
                temperature: Some(GENERATION_TEMPERATURE),
                num_predict: None,
            }),
        )
        .await
    }

    async fn probe(&self) -> Result<()> {
        // One-token completion; cheapest call that proves the model loads.
        self.generate(
            "test",
            Some(GenerateOptions {
                temperature: None,
                num_predict: Some(1),
            }),
        )
        .await
        .map(|_| ())
    }
}
