//! Retrieval-augmented generation engine.
//!
//! Orchestrates the full answer pipeline: document loading → chunking →
//! embedding → vector storage on ingest, and embedding → similarity
//! search → answer synthesis on query. The embedding/generation backend
//! and the vector store are injected at construction.
//!
//! # Index lifecycle
//!
//! The engine tracks one piece of state, index presence, with two states:
//! **empty** and **populated**.
//!
//! - Startup resumes **populated** when the store already holds chunks.
//! - The first ingest that produces at least one chunk moves to
//!   **populated**; later ingests insert incrementally.
//! - Clear empties the store and returns to **empty**.
//! - A query in **empty** returns a fixed no-documents answer without
//!   touching the backend. A guard, not a failure.
//!
//! Ingest and clear serialize on an internal mutex, so a query racing a
//! clear observes either the pre-clear or the post-clear collection,
//! never a half reset.
//!
//! # Failure contract
//!
//! Query failures never escape: any backend or store error on the query
//! path is folded into the answer body with an error flag in the
//! metadata. Ingest and clear propagate errors to the caller.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::backend::LanguageBackend;
use crate::chunk::chunk_text;
use crate::config::Settings;
use crate::extract;
use crate::models::{ChatMessage, QueryResponse, StatsResponse};
use crate::store::{EmbeddedChunk, ScoredChunk, VectorStore};

/// Chunking parameters applied to every ingested document.
const CHUNK_MAX_TOKENS: usize = 512;
const CHUNK_OVERLAP_TOKENS: usize = 50;

/// How many trailing conversation turns feed into the prompt.
const HISTORY_WINDOW: usize = 5;

/// Source excerpts are cut to this many characters, marker excluded.
const SOURCE_PREVIEW_CHARS: usize = 300;

/// Character budget for retrieved context per generation call.
const MAX_CONTEXT_CHARS: usize = 12_000;

/// Fixed answer returned while no documents are indexed.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been uploaded yet. Please upload documents first.";

/// Outcome of an ingest run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub num_documents: usize,
    pub num_chunks: usize,
}

/// Result of probing one external dependency.
#[derive(Debug, Clone)]
pub enum ComponentHealth {
    Ok,
    Unreachable(String),
}

impl ComponentHealth {
    pub fn is_ok(&self) -> bool {
        matches!(self, ComponentHealth::Ok)
    }
}

/// Aggregated health probe results.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub backend: ComponentHealth,
    pub store: ComponentHealth,
    pub index_ready: bool,
}

pub struct RagEngine {
    settings: Arc<Settings>,
    backend: Arc<dyn LanguageBackend>,
    store: Arc<dyn VectorStore>,
    index_ready: RwLock<bool>,
    /// Serializes ingest and clear against each other.
    write_lock: Mutex<()>,
}

impl RagEngine {
    /// Construct the engine, resuming a previously built index when the
    /// store already holds chunks.
    pub async fn new(
        settings: Arc<Settings>,
        backend: Arc<dyn LanguageBackend>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let existing = store.count().await.context("Failed to inspect the vector store")?;
        if existing > 0 {
            println!("Resuming index with {} existing chunks", existing);
        }

        Ok(Self {
            settings,
            backend,
            store,
            index_ready: RwLock::new(existing > 0),
            write_lock: Mutex::new(()),
        })
    }

    /// Load, chunk, embed, and store the given files.
    ///
    /// Missing paths are skipped. Fails without mutating state when no
    /// document loads or no chunk results.
    pub async fn ingest<P: AsRef<Path>>(&self, paths: &[P]) -> Result<IngestReport> {
        let _guard = self.write_lock.lock().await;

        let mut documents = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            let text = extract::load_document(path)
                .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
            documents.push(text);
        }

        if documents.is_empty() {
            bail!("No valid documents found");
        }

        let mut chunks = Vec::new();
        for text in &documents {
            let doc_id = Uuid::new_v4().to_string();
            chunks.extend(chunk_text(
                &doc_id,
                text,
                CHUNK_MAX_TOKENS,
                CHUNK_OVERLAP_TOKENS,
            ));
        }

        if chunks.is_empty() {
            bail!("No text could be extracted from the documents");
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = self
                .backend
                .embed(&chunk.text)
                .await
                .context("Embedding failed")?;
            embedded.push(EmbeddedChunk {
                id: chunk.id,
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                hash: chunk.hash,
                vector,
            });
        }

        self.store.insert(&embedded).await?;
        *self.index_ready.write().await = true;

        println!(
            "Ingested {} document(s) into {} chunks",
            documents.len(),
            embedded.len()
        );

        Ok(IngestReport {
            num_documents: documents.len(),
            num_chunks: embedded.len(),
        })
    }

    /// Answer a query against the indexed documents.
    ///
    /// Never fails: errors on this path become the answer text with an
    /// error flag in the metadata.
    pub async fn query(
        &self,
        query_text: &str,
        top_k: usize,
        history: &[ChatMessage],
    ) -> QueryResponse {
        if !*self.index_ready.read().await {
            return QueryResponse {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
                metadata: serde_json::json!({ "error": "No index available" }),
            };
        }

        let full_query = build_query_prompt(query_text, history);

        match self.answer(&full_query, top_k).await {
            Ok((answer, sources)) => QueryResponse {
                metadata: serde_json::json!({
                    "model": self.settings.ollama_model,
                    "num_sources": sources.len(),
                    "top_k": top_k,
                }),
                answer,
                sources,
            },
            Err(e) => QueryResponse {
                answer: format!("Error processing query: {}", e),
                sources: Vec::new(),
                metadata: serde_json::json!({ "error": e.to_string() }),
            },
        }
    }

    async fn answer(&self, full_query: &str, top_k: usize) -> Result<(String, Vec<String>)> {
        let query_vec = self.backend.embed(full_query).await?;
        let hits = self.store.search(&query_vec, top_k).await?;

        if hits.is_empty() {
            return Ok((NO_DOCUMENTS_ANSWER.to_string(), Vec::new()));
        }

        let answer = self.synthesize(full_query, &hits).await?;
        let sources = hits.iter().map(|h| truncate_source(&h.text)).collect();

        Ok((answer, sources))
    }

    /// Compact synthesis: retrieved texts are packed into as few context
    /// windows as the character budget allows, one generation call per
    /// window, plus a final combine call when more than one window was
    /// needed.
    async fn synthesize(&self, question: &str, hits: &[ScoredChunk]) -> Result<String> {
        let windows = pack_windows(hits, MAX_CONTEXT_CHARS);

        let mut partials = Vec::with_capacity(windows.len());
        for window in &windows {
            let prompt = build_context_prompt(question, window);
            partials.push(self.backend.complete(&prompt).await?);
        }

        if partials.len() == 1 {
            Ok(partials.remove(0))
        } else {
            let prompt = build_combine_prompt(question, &partials);
            self.backend.complete(&prompt).await
        }
    }

    /// Empty the store and drop the index reference.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.clear().await.context("Failed to clear the vector store")?;
        *self.index_ready.write().await = false;
        Ok(())
    }

    /// Chunk count, index readiness, and active model names.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let num_chunks = self.store.count().await?;
        Ok(StatsResponse {
            num_chunks,
            index_ready: *self.index_ready.read().await,
            model: self.settings.ollama_model.clone(),
            embedding_model: self.settings.ollama_embedding_model.clone(),
        })
    }

    /// Probe each external dependency independently. Probe failures are
    /// reported per component, never propagated.
    pub async fn health(&self) -> HealthReport {
        let backend = match self.backend.probe().await {
            Ok(()) => ComponentHealth::Ok,
            Err(e) => ComponentHealth::Unreachable(e.to_string()),
        };
        let store = match self.store.count().await {
            Ok(_) => ComponentHealth::Ok,
            Err(e) => ComponentHealth::Unreachable(e.to_string()),
        };

        HealthReport {
            backend,
            store,
            index_ready: *self.index_ready.read().await,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }
}

/// Prepend the trailing conversation window to the query text.
///
/// Turns render as `"role: content"` lines, oldest retained turn first.
fn build_query_prompt(query: &str, history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return query.to_string();
    }

    let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let lines: Vec<String> = window
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect();

    format!(
        "Previous conversation:\n{}\n\nCurrent question: {}",
        lines.join("\n"),
        query
    )
}

/// Pack retrieved chunks into context windows of at most `budget` chars,
/// preserving retrieval order. Every window holds at least one chunk.
fn pack_windows(hits: &[ScoredChunk], budget: usize) -> Vec<Vec<&ScoredChunk>> {
    let mut windows: Vec<Vec<&ScoredChunk>> = Vec::new();
    let mut current: Vec<&ScoredChunk> = Vec::new();
    let mut used = 0usize;

    for hit in hits {
        let len = hit.text.chars().count();
        if !current.is_empty() && used + len > budget {
            windows.push(std::mem::take(&mut current));
            used = 0;
        }
        used += len;
        current.push(hit);
    }
    if !current.is_empty() {
        windows.push(current);
    }

    windows
}

fn build_context_prompt(question: &str, window: &[&ScoredChunk]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the context below. \
         If the context does not contain the answer, say so.\n\nContext:\n",
    );
    for (i, hit) in window.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, hit.text));
    }
    prompt.push_str(&format!("\nQuestion: {}\nAnswer:", question));
    prompt
}

fn build_combine_prompt(question: &str, partials: &[String]) -> String {
    let mut prompt = String::from(
        "Combine the following partial answers into one final answer to the question.\n\n",
    );
    for (i, partial) in partials.iter().enumerate() {
        prompt.push_str(&format!("Partial answer {}:\n{}\n\n", i + 1, partial));
    }
    prompt.push_str(&format!("Question: {}\nFinal answer:", question));
    prompt
}

/// First 300 characters of a source excerpt, truncation marker always
/// appended.
fn truncate_source(text: &str) -> String {
    let preview: String = text.chars().take(SOURCE_PREVIEW_CHARS).collect();
    format!("{}...", preview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubBackend {
        embed_calls: AtomicUsize,
        complete_calls: AtomicUsize,
        prompts: StdMutex<Vec<String>>,
        fail_complete: bool,
    }

    impl StubBackend {
        fn new() -> Self {
            Self {
                embed_calls: AtomicUsize::new(0),
                complete_calls: AtomicUsize::new(0),
                prompts: StdMutex::new(Vec::new()),
                fail_complete: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_complete: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl LanguageBackend for StubBackend {
        fn model_name(&self) -> &str {
            "stub-model"
        }

        fn embedding_model_name(&self) -> &str {
            "stub-embed"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            // Deterministic toy embedding: byte histogram folded into 8 dims
            let mut v = vec![0.0f32; 8];
            for (i, b) in text.bytes().enumerate() {
                v[i % 8] += b as f32 / 255.0;
            }
            Ok(v)
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail_complete {
                bail!("stub backend unavailable");
            }
            Ok("stub answer".to_string())
        }

        async fn probe(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn make_engine(backend: Arc<StubBackend>) -> RagEngine {
        let settings = Arc::new(Settings::from_lookup(|_| None).unwrap());
        RagEngine::new(settings, backend, Arc::new(MemoryStore::new()))
            .await
            .unwrap()
    }

    fn turn(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_query_on_empty_index_is_guarded() {
        let backend = Arc::new(StubBackend::new());
        let engine = make_engine(backend.clone()).await;

        let resp = engine.query("what is this?", 3, &[]).await;
        assert_eq!(resp.answer, NO_DOCUMENTS_ANSWER);
        assert!(resp.sources.is_empty());
        assert!(resp.metadata.get("error").is_some());
        // The guard must not touch the backend at all
        assert_eq!(backend.embed_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.complete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ingest_then_query() {
        let backend = Arc::new(StubBackend::new());
        let engine = make_engine(backend.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "The billing service retries failed webhooks every five minutes.").unwrap();

        let report = engine.ingest(&[&path]).await.unwrap();
        assert_eq!(report.num_documents, 1);
        assert!(report.num_chunks >= 1);

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.num_chunks, report.num_chunks as i64);
        assert!(stats.index_ready);

        let resp = engine.query("how often do webhooks retry?", 2, &[]).await;
        assert_eq!(resp.answer, "stub answer");
        assert!(!resp.sources.is_empty());
        assert!(resp.sources.len() <= 2);
        for source in &resp.sources {
            assert!(source.chars().count() <= SOURCE_PREVIEW_CHARS + 3);
            assert!(source.ends_with("..."));
        }
        assert_eq!(resp.metadata["num_sources"], resp.sources.len());
    }

    #[tokio::test]
    async fn test_ingest_whitespace_only_fails_without_state_change() {
        let backend = Arc::new(StubBackend::new());
        let engine = make_engine(backend).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "   \n\n  ").unwrap();

        assert!(engine.ingest(&[&path]).await.is_err());
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.num_chunks, 0);
        assert!(!stats.index_ready);
    }

    #[tokio::test]
    async fn test_ingest_skips_missing_paths() {
        let backend = Arc::new(StubBackend::new());
        let engine = make_engine(backend).await;

        let err = engine
            .ingest(&[Path::new("/nonexistent/ghost.txt")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No valid documents"));
    }

    #[tokio::test]
    async fn test_clear_returns_to_empty_state() {
        let backend = Arc::new(StubBackend::new());
        let engine = make_engine(backend.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Notes\n\nSome indexed content here.").unwrap();
        engine.ingest(&[&path]).await.unwrap();

        engine.clear().await.unwrap();

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.num_chunks, 0);
        assert!(!stats.index_ready);

        let complete_before = backend.complete_calls.load(Ordering::SeqCst);
        let resp = engine.query("anything?", 3, &[]).await;
        assert_eq!(resp.answer, NO_DOCUMENTS_ANSWER);
        assert_eq!(backend.complete_calls.load(Ordering::SeqCst), complete_before);
    }

    #[tokio::test]
    async fn test_resume_from_populated_store() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(&[EmbeddedChunk {
                id: "c1".to_string(),
                document_id: "d1".to_string(),
                chunk_index: 0,
                text: "existing chunk".to_string(),
                hash: String::new(),
                vector: vec![1.0; 8],
            }])
            .await
            .unwrap();

        let settings = Arc::new(Settings::from_lookup(|_| None).unwrap());
        let engine = RagEngine::new(settings, Arc::new(StubBackend::new()), store)
            .await
            .unwrap();

        let stats = engine.stats().await.unwrap();
        assert!(stats.index_ready);
        assert_eq!(stats.num_chunks, 1);
    }

    #[tokio::test]
    async fn test_query_failure_becomes_answer_text() {
        let backend = Arc::new(StubBackend::failing());
        let engine = make_engine(backend).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "content that will be indexed fine").unwrap();
        engine.ingest(&[&path]).await.unwrap();

        let resp = engine.query("boom?", 3, &[]).await;
        assert!(resp.answer.starts_with("Error processing query:"));
        assert!(resp.answer.contains("stub backend unavailable"));
        assert!(resp.sources.is_empty());
        assert!(resp.metadata.get("error").is_some());
    }

    #[tokio::test]
    async fn test_chat_history_window_is_last_five_in_order() {
        let backend = Arc::new(StubBackend::new());
        let engine = make_engine(backend.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "chat context document body").unwrap();
        engine.ingest(&[&path]).await.unwrap();

        let history: Vec<ChatMessage> = (1..=7)
            .map(|i| {
                turn(
                    if i % 2 == 1 { "user" } else { "assistant" },
                    &format!("turn number {}", i),
                )
            })
            .collect();

        engine.query("and now?", 3, &history).await;

        let prompts = backend.prompts.lock().unwrap();
        let prompt = prompts.last().unwrap();
        // Only the trailing five turns survive, in original order
        assert!(!prompt.contains("turn number 1"));
        assert!(!prompt.contains("turn number 2"));
        for i in 3..=7 {
            assert!(prompt.contains(&format!("turn number {}", i)));
        }
        let pos5 = prompt.find("turn number 5").unwrap();
        let pos6 = prompt.find("turn number 6").unwrap();
        assert!(pos5 < pos6);
    }

    #[test]
    fn test_build_query_prompt_without_history() {
        assert_eq!(build_query_prompt("plain", &[]), "plain");
    }

    #[test]
    fn test_build_query_prompt_formats_turns() {
        let history = vec![turn("user", "hi"), turn("assistant", "hello")];
        let prompt = build_query_prompt("next", &history);
        assert!(prompt.starts_with("Previous conversation:\n"));
        assert!(prompt.contains("user: hi\nassistant: hello"));
        assert!(prompt.ends_with("Current question: next"));
    }

    #[test]
    fn test_truncate_source_always_appends_marker() {
        assert_eq!(truncate_source("short"), "short...");

        let long = "x".repeat(500);
        let cut = truncate_source(&long);
        assert_eq!(cut.chars().count(), 303);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_pack_windows_respects_budget() {
        let hits: Vec<ScoredChunk> = (0..4)
            .map(|i| ScoredChunk {
                chunk_id: format!("c{}", i),
                document_id: "d".to_string(),
                text: "y".repeat(100),
                score: 1.0,
            })
            .collect();

        // Budget fits two 100-char chunks per window
        let windows = pack_windows(&hits, 200);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].len(), 2);
        assert_eq!(windows[1].len(), 2);

        // A chunk larger than the budget still gets its own window
        let big = vec![ScoredChunk {
            chunk_id: "big".to_string(),
            document_id: "d".to_string(),
            text: "z".repeat(500),
            score: 1.0,
        }];
        let windows = pack_windows(&big, 200);
        assert_eq!(windows.len(), 1);
    }
}
