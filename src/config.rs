use anyhow::{Context, Result};
use std::path::PathBuf;

/// Which vector store backs the engine's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStoreKind {
    Sqlite,
    Memory,
}

/// Process-wide settings, resolved once at startup from the environment.
/// Read-only after construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_embedding_model: String,
    pub vector_store: VectorStoreKind,
    pub data_dir: PathBuf,
    pub collection_name: String,
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_file_size: u64,
}

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_COLLECTION_NAME: &str = "documents";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_UPLOAD_DIR: &str = "./uploads";
const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

impl Settings {
    /// Resolve settings from the process environment.
    ///
    /// Every variable has a hard-coded default; malformed integer values
    /// (`PORT`, `MAX_FILE_SIZE`) and unknown `VECTOR_STORE` values are
    /// startup errors rather than silent fallbacks.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ollama_base_url = get("OLLAMA_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let ollama_model =
            get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
        let ollama_embedding_model =
            get("OLLAMA_EMBEDDING_MODEL").unwrap_or_else(|| ollama_model.clone());

        let vector_store = match get("VECTOR_STORE").as_deref() {
            None | Some("sqlite") => VectorStoreKind::Sqlite,
            Some("memory") => VectorStoreKind::Memory,
            Some(other) => anyhow::bail!(
                "Unknown VECTOR_STORE: '{}'. Must be sqlite or memory.",
                other
            ),
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be an integer, got '{}'", raw))?,
            None => DEFAULT_PORT,
        };

        let max_file_size = match get("MAX_FILE_SIZE") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("MAX_FILE_SIZE must be an integer, got '{}'", raw))?,
            None => DEFAULT_MAX_FILE_SIZE,
        };

        Ok(Self {
            ollama_base_url,
            ollama_model,
            ollama_embedding_model,
            vector_store,
            data_dir: PathBuf::from(
                get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            collection_name: get("COLLECTION_NAME")
                .unwrap_or_else(|| DEFAULT_COLLECTION_NAME.to_string()),
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            upload_dir: PathBuf::from(
                get("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            max_file_size,
        })
    }

    /// Create the data and upload directories, parents included.
    /// Succeeds silently if they already exist.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create data dir: {}", self.data_dir.display()))?;
        std::fs::create_dir_all(&self.upload_dir).with_context(|| {
            format!("Failed to create upload dir: {}", self.upload_dir.display())
        })?;
        Ok(())
    }

    /// Path of the SQLite collection file under the data directory.
    pub fn collection_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite", self.collection_name))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
