//! # Ragbox CLI
//!
//! The `ragbox` binary runs the document Q&A service and a few
//! maintenance commands. All configuration comes from environment
//! variables (a local `.env` file is honored).
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragbox serve` | Start the HTTP API server |
//! | `ragbox init` | Create the data/upload directories and the collection |
//! | `ragbox stats` | Print an indexed-content summary |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use ragbox::backend::OllamaBackend;
use ragbox::config::{Settings, VectorStoreKind};
use ragbox::engine::RagEngine;
use ragbox::store;
use ragbox::store::sqlite::SqliteStore;
use ragbox::{server, stats};

/// Ragbox — a retrieval-augmented document Q&A service backed by Ollama.
#[derive(Parser)]
#[command(
    name = "ragbox",
    about = "Ragbox — a retrieval-augmented document Q&A service backed by Ollama",
    version,
    long_about = "Ragbox ingests uploaded documents, chunks and embeds them through an \
    Ollama-compatible backend, stores the vectors, and answers natural-language questions \
    over HTTP by retrieving the most relevant chunks and generating an answer from them."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Binds to `HOST:PORT` and serves the upload, query, chat, and
    /// management endpoints until the process is terminated.
    Serve,

    /// Create the data and upload directories and the collection file.
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// Print a summary of the indexed content.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Serve => {
            settings.ensure_directories()?;
            let settings = Arc::new(settings);
            let backend = Arc::new(OllamaBackend::new(&settings)?);
            let vector_store = store::create_store(&settings).await?;
            let engine =
                Arc::new(RagEngine::new(settings.clone(), backend, vector_store).await?);
            server::run_server(settings, engine).await?;
        }
        Commands::Init => {
            settings.ensure_directories()?;
            if settings.vector_store == VectorStoreKind::Sqlite {
                SqliteStore::connect(&settings.collection_path()).await?;
            }
            println!("Initialized successfully.");
        }
        Commands::Stats => {
            stats::run_stats(&settings).await?;
        }
    }

    Ok(())
}
