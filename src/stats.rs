//! Indexed-content summary for the `stats` CLI command.
//!
//! Gives a quick view of what's indexed without starting the server:
//! chunk counts, uploaded files, and the active models.

use anyhow::Result;
use walkdir::WalkDir;

use crate::config::{Settings, VectorStoreKind};
use crate::store;

pub async fn run_stats(settings: &Settings) -> Result<()> {
    let vector_store = store::create_store(settings).await?;
    let num_chunks = vector_store.count().await?;

    let mut num_files = 0usize;
    let mut total_bytes = 0u64;
    for entry in WalkDir::new(&settings.upload_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .flatten()
    {
        if entry.file_type().is_file() {
            num_files += 1;
            total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }

    let store_display = match settings.vector_store {
        VectorStoreKind::Sqlite => format!("sqlite ({})", settings.collection_path().display()),
        VectorStoreKind::Memory => "memory".to_string(),
    };

    println!("Ragbox — Index Stats");
    println!("====================");
    println!();
    println!("  Store:            {}", store_display);
    println!("  Chunks:           {}", num_chunks);
    println!("  Index ready:      {}", num_chunks > 0);
    println!();
    println!("  Uploaded files:   {}", num_files);
    println!("  Upload bytes:     {}", format_bytes(total_bytes));
    println!("  Upload dir:       {}", settings.upload_dir.display());
    println!();
    println!("  Model:            {}", settings.ollama_model);
    println!("  Embedding model:  {}", settings.ollama_embedding_model);
    println!();

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
