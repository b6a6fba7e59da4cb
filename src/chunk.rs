//! Sliding-window text chunker.
//!
//! Splits document body text into [`Chunk`]s of roughly `max_tokens` with
//! `overlap_tokens` of trailing text repeated at the start of the next
//! chunk, so retrieval does not lose context at span boundaries.
//!
//! Each chunk carries a fresh UUID, its parent document id, a contiguous
//! index starting at 0, and a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A contiguous span of a document's text, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Split text into overlapping chunks on word boundaries.
///
/// Whitespace-only input yields no chunks. Words longer than the chunk
/// budget are hard-split. Indices are contiguous starting at 0.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    let words = split_words(text, max_chars);
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut start = 0usize;

    while start < words.len() {
        let mut end = start;
        let mut len = 0usize;
        while end < words.len() {
            let word_len = words[end].chars().count();
            let would_be = if len == 0 { word_len } else { len + 1 + word_len };
            if would_be > max_chars && len > 0 {
                break;
            }
            len = would_be;
            end += 1;
        }

        chunks.push(make_chunk(
            document_id,
            chunk_index,
            &words[start..end].join(" "),
        ));
        chunk_index += 1;

        if end >= words.len() {
            break;
        }

        // Back up far enough to repeat ~overlap_chars of trailing text,
        // always keeping forward progress.
        let mut overlap_start = end;
        let mut carried = 0usize;
        while overlap_start > start + 1 {
            let word_len = words[overlap_start - 1].chars().count() + 1;
            if carried + word_len > overlap_chars {
                break;
            }
            carried += word_len;
            overlap_start -= 1;
        }
        start = overlap_start;
    }

    chunks
}

/// Split into whitespace-delimited words, hard-splitting any single word
/// that exceeds the chunk budget.
fn split_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut words = Vec::new();
    for word in text.split_whitespace() {
        if word.chars().count() <= max_chars {
            words.push(word.to_string());
        } else {
            let cs: Vec<char> = word.chars().collect();
            for piece in cs.chunks(max_chars) {
                words.push(piece.iter().collect());
            }
        }
    }
    words
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
