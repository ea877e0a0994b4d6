//! Document ingestion and semantic retrieval (C5).
//!
//! Ingest: extract -> chunk (512-token windows, 50-token overlap) -> embed
//! -> upsert into the system message's namespace, carrying `file_id` in
//! every chunk's metadata. Retrieval: top_k 5 with a 0.70 similarity
//! cutoff, formatted with per-chunk source markers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::clients::pinecone::VectorRecord;
use crate::error::{Error, Result};
use crate::services::embedding_store::EmbeddingStore;
use crate::services::extractor::DocumentExtractor;
use crate::services::storage::{ArtifactKind, FileStorage};
use crate::services::tokens;

pub const SIMILARITY_TOP_K: usize = 5;
pub const SIMILARITY_CUTOFF: f32 = 0.70;

/// Metadata key carrying the chunk text in the vector store.
pub const CONTENT_KEY: &str = "content";
/// Metadata key tying a chunk back to its uploaded file.
pub const FILE_ID_KEY: &str = "file_id";

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub file_id: String,
    pub score: f32,
    pub text: String,
}

/// Split text into overlapping token windows under cl100k_base.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![];
    }
    if chunk_size == 0 {
        return vec![text.to_string()];
    }

    let bpe = tokens::cl100k();
    let encoded = bpe.encode_ordinary(text);
    let n = encoded.len();

    let mut chunks = Vec::new();
    let advance = chunk_size.saturating_sub(overlap).max(1);
    let mut start = 0;
    while start < n {
        let end = (start + chunk_size).min(n);
        match bpe.decode(encoded[start..end].to_vec()) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => tracing::warn!("Skipping undecodable chunk at offset {}: {}", start, e),
        }
        if end == n {
            break;
        }
        start += advance;
    }
    chunks
}

/// Filter hits by the similarity cutoff and format the survivors. Returns
/// `None` when nothing clears the threshold.
pub fn format_retrieved(hits: &[RetrievedChunk]) -> Option<String> {
    let retrieved: Vec<String> = hits
        .iter()
        .filter(|hit| hit.score >= SIMILARITY_CUTOFF)
        .filter(|hit| !hit.text.trim().is_empty())
        .map(|hit| {
            format!(
                "[Source: Document {}, Relevance: {:.2}]\n{}",
                hit.file_id,
                hit.score,
                hit.text.trim()
            )
        })
        .collect();

    if retrieved.is_empty() {
        None
    } else {
        Some(retrieved.join("\n\n---\n\n"))
    }
}

#[derive(Clone)]
pub struct FileProcessor {
    embedding_store: EmbeddingStore,
    extractor: DocumentExtractor,
    storage: FileStorage,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FileProcessor {
    pub fn new(
        embedding_store: EmbeddingStore,
        extractor: DocumentExtractor,
        storage: FileStorage,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            embedding_store,
            extractor,
            storage,
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn extractor(&self) -> &DocumentExtractor {
        &self.extractor
    }

    /// Ingest an uploaded file: extract, chunk, embed, upsert, and persist
    /// the concatenated text. Returns the processed-text path.
    pub async fn process_file(
        &self,
        file_path: &Path,
        file_id: &str,
        user_id: i32,
        system_message_id: i32,
    ) -> Result<PathBuf> {
        tracing::info!("Processing file: {:?}", file_path);
        let text = self
            .extractor
            .extract_text(file_path, user_id, system_message_id, file_id)
            .await?;

        // Chunking walks the whole token stream; keep it off the scheduler.
        let chunk_size = self.chunk_size;
        let chunk_overlap = self.chunk_overlap;
        let text_for_chunking = text.clone();
        let chunks = tokio::task::spawn_blocking(move || {
            chunk_text(&text_for_chunking, chunk_size, chunk_overlap)
        })
        .await
        .map_err(|e| Error::Internal(format!("Chunking task failed: {}", e)))?;

        tracing::info!("Created {} chunks from {:?}", chunks.len(), file_path);

        if !chunks.is_empty() {
            let namespace = self.embedding_store.namespace(system_message_id);
            let mut records = Vec::with_capacity(chunks.len());
            for (i, chunk) in chunks.iter().enumerate() {
                let values = self.embedding_store.embed(chunk).await?;
                let mut metadata = HashMap::new();
                metadata.insert(FILE_ID_KEY.to_string(), file_id.to_string());
                metadata.insert(CONTENT_KEY.to_string(), chunk.clone());
                records.push(VectorRecord {
                    id: format!("{}-{}", file_id, i),
                    values,
                    metadata,
                });
            }
            self.embedding_store
                .pinecone()?
                .upsert(&namespace, records)
                .await?;
        }

        let processed_path = self
            .storage
            .artifact_path(
                user_id,
                system_message_id,
                ArtifactKind::ProcessedTexts,
                &format!("{}_processed.txt", file_id),
            )
            .await?;
        fs::write(&processed_path, format!("{}\n\n", text.trim_end()))
            .await
            .map_err(|e| {
                Error::Internal(format!("Failed to save processed text {:?}: {}", processed_path, e))
            })?;

        tracing::info!("Processed text saved to: {:?}", processed_path);
        Ok(processed_path)
    }

    /// Semantic retrieval against a system message's namespace. Store
    /// errors surface as `Err`; the orchestrator degrades them to "no
    /// relevant context".
    pub async fn query_index(
        &self,
        query_text: &str,
        system_message_id: i32,
    ) -> Result<Option<String>> {
        if !self.embedding_store.is_enabled() {
            return Ok(None);
        }

        let namespace = self.embedding_store.namespace(system_message_id);
        let query_vector = self.embedding_store.embed(query_text).await?;
        let matches = self
            .embedding_store
            .pinecone()?
            .query(&namespace, query_vector, SIMILARITY_TOP_K, true)
            .await?;

        let hits: Vec<RetrievedChunk> = matches
            .into_iter()
            .filter_map(|m| {
                let metadata = m.metadata?;
                Some(RetrievedChunk {
                    file_id: metadata
                        .get(FILE_ID_KEY)
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string()),
                    score: m.score,
                    text: metadata.get(CONTENT_KEY).cloned().unwrap_or_default(),
                })
            })
            .collect();

        let formatted = format_retrieved(&hits);
        if formatted.is_some() {
            tracing::info!("Retrieved relevant content from namespace {}", namespace);
        } else {
            tracing::info!("No text chunks met the similarity threshold");
        }
        Ok(formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(file_id: &str, score: f32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            file_id: file_id.to_string(),
            score,
            text: text.to_string(),
        }
    }

    #[test]
    fn chunks_overlap_and_cover_the_text() {
        let text = "alpha beta gamma delta ".repeat(200);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(tokens::count_text_tokens(chunk) <= 50);
        }
        // Token prefixes decode to string prefixes, so the first chunk
        // opens the document, and the overlap means the chunks together
        // carry more tokens than the source.
        assert!(text.starts_with(&chunks[0]));
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(total > text.len());
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", 512, 50).is_empty());
        assert!(chunk_text("   \n", 512, 50).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("alpha beta gamma", 512, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "alpha beta gamma");
    }

    #[test]
    fn format_filters_below_cutoff() {
        let hits = vec![hit("a", 0.65, "low"), hit("b", 0.69, "still low")];
        assert!(format_retrieved(&hits).is_none());
    }

    #[test]
    fn format_includes_source_markers() {
        let hits = vec![hit("doc-1", 0.91, "alpha beta"), hit("doc-2", 0.72, "gamma")];
        let formatted = format_retrieved(&hits).unwrap();
        assert!(formatted.contains("[Source: Document doc-1, Relevance: 0.91]"));
        assert!(formatted.contains("[Source: Document doc-2, Relevance: 0.72]"));
        assert!(formatted.contains("\n\n---\n\n"));
        assert!(formatted.contains("alpha beta"));
    }

    #[test]
    fn format_keeps_only_survivors() {
        let hits = vec![hit("keep", 0.8, "kept text"), hit("drop", 0.3, "dropped")];
        let formatted = format_retrieved(&hits).unwrap();
        assert!(formatted.contains("kept text"));
        assert!(!formatted.contains("dropped"));
    }

    #[test]
    fn format_skips_empty_chunks() {
        let hits = vec![hit("a", 0.9, "   ")];
        assert!(format_retrieved(&hits).is_none());
    }
}
