//! Document extraction (C3): turn an uploaded file into plain text.
//!
//! PDFs go through the external LLMWhisperer service; anything else is read
//! as text directly. The raw extractor response is persisted next to the
//! other per-file artifacts for auditing.

use std::path::Path;
use std::sync::Arc;

use tokio::fs;

use crate::clients::WhisperClient;
use crate::error::{Error, Result};
use crate::services::storage::{ArtifactKind, FileStorage};

#[derive(Clone)]
pub struct DocumentExtractor {
    whisper: Option<Arc<WhisperClient>>,
    storage: FileStorage,
}

impl DocumentExtractor {
    pub fn new(whisper: Option<Arc<WhisperClient>>, storage: FileStorage) -> Self {
        Self { whisper, storage }
    }

    /// Extract plain text from a file on disk.
    pub async fn extract_text(
        &self,
        file_path: &Path,
        user_id: i32,
        system_message_id: i32,
        file_id: &str,
    ) -> Result<String> {
        let is_pdf = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            self.extract_pdf(file_path, user_id, system_message_id, file_id)
                .await
        } else {
            read_text_lossy(file_path).await
        }
    }

    async fn extract_pdf(
        &self,
        file_path: &Path,
        user_id: i32,
        system_message_id: i32,
        file_id: &str,
    ) -> Result<String> {
        let whisper = self.whisper.as_ref().ok_or_else(|| {
            Error::Provider("Document extractor is not configured (LLMWHISPERER_API_KEY)".to_string())
        })?;

        let bytes = fs::read(file_path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to read {:?}: {}", file_path, e)))?;

        tracing::info!("Submitting {:?} to document extractor", file_path);
        let extraction = whisper.extract(bytes).await?;

        // Keep the full service response for later inspection
        let output_path = self
            .storage
            .artifact_path(
                user_id,
                system_message_id,
                ArtifactKind::WhisperOutput,
                &format!("{}_llmwhisperer_output.txt", file_id),
            )
            .await?;
        if let Err(e) = fs::write(&output_path, &extraction.raw_response).await {
            tracing::warn!("Failed to persist extractor output {:?}: {}", output_path, e);
        }

        Ok(extraction.text)
    }
}

/// Read a file as UTF-8, falling back to a latin-1 interpretation so a
/// stray byte never fails the whole attachment.
pub async fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| Error::Internal(format!("Failed to read {:?}: {}", path, e)))?;
    Ok(decode_lossy(&bytes))
}

fn decode_lossy(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_lossy_passes_utf8_through() {
        assert_eq!(decode_lossy("foo\nbar\nbaz".as_bytes()), "foo\nbar\nbaz");
    }

    #[test]
    fn decode_lossy_falls_back_to_latin1() {
        let bytes = vec![0x63, 0x61, 0x66, 0xE9]; // "café" in latin-1
        assert_eq!(decode_lossy(&bytes), "café");
    }
}
