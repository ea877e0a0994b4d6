//! Ephemeral per-user session attachments (C7).
//!
//! Saved under `{base}/{user_id}/session_attachments/{id}_{safe_filename}`,
//! extracted on demand for one turn's context, never embedded, never given
//! a processed artifact. Removal is by attachment id prefix.

use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::services::extractor::DocumentExtractor;
use crate::services::storage::FileStorage;

#[derive(Debug, Clone, Serialize)]
pub struct SavedAttachment {
    #[serde(rename = "attachmentId")]
    pub attachment_id: String,
    pub filename: String,
    #[serde(skip)]
    pub file_path: std::path::PathBuf,
    pub size: u64,
    pub mime_type: String,
}

/// Extracted content plus the metadata the caller displays.
#[derive(Debug, Clone)]
pub struct AttachmentContent {
    pub text: String,
    pub filename: String,
    pub mime_type: Option<String>,
}

#[derive(Clone)]
pub struct SessionAttachmentHandler {
    storage: FileStorage,
    extractor: DocumentExtractor,
}

/// Keep filenames shell- and path-safe: alphanumerics plus `.`, `-`, `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(['.', '_']).to_string();
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed
    }
}

impl SessionAttachmentHandler {
    pub fn new(storage: FileStorage, extractor: DocumentExtractor) -> Self {
        Self { storage, extractor }
    }

    /// Persist an uploaded file as a session attachment.
    pub async fn save_attachment(
        &self,
        filename: &str,
        bytes: &[u8],
        user_id: i32,
    ) -> Result<SavedAttachment> {
        let attachment_id = Uuid::new_v4().to_string();
        let safe_filename = sanitize_filename(filename);
        let stored_name = format!("{}_{}", attachment_id, safe_filename);
        let file_path = self
            .storage
            .session_attachment_path(user_id, &stored_name)
            .await?;

        fs::write(&file_path, bytes)
            .await
            .map_err(|e| Error::Internal(format!("Failed to save attachment: {}", e)))?;

        let size = self.storage.file_size(&file_path).await?;
        let mime_type = mime_guess::from_path(&file_path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        tracing::info!(
            "Saved session attachment: {} (ID: {}) for user {}",
            stored_name,
            attachment_id,
            user_id
        );

        Ok(SavedAttachment {
            attachment_id,
            filename: filename.to_string(),
            file_path,
            size,
            mime_type,
        })
    }

    async fn find_attachment(
        &self,
        attachment_id: &str,
        user_id: i32,
    ) -> Result<Option<std::path::PathBuf>> {
        let folder = self.storage.session_attachment_folder(user_id);
        let mut entries = match fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        let prefix = format!("{}_", attachment_id);
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Internal(format!("Failed to list attachments: {}", e)))?
        {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Remove an attachment by id. Returns false when nothing matched.
    pub async fn remove_attachment(&self, attachment_id: &str, user_id: i32) -> Result<bool> {
        match self.find_attachment(attachment_id, user_id).await? {
            Some(path) => {
                self.storage.remove_file(&path).await?;
                tracing::info!(
                    "Removed session attachment: {:?} for user {}",
                    path,
                    user_id
                );
                Ok(true)
            }
            None => {
                tracing::warn!(
                    "Session attachment not found for removal: {} (user {})",
                    attachment_id,
                    user_id
                );
                Ok(false)
            }
        }
    }

    /// Extract an attachment's text for context injection. Returns `None`
    /// when the attachment is gone; extraction runs the same pipeline as
    /// corpus files but persists nothing.
    pub async fn get_attachment_content(
        &self,
        attachment_id: &str,
        user_id: i32,
        system_message_id: i32,
    ) -> Result<Option<AttachmentContent>> {
        let Some(path) = self.find_attachment(attachment_id, user_id).await? else {
            tracing::warn!(
                "Session attachment not found: {} (user {})",
                attachment_id,
                user_id
            );
            return Ok(None);
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .and_then(|name| name.split_once('_').map(|(_, rest)| rest.to_string()))
            .unwrap_or_else(|| attachment_id.to_string());
        let mime_type = mime_guess::from_path(&path).first_raw().map(str::to_string);

        let text = self
            .extractor
            .extract_text(&path, user_id, system_message_id, attachment_id)
            .await?;

        Ok(Some(AttachmentContent {
            text,
            filename,
            mime_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::WhisperClient;

    fn handler(base: &std::path::Path) -> SessionAttachmentHandler {
        let storage = FileStorage::new(base.to_str().unwrap());
        let whisper: Option<std::sync::Arc<WhisperClient>> = None;
        let extractor = DocumentExtractor::new(whisper, storage.clone());
        SessionAttachmentHandler::new(storage, extractor)
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("notes.txt"), "notes.txt");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("my report (v2).pdf"), "my_report__v2_.pdf");
        assert_eq!(sanitize_filename("...."), "attachment");
    }

    #[tokio::test]
    async fn save_and_extract_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let saved = handler
            .save_attachment("notes.txt", b"foo\nbar\nbaz", 9)
            .await
            .unwrap();
        assert_eq!(saved.filename, "notes.txt");
        assert_eq!(saved.size, 11);
        assert_eq!(saved.mime_type, "text/plain");

        let content = handler
            .get_attachment_content(&saved.attachment_id, 9, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.text, "foo\nbar\nbaz");
        assert_eq!(content.filename, "notes.txt");
    }

    #[tokio::test]
    async fn remove_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let saved = handler.save_attachment("a.txt", b"x", 3).await.unwrap();
        assert!(handler.remove_attachment(&saved.attachment_id, 3).await.unwrap());
        assert!(!handler.remove_attachment(&saved.attachment_id, 3).await.unwrap());
        assert!(
            handler
                .get_attachment_content(&saved.attachment_id, 3, 1)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn attachments_are_scoped_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path());

        let saved = handler.save_attachment("a.txt", b"mine", 3).await.unwrap();
        assert!(
            handler
                .get_attachment_content(&saved.attachment_id, 4, 1)
                .await
                .unwrap()
                .is_none()
        );
    }
}
