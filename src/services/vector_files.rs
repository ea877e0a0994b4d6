//! VectorDB file management (C6): uploads into a system message's corpus,
//! serving originals and processed text, and deletion of a file together
//! with its vectors.

use std::path::Path;

use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::DbConn;
use crate::error::{Error, Result};
use crate::models::uploaded_files::UploadedFile;
use crate::queries::uploaded_files as file_queries;
use crate::services::embedding_store::EmbeddingStore;
use crate::services::file_processor::{FILE_ID_KEY, FileProcessor};
use crate::services::storage::{ArtifactKind, FileStorage};

/// Serverless index tiers reject metadata-filter deletes, so deletion
/// queries the namespace wide and filters client-side. 10k covers any
/// realistic per-namespace chunk count.
const DELETE_SCAN_TOP_K: usize = 10000;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeletionDetails {
    pub vectors_deleted: bool,
    pub original_file_deleted: bool,
    pub processed_file_deleted: bool,
    pub database_entry_deleted: bool,
}

impl DeletionDetails {
    fn complete(&self) -> bool {
        self.vectors_deleted
            && self.original_file_deleted
            && self.processed_file_deleted
            && self.database_entry_deleted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovalOutcome {
    pub success: bool,
    pub message: String,
    pub details: DeletionDetails,
}

#[derive(Clone)]
pub struct VectorFileManager {
    processor: FileProcessor,
    embedding_store: EmbeddingStore,
    storage: FileStorage,
}

impl VectorFileManager {
    pub fn new(
        processor: FileProcessor,
        embedding_store: EmbeddingStore,
        storage: FileStorage,
    ) -> Self {
        Self {
            processor,
            embedding_store,
            storage,
        }
    }

    async fn get_owned_file(
        &self,
        conn: &mut DbConn,
        file_id: &str,
        user_id: i32,
    ) -> Result<UploadedFile> {
        let file = file_queries::get_by_id(conn, file_id)
            .await?
            .ok_or_else(|| Error::NotFound("File not found".to_string()))?;
        if file.user_id != user_id {
            return Err(Error::Forbidden("Unauthorized".to_string()));
        }
        Ok(file)
    }

    /// Persist an upload, record it, and run it through the ingestion
    /// pipeline. The row is created first so the vector chunks can carry
    /// its id.
    pub async fn upload_file(
        &self,
        conn: &mut DbConn,
        filename: &str,
        bytes: &[u8],
        mime_type: Option<&str>,
        user_id: i32,
        system_message_id: i32,
    ) -> Result<UploadedFile> {
        if filename.is_empty() {
            return Err(Error::Validation("No selected file".to_string()));
        }

        let safe_filename = crate::services::session_attachments::sanitize_filename(filename);
        let file_path = self
            .storage
            .artifact_path(user_id, system_message_id, ArtifactKind::Uploads, &safe_filename)
            .await?;
        fs::write(&file_path, bytes)
            .await
            .map_err(|e| Error::Internal(format!("Failed to save upload: {}", e)))?;

        let file_size = self.storage.file_size(&file_path).await? as i64;
        let file_id = Uuid::new_v4().to_string();
        let file = file_queries::insert(
            conn,
            &file_id,
            user_id,
            &safe_filename,
            &file_path.to_string_lossy(),
            system_message_id,
            file_size,
            mime_type,
        )
        .await?;

        match self
            .processor
            .process_file(&file_path, &file.id, user_id, system_message_id)
            .await
        {
            Ok(processed_path) => {
                file_queries::set_processed_text_path(
                    conn,
                    &file.id,
                    &processed_path.to_string_lossy(),
                )
                .await?;
            }
            Err(e) => {
                tracing::error!("Error processing file: {}", e);
                let _ = self.storage.remove_file(&file_path).await;
                let _ = file_queries::delete(conn, &file.id).await;
                return Err(Error::Internal(format!("Error processing file: {}", e)));
            }
        }

        Ok(file)
    }

    /// Embed-HTML viewer for the original document.
    pub async fn get_original_file_html(
        &self,
        conn: &mut DbConn,
        file_id: &str,
        user_id: i32,
    ) -> Result<String> {
        let file = self.get_owned_file(conn, file_id, user_id).await?;
        if !self.storage.file_exists(Path::new(&file.file_path)).await {
            return Err(Error::NotFound("File not found on disk".to_string()));
        }

        Ok(format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        html, body {{ margin: 0; padding: 0; height: 100%; overflow: hidden; }}
        #file-embed {{ width: 100%; height: 100%; border: none; }}
    </style>
</head>
<body>
    <embed id="file-embed" src="/api/v1/vector-files/{file_id}/serve" type="{mime}">
    <script>
        function resizeEmbed() {{
            var embed = document.getElementById('file-embed');
            embed.style.height = window.innerHeight + 'px';
        }}
        window.onload = resizeEmbed;
        window.onresize = resizeEmbed;
    </script>
</body>
</html>
"#,
            title = file.original_filename,
            file_id = file.id,
            mime = file.mime_type.as_deref().unwrap_or("application/octet-stream"),
        ))
    }

    /// Raw bytes of the original, with its stored mime type and filename.
    pub async fn get_file_bytes(
        &self,
        conn: &mut DbConn,
        file_id: &str,
        user_id: i32,
    ) -> Result<(Vec<u8>, String, String)> {
        let file = self.get_owned_file(conn, file_id, user_id).await?;
        if !self.storage.file_exists(Path::new(&file.file_path)).await {
            return Err(Error::NotFound("File not found on disk".to_string()));
        }
        let bytes = fs::read(&file.file_path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to read file: {}", e)))?;
        let mime = file
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok((bytes, mime, file.original_filename))
    }

    /// The extracted text, if processing produced one.
    pub async fn get_processed_text(
        &self,
        conn: &mut DbConn,
        file_id: &str,
        user_id: i32,
    ) -> Result<(String, String)> {
        let file = self.get_owned_file(conn, file_id, user_id).await?;
        let processed_path = file
            .processed_text_path
            .ok_or_else(|| Error::NotFound("Processed text not available".to_string()))?;
        if !self.storage.file_exists(Path::new(&processed_path)).await {
            return Err(Error::NotFound("Processed text not available".to_string()));
        }
        let content = fs::read_to_string(&processed_path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to read processed text: {}", e)))?;
        Ok((content, format!("{}_processed.txt", file.original_filename)))
    }

    /// Delete a file's vectors, its on-disk artifacts, and finally its row.
    /// Each step is attempted and reported; the DB deletion goes last so a
    /// partial failure stays visible.
    pub async fn remove_file(
        &self,
        conn: &mut DbConn,
        file_id: &str,
        user_id: i32,
    ) -> Result<RemovalOutcome> {
        let file = self.get_owned_file(conn, file_id, user_id).await?;
        let mut details = DeletionDetails::default();

        let namespace = self.embedding_store.namespace(file.system_message_id);
        match self.delete_vectors_for_file(file_id, &namespace).await {
            Ok(deleted) => {
                details.vectors_deleted = deleted;
                tracing::info!(
                    "Vector deletion {} for file {}",
                    if deleted { "successful" } else { "not needed" },
                    file_id
                );
            }
            Err(e) => tracing::error!("Error deleting vectors: {}", e),
        }

        match self.storage.remove_file(Path::new(&file.file_path)).await {
            Ok(removed) => {
                details.original_file_deleted = removed;
                if !removed {
                    tracing::warn!("Original file not found: {}", file.file_path);
                }
            }
            Err(e) => tracing::error!("Error deleting original file: {}", e),
        }

        if let Some(processed_path) = &file.processed_text_path {
            match self.storage.remove_file(Path::new(processed_path)).await {
                Ok(removed) => details.processed_file_deleted = removed,
                Err(e) => tracing::error!("Error deleting processed file: {}", e),
            }
        }

        details.database_entry_deleted = file_queries::delete(conn, file_id).await?;

        let message = if details.complete() {
            "File and associated resources removed successfully".to_string()
        } else {
            "File partially removed with some errors".to_string()
        };
        tracing::info!("File removal completed for {}: {:?}", file_id, details);

        Ok(RemovalOutcome {
            success: true,
            message,
            details,
        })
    }

    /// Scan the namespace with a zero vector and delete the ids whose
    /// metadata ties them to this file. Returns false when no vectors
    /// matched.
    pub async fn delete_vectors_for_file(&self, file_id: &str, namespace: &str) -> Result<bool> {
        if file_id.is_empty() {
            return Err(Error::Validation("file_id cannot be empty".to_string()));
        }
        let pinecone = self.embedding_store.pinecone()?;

        let zero_vector = vec![0.0; self.embedding_store.dimension()];
        let matches = pinecone
            .query(namespace, zero_vector, DELETE_SCAN_TOP_K, true)
            .await?;

        let vector_ids: Vec<String> = matches
            .into_iter()
            .filter(|m| {
                m.metadata
                    .as_ref()
                    .and_then(|meta| meta.get(FILE_ID_KEY))
                    .is_some_and(|id| id == file_id)
            })
            .map(|m| m.id)
            .collect();

        if vector_ids.is_empty() {
            tracing::warn!(
                "No vectors found for file ID: {} in namespace: {}",
                file_id,
                namespace
            );
            return Ok(false);
        }

        pinecone.delete_ids(namespace, &vector_ids).await?;
        tracing::info!(
            "Successfully deleted {} vectors for file ID: {}",
            vector_ids.len(),
            file_id
        );
        Ok(true)
    }
}
