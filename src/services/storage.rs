//! On-disk layout for per-user artifacts.
//!
//! `{base}/{user_id}/{system_message_id}/{uploads|processed_texts|
//! llmwhisperer_output|web_search_results}/...` for indexed artifacts and
//! `{base}/{user_id}/session_attachments/...` for ephemeral attachments.
//! Directories are created on demand with 0755 permissions.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Uploads,
    ProcessedTexts,
    WhisperOutput,
    WebSearchResults,
}

impl ArtifactKind {
    fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Uploads => "uploads",
            ArtifactKind::ProcessedTexts => "processed_texts",
            ArtifactKind::WhisperOutput => "llmwhisperer_output",
            ArtifactKind::WebSearchResults => "web_search_results",
        }
    }
}

#[derive(Clone)]
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    pub fn new(base_folder: &str) -> Self {
        Self {
            base: PathBuf::from(base_folder),
        }
    }

    pub fn user_folder(&self, user_id: i32) -> PathBuf {
        self.base.join(user_id.to_string())
    }

    pub fn system_message_folder(&self, user_id: i32, system_message_id: i32) -> PathBuf {
        self.user_folder(user_id).join(system_message_id.to_string())
    }

    pub fn artifact_folder(
        &self,
        user_id: i32,
        system_message_id: i32,
        kind: ArtifactKind,
    ) -> PathBuf {
        self.system_message_folder(user_id, system_message_id)
            .join(kind.dir_name())
    }

    pub fn session_attachment_folder(&self, user_id: i32) -> PathBuf {
        self.user_folder(user_id).join("session_attachments")
    }

    /// Resolve the full path for an artifact, creating its folder on demand.
    pub async fn artifact_path(
        &self,
        user_id: i32,
        system_message_id: i32,
        kind: ArtifactKind,
        filename: &str,
    ) -> Result<PathBuf> {
        let folder = self.artifact_folder(user_id, system_message_id, kind);
        self.ensure_folder_exists(&folder).await?;
        Ok(folder.join(filename))
    }

    /// Resolve the session-attachment path for a user, creating the folder.
    pub async fn session_attachment_path(&self, user_id: i32, filename: &str) -> Result<PathBuf> {
        let folder = self.session_attachment_folder(user_id);
        self.ensure_folder_exists(&folder).await?;
        Ok(folder.join(filename))
    }

    pub async fn ensure_folder_exists(&self, folder: &Path) -> Result<()> {
        if fs::try_exists(folder).await.unwrap_or(false) {
            return Ok(());
        }
        fs::create_dir_all(folder).await.map_err(|e| {
            Error::Internal(format!("Failed to create folder {:?}: {}", folder, e))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            fs::set_permissions(folder, perms).await.map_err(|e| {
                Error::Internal(format!("Failed to set permissions on {:?}: {}", folder, e))
            })?;
        }
        tracing::info!("Created folder: {:?}", folder);
        Ok(())
    }

    pub async fn file_exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    pub async fn file_size(&self, path: &Path) -> Result<u64> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to stat {:?}: {}", path, e)))?;
        Ok(meta.len())
    }

    /// Remove a file if it exists; missing files are not an error.
    pub async fn remove_file(&self, path: &Path) -> Result<bool> {
        if !self.file_exists(path).await {
            return Ok(false);
        }
        fs::remove_file(path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to remove {:?}: {}", path, e)))?;
        tracing::info!("Removed file: {:?}", path);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_expected_tree() {
        let storage = FileStorage::new("/data/user_files");
        assert_eq!(
            storage.artifact_folder(7, 42, ArtifactKind::Uploads),
            PathBuf::from("/data/user_files/7/42/uploads")
        );
        assert_eq!(
            storage.artifact_folder(7, 42, ArtifactKind::ProcessedTexts),
            PathBuf::from("/data/user_files/7/42/processed_texts")
        );
        assert_eq!(
            storage.artifact_folder(7, 42, ArtifactKind::WebSearchResults),
            PathBuf::from("/data/user_files/7/42/web_search_results")
        );
        assert_eq!(
            storage.session_attachment_folder(7),
            PathBuf::from("/data/user_files/7/session_attachments")
        );
    }

    #[tokio::test]
    async fn artifact_path_creates_folder() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_str().unwrap());

        let path = storage
            .artifact_path(1, 2, ArtifactKind::ProcessedTexts, "abc_processed.txt")
            .await
            .unwrap();

        assert!(path.parent().unwrap().is_dir());
        assert!(path.ends_with("1/2/processed_texts/abc_processed.txt"));
    }

    #[tokio::test]
    async fn remove_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_str().unwrap());
        let removed = storage.remove_file(&dir.path().join("ghost.txt")).await.unwrap();
        assert!(!removed);
    }
}
