use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persistent document attached to a SystemMessage's corpus. The opaque id
/// doubles as the vector-metadata key that ties chunks back to the file.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UploadedFile {
    pub id: String,
    pub user_id: i32,
    pub original_filename: String,
    pub file_path: String,
    pub processed_text_path: Option<String>,
    pub upload_timestamp: DateTime<Utc>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub system_message_id: i32,
}

/// Metadata shape returned by the file listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFileView {
    pub id: String,
    pub name: String,
    pub path: String,
    pub size: Option<i64>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub upload_date: Option<String>,
}

impl From<UploadedFile> for UploadedFileView {
    fn from(file: UploadedFile) -> Self {
        Self {
            id: file.id,
            name: file.original_filename,
            path: file.file_path,
            size: file.file_size,
            mime_type: file.mime_type,
            upload_date: Some(file.upload_timestamp.to_rfc3339()),
        }
    }
}
