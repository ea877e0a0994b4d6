use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
};

use crate::error::{Error, Result};
use crate::handlers::allowed_file;
use crate::middleware::auth::AuthenticatedUser;
use crate::services::tokens;
use crate::state::AppState;

/// POST /session-attachments/upload — save and immediately extract, so the
/// client can show token counts before the chat turn.
pub async fn upload_session_attachment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let is_file = field.name() == Some("file");
        if is_file {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::Validation(format!("Failed to read upload: {}", e)))?;
            file = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) = file.ok_or_else(|| Error::Validation("No file provided".to_string()))?;
    if filename.is_empty() {
        return Err(Error::Validation("No filename provided".to_string()));
    }
    if !allowed_file(&filename) {
        return Err(Error::Validation("File type not allowed".to_string()));
    }

    let saved = state
        .attachments
        .save_attachment(&filename, &bytes, user.id)
        .await?;

    // Session attachments have no owning system message; extraction
    // artifacts land under the reserved id 0.
    let start = std::time::Instant::now();
    let content = state
        .attachments
        .get_attachment_content(&saved.attachment_id, user.id, 0)
        .await?
        .ok_or_else(|| Error::Internal("Failed to extract attachment".to_string()))?;
    let processing_time = start.elapsed().as_secs_f64();

    let extracted = content.text;
    let token_count = {
        let text = extracted.clone();
        tokio::task::spawn_blocking(move || tokens::count_text_tokens(&text))
            .await
            .ok()
    };
    tracing::info!(
        "Attachment extraction took {:.2} seconds for {}",
        processing_time,
        filename
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "attachmentId": saved.attachment_id,
        "filename": saved.filename,
        "size": saved.size,
        "mime_type": saved.mime_type,
        "tokenCount": token_count,
        "extractedText": extracted,
        "processingTime": processing_time,
    })))
}

/// DELETE /session-attachments/{id}/remove
pub async fn remove_session_attachment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(attachment_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let success = state
        .attachments
        .remove_attachment(&attachment_id, user.id)
        .await?;
    Ok(Json(serde_json::json!({
        "success": success,
        "message": if success { "Attachment removed" } else { "Attachment not found" },
    })))
}
