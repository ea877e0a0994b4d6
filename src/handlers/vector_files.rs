use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::{HeaderValue, header},
    response::{Html, IntoResponse, Response},
};

use crate::error::{Error, Result};
use crate::handlers::allowed_file;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::uploaded_files::UploadedFileView;
use crate::queries::uploaded_files as file_queries;
use crate::state::AppState;

fn no_cache_headers(response: &mut Response, filename: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{}\"", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

/// POST /vector-files/upload — multipart form: `file`, `system_message_id`.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut system_message_id: Option<i32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("Failed to read upload: {}", e)))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            Some("system_message_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(format!("Invalid form field: {}", e)))?;
                system_message_id = Some(
                    text.parse()
                        .map_err(|_| Error::Validation("Invalid system message ID".to_string()))?,
                );
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| Error::Validation("No file part".to_string()))?;
    let system_message_id = system_message_id
        .ok_or_else(|| Error::Validation("Invalid system message ID".to_string()))?;
    if !allowed_file(&filename) {
        return Err(Error::Validation("File type not allowed".to_string()));
    }

    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let uploaded = state
        .vector_files
        .upload_file(
            &mut conn,
            &filename,
            &bytes,
            content_type.as_deref(),
            user.id,
            system_message_id,
        )
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "File uploaded and indexed successfully",
        "file_id": uploaded.id,
    })))
}

/// GET /vector-files/{id}/original — embed-HTML viewer.
pub async fn view_original_file(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(file_id): Path<String>,
) -> Result<Html<String>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let html = state
        .vector_files
        .get_original_file_html(&mut conn, &file_id, user.id)
        .await?;
    Ok(Html(html))
}

/// GET /vector-files/{id}/serve — raw bytes with the stored mime type.
pub async fn serve_file(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let (bytes, mime, filename) = state
        .vector_files
        .get_file_bytes(&mut conn, &file_id, user.id)
        .await?;

    let mut response = bytes.into_response();
    if let Ok(value) = HeaderValue::from_str(&mime) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    no_cache_headers(&mut response, &filename);
    Ok(response)
}

/// GET /vector-files/{id}/processed — the extracted text.
pub async fn view_processed_text(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let (content, filename) = state
        .vector_files
        .get_processed_text(&mut conn, &file_id, user.id)
        .await?;

    let mut response = content.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    no_cache_headers(&mut response, &filename);
    Ok(response)
}

/// DELETE /vector-files/{id} — file, vectors, artifacts, row.
pub async fn remove_file(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(file_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let outcome = state
        .vector_files
        .remove_file(&mut conn, &file_id, user.id)
        .await?;
    Ok(Json(serde_json::to_value(outcome)?))
}

/// GET /vector-files/list/{system_message_id}
pub async fn list_files(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Path(system_message_id): Path<i32>,
) -> Result<Json<Vec<UploadedFileView>>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let files = file_queries::list_for_system_message(&mut conn, system_message_id).await?;
    Ok(Json(files.into_iter().map(Into::into).collect()))
}
