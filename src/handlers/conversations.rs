use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::COOKIE},
};

use crate::error::{Error, Result};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::requests::{
    CreateConversationInFolderRequest, CreateFolderRequest, PaginationQuery, UpdateTitleRequest,
};
use crate::services::conversations as conversation_service;
use crate::state::AppState;

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// GET /conversations/active — the conversation the session last touched.
pub async fn get_active_conversation(headers: HeaderMap) -> Json<serde_json::Value> {
    let conversation_id = cookie_value(&headers, "active_conversation_id")
        .and_then(|v| v.parse::<i32>().ok());
    Json(serde_json::json!({ "conversationId": conversation_id }))
}

/// GET /conversations — paginated listing.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let page = conversation_service::get_conversations(
        &mut conn,
        user.id,
        pagination.page.max(1),
        pagination.per_page.clamp(1, 100),
    )
    .await?;
    Ok(Json(serde_json::to_value(page)?))
}

/// GET /conversations/{id} — full history plus side data.
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<i32>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let detail =
        conversation_service::get_conversation_detail(&mut conn, conversation_id, user.id).await?;
    Ok(Json(serde_json::to_value(detail)?))
}

/// POST /conversations/{id}/update_title
pub async fn update_conversation_title(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<i32>,
    Json(request): Json<UpdateTitleRequest>,
) -> Result<Json<serde_json::Value>> {
    if request.title.trim().is_empty() {
        return Err(Error::Validation("New title is required".to_string()));
    }
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    conversation_service::update_title(&mut conn, conversation_id, user.id, request.title.trim())
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Title updated successfully",
        "title": request.title.trim(),
    })))
}

/// DELETE /conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<i32>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    conversation_service::delete_conversation(&mut conn, conversation_id, user.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Conversation deleted successfully"
    })))
}

/// GET /conversations/folders
pub async fn get_folders(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<String>>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    Ok(Json(conversation_service::get_folders(&mut conn).await?))
}

/// POST /conversations/folders
pub async fn create_folder(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    conversation_service::create_folder(&mut conn, &request.title).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Folder created successfully" })),
    ))
}

/// GET /conversations/folders/{id}/conversations
pub async fn get_folder_conversations(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
    Path(folder_id): Path<i32>,
) -> Result<Json<Vec<String>>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    Ok(Json(
        conversation_service::get_folder_conversations(&mut conn, folder_id).await?,
    ))
}

/// POST /conversations/folders/{id}/conversations
pub async fn create_conversation_in_folder(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(folder_id): Path<i32>,
    Json(request): Json<CreateConversationInFolderRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    conversation_service::create_conversation_in_folder(
        &mut conn,
        &request.title,
        folder_id,
        user.id,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Conversation created successfully" })),
    ))
}

/// POST /conversations/reset — forget the active conversation.
pub async fn reset_conversation() -> (HeaderMap, Json<serde_json::Value>) {
    let mut headers = HeaderMap::new();
    if let Ok(value) =
        "active_conversation_id=; Path=/; Max-Age=0".parse::<axum::http::HeaderValue>()
    {
        headers.insert(axum::http::header::SET_COOKIE, value);
    }
    (
        headers,
        Json(serde_json::json!({ "message": "Conversation reset successful" })),
    )
}
