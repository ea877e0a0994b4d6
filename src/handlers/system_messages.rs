use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::error::{Error, Result};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::requests::{
    CreateSystemMessageRequest, ShowAllQuery, ToggleSearchRequest, UpdateSystemMessageRequest,
};
use crate::services::system_messages as system_message_service;
use crate::state::AppState;

/// POST /system_messages — create, owned by the caller.
pub async fn create_system_message(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Json(request): Json<CreateSystemMessageRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let message = system_message_service::create(&mut conn, request, &user).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(message)?)))
}

/// GET /system_messages[?show_all=true] — own + defaults; admins may see all.
pub async fn list_system_messages(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Query(query): Query<ShowAllQuery>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let user_id = if query.show_all && user.is_admin {
        None
    } else {
        Some(user.id)
    };
    let messages = system_message_service::get_all(&mut conn, user_id).await?;
    Ok(Json(serde_json::to_value(messages)?))
}

/// GET /system_messages/default-model
pub async fn get_default_model(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthenticatedUser>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let model_name = system_message_service::get_default_model_name(&mut conn).await?;
    Ok(Json(serde_json::json!({ "model_name": model_name })))
}

/// GET /system_messages/{id}
pub async fn get_system_message(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(message_id): Path<i32>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let user_id = if user.is_admin { None } else { Some(user.id) };
    let message = system_message_service::get_by_id(&mut conn, message_id, user_id).await?;
    Ok(Json(serde_json::to_value(message)?))
}

/// PUT /system_messages/{id}
pub async fn update_system_message(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(message_id): Path<i32>,
    Json(request): Json<UpdateSystemMessageRequest>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let message =
        system_message_service::update(&mut conn, message_id, request, &user).await?;
    Ok(Json(serde_json::to_value(message)?))
}

/// DELETE /system_messages/{id} — blocked on defaults.
pub async fn delete_system_message(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(message_id): Path<i32>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    system_message_service::delete(&mut conn, message_id, &user).await?;
    Ok(Json(serde_json::json!({
        "message": "System message deleted successfully"
    })))
}

/// POST /system_messages/{id}/toggle-search
pub async fn toggle_search(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(message_id): Path<i32>,
    Json(request): Json<ToggleSearchRequest>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.pool.acquire().await.map_err(Error::Sqlx)?;
    let message = system_message_service::toggle_search(
        &mut conn,
        message_id,
        request.enable_web_search,
        request.enable_deep_search,
        &user,
    )
    .await?;
    Ok(Json(serde_json::json!({
        "message": "Search settings updated successfully",
        "enableWebSearch": message.enable_web_search,
        "enableDeepSearch": message.enable_deep_search,
        "updatedAt": message.updated_at.to_rfc3339(),
    })))
}
