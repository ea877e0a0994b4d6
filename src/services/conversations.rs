//! Conversation store operations (C13): pagination, detail views, title
//! management, deletion, and folders.

use serde::Serialize;

use crate::DbConn;
use crate::error::{Error, Result};
use crate::models::conversations::{Conversation, ConversationSummary, Folder};
use crate::queries::conversations as queries;

#[derive(Debug, Serialize)]
pub struct ConversationPage {
    pub conversations: Vec<ConversationSummary>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Detail view with decoded history and side data.
#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub id: i32,
    pub title: Option<String>,
    pub history: serde_json::Value,
    pub token_count: i32,
    pub total_tokens: i32,
    pub model_name: Option<String>,
    pub temperature: Option<f64>,
    pub vector_search_results: Option<serde_json::Value>,
    pub generated_search_queries: Option<serde_json::Value>,
    pub web_search_results: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Conversation> for ConversationDetail {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title,
            history: c.history,
            token_count: c.token_count,
            total_tokens: c.token_count,
            model_name: c.model_name,
            temperature: c.temperature,
            vector_search_results: c.vector_search_results,
            generated_search_queries: c.generated_search_queries,
            web_search_results: c.web_search_results,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

pub async fn get_conversations(
    conn: &mut DbConn,
    user_id: i32,
    page: i64,
    per_page: i64,
) -> Result<ConversationPage> {
    let total = queries::count_for_user(conn, user_id).await?;
    let conversations = queries::list_page_for_user(conn, user_id, page, per_page).await?;
    Ok(ConversationPage {
        conversations,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    })
}

pub async fn get_conversation_detail(
    conn: &mut DbConn,
    conversation_id: i32,
    user_id: i32,
) -> Result<ConversationDetail> {
    let conversation = queries::get_by_id(conn, conversation_id)
        .await?
        .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;
    if conversation.user_id != user_id {
        return Err(Error::Forbidden(
            "You can only view your own conversations".to_string(),
        ));
    }
    Ok(conversation.into())
}

pub async fn update_title(
    conn: &mut DbConn,
    conversation_id: i32,
    user_id: i32,
    new_title: &str,
) -> Result<Conversation> {
    let existing = queries::get_by_id(conn, conversation_id)
        .await?
        .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;
    if existing.user_id != user_id {
        return Err(Error::Forbidden(
            "You can only update your own conversations".to_string(),
        ));
    }
    queries::update_title(conn, conversation_id, new_title)
        .await?
        .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))
}

pub async fn delete_conversation(
    conn: &mut DbConn,
    conversation_id: i32,
    user_id: i32,
) -> Result<()> {
    let existing = queries::get_by_id(conn, conversation_id)
        .await?
        .ok_or_else(|| Error::NotFound("Conversation not found".to_string()))?;
    if existing.user_id != user_id {
        return Err(Error::Forbidden(
            "You can only delete your own conversations".to_string(),
        ));
    }
    queries::delete(conn, conversation_id).await?;
    Ok(())
}

pub async fn get_folders(conn: &mut DbConn) -> Result<Vec<String>> {
    let folders = queries::list_folders(conn).await?;
    Ok(folders.into_iter().map(|f| f.title).collect())
}

pub async fn create_folder(conn: &mut DbConn, title: &str) -> Result<Folder> {
    if title.trim().is_empty() {
        return Err(Error::Validation("Folder title is required".to_string()));
    }
    queries::create_folder(conn, title.trim()).await
}

pub async fn get_folder_conversations(conn: &mut DbConn, folder_id: i32) -> Result<Vec<String>> {
    queries::folder_conversation_titles(conn, folder_id).await
}

pub async fn create_conversation_in_folder(
    conn: &mut DbConn,
    title: &str,
    folder_id: i32,
    user_id: i32,
) -> Result<Conversation> {
    let folder = queries::get_folder(conn, folder_id).await?;
    if folder.is_none() {
        return Err(Error::NotFound("Folder not found".to_string()));
    }
    queries::create_in_folder(conn, title, folder_id, user_id).await
}
