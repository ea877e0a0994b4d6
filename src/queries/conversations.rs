use chrono::Utc;

use crate::{
    DbConn,
    error::{Error, Result},
    models::conversations::{Conversation, ConversationSummary, Folder},
};

const COLUMNS: &str = "id, title, history, token_count, folder_id, user_id, created_at, \
                       updated_at, model_name, temperature, vector_search_results, \
                       generated_search_queries, web_search_results";

pub async fn get_by_id(conn: &mut DbConn, id: i32) -> Result<Option<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {} FROM conversations WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(conversation)
}

pub async fn count_for_user(conn: &mut DbConn, user_id: i32) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await
        .map_err(Error::Sqlx)?;
    Ok(count.0)
}

pub async fn list_page_for_user(
    conn: &mut DbConn,
    user_id: i32,
    page: i64,
    per_page: i64,
) -> Result<Vec<ConversationSummary>> {
    let summaries = sqlx::query_as::<_, ConversationSummary>(
        "SELECT id, title, model_name, token_count, updated_at, temperature \
         FROM conversations WHERE user_id = $1 \
         ORDER BY updated_at DESC OFFSET $2 LIMIT $3",
    )
    .bind(user_id)
    .bind((page - 1).max(0) * per_page)
    .bind(per_page)
    .fetch_all(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(summaries)
}

pub struct NewConversation<'a> {
    pub title: Option<&'a str>,
    pub history: &'a serde_json::Value,
    pub token_count: i32,
    pub user_id: i32,
    pub model_name: Option<&'a str>,
    pub temperature: Option<f64>,
    pub vector_search_results: Option<&'a serde_json::Value>,
    pub generated_search_queries: Option<&'a serde_json::Value>,
    pub web_search_results: Option<&'a serde_json::Value>,
}

pub async fn insert(conn: &mut DbConn, new: NewConversation<'_>) -> Result<Conversation> {
    let now = Utc::now();
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "INSERT INTO conversations \
         (title, history, token_count, user_id, created_at, updated_at, model_name, \
          temperature, vector_search_results, generated_search_queries, web_search_results) \
         VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8, $9, $10) \
         RETURNING {}",
        COLUMNS
    ))
    .bind(new.title)
    .bind(new.history)
    .bind(new.token_count)
    .bind(new.user_id)
    .bind(now)
    .bind(new.model_name)
    .bind(new.temperature)
    .bind(new.vector_search_results)
    .bind(new.generated_search_queries)
    .bind(new.web_search_results)
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(conversation)
}

pub struct ConversationTurnUpdate<'a> {
    pub id: i32,
    pub history: &'a serde_json::Value,
    pub added_tokens: i32,
    pub model_name: Option<&'a str>,
    pub temperature: Option<f64>,
    pub vector_search_results: Option<&'a serde_json::Value>,
    pub generated_search_queries: Option<&'a serde_json::Value>,
    pub web_search_results: Option<&'a serde_json::Value>,
}

/// Append the turn's results to an existing conversation. Token count is
/// cumulative.
pub async fn update_after_turn(
    conn: &mut DbConn,
    update: ConversationTurnUpdate<'_>,
) -> Result<Conversation> {
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "UPDATE conversations SET history = $2, token_count = token_count + $3, \
         model_name = $4, temperature = $5, vector_search_results = $6, \
         generated_search_queries = $7, web_search_results = $8, updated_at = $9 \
         WHERE id = $1 RETURNING {}",
        COLUMNS
    ))
    .bind(update.id)
    .bind(update.history)
    .bind(update.added_tokens)
    .bind(update.model_name)
    .bind(update.temperature)
    .bind(update.vector_search_results)
    .bind(update.generated_search_queries)
    .bind(update.web_search_results)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(conversation)
}

pub async fn update_title(
    conn: &mut DbConn,
    id: i32,
    title: &str,
) -> Result<Option<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "UPDATE conversations SET title = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
        COLUMNS
    ))
    .bind(id)
    .bind(title)
    .bind(Utc::now())
    .fetch_optional(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(conversation)
}

pub async fn delete(conn: &mut DbConn, id: i32) -> Result<bool> {
    let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await
        .map_err(Error::Sqlx)?;
    Ok(result.rows_affected() > 0)
}

// --- Folders ---

pub async fn list_folders(conn: &mut DbConn) -> Result<Vec<Folder>> {
    let folders = sqlx::query_as::<_, Folder>("SELECT id, title FROM folders ORDER BY id")
        .fetch_all(conn)
        .await
        .map_err(Error::Sqlx)?;
    Ok(folders)
}

pub async fn get_folder(conn: &mut DbConn, id: i32) -> Result<Option<Folder>> {
    let folder = sqlx::query_as::<_, Folder>("SELECT id, title FROM folders WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(Error::Sqlx)?;
    Ok(folder)
}

pub async fn create_folder(conn: &mut DbConn, title: &str) -> Result<Folder> {
    let folder = sqlx::query_as::<_, Folder>(
        "INSERT INTO folders (title) VALUES ($1) RETURNING id, title",
    )
    .bind(title)
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(folder)
}

pub async fn folder_conversation_titles(conn: &mut DbConn, folder_id: i32) -> Result<Vec<String>> {
    let titles: Vec<(Option<String>,)> =
        sqlx::query_as("SELECT title FROM conversations WHERE folder_id = $1 ORDER BY id")
            .bind(folder_id)
            .fetch_all(conn)
            .await
            .map_err(Error::Sqlx)?;
    Ok(titles.into_iter().filter_map(|(t,)| t).collect())
}

pub async fn create_in_folder(
    conn: &mut DbConn,
    title: &str,
    folder_id: i32,
    user_id: i32,
) -> Result<Conversation> {
    let now = Utc::now();
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "INSERT INTO conversations (title, history, token_count, folder_id, user_id, \
         created_at, updated_at) VALUES ($1, '[]'::jsonb, 0, $2, $3, $4, $4) RETURNING {}",
        COLUMNS
    ))
    .bind(title)
    .bind(folder_id)
    .bind(user_id)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(Error::Sqlx)?;
    Ok(conversation)
}
