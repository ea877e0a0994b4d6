use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One turn of conversation history, as stored and as sent to providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// A persisted conversation. History is an append-only JSON array of
/// `{role, content}`; the side columns capture the last turn's retrieval
/// and search artifacts for display and debugging.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: i32,
    pub title: Option<String>,
    pub history: serde_json::Value,
    pub token_count: i32,
    pub folder_id: Option<i32>,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub model_name: Option<String>,
    pub temperature: Option<f64>,
    pub vector_search_results: Option<serde_json::Value>,
    pub generated_search_queries: Option<serde_json::Value>,
    pub web_search_results: Option<serde_json::Value>,
}

impl Conversation {
    /// Decode history into typed messages; tolerates legacy rows that are
    /// not arrays by returning an empty list.
    pub fn messages(&self) -> Vec<Message> {
        serde_json::from_value(self.history.clone()).unwrap_or_default()
    }
}

/// Compact row for the paginated conversation list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub id: i32,
    pub title: Option<String>,
    pub model_name: Option<String>,
    pub token_count: i32,
    pub updated_at: DateTime<Utc>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Folder {
    pub id: i32,
    pub title: String,
}
