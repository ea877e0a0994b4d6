use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the non-deletable, system-owned default prompt template.
pub const DEFAULT_SYSTEM_MESSAGE_NAME: &str = "Default System Message";

/// A reusable prompt template that scopes a document corpus and a vector
/// namespace. `created_by = NULL` marks a system default: world-readable,
/// admin-only writable, never deletable.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemMessage {
    pub id: i32,
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    pub model_name: Option<String>,
    pub temperature: Option<f64>,
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub enable_web_search: bool,
    pub enable_deep_search: bool,
    pub enable_time_sense: bool,
}

impl SystemMessage {
    pub fn is_default(&self) -> bool {
        self.created_by.is_none()
    }

    /// Owner-or-admin write access; defaults are admin-only.
    pub fn can_modify(&self, user_id: i32, is_admin: bool) -> bool {
        match self.created_by {
            None => is_admin,
            Some(owner) => owner == user_id || is_admin,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMessageView {
    #[serde(flatten)]
    pub message: SystemMessage,
    pub is_default: bool,
    pub is_editable: bool,
}
