use serde::{Deserialize, Serialize};

use crate::models::conversations::Message;

fn default_temperature() -> f32 {
    0.7
}

fn default_thinking_budget() -> u32 {
    12000
}

/// Body of `POST /api/v1/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    pub system_message_id: Option<i32>,
    #[serde(default)]
    pub enable_web_search: bool,
    #[serde(default)]
    pub enable_deep_search: bool,
    #[serde(default)]
    pub conversation_id: Option<i32>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub extended_thinking: bool,
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: u32,
    /// Session-attachment ids to inject into this turn
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub extended_thinking: Option<bool>,
    pub thinking_budget: Option<u32>,
}

/// Body of the chat response; field names match what the UI consumes.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: i32,
    pub conversation_title: Option<String>,
    pub vector_search_results: String,
    pub generated_search_queries: Vec<String>,
    pub web_search_results: String,
    pub system_message_content: String,
    pub thinking_process: Option<String>,
    pub usage: TokenUsage,
    pub enable_web_search: bool,
    pub enable_deep_search: bool,
    pub model_info: ModelInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTitleRequest {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFolderRequest {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConversationInFolderRequest {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSystemMessageRequest {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default = "default_temperature_f64")]
    pub temperature: f64,
    #[serde(default)]
    pub enable_web_search: bool,
    #[serde(default)]
    pub enable_time_sense: bool,
}

fn default_temperature_f64() -> f64 {
    0.7
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSystemMessageRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub model_name: Option<String>,
    pub temperature: Option<f64>,
    pub enable_web_search: Option<bool>,
    pub enable_time_sense: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleSearchRequest {
    pub enable_web_search: bool,
    #[serde(default)]
    pub enable_deep_search: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShowAllQuery {
    #[serde(default)]
    pub show_all: bool,
}
