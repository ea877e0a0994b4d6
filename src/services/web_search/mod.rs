//! The two-mode web-search subsystem: query understanding feeding either
//! the standard (single-query) or deep (three-query) pipeline.

pub mod common;
pub mod deep;
pub mod standard;

pub use common::{BraveSearchClient, FetchedResult, RateLimiter, SearchApi, SearchResult};

use crate::error::{Error, Result};
use crate::models::conversations::Message;
use crate::services::llm_router::{GenerateOptions, GenerateText};
use crate::services::status::StatusSessionManager;
use crate::services::storage::FileStorage;

/// Model used to interpret the user's query in standard mode; deep mode
/// uses the caller's chosen model.
const QUERY_UNDERSTANDING_MODEL: &str = "gpt-4o-mini-2024-07-18";

/// Ask the LLM what the user is actually looking for, given the prior
/// conversation (truncated previews) and the new query.
pub async fn understand_query(
    llm: &dyn GenerateText,
    model: &str,
    messages: &[Message],
    user_query: &str,
    is_standard_search: bool,
) -> Result<String> {
    tracing::info!(
        "Starting query understanding for user query: '{}'",
        common::truncate_chars(user_query, 50)
    );

    let system_message = "Analyze the conversation history and the latest user query. \
\nProvide a concise interpretation of what information the user is seeking, \
\nconsidering the full context of the conversation.";

    let prior = &messages[..messages.len().saturating_sub(1)];
    let mut conversation_history = prior
        .iter()
        .map(|m| format!("{}: {}...", capitalize(&m.role.to_string()), common::truncate_chars(&m.content, 50)))
        .collect::<Vec<_>>()
        .join("\n");
    conversation_history.push_str(&format!("\nUser: {}", user_query));

    let request = vec![
        Message::system(system_message),
        Message::user(conversation_history),
    ];

    let query_model = if is_standard_search {
        QUERY_UNDERSTANDING_MODEL
    } else {
        model
    };
    tracing::info!("Sending request to model {} for query interpretation", query_model);

    let outcome = llm
        .generate(query_model, &request, 0.3, &GenerateOptions::default())
        .await
        .map_err(|e| Error::Provider(format!("Failed to interpret query: {}", e)))?;
    let interpreted = outcome.text.trim().to_string();
    tracing::info!(
        "Query interpreted. Interpretation: '{}'",
        common::truncate_chars(&interpreted, 100)
    );
    Ok(interpreted)
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Entry point used by the chat orchestrator: understand the query, then
/// run the mode-appropriate pipeline. Status updates are emitted along the
/// way; any error propagates for the orchestrator to degrade.
#[allow(clippy::too_many_arguments)]
pub async fn perform_web_search_process(
    llm: &dyn GenerateText,
    search: &dyn SearchApi,
    http: &reqwest::Client,
    storage: &FileStorage,
    status: &StatusSessionManager,
    model: &str,
    messages: &[Message],
    user_query: &str,
    user_id: i32,
    system_message_id: i32,
    enable_deep_search: bool,
    session_id: &str,
) -> Result<(Vec<String>, String)> {
    tracing::info!(
        "Starting web search process for query: '{}' ({} search)",
        common::truncate_chars(user_query, 50),
        if enable_deep_search { "deep" } else { "standard" }
    );

    tracing::info!("Step 1: Understanding user query");
    status
        .update_status(session_id, "Analyzing user query for web search")
        .await;
    let understood_query =
        understand_query(llm, model, messages, user_query, !enable_deep_search).await?;
    status
        .update_status(session_id, "User query analyzed successfully.")
        .await;

    if enable_deep_search {
        status.update_status(session_id, "Starting deep web search").await;
        let results = deep::deep_search_process(
            llm,
            search,
            http,
            storage,
            model,
            &understood_query,
            user_id,
            system_message_id,
        )
        .await?;
        status.update_status(session_id, "Deep web search completed.").await;
        Ok(results)
    } else {
        status
            .update_status(session_id, "Starting standard web search")
            .await;
        let results = standard::standard_search_process(
            llm,
            search,
            http,
            storage,
            model,
            &understood_query,
            user_id,
            system_message_id,
        )
        .await?;
        status
            .update_status(session_id, "Standard web search completed.")
            .await;
        Ok(results)
    }
}
