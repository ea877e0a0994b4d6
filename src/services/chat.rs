//! The per-request chat pipeline (C12).
//!
//! Assembles context (attachments, time context, semantic retrieval, web
//! search), calls the routed model, accounts tokens, and commits the
//! conversation. Every stage emits a status update; stage-local failures
//! degrade to empty context while the main model call stays fatal.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::DbPool;
use crate::error::{Error, Result};
use crate::models::conversations::{Conversation, Message, MessageRole};
use crate::models::requests::{ChatRequest, ChatResponse, ModelInfo, TokenUsage};
use crate::models::users::User;
use crate::queries::conversations as conversation_queries;
use crate::queries::system_messages as system_message_queries;
use crate::services::file_processor::FileProcessor;
use crate::services::llm_router::{GenerateOptions, GenerateText, LlmRouter};
use crate::services::session_attachments::SessionAttachmentHandler;
use crate::services::status::StatusSessionManager;
use crate::services::storage::FileStorage;
use crate::services::time_context;
use crate::services::titles;
use crate::services::tokens;
use crate::services::web_search::{self, SearchApi};

pub const ATTACHMENT_BLOCK_START: &str = "--- Attached Files Context ---";
pub const ATTACHMENT_BLOCK_END: &str = "--- End Attached Files Context ---";

pub const VECTOR_CONTEXT_OPEN: &str = "<Added Context Provided by Vector Search>";
pub const VECTOR_CONTEXT_CLOSE: &str = "</Added Context Provided by Vector Search>";
pub const WEB_CONTEXT_OPEN: &str = "<Added Context Provided by Web Search>";
pub const WEB_CONTEXT_CLOSE: &str = "</Added Context Provided by Web Search>";

const CITATION_INSTRUCTION: &str = "\n\nIMPORTANT: In your response, please include relevant \
footnotes using [1], [2], etc. At the end of your response, list all sources under a \
'Sources:' section, providing full URLs for each footnote.";

/// Only this model accepts the extended-thinking knobs.
const EXTENDED_THINKING_MODEL: &str = "claude-3-7-sonnet-20250219";

/// Model used to rewrite over-long queries for embedding.
const CONCISE_QUERY_MODEL: &str = "gpt-4o-mini";

static ATTACHMENT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\n*--- Attached Files Context ---[\s\S]*?--- End Attached Files Context ---\n*",
    )
    .expect("static regex")
});

/// Strip any sentinel-delimited attachment block from a user message.
pub fn strip_attachment_block(text: &str) -> String {
    ATTACHMENT_BLOCK.replace_all(text, "").trim().to_string()
}

/// Wrap one attachment's extracted text for injection.
pub fn wrap_attachment_content(name: &str, content: &str) -> String {
    format!(
        "\n--- Content from {name} ---\n{content}\n--- End Content from {name} ---",
    )
}

pub struct ChatOrchestrator {
    pool: DbPool,
    status: Arc<StatusSessionManager>,
    llm: Arc<LlmRouter>,
    file_processor: FileProcessor,
    attachments: SessionAttachmentHandler,
    search: Option<Arc<dyn SearchApi>>,
    storage: FileStorage,
    fetch_client: reqwest::Client,
    embedding_token_limit: usize,
}

impl ChatOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        status: Arc<StatusSessionManager>,
        llm: Arc<LlmRouter>,
        file_processor: FileProcessor,
        attachments: SessionAttachmentHandler,
        search: Option<Arc<dyn SearchApi>>,
        storage: FileStorage,
        embedding_token_limit: usize,
    ) -> Self {
        let fetch_client = reqwest::Client::builder()
            .build()
            .expect("failed to build fetch client");
        Self {
            pool,
            status,
            llm,
            file_processor,
            attachments,
            search,
            storage,
            fetch_client,
            embedding_token_limit,
        }
    }

    /// Drive one chat turn end to end. The websocket session is always
    /// deregistered on the way out, success or failure.
    pub async fn run_chat(
        &self,
        request: ChatRequest,
        user: &User,
        session_id: &str,
    ) -> Result<ChatResponse> {
        let result = self.run_chat_inner(request, user, session_id).await;

        if let Err(e) = &result {
            tracing::error!("[{}] Unexpected error in chat orchestrator: {}", session_id, e);
            self.status
                .update_status_with(session_id, "An error occurred during processing", Some("error"))
                .await;
        }

        tracing::info!("[{}] Cleaning up connection status for session.", session_id);
        self.status.remove_connection(session_id, false).await;

        // Missing system message and bad input keep their own status codes;
        // everything else collapses to a generic 500.
        result.map_err(|e| match e {
            Error::NotFound(_) | Error::Validation(_) => e,
            _ => Error::Internal("An unexpected error occurred".to_string()),
        })
    }

    async fn run_chat_inner(
        &self,
        request: ChatRequest,
        user: &User,
        session_id: &str,
    ) -> Result<ChatResponse> {
        let system_message_id = request
            .system_message_id
            .ok_or_else(|| Error::Validation("system_message_id is required".to_string()))?;
        if request.messages.is_empty() {
            return Err(Error::Validation("messages must not be empty".to_string()));
        }
        let mut messages = request.messages.clone();

        tracing::info!(
            "[{}] Received model: {}, temperature: {}, system_message_id: {}, \
             enable_web_search: {}, enable_deep_search: {}",
            session_id,
            request.model,
            request.temperature,
            system_message_id,
            request.enable_web_search,
            request.enable_deep_search
        );

        self.status
            .update_status(session_id, "Initializing conversation")
            .await;

        // Load the existing conversation when it belongs to this user;
        // anything else silently starts a new one.
        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;
        let conversation: Option<Conversation> = match request.conversation_id {
            Some(conversation_id) => {
                match conversation_queries::get_by_id(&mut conn, conversation_id).await? {
                    Some(c) if c.user_id == user.id => {
                        tracing::info!(
                            "[{}] Using existing conversation with id {}.",
                            session_id,
                            conversation_id
                        );
                        Some(c)
                    }
                    _ => {
                        tracing::info!(
                            "[{}] No valid conversation found with id {}, starting a new one.",
                            session_id,
                            conversation_id
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let system_message_row = system_message_queries::get_by_id(&mut conn, system_message_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(
                    "[{}] System message with ID {} not found",
                    session_id,
                    system_message_id
                );
                Error::NotFound("System message not found".to_string())
            })?;
        let enable_time_sense = system_message_row.enable_time_sense;
        tracing::info!("[{}] Time sense enabled: {}", session_id, enable_time_sense);
        drop(conn);

        // --- Session attachment injection (before time context) ---
        let original_user_text = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let user_query_for_search = strip_attachment_block(&original_user_text);

        if !request.file_ids.is_empty() {
            tracing::info!(
                "[{}] Found {} session attachment IDs. Processing content.",
                session_id,
                request.file_ids.len()
            );
            self.status
                .update_status(session_id, "Processing session attachments...")
                .await;

            let mut retrieved_contents = Vec::new();
            for attachment_id in &request.file_ids {
                match self
                    .attachments
                    .get_attachment_content(attachment_id, user.id, system_message_id)
                    .await
                {
                    Ok(Some(content)) => {
                        let name = if content.filename.is_empty() {
                            format!("Attachment ID {}", &attachment_id[..attachment_id.len().min(8)])
                        } else {
                            content.filename.clone()
                        };
                        retrieved_contents.push(wrap_attachment_content(&name, &content.text));
                        tracing::info!(
                            "[{}] Successfully retrieved content for attachment: {} (ID: {})",
                            session_id,
                            name,
                            attachment_id
                        );
                    }
                    Ok(None) => {
                        tracing::warn!(
                            "[{}] Could not retrieve content for session attachment ID: {}",
                            session_id,
                            attachment_id
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "[{}] Error retrieving session attachment {}: {}",
                            session_id,
                            attachment_id,
                            e
                        );
                    }
                }
            }

            if !retrieved_contents.is_empty() {
                let injected = retrieved_contents.join("\n");
                if let Some(last) = messages.last_mut() {
                    last.content = format!("{}\n\n{}", user_query_for_search, injected)
                        .trim()
                        .to_string();
                }
                tracing::info!(
                    "[{}] Injected content from {} session attachments into user message.",
                    session_id,
                    retrieved_contents.len()
                );
            } else {
                tracing::warn!(
                    "[{}] No content retrieved for provided attachment IDs. User message unchanged.",
                    session_id
                );
            }
        }

        // --- Time context ---
        if enable_time_sense {
            self.status
                .update_status(session_id, "Processing time context information")
                .await;
            time_context::clean_and_update_time_context(
                &mut messages,
                request.timezone.as_deref().or(user.timezone.as_deref()),
            );
            tracing::info!("[{}] Time context processing completed", session_id);
        }

        // Every later injection lands on the system message; make sure one
        // exists.
        if !messages.iter().any(|m| m.role == MessageRole::System) {
            messages.insert(0, Message::system(""));
        }

        // --- Semantic retrieval ---
        self.status
            .update_status(session_id, "Checking document database")
            .await;
        let relevant_info = self
            .semantic_search_stage(&user_query_for_search, system_message_id, session_id)
            .await;

        if let Some(info) = &relevant_info {
            tracing::info!(
                "[{}] Injecting relevant document info into system message.",
                session_id
            );
            if let Some(system) = messages.iter_mut().find(|m| m.role == MessageRole::System) {
                system.content.push_str(&format!(
                    "\n\n{}\n{}\n{}",
                    VECTOR_CONTEXT_OPEN, info, VECTOR_CONTEXT_CLOSE
                ));
            }
        } else {
            tracing::info!("[{}] No relevant document info to inject.", session_id);
        }

        // --- Web search ---
        let mut generated_search_queries: Option<Vec<String>> = None;
        let mut summarized_results: Option<String> = None;
        if request.enable_web_search {
            self.status
                .update_status(session_id, "Starting web search process")
                .await;
            match self
                .web_search_stage(
                    &request,
                    &messages,
                    &user_query_for_search,
                    user.id,
                    system_message_id,
                    session_id,
                )
                .await
            {
                Ok((queries, summary)) => {
                    self.status
                        .update_status(session_id, "Web search completed, processing results")
                        .await;
                    tracing::info!(
                        "[{}] Web search process completed. Generated queries: {:?}",
                        session_id,
                        queries
                    );
                    generated_search_queries = Some(queries);
                    if !summary.is_empty() {
                        if let Some(system) =
                            messages.iter_mut().find(|m| m.role == MessageRole::System)
                        {
                            system.content.push_str(&format!(
                                "\n\n{}\n{}\n{}",
                                WEB_CONTEXT_OPEN, summary, WEB_CONTEXT_CLOSE
                            ));
                            system.content.push_str(CITATION_INSTRUCTION);
                        }
                        summarized_results = Some(summary);
                    } else {
                        tracing::warn!(
                            "[{}] No summarized results from web search to inject.",
                            session_id
                        );
                    }
                }
                Err(e) => {
                    tracing::error!("[{}] Error in web search process: {}", session_id, e);
                    self.status
                        .update_status_with(
                            session_id,
                            "Error during web search process",
                            Some("error"),
                        )
                        .await;
                }
            }
        } else {
            tracing::info!("[{}] Web search is disabled", session_id);
        }

        // --- Model call ---
        tracing::info!(
            "[{}] Sending final message list ({} messages) to model.",
            session_id,
            messages.len()
        );
        self.status
            .update_status(
                session_id,
                &format!(
                    "Generating final analysis and response using model: {}",
                    request.model
                ),
            )
            .await;

        let is_thinking_model = request.model == EXTENDED_THINKING_MODEL;
        let options = GenerateOptions {
            reasoning_effort: request.reasoning_effort.clone(),
            extended_thinking: is_thinking_model.then_some(request.extended_thinking),
            thinking_budget: (is_thinking_model && request.extended_thinking)
                .then_some(request.thinking_budget),
            max_tokens: None,
        };

        let outcome = match self
            .llm
            .generate(&request.model, &messages, request.temperature, &options)
            .await
        {
            Ok(outcome) if !outcome.text.is_empty() => outcome,
            Ok(_) | Err(_) => {
                tracing::error!(
                    "[{}] Failed to get response from model {}.",
                    session_id,
                    request.model
                );
                self.status
                    .update_status_with(
                        session_id,
                        "Error getting response from AI model",
                        Some("error"),
                    )
                    .await;
                return Err(Error::Provider(format!(
                    "Failed to get response from model {}",
                    request.model
                )));
            }
        };

        // --- Token accounting ---
        let prompt_tokens = self.llm.count_tokens(&outcome.model_name, &messages).await;
        let assistant_message = Message::assistant(outcome.text.clone());
        let completion_tokens = self
            .llm
            .count_tokens(&outcome.model_name, std::slice::from_ref(&assistant_message))
            .await;
        let total_tokens = prompt_tokens + completion_tokens;
        tracing::info!(
            "[{}] Tokens - Prompt: {}, Completion: {}, Total: {}",
            session_id,
            prompt_tokens,
            completion_tokens,
            total_tokens
        );

        messages.push(assistant_message);

        // --- Persist ---
        self.status.update_status(session_id, "Saving conversation").await;
        let history = serde_json::to_value(&messages)?;
        let vector_json = relevant_info.as_ref().map(|v| serde_json::json!(v));
        let queries_json = generated_search_queries.as_ref().map(|q| serde_json::json!(q));
        let web_json = summarized_results.as_ref().map(|s| serde_json::json!(s));

        let mut conn = self.pool.acquire().await.map_err(Error::Sqlx)?;
        let saved = match conversation {
            None => {
                tracing::info!("[{}] Creating new conversation.", session_id);
                let title =
                    titles::generate_summary_title(self.llm.as_ref(), &messages).await;
                conversation_queries::insert(
                    &mut conn,
                    conversation_queries::NewConversation {
                        title: Some(title.as_str()),
                        history: &history,
                        token_count: total_tokens as i32,
                        user_id: user.id,
                        model_name: Some(outcome.model_name.as_str()),
                        temperature: Some(request.temperature as f64),
                        vector_search_results: vector_json.as_ref(),
                        generated_search_queries: queries_json.as_ref(),
                        web_search_results: web_json.as_ref(),
                    },
                )
                .await?
            }
            Some(existing) => {
                tracing::info!(
                    "[{}] Updating existing conversation ID: {}",
                    session_id,
                    existing.id
                );
                conversation_queries::update_after_turn(
                    &mut conn,
                    conversation_queries::ConversationTurnUpdate {
                        id: existing.id,
                        history: &history,
                        added_tokens: total_tokens as i32,
                        model_name: Some(outcome.model_name.as_str()),
                        temperature: Some(request.temperature as f64),
                        vector_search_results: vector_json.as_ref(),
                        generated_search_queries: queries_json.as_ref(),
                        web_search_results: web_json.as_ref(),
                    },
                )
                .await?
            }
        };
        tracing::info!(
            "[{}] Conversation committed to database. ID: {}, Title: {:?}",
            session_id,
            saved.id,
            saved.title
        );

        let system_message_content = messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(ChatResponse {
            response: outcome.text,
            conversation_id: saved.id,
            conversation_title: saved.title,
            vector_search_results: relevant_info
                .unwrap_or_else(|| "No results found".to_string()),
            generated_search_queries: generated_search_queries.unwrap_or_default(),
            web_search_results: summarized_results
                .unwrap_or_else(|| "No web search performed".to_string()),
            system_message_content,
            thinking_process: outcome.thinking,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens,
            },
            enable_web_search: request.enable_web_search,
            enable_deep_search: request.enable_deep_search,
            model_info: ModelInfo {
                name: outcome.model_name,
                extended_thinking: is_thinking_model.then_some(request.extended_thinking),
                thinking_budget: (is_thinking_model && request.extended_thinking)
                    .then_some(request.thinking_budget),
            },
        })
    }

    /// The retrieval stage: token-gate the query, rewrite or truncate it if
    /// oversized, then query the index. Never fails the turn.
    async fn semantic_search_stage(
        &self,
        user_query: &str,
        system_message_id: i32,
        session_id: &str,
    ) -> Option<String> {
        let query = user_query.to_string();
        let query_tokens = tokio::task::spawn_blocking({
            let query = query.clone();
            move || tokens::count_text_tokens(&query)
        })
        .await
        .unwrap_or(query.len() / 3);
        tracing::info!(
            "[{}] Estimated token count for embedding query: {}",
            session_id,
            query_tokens
        );

        let mut search_query = query.clone();
        if query_tokens > self.embedding_token_limit {
            tracing::warn!(
                "[{}] Query token count ({}) exceeds limit ({}).",
                session_id,
                query_tokens,
                self.embedding_token_limit
            );
            self.status
                .update_status(
                    session_id,
                    "Query is too long for semantic search, generating concise version...",
                )
                .await;
            search_query = self.generate_concise_query(&query).await;
            let concise_tokens = tokens::count_text_tokens(&search_query);
            tracing::info!(
                "[{}] Concise query generated ({} tokens).",
                session_id,
                concise_tokens
            );
            if concise_tokens > self.embedding_token_limit {
                tracing::warn!(
                    "[{}] Concise query still too long ({} tokens). Truncating further.",
                    session_id,
                    concise_tokens
                );
                let max_chars = self.embedding_token_limit * 3;
                search_query = search_query.chars().take(max_chars).collect();
            }
        }

        // Far past the limit even a rewrite is hopeless; skip the search.
        if query_tokens > self.embedding_token_limit * 3 / 2 {
            tracing::warn!(
                "[{}] Skipping semantic search because query is too long ({} tokens).",
                session_id,
                query_tokens
            );
            self.status
                .update_status(session_id, "Skipping document search as the query is too long.")
                .await;
            return None;
        }

        self.status
            .update_status(session_id, "Searching through documents")
            .await;
        match self
            .file_processor
            .query_index(&search_query, system_message_id)
            .await
        {
            Ok(Some(info)) => {
                self.status
                    .update_status(session_id, "Found relevant information in documents")
                    .await;
                Some(info)
            }
            Ok(None) => {
                self.status
                    .update_status(session_id, "No relevant documents found")
                    .await;
                None
            }
            Err(e) => {
                tracing::error!("[{}] Error querying index: {}", session_id, e);
                self.status
                    .update_status_with(
                        session_id,
                        "Error searching document database",
                        Some("error"),
                    )
                    .await;
                None
            }
        }
    }

    /// Rewrite a long query into a short embedding-friendly one, falling
    /// back to plain truncation.
    async fn generate_concise_query(&self, long_query: &str) -> String {
        const MAX_SUMMARY_INPUT_CHARS: usize = 16000 * 4;

        let mut input = long_query.to_string();
        if input.chars().count() > MAX_SUMMARY_INPUT_CHARS {
            input = input.chars().take(MAX_SUMMARY_INPUT_CHARS).collect();
            input.push_str("...");
        }

        let system_message = "You are an expert at summarizing long texts into concise search \
queries.\nAnalyze the following text and extract the core question, topic, or instruction.\n\
Your output should be a short phrase or sentence (ideally under 100 words, definitely under \
500 tokens)\nthat captures the essence of the text and is suitable for a semantic database \
search.\nFocus on the key entities, concepts, and the user's likely goal.\nRespond ONLY with \
the concise search query, no preamble or explanation.";

        let request = vec![Message::system(system_message), Message::user(input)];
        match self
            .llm
            .generate(CONCISE_QUERY_MODEL, &request, 0.1, &GenerateOptions::default())
            .await
        {
            Ok(outcome) if !outcome.text.trim().is_empty() => outcome.text.trim().to_string(),
            _ => {
                tracing::error!("Failed to generate concise query. Falling back to truncation.");
                long_query
                    .chars()
                    .take(self.embedding_token_limit * 3)
                    .collect()
            }
        }
    }

    async fn web_search_stage(
        &self,
        request: &ChatRequest,
        messages: &[Message],
        user_query: &str,
        user_id: i32,
        system_message_id: i32,
        session_id: &str,
    ) -> Result<(Vec<String>, String)> {
        let search = self.search.as_ref().ok_or_else(|| {
            Error::ApiKeyMissing("brave_search".to_string())
        })?;

        web_search::perform_web_search_process(
            self.llm.as_ref(),
            search.as_ref(),
            &self.fetch_client,
            &self.storage,
            &self.status,
            &request.model,
            messages,
            user_query,
            user_id,
            system_message_id,
            request.enable_deep_search,
            session_id,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_removes_the_sentinel_block() {
        let text = format!(
            "summarize this\n\n{}\nold content here\n{}\n",
            ATTACHMENT_BLOCK_START, ATTACHMENT_BLOCK_END
        );
        assert_eq!(strip_attachment_block(&text), "summarize this");
    }

    #[test]
    fn strip_without_block_is_identity_modulo_trim() {
        assert_eq!(strip_attachment_block("  plain question  "), "plain question");
    }

    #[test]
    fn injection_is_idempotent() {
        // Running strip-then-append twice with the same attachment content
        // yields the same final text.
        let fresh = wrap_attachment_content("notes.txt", "foo\nbar\nbaz");
        let first_pass = format!("{}\n\n{}", strip_attachment_block("summarize"), fresh)
            .trim()
            .to_string();
        let second_pass = format!("{}\n\n{}", strip_attachment_block(&first_pass), fresh)
            .trim()
            .to_string();
        // The wrapped content is not inside the sentinel pair, so this
        // exercises the real block form too:
        let with_block = format!(
            "summarize\n\n{}\n{}\n{}",
            ATTACHMENT_BLOCK_START, "stale content", ATTACHMENT_BLOCK_END
        );
        let stripped = strip_attachment_block(&with_block);
        assert_eq!(stripped, "summarize");
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn wrapped_content_names_the_file() {
        let wrapped = wrap_attachment_content("report.pdf", "alpha");
        assert!(wrapped.contains("--- Content from report.pdf ---"));
        assert!(wrapped.contains("--- End Content from report.pdf ---"));
        assert!(wrapped.contains("alpha"));
    }
}
