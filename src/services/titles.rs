//! Conversation title generation.
//!
//! New conversations get a 2-4 word title from a cheap model. Long system
//! messages and long histories are summarized first so the title request
//! stays within budget.

use crate::models::conversations::{Message, MessageRole};
use crate::services::llm_router::{GenerateOptions, GenerateText};
use crate::services::tokens;

pub const TITLE_MODEL: &str = "gpt-4o-mini";
pub const SUMMARY_MODEL: &str = "gpt-3.5-turbo";
pub const FALLBACK_TITLE: &str = "Conversation Summary";

const TITLE_MAX_TOKENS: u32 = 10;
const SUMMARY_MAX_TOKENS: u32 = 64;
const TOKEN_LIMIT: usize = 4000;
const CONTEXT_TURNS: usize = 5;

/// First system message content, if present.
pub fn extract_system_message(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == MessageRole::System)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// The last `max_turns` user/assistant messages joined for context.
pub fn extract_user_assistant_content(messages: &[Message], max_turns: usize) -> String {
    let filtered: Vec<&str> = messages
        .iter()
        .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
        .map(|m| m.content.as_str())
        .collect();
    let start = filtered.len().saturating_sub(max_turns);
    filtered[start..].join(" ")
}

async fn summarize_text(llm: &dyn GenerateText, text: &str, prompt: &str) -> String {
    let messages = vec![Message::system(prompt), Message::user(text)];
    let options = GenerateOptions {
        max_tokens: Some(SUMMARY_MAX_TOKENS),
        ..Default::default()
    };
    match llm.generate(SUMMARY_MODEL, &messages, 0.3, &options).await {
        Ok(outcome) => outcome.text.trim().to_string(),
        Err(e) => {
            tracing::error!("Error during summarization: {}", e);
            // Fallback: truncate to roughly the summary budget
            text.chars().take(SUMMARY_MAX_TOKENS as usize * 4).collect()
        }
    }
}

/// Generate a short title for a conversation, summarizing the system
/// message and recent turns first when they are too large.
pub async fn generate_summary_title(llm: &dyn GenerateText, messages: &[Message]) -> String {
    let system_message = extract_system_message(messages);
    let system_summary = if !system_message.is_empty()
        && tokens::count_text_tokens(&system_message) > TOKEN_LIMIT / 4
    {
        tracing::info!("System message too long, summarizing.");
        summarize_text(
            llm,
            &system_message,
            "Summarize the following system message for context:",
        )
        .await
    } else {
        system_message
    };

    let mut context = extract_user_assistant_content(messages, CONTEXT_TURNS);
    if tokens::count_text_tokens(&context) > TOKEN_LIMIT {
        tracing::info!("Conversation context too large, summarizing before title generation.");
        context = summarize_text(
            llm,
            &context,
            "Summarize the following conversation in 1-2 sentences, focusing on the main \
             topic or question.",
        )
        .await;
    }

    let mut title_prompt = String::new();
    if !system_summary.is_empty() {
        title_prompt.push_str(&format!(
            "System Message Summary (for context):\n{}\n\n",
            system_summary
        ));
    }
    title_prompt.push_str(&format!(
        "Conversation Summary (last turns or summarized):\n{}\n\n\
         Please create a very short (2-4 words) summary title for the above context.",
        context
    ));

    let request = vec![Message::system(title_prompt)];
    let options = GenerateOptions {
        max_tokens: Some(TITLE_MAX_TOKENS),
        ..Default::default()
    };
    match llm.generate(TITLE_MODEL, &request, 0.5, &options).await {
        Ok(outcome) => {
            let title = outcome.text.trim().to_string();
            tracing::info!("Generated conversation title: {}", title);
            if title.is_empty() {
                FALLBACK_TITLE.to_string()
            } else {
                title
            }
        }
        Err(e) => {
            tracing::error!("Error generating conversation title: {}", e);
            FALLBACK_TITLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_system_message() {
        let messages = vec![
            Message::user("hi"),
            Message::system("be brief"),
            Message::system("ignored second"),
        ];
        assert_eq!(extract_system_message(&messages), "be brief");
        assert_eq!(extract_system_message(&[Message::user("hi")]), "");
    }

    #[test]
    fn context_takes_the_last_turns_only() {
        let mut messages = vec![Message::system("sys")];
        for i in 0..8 {
            messages.push(Message::user(format!("u{}", i)));
            messages.push(Message::assistant(format!("a{}", i)));
        }
        let context = extract_user_assistant_content(&messages, 5);
        assert_eq!(context, "a5 u6 a6 u7 a7");
        assert!(!context.contains("sys"));
    }
}
