//! Provider-agnostic LLM routing (C9).
//!
//! Routing is by model-name prefix over a closed set of providers. Each
//! provider call retries up to three times with exponential backoff; there
//! is no cross-provider fallback.

use std::time::Duration;

use async_trait::async_trait;

use crate::clients::ClientBag;
use crate::error::{Error, Result};
use crate::models::conversations::{Message, MessageRole};
use crate::services::tokens;

const MAX_RETRIES: usize = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);

pub const REFUSAL_NOTICE: &str = "The model refused to answer this request for safety reasons.";

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub reasoning_effort: Option<String>,
    pub extended_thinking: Option<bool>,
    pub thinking_budget: Option<u32>,
    /// Completion cap override; providers default to 4096
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub text: String,
    /// Canonical model name reported by the provider
    pub model_name: String,
    /// Intermediate reasoning, for models that expose it
    pub thinking: Option<String>,
}

/// The generate capability, separated from the concrete router so the
/// pipelines that sit on top can be driven by fakes in tests.
#[async_trait]
pub trait GenerateText: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        options: &GenerateOptions,
    ) -> Result<GenerateOutcome>;
}

#[derive(Clone)]
pub struct LlmRouter {
    clients: ClientBag,
}

impl LlmRouter {
    pub fn new(clients: ClientBag) -> Self {
        Self { clients }
    }

    /// Retry an operation with exponential backoff (1s base, factor 2).
    async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < MAX_RETRIES => {
                    let delay = RETRY_BASE * 2u32.pow(attempt as u32);
                    tracing::warn!(
                        "Provider call failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt + 1,
                        MAX_RETRIES,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn handle_openai(
        &self,
        model: &str,
        messages: &[Message],
        temperature: Option<f32>,
        options: &GenerateOptions,
    ) -> Result<GenerateOutcome> {
        let max_tokens = options.max_tokens.unwrap_or(4096);
        let mut payload = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        if let Some(temperature) = temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        // o3-mini takes max_completion_tokens and an optional effort knob
        if model == "o3-mini" {
            payload["max_completion_tokens"] = serde_json::json!(max_tokens);
            if let Some(effort) = options.reasoning_effort.as_deref() {
                payload["reasoning_effort"] = serde_json::json!(effort);
            }
        } else {
            payload["max_tokens"] = serde_json::json!(max_tokens);
        }

        let response = self
            .retry(|| async { self.clients.openai.chat_completion(&payload).await })
            .await?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(GenerateOutcome {
            text,
            model_name: response.model,
            thinking: None,
        })
    }

    async fn handle_anthropic(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        options: &GenerateOptions,
    ) -> Result<GenerateOutcome> {
        let client = self
            .clients
            .anthropic
            .as_ref()
            .ok_or_else(|| Error::ApiKeyMissing("anthropic".to_string()))?;

        let anthropic_messages = fold_system_into_first_turn(messages);

        let mut payload = serde_json::json!({
            "model": model,
            "messages": anthropic_messages,
            "max_tokens": anthropic_max_tokens(model),
            "temperature": temperature,
        });
        if options.extended_thinking == Some(true) {
            if let Some(budget) = options.thinking_budget {
                payload["thinking"] =
                    serde_json::json!({ "type": "enabled", "budget_tokens": budget });
            }
        }

        let response = self
            .retry(|| async { client.create_message(&payload).await })
            .await?;

        tracing::info!("Anthropic stop_reason: {:?}", response.stop_reason);
        if response.stop_reason.as_deref() == Some("refusal") {
            return Ok(GenerateOutcome {
                text: REFUSAL_NOTICE.to_string(),
                model_name: model.to_string(),
                thinking: None,
            });
        }

        Ok(GenerateOutcome {
            text: response.text().unwrap_or_default().to_string(),
            model_name: model.to_string(),
            thinking: response.thinking().map(str::to_string),
        })
    }

    async fn handle_gemini(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<GenerateOutcome> {
        let client = self
            .clients
            .gemini
            .as_ref()
            .ok_or_else(|| Error::ApiKeyMissing("google".to_string()))?;

        let combined = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let text = self
            .retry(|| async { client.generate_content(model, &combined, temperature).await })
            .await?;

        Ok(GenerateOutcome {
            text,
            model_name: model.to_string(),
            thinking: None,
        })
    }

    async fn handle_cerebras(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<GenerateOutcome> {
        let client = self
            .clients
            .cerebras
            .as_ref()
            .ok_or_else(|| Error::ApiKeyMissing("cerebras".to_string()))?;

        let payload = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
        });

        tracing::info!("Routing request to Cerebras for model: {}", model);
        let response = self
            .retry(|| async { client.chat_completion(&payload).await })
            .await?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(GenerateOutcome {
            text,
            model_name: model.to_string(),
            thinking: None,
        })
    }

    /// Token counting with the model-appropriate counter. Gemini asks the
    /// provider and falls back to the offline heuristic; the tiktoken-based
    /// counters run on the blocking pool.
    pub async fn count_tokens(&self, model_name: &str, messages: &[Message]) -> usize {
        if model_name.starts_with("gemini-") {
            if let Some(client) = &self.clients.gemini {
                let mut total = 0;
                for message in messages {
                    match client.count_tokens(&message.content).await {
                        Ok(count) => total += count,
                        Err(e) => {
                            tracing::warn!("Gemini token count failed: {}; using approximation", e);
                            return tokens::approximate_gemini_tokens(messages);
                        }
                    }
                }
                return total;
            }
            return tokens::approximate_gemini_tokens(messages);
        }

        let model_name = model_name.to_string();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || tokens::count_tokens(&model_name, &messages))
            .await
            .unwrap_or(0)
    }
}

/// Anthropic takes no system role on this path: fold the system message
/// into the first turn and make sure the list opens with a user message.
pub fn fold_system_into_first_turn(messages: &[Message]) -> Vec<Message> {
    let mut system_content: Option<String> = None;
    let mut folded: Vec<Message> = Vec::new();
    for message in messages {
        match message.role {
            MessageRole::System => system_content = Some(message.content.clone()),
            MessageRole::User | MessageRole::Assistant => folded.push(message.clone()),
        }
    }
    if let (Some(system), Some(first)) = (&system_content, folded.first_mut()) {
        first.content = format!("{}\n\nUser: {}", system, first.content);
    }
    if folded
        .first()
        .map(|m| m.role != MessageRole::User)
        .unwrap_or(true)
    {
        folded.insert(0, Message::user(""));
    }
    folded
}

/// Completion budget per Claude tier.
pub fn anthropic_max_tokens(model: &str) -> u32 {
    match model {
        "claude-3-7-sonnet-20250219" => 64000,
        "claude-opus-4-20250514" | "claude-sonnet-4-20250514" => 32000,
        _ => 4096,
    }
}

#[async_trait]
impl GenerateText for LlmRouter {
    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        options: &GenerateOptions,
    ) -> Result<GenerateOutcome> {
        tracing::info!(
            "Getting response from model: {} ({} messages, temperature {})",
            model,
            messages.len(),
            temperature
        );

        if model.starts_with("gpt-") {
            self.handle_openai(model, messages, Some(temperature), options)
                .await
        } else if model == "o3-mini" {
            self.handle_openai(model, messages, None, options).await
        } else if model.starts_with("claude-") {
            self.handle_anthropic(model, messages, temperature, options)
                .await
        } else if model.starts_with("gemini-") {
            self.handle_gemini(model, messages, temperature).await
        } else if model.starts_with("llama3")
            || model == "llama-3.3-70b"
            || model == "deepSeek-r1-distill-llama-70B"
        {
            self.handle_cerebras(model, messages, temperature).await
        } else {
            Err(Error::Validation(format!("Unsupported model: {}", model)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_is_folded_into_the_first_user_turn() {
        let messages = vec![
            Message::system("You are terse."),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        let folded = fold_system_into_first_turn(&messages);
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].role, MessageRole::User);
        assert_eq!(folded[0].content, "You are terse.\n\nUser: hello");
        assert_eq!(folded[1].content, "hi");
    }

    #[test]
    fn missing_leading_user_turn_gets_an_empty_one() {
        let messages = vec![Message::assistant("I said this earlier")];
        let folded = fold_system_into_first_turn(&messages);
        assert_eq!(folded[0].role, MessageRole::User);
        assert_eq!(folded[0].content, "");
        assert_eq!(folded.len(), 2);
    }

    #[test]
    fn empty_history_still_opens_with_a_user_turn() {
        let folded = fold_system_into_first_turn(&[]);
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].role, MessageRole::User);
    }

    #[test]
    fn claude_completion_budgets_follow_the_tiers() {
        assert_eq!(anthropic_max_tokens("claude-3-7-sonnet-20250219"), 64000);
        assert_eq!(anthropic_max_tokens("claude-opus-4-20250514"), 32000);
        assert_eq!(anthropic_max_tokens("claude-sonnet-4-20250514"), 32000);
        assert_eq!(anthropic_max_tokens("claude-3-5-haiku-latest"), 4096);
    }
}
