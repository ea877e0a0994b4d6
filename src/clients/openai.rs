//! OpenAI chat-completions and embeddings adapter.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

const API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRecord>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRecord {
    embedding: Vec<f32>,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: SecretString) -> Self {
        Self { http, api_key }
    }

    /// POST /chat/completions with a caller-built payload. The payload shape
    /// varies per model (o3-mini swaps `max_tokens` for
    /// `max_completion_tokens`), so routing owns it.
    pub async fn chat_completion(&self, payload: &Value) -> Result<ChatCompletion> {
        let response = self
            .http
            .post(format!("{}/chat/completions", API_BASE))
            .bearer_auth(self.api_key.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("OpenAI request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("OpenAI rate limit reached".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OpenAI returned {}: {}",
                status, body
            )));
        }

        response
            .json::<ChatCompletion>()
            .await
            .map_err(|e| Error::Provider(format!("OpenAI response decode failed: {}", e)))
    }

    /// Embed a single input with the given embedding model.
    pub async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>> {
        let response = self
            .http
            .post(format!("{}/embeddings", API_BASE))
            .bearer_auth(self.api_key.expose_secret())
            .json(&serde_json::json!({ "model": model, "input": input }))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("OpenAI embeddings request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OpenAI embeddings returned {}: {}",
                status, body
            )));
        }

        let mut decoded = response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| Error::Provider(format!("OpenAI embeddings decode failed: {}", e)))?;

        decoded
            .data
            .pop()
            .map(|record| record.embedding)
            .ok_or_else(|| Error::Provider("OpenAI embeddings returned no data".to_string()))
    }
}
