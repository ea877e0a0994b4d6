//! Anthropic messages API adapter.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct AnthropicMessage {
    pub content: Vec<AnthropicContentBlock>,
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, api_key: SecretString) -> Self {
        Self { http, api_key }
    }

    pub async fn create_message(&self, payload: &Value) -> Result<AnthropicMessage> {
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Anthropic request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("Anthropic rate limit reached".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Anthropic returned {}: {}",
                status, body
            )));
        }

        response
            .json::<AnthropicMessage>()
            .await
            .map_err(|e| Error::Provider(format!("Anthropic response decode failed: {}", e)))
    }
}

impl AnthropicMessage {
    /// First text block, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Thinking trace emitted under extended thinking, if any.
    pub fn thinking(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            AnthropicContentBlock::Thinking { thinking } => Some(thinking.as_str()),
            _ => None,
        })
    }
}
