//! Cerebras inference adapter (OpenAI-compatible chat completions).

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::clients::openai::ChatCompletion;
use crate::error::{Error, Result};

const API_URL: &str = "https://api.cerebras.ai/v1/chat/completions";

pub struct CerebrasClient {
    http: reqwest::Client,
    api_key: SecretString,
}

impl CerebrasClient {
    pub fn new(http: reqwest::Client, api_key: SecretString) -> Self {
        Self { http, api_key }
    }

    pub async fn chat_completion(&self, payload: &Value) -> Result<ChatCompletion> {
        let response = self
            .http
            .post(API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Cerebras request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("Cerebras rate limit reached".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "Cerebras returned {}: {}",
                status, body
            )));
        }

        response
            .json::<ChatCompletion>()
            .await
            .map_err(|e| Error::Provider(format!("Cerebras response decode failed: {}", e)))
    }
}
