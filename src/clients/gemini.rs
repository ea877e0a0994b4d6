//! Google generative-language API adapter.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Error, Result};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Model used for server-side token counting.
const COUNT_TOKENS_MODEL: &str = "gemini-2.0-flash";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: usize,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: SecretString) -> Self {
        Self { http, api_key }
    }

    /// Generate from a single concatenated user turn.
    pub async fn generate_content(&self, model: &str, text: &str, temperature: f32) -> Result<String> {
        let payload = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": { "temperature": temperature },
        });

        let response = self
            .http
            .post(format!("{}/{}:generateContent", API_BASE, model))
            .query(&[("key", self.api_key.expose_secret())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gemini request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("Gemini rate limit reached".to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("Gemini returned {}: {}", status, body)));
        }

        let decoded = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| Error::Provider(format!("Gemini response decode failed: {}", e)))?;

        decoded
            .candidates
            .and_then(|mut c| c.drain(..).next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|mut p| p.drain(..).next())
            .and_then(|p| p.text)
            .ok_or_else(|| Error::Provider("Gemini returned no text candidate".to_string()))
    }

    /// Server-side token count for a piece of text.
    pub async fn count_tokens(&self, text: &str) -> Result<usize> {
        let payload = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
        });

        let response = self
            .http
            .post(format!("{}/{}:countTokens", API_BASE, COUNT_TOKENS_MODEL))
            .query(&[("key", self.api_key.expose_secret())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Gemini countTokens request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Provider(format!("Gemini countTokens returned {}", status)));
        }

        let decoded = response
            .json::<CountTokensResponse>()
            .await
            .map_err(|e| Error::Provider(format!("Gemini countTokens decode failed: {}", e)))?;
        Ok(decoded.total_tokens)
    }
}
