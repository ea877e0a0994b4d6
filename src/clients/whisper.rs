//! LLMWhisperer v2 document-extraction adapter.
//!
//! Submit → poll → retrieve. The wait is capped by the configured timeout
//! (180s by default); a job still running after that is a provider error.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct WhisperClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    wait_timeout: Duration,
}

/// Raw extraction outcome: the text plus the full response body, which the
/// caller persists for auditing.
#[derive(Debug)]
pub struct WhisperExtraction {
    pub text: String,
    pub raw_response: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    whisper_hash: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

impl WhisperClient {
    pub fn new(
        http: reqwest::Client,
        api_key: SecretString,
        base_url: String,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_key,
            base_url,
            wait_timeout,
        }
    }

    /// Run a whisper job to completion and return the extracted text.
    pub async fn extract(&self, file_bytes: Vec<u8>) -> Result<WhisperExtraction> {
        let whisper_hash = self.submit(file_bytes).await?;

        let deadline = tokio::time::Instant::now() + self.wait_timeout;
        loop {
            let status = self.status(&whisper_hash).await?;
            match status.as_str() {
                "processed" => break,
                "processing" | "accepted" | "delivered" => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::Provider(format!(
                            "LLMWhisperer job {} timed out after {:?}",
                            whisper_hash, self.wait_timeout
                        )));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                other => {
                    return Err(Error::Provider(format!(
                        "LLMWhisperer job {} failed with status '{}'",
                        whisper_hash, other
                    )));
                }
            }
        }

        self.retrieve(&whisper_hash).await
    }

    async fn submit(&self, file_bytes: Vec<u8>) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/whisper", self.base_url))
            .header("unstract-key", self.api_key.expose_secret())
            .header("Content-Type", "application/octet-stream")
            .query(&[("mode", "high_quality"), ("output_mode", "text")])
            .body(file_bytes)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("LLMWhisperer submit failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "LLMWhisperer submit returned {}: {}",
                status, body
            )));
        }

        let decoded = response
            .json::<SubmitResponse>()
            .await
            .map_err(|e| Error::Provider(format!("LLMWhisperer submit decode failed: {}", e)))?;
        Ok(decoded.whisper_hash)
    }

    async fn status(&self, whisper_hash: &str) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/whisper-status", self.base_url))
            .header("unstract-key", self.api_key.expose_secret())
            .query(&[("whisper_hash", whisper_hash)])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("LLMWhisperer status failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Provider(format!(
                "LLMWhisperer status returned {}",
                status
            )));
        }

        let decoded = response
            .json::<StatusResponse>()
            .await
            .map_err(|e| Error::Provider(format!("LLMWhisperer status decode failed: {}", e)))?;
        Ok(decoded.status)
    }

    async fn retrieve(&self, whisper_hash: &str) -> Result<WhisperExtraction> {
        let response = self
            .http
            .get(format!("{}/whisper-retrieve", self.base_url))
            .header("unstract-key", self.api_key.expose_secret())
            .query(&[("whisper_hash", whisper_hash), ("text_only", "false")])
            .send()
            .await
            .map_err(|e| Error::Provider(format!("LLMWhisperer retrieve failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Provider(format!(
                "LLMWhisperer retrieve returned {}",
                status
            )));
        }

        let raw_response = response
            .text()
            .await
            .map_err(|e| Error::Provider(format!("LLMWhisperer retrieve read failed: {}", e)))?;

        let text = extract_result_text(&raw_response).ok_or_else(|| {
            Error::Provider("No extracted text found in LLMWhisperer result".to_string())
        })?;

        Ok(WhisperExtraction { text, raw_response })
    }
}

/// Pull the extracted text out of a retrieve response. The service has
/// shipped several shapes; try the known keys before giving up.
fn extract_result_text(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let extraction = value.get("extraction")?;
    if let Some(text) = extraction.as_str() {
        return Some(text.to_string());
    }
    for key in ["result_text", "extracted_text", "layout_preserved_text", "text"] {
        if let Some(text) = extraction.get(key).and_then(|v| v.as_str()) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_string_extraction() {
        let raw = r#"{"extraction": "hello world"}"#;
        assert_eq!(extract_result_text(raw).as_deref(), Some("hello world"));
    }

    #[test]
    fn extracts_nested_result_text() {
        let raw = r#"{"extraction": {"result_text": "layout text"}}"#;
        assert_eq!(extract_result_text(raw).as_deref(), Some("layout text"));
    }

    #[test]
    fn prefers_first_non_empty_key() {
        let raw = r#"{"extraction": {"result_text": "", "extracted_text": "fallback"}}"#;
        assert_eq!(extract_result_text(raw).as_deref(), Some("fallback"));
    }

    #[test]
    fn missing_extraction_yields_none() {
        assert!(extract_result_text(r#"{"status": "ok"}"#).is_none());
        assert!(extract_result_text("not json").is_none());
    }
}
