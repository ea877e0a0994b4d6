//! Thin adapters over the external services the backend talks to.
//!
//! Each client wraps one HTTP API behind the handful of calls we actually
//! make. All clients share a single `reqwest::Client`; the `ClientBag`
//! owns them and is constructed once at startup. A missing API key leaves
//! the corresponding slot empty, which disables that feature rather than
//! failing the process (only the database and OpenAI are required).

pub mod anthropic;
pub mod cerebras;
pub mod gemini;
pub mod openai;
pub mod pinecone;
pub mod whisper;

pub use anthropic::AnthropicClient;
pub use cerebras::CerebrasClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use pinecone::PineconeClient;
pub use whisper::WhisperClient;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::Config;

/// Every external SDK instance, owned in one place and injected where needed.
#[derive(Clone)]
pub struct ClientBag {
    pub openai: Arc<OpenAiClient>,
    pub anthropic: Option<Arc<AnthropicClient>>,
    pub gemini: Option<Arc<GeminiClient>>,
    pub cerebras: Option<Arc<CerebrasClient>>,
    pub pinecone: Option<Arc<PineconeClient>>,
    pub whisper: Option<Arc<WhisperClient>>,
    pub brave_api_key: Option<SecretString>,
}

impl ClientBag {
    pub fn from_config(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("failed to build HTTP client");

        let openai = Arc::new(OpenAiClient::new(http.clone(), config.ai.openai_api_key.clone()));

        let anthropic = config
            .ai
            .anthropic_api_key
            .clone()
            .map(|key| Arc::new(AnthropicClient::new(http.clone(), key)));

        let gemini = config
            .ai
            .google_api_key
            .clone()
            .map(|key| Arc::new(GeminiClient::new(http.clone(), key)));

        let cerebras = config
            .ai
            .cerebras_api_key
            .clone()
            .map(|key| Arc::new(CerebrasClient::new(http.clone(), key)));

        let pinecone = config.vector.pinecone_api_key.clone().map(|key| {
            Arc::new(PineconeClient::new(
                http.clone(),
                key,
                config.vector.index_name.clone(),
                config.vector.pinecone_cloud.clone(),
                config.vector.pinecone_region.clone(),
            ))
        });

        let whisper = config.extractor.llmwhisperer_api_key.clone().map(|key| {
            Arc::new(WhisperClient::new(
                http.clone(),
                key,
                config.extractor.llmwhisperer_base_url.clone(),
                Duration::from_secs(config.extractor.wait_timeout_seconds),
            ))
        });

        let bag = Self {
            openai,
            anthropic,
            gemini,
            cerebras,
            pinecone,
            whisper,
            brave_api_key: config.search.brave_api_key.clone(),
        };
        bag.log_availability();
        bag
    }

    fn log_availability(&self) {
        let mut available = vec!["openai"];
        let mut missing = Vec::new();
        for (name, present) in [
            ("anthropic", self.anthropic.is_some()),
            ("gemini", self.gemini.is_some()),
            ("cerebras", self.cerebras.is_some()),
            ("pinecone", self.pinecone.is_some()),
            ("llmwhisperer", self.whisper.is_some()),
            ("brave_search", self.brave_api_key.is_some()),
        ] {
            if present {
                available.push(name);
            } else {
                missing.push(name);
            }
        }
        tracing::info!("Client initialization complete. Available: {:?}", available);
        if !missing.is_empty() {
            tracing::warn!("Disabled (no API key): {:?}", missing);
        }
    }
}
