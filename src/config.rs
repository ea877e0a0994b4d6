use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use std::fmt;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub uploads: UploadConfig,
    pub auth: AuthConfig,
    pub ai: AiConfig,
    pub vector: VectorConfig,
    pub search: SearchConfig,
    pub extractor: ExtractorConfig,
}

/// Deployment profile selected by `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Production,
    Digitalocean,
    Azure,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn dev_secret() -> SecretString {
    SecretString::from("dev-secret".to_string())
}

impl AppEnv {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" => AppEnv::Production,
            "digitalocean" => AppEnv::Digitalocean,
            "azure" => AppEnv::Azure,
            _ => AppEnv::Development,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, AppEnv::Development)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host address to bind to (default: "0.0.0.0")
    pub host: String,
    /// Port to listen on (default: 3000)
    pub port: u16,
    /// Deployment profile; controls debug behavior and cookie security
    pub app_env: AppEnv,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Full connection URL; required at startup
    #[serde(skip_serializing, default = "empty_secret")]
    pub url: SecretString,
    /// Maximum pool connections
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Root of per-user storage (BASE_UPLOAD_FOLDER)
    pub base_folder: String,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Cookie signing key (SECRET_KEY)
    #[serde(skip_serializing, default = "dev_secret")]
    pub secret_key: SecretString,
    /// Whether the session cookie carries the Secure attribute
    pub cookie_secure: bool,
}

// Custom Debug implementation to redact the signing key
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<REDACTED>")
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct AiConfig {
    /// OpenAI API key; required (chat fallbacks, embeddings, titles)
    #[serde(skip_serializing, default = "empty_secret")]
    pub openai_api_key: SecretString,
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<SecretString>,
    #[serde(skip_serializing)]
    pub google_api_key: Option<SecretString>,
    #[serde(skip_serializing)]
    pub cerebras_api_key: Option<SecretString>,
    /// Token budget of the embedding model input
    pub embedding_token_limit: usize,
    /// Embedding model dimension
    pub embedding_dimension: usize,
    /// Chunk window in tokens for document ingestion
    pub chunk_size_tokens: usize,
    /// Chunk overlap in tokens
    pub chunk_overlap_tokens: usize,
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("openai_api_key", &"<REDACTED>")
            .field("anthropic_api_key", &self.anthropic_api_key.as_ref().map(|_| "<REDACTED>"))
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "<REDACTED>"))
            .field("cerebras_api_key", &self.cerebras_api_key.as_ref().map(|_| "<REDACTED>"))
            .field("embedding_token_limit", &self.embedding_token_limit)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("chunk_size_tokens", &self.chunk_size_tokens)
            .field("chunk_overlap_tokens", &self.chunk_overlap_tokens)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    #[serde(skip_serializing)]
    pub pinecone_api_key: Option<SecretString>,
    pub pinecone_cloud: String,
    pub pinecone_region: String,
    /// Name of the shared vector index
    pub index_name: String,
}

impl fmt::Debug for VectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorConfig")
            .field("pinecone_api_key", &self.pinecone_api_key.as_ref().map(|_| "<REDACTED>"))
            .field("pinecone_cloud", &self.pinecone_cloud)
            .field("pinecone_region", &self.pinecone_region)
            .field("index_name", &self.index_name)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(skip_serializing)]
    pub brave_api_key: Option<SecretString>,
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("brave_api_key", &self.brave_api_key.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
    #[serde(skip_serializing)]
    pub llmwhisperer_api_key: Option<SecretString>,
    pub llmwhisperer_base_url: String,
    /// Upper bound in seconds on a single extraction job
    pub wait_timeout_seconds: u64,
}

impl fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("llmwhisperer_api_key", &self.llmwhisperer_api_key.as_ref().map(|_| "<REDACTED>"))
            .field("llmwhisperer_base_url", &self.llmwhisperer_base_url)
            .field("wait_timeout_seconds", &self.wait_timeout_seconds)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    ///
    /// Sectioned values can be overridden with the `CHATFORGE` prefix and
    /// `__` separator (e.g. `CHATFORGE__SERVER__PORT=8080`); the flat
    /// variables the deployment environments already set (`DATABASE_URL`,
    /// provider keys, `APP_ENV`, `BASE_UPLOAD_FOLDER`, `SECRET_KEY`) are
    /// applied on top.
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(
                config::Environment::with_prefix("CHATFORGE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        config.apply_flat_env();

        config.validate().map_err(|e| {
            config::ConfigError::Message(format!("Configuration validation failed: {}", e))
        })?;

        Ok(config)
    }

    /// Apply the flat, well-known environment variables over the sectioned config.
    fn apply_flat_env(&mut self) {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(url) = env("DATABASE_URL") {
            self.database.url = SecretString::from(url);
        }
        if let Some(key) = env("SECRET_KEY") {
            self.auth.secret_key = SecretString::from(key);
        }
        if let Some(folder) = env("BASE_UPLOAD_FOLDER") {
            self.uploads.base_folder = folder;
        }
        if let Some(app_env) = env("APP_ENV") {
            self.server.app_env = AppEnv::parse(&app_env);
            self.auth.cookie_secure = !self.server.app_env.is_development();
        }
        if let Some(key) = env("OPENAI_API_KEY") {
            self.ai.openai_api_key = SecretString::from(key);
        }
        if let Some(key) = env("ANTHROPIC_API_KEY") {
            self.ai.anthropic_api_key = Some(SecretString::from(key));
        }
        if let Some(key) = env("GOOGLE_API_KEY") {
            self.ai.google_api_key = Some(SecretString::from(key));
        }
        if let Some(key) = env("CEREBRAS_API_KEY") {
            self.ai.cerebras_api_key = Some(SecretString::from(key));
        }
        if let Some(key) = env("PINECONE_API_KEY") {
            self.vector.pinecone_api_key = Some(SecretString::from(key));
        }
        if let Some(cloud) = env("PINECONE_CLOUD") {
            self.vector.pinecone_cloud = cloud;
        }
        if let Some(region) = env("PINECONE_REGION") {
            self.vector.pinecone_region = region;
        }
        if let Some(key) = env("BRAVE_SEARCH_API_KEY") {
            self.search.brave_api_key = Some(SecretString::from(key));
        }
        if let Some(key) = env("LLMWHISPERER_API_KEY") {
            self.extractor.llmwhisperer_api_key = Some(SecretString::from(key));
        }
        if let Some(base) = env("LLMWHISPERER_BASE_URL") {
            self.extractor.llmwhisperer_base_url = base;
        }
    }

    /// Validates the required settings: everything else degrades to a
    /// disabled feature, but the durable store and OpenAI are load-bearing.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.database.url.expose_secret().is_empty() {
            return Err("DATABASE_URL environment variable is required but not set.".into());
        }
        if self.ai.openai_api_key.expose_secret().is_empty() {
            return Err("OPENAI_API_KEY environment variable is required but not set.".into());
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            app_env: AppEnv::Development,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: SecretString::from(String::new()),
            max_connections: 10,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_folder: "./user_files".to_string(),
            max_upload_bytes: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: SecretString::from("dev-secret".to_string()),
            cookie_secure: false,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            openai_api_key: SecretString::from(String::new()),
            anthropic_api_key: None,
            google_api_key: None,
            cerebras_api_key: None,
            embedding_token_limit: 8190,
            embedding_dimension: 1536,
            chunk_size_tokens: 512,
            chunk_overlap_tokens: 50,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            pinecone_api_key: None,
            pinecone_cloud: "aws".to_string(),
            pinecone_region: "us-east-1".to_string(),
            index_name: "aiui".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { brave_api_key: None }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            llmwhisperer_api_key: None,
            llmwhisperer_base_url:
                "https://llmwhisperer-api.us-central.unstract.com/api/v2".to_string(),
            wait_timeout_seconds: 180,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets are skipped during serialization
        match serde_json::to_string_pretty(&self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "Error serializing config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_env_parses_known_profiles() {
        assert_eq!(AppEnv::parse("production"), AppEnv::Production);
        assert_eq!(AppEnv::parse("DigitalOcean"), AppEnv::Digitalocean);
        assert_eq!(AppEnv::parse("azure"), AppEnv::Azure);
        assert_eq!(AppEnv::parse("anything-else"), AppEnv::Development);
    }

    #[test]
    fn validate_requires_database_url_and_openai_key() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.database.url = SecretString::from("postgres://localhost/app".to_string());
        assert!(config.validate().is_err());

        config.ai.openai_api_key = SecretString::from("sk-test".to_string());
        assert!(config.validate().is_ok());
    }
}
