//! Pinecone serverless index adapter.
//!
//! The control plane resolves (and lazily creates) the shared index; the
//! data-plane host it returns is cached for the lifetime of the process.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};

const CONTROL_PLANE: &str = "https://api.pinecone.io";

pub struct PineconeClient {
    http: reqwest::Client,
    api_key: SecretString,
    index_name: String,
    cloud: String,
    region: String,
    host: OnceCell<String>,
}

#[derive(Debug, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ScoredVector {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredVector>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

impl PineconeClient {
    pub fn new(
        http: reqwest::Client,
        api_key: SecretString,
        index_name: String,
        cloud: String,
        region: String,
    ) -> Self {
        Self {
            http,
            api_key,
            index_name,
            cloud,
            region,
            host: OnceCell::new(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Describe the index, creating it if it does not exist, and cache the
    /// data-plane host. Called once at startup; later calls are no-ops.
    pub async fn ensure_index(&self, dimension: usize) -> Result<()> {
        self.resolve_host(dimension).await.map(|_| ())
    }

    async fn resolve_host(&self, dimension: usize) -> Result<&str> {
        self.host
            .get_or_try_init(|| async {
                match self.describe_index().await {
                    Ok(description) => Ok(description.host),
                    Err(Error::NotFound(_)) => {
                        tracing::info!(
                            "Vector index '{}' not found, creating it",
                            self.index_name
                        );
                        self.create_index(dimension).await?;
                        Ok(self.describe_index().await?.host)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map(String::as_str)
    }

    async fn describe_index(&self) -> Result<IndexDescription> {
        let response = self
            .http
            .get(format!("{}/indexes/{}", CONTROL_PLANE, self.index_name))
            .header("Api-Key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| Error::Store(format!("Pinecone describe failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "Pinecone index '{}' does not exist",
                self.index_name
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Store(format!("Pinecone describe returned {}", status)));
        }

        response
            .json::<IndexDescription>()
            .await
            .map_err(|e| Error::Store(format!("Pinecone describe decode failed: {}", e)))
    }

    async fn create_index(&self, dimension: usize) -> Result<()> {
        let payload = serde_json::json!({
            "name": self.index_name,
            "dimension": dimension,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": self.cloud, "region": self.region } },
        });

        let response = self
            .http
            .post(format!("{}/indexes", CONTROL_PLANE))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Store(format!("Pinecone create failed: {}", e)))?;

        // 409 means another deployment won the race; the index exists either way
        if !response.status().is_success() && response.status() != reqwest::StatusCode::CONFLICT {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Pinecone create returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    fn data_host(&self) -> Result<&str> {
        self.host
            .get()
            .map(String::as_str)
            .ok_or_else(|| Error::Store("Pinecone index host not resolved".to_string()))
    }

    pub async fn upsert(&self, namespace: &str, vectors: Vec<VectorRecord>) -> Result<()> {
        let host = self.data_host()?;
        let payload = serde_json::json!({ "vectors": vectors, "namespace": namespace });

        let response = self
            .http
            .post(format!("https://{}/vectors/upsert", host))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Store(format!("Pinecone upsert failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Pinecone upsert returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    pub async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ScoredVector>> {
        let host = self.data_host()?;
        let payload = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "namespace": namespace,
            "includeMetadata": include_metadata,
        });

        let response = self
            .http
            .post(format!("https://{}/query", host))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Store(format!("Pinecone query failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Pinecone query returned {}: {}",
                status, body
            )));
        }

        let decoded = response
            .json::<QueryResponse>()
            .await
            .map_err(|e| Error::Store(format!("Pinecone query decode failed: {}", e)))?;
        Ok(decoded.matches)
    }

    pub async fn delete_ids(&self, namespace: &str, ids: &[String]) -> Result<()> {
        let host = self.data_host()?;
        let payload = serde_json::json!({ "ids": ids, "namespace": namespace });

        let response = self
            .http
            .post(format!("https://{}/vectors/delete", host))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Store(format!("Pinecone delete failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Pinecone delete returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}
