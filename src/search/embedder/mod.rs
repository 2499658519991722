mod ollama;
mod openai;
mod service;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use service::EmbeddingService;

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;
    async fn health_check(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub dimensions: usize,
    /// Texts sent per provider call
    pub batch_size: usize,
    /// Provider input limit; longer texts are truncated to it
    pub token_limit: usize,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            endpoint: None,
            dimensions: 1536,
            batch_size: 10,
            token_limit: 8191,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

pub fn create_embedder(config: &EmbedderConfig, retry: RetryPolicy) -> Result<Box<dyn Embedder>> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    match config.provider.as_str() {
        "openai" => {
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(Box::new(OpenAiEmbedder::new(
                &endpoint,
                &config.model,
                config.dimensions,
                &config.api_key_env,
                timeout,
                retry,
            )?))
        }
        "ollama" => {
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Box::new(OllamaEmbedder::new(
                &endpoint,
                &config.model,
                config.dimensions,
                timeout,
                retry,
            )?))
        }
        other => bail!("Unknown embedding provider '{}' (expected openai or ollama)", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_known_providers() {
        let config = EmbedderConfig::default();
        let embedder = create_embedder(&config, RetryPolicy::default()).unwrap();
        assert_eq!(embedder.dimensions(), 1536);

        let config = EmbedderConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            ..Default::default()
        };
        let embedder = create_embedder(&config, RetryPolicy::default()).unwrap();
        assert_eq!(embedder.dimensions(), 768);
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbedderConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(create_embedder(&config, RetryPolicy::default()).is_err());
    }
}
