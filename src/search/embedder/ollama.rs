use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProviderError;
use crate::search::retry::RetryPolicy;

use super::Embedder;

pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl OllamaEmbedder {
    pub fn new(
        endpoint: &str,
        model: &str,
        dimensions: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
            client,
            retry,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            truncate: true,
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let embed_response: EmbedResponse = response.json().await?;
        Ok(embed_response.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.retry
            .run("ollama embed", || self.request(texts))
            .await
            .map_err(|e| match e {
                ProviderError::Transport(ref inner) if inner.is_connect() => anyhow!(
                    "Cannot connect to Ollama at {}. Is Ollama running?\n\
                     Start: ollama serve",
                    self.endpoint
                ),
                ProviderError::Status { status: 404, .. } => anyhow!(
                    "Model '{}' not found. Pull it with:\n  ollama pull {}",
                    self.model,
                    self.model
                ),
                other => anyhow!("Ollama request failed: {}", other),
            })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await
            .map_err(|_| {
                anyhow!(
                    "Cannot connect to Ollama at {}. Is Ollama running?",
                    self.endpoint
                )
            })?;

        if !response.status().is_success() {
            return Err(anyhow!("Ollama health check failed"));
        }

        let tags: OllamaTagsResponse = response.json().await?;
        let model_available = tags
            .models
            .iter()
            .any(|m| m.name.starts_with(&self.model) || m.name == format!("{}:latest", self.model));

        if !model_available {
            return Err(anyhow!(
                "Model '{}' not installed. Pull it with:\n  ollama pull {}",
                self.model,
                self.model
            ));
        }

        Ok(())
    }
}
