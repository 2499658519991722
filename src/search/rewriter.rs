use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

use super::retry::RetryPolicy;

/// Turns a query that found nothing into one more likely to match.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, query: &str) -> Result<String>;
}

const DEFAULT_PROMPT: &str = "Rewrite the following question as a concise search query. \
Keep the key terms and names, drop filler words, and answer with the query only.\n\
Question: {query}\n\
Search query:";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriterConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    /// Prompt template; `{query}` is replaced by the user's query
    pub prompt: String,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            max_tokens: 1000,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Rewriter backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatRewriter {
    endpoint: String,
    model: String,
    api_key_env: String,
    max_tokens: u32,
    prompt: String,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl ChatRewriter {
    pub fn new(config: &RewriterConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            max_tokens: config.max_tokens,
            prompt: config.prompt.clone(),
            client,
            retry,
        })
    }

    fn render_prompt(&self, query: &str) -> String {
        self.prompt.replace("{query}", query)
    }

    async fn request(&self, prompt: &str) -> Result<String, ProviderError> {
        let api_key = std::env::var(&self.api_key_env)
            .map_err(|_| ProviderError::MissingCredential(self.api_key_env.clone()))?;
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Decode("response has no message content".to_string()))
    }
}

#[async_trait]
impl QueryRewriter for ChatRewriter {
    async fn rewrite(&self, query: &str) -> Result<String> {
        let prompt = self.render_prompt(query);
        let rewritten = self
            .retry
            .run("query rewrite", || self.request(&prompt))
            .await
            .map_err(|e| anyhow!("Rewrite request to {} failed: {}", self.endpoint, e))?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            bail!("Rewriter returned an empty query");
        }
        Ok(rewritten.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_substitutes_query() {
        let rewriter = ChatRewriter::new(&RewriterConfig::default(), RetryPolicy::default()).unwrap();
        let prompt = rewriter.render_prompt("opening hours of the library");
        assert!(prompt.contains("Question: opening hours of the library"));
        assert!(!prompt.contains("{query}"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let config = RewriterConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            api_key_env: "DOCRAG_REWRITE_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        let rewriter = ChatRewriter::new(&config, RetryPolicy::default()).unwrap();
        let err = rewriter.rewrite("anything").await.unwrap_err();
        assert!(err.to_string().contains("DOCRAG_REWRITE_KEY_THAT_IS_NEVER_SET"));
    }
}
