use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, warn};

use crate::search::tokenizer::Tokenizer;

use super::Embedder;

/// Batched embedding with partial-failure tolerance.
///
/// `encode` always returns exactly one vector per input, in input order. A batch
/// whose provider call fails (or returns the wrong shape) is replaced by zero
/// vectors so chunk positions stay aligned with vector positions.
pub struct EmbeddingService {
    embedder: Arc<dyn Embedder>,
    token_limit: usize,
    tokenizer: Tokenizer,
}

impl EmbeddingService {
    pub fn new(embedder: Arc<dyn Embedder>, token_limit: usize) -> Self {
        Self {
            embedder,
            token_limit: token_limit.max(1),
            tokenizer: Tokenizer::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub async fn encode(&self, texts: &[String], batch_size: usize) -> Vec<Vec<f32>> {
        let batch_size = batch_size.max(1);
        let mut batches: Vec<Option<Vec<Vec<f32>>>> = Vec::new();

        for (batch_idx, batch) in texts.chunks(batch_size).enumerate() {
            let offset = batch_idx * batch_size;
            let prepared: Vec<String> = batch
                .iter()
                .enumerate()
                .map(|(i, text)| self.fit_to_limit(text, offset + i))
                .collect();

            match self.embedder.embed_batch(&prepared).await {
                Ok(vectors) if vectors.len() == batch.len() => batches.push(Some(vectors)),
                Ok(vectors) => {
                    warn!(
                        "Embedding batch {} returned {} vectors for {} texts; using zero vectors",
                        batch_idx,
                        vectors.len(),
                        batch.len()
                    );
                    batches.push(None);
                }
                Err(e) => {
                    error!(
                        "Embedding batch {} failed ({} texts); using zero vectors: {:#}",
                        batch_idx,
                        batch.len(),
                        e
                    );
                    batches.push(None);
                }
            }
        }

        let dimension = batches
            .iter()
            .flatten()
            .flatten()
            .map(Vec::len)
            .next()
            .unwrap_or_else(|| self.embedder.dimensions());

        let mut output = Vec::with_capacity(texts.len());
        for (batch_idx, (batch, result)) in texts.chunks(batch_size).zip(batches).enumerate() {
            match result {
                Some(vectors) if vectors.iter().all(|v| v.len() == dimension) => {
                    output.extend(vectors)
                }
                Some(_) => {
                    warn!(
                        "Embedding batch {} has inconsistent dimensions; using zero vectors",
                        batch_idx
                    );
                    output.extend(std::iter::repeat_with(|| vec![0.0; dimension]).take(batch.len()));
                }
                None => {
                    output.extend(std::iter::repeat_with(|| vec![0.0; dimension]).take(batch.len()))
                }
            }
        }

        debug!("Encoded {} texts into {}-d vectors", output.len(), dimension);
        output
    }

    /// Embed a single query, truncated to the provider limit. Errors propagate.
    pub async fn encode_query(&self, query: &str) -> Result<Vec<f32>> {
        let text = self.fit_to_limit(query, 0);
        self.embedder.embed(&text).await
    }

    fn fit_to_limit(&self, text: &str, position: usize) -> String {
        let tokens = self.tokenizer.count(text);
        if tokens > self.token_limit {
            warn!(
                "Text {} exceeds the provider limit ({} > {} tokens); truncating",
                position, tokens, self.token_limit
            );
            self.tokenizer.truncate(text, self.token_limit)
        } else {
            text.to_string()
        }
    }
}
