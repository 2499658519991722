use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::Document;

use super::tokenizer::Tokenizer;

/// How document text is cut into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Non-overlapping character windows of `chunk_param` characters
    Fixed,
    /// Non-overlapping windows of `chunk_param` tokens
    Token,
    /// Token midpoint bisection until every piece has at most `chunk_param` tokens
    Recursive,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Fixed => "fixed",
            ChunkStrategy::Token => "token",
            ChunkStrategy::Recursive => "recursive",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(ChunkStrategy::Fixed),
            "token" => Ok(ChunkStrategy::Token),
            "recursive" => Ok(ChunkStrategy::Recursive),
            other => Err(format!(
                "unknown chunk strategy '{}' (expected fixed, token or recursive)",
                other
            )),
        }
    }
}

/// A chunk of document text, tagged with the position of its source document
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub doc_id: usize,
}

pub struct Chunker {
    strategy: ChunkStrategy,
    chunk_param: usize,
    tokenizer: Tokenizer,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkStrategy::Recursive, 500)
    }
}

impl Chunker {
    pub fn new(strategy: ChunkStrategy, chunk_param: usize) -> Self {
        Self {
            strategy,
            chunk_param: chunk_param.max(1),
            tokenizer: Tokenizer::new(),
        }
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        match self.strategy {
            ChunkStrategy::Fixed => fixed_width(text, self.chunk_param),
            ChunkStrategy::Token => self.tokenizer.windows(text, self.chunk_param),
            ChunkStrategy::Recursive => self.tokenizer.bisect(text, self.chunk_param),
        }
    }

    /// Chunk every document in order. Chunk order follows document order, so
    /// `chunks[i].doc_id` is the i-th entry of the chunk-to-document map.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .enumerate()
            .flat_map(|(doc_idx, doc)| {
                self.chunk_text(&doc.indexable_text())
                    .into_iter()
                    .filter(|text| !text.is_empty())
                    .map(move |text| Chunk {
                        text,
                        doc_id: doc_idx,
                    })
            })
            .collect()
    }
}

fn fixed_width(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}
