use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the retrieval engine.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document file could not be read or did not match a known schema
    #[error("failed to load {}: {reason}", path.display())]
    DataLoad { path: PathBuf, reason: String },

    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// A query arrived before any store was built or loaded
    #[error("retrieval index is not initialized")]
    IndexNotReady,

    /// The installed store holds an index with zero vectors
    #[error("retrieval index contains no vectors")]
    IndexEmpty,

    #[error("chunk {chunk} does not resolve: {detail}")]
    AlignmentCorruption { chunk: usize, detail: String },

    #[error("query rewrite failed: {0}")]
    RewriteProvider(String),

    #[error("cannot build an index from zero vectors")]
    EmptyIndex,

    #[error(
        "store is misaligned: {chunks} chunks, {mappings} chunk-to-document entries, {vectors} vectors"
    )]
    Misaligned {
        chunks: usize,
        mappings: usize,
        vectors: usize,
    },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no documents loaded from {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("invalid index file {}: {reason}", path.display())]
    IndexFormat { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;

/// Failures from an HTTP collaborator (embedding provider, query rewriter).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    Decode(String),

    #[error("environment variable {0} is not set")]
    MissingCredential(String),
}

impl ProviderError {
    /// Only server-side failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Status { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_errors_are_retryable() {
        let server = ProviderError::Status {
            status: 503,
            body: String::new(),
        };
        let client = ProviderError::Status {
            status: 429,
            body: String::new(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!ProviderError::Decode("bad".to_string()).is_retryable());
        assert!(!ProviderError::MissingCredential("KEY".to_string()).is_retryable());
    }

    #[test]
    fn test_misaligned_message_lists_all_counts() {
        let err = RagError::Misaligned {
            chunks: 3,
            mappings: 2,
            vectors: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 chunks"));
        assert!(msg.contains("2 chunk-to-document"));
    }
}
