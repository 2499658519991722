pub mod chunker;
pub mod embedder;
pub mod hybrid;
pub mod index;
pub mod indexer;
pub mod lexical;
pub mod retry;
pub mod rewriter;
pub mod searcher;
pub mod store;
pub mod tokenizer;

pub use chunker::{Chunk, ChunkStrategy, Chunker};
pub use embedder::{create_embedder, Embedder, EmbedderConfig, EmbeddingService};
pub use hybrid::{reciprocal_rank_fusion, RankingMode};
pub use index::{AnnIndex, IndexConfig, IndexKind, VectorIndex};
pub use indexer::{load_store, IndexResult, Indexer, RagPaths};
pub use retry::RetryPolicy;
pub use rewriter::{ChatRewriter, QueryRewriter, RewriterConfig};
pub use searcher::{Retrieval, RetrievalStatus, SearchOptions, SearchResult, Searcher};
pub use store::{ChunkStore, RetrievalStore, StoreHandle};
