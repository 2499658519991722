use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::types::Document;

use super::embedder::EmbeddingService;
use super::hybrid::{reciprocal_rank_fusion, RankingMode};
use super::index::VectorIndex;
use super::indexer::{Indexer, RagPaths};
use super::lexical;
use super::rewriter::QueryRewriter;
use super::store::{RetrievalStore, StoreHandle};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub top_k: usize,
    /// `dense`, `tfidf` or `rrf`; anything else is treated as `rrf`
    pub ranking_mode: String,
    pub rrf_k: f32,
    /// Dense hits farther than this squared L2 distance are dropped
    pub max_distance: Option<f32>,
    /// Result count for the retry after a rewrite; defaults to `top_k`
    pub escalation_top_k: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            ranking_mode: "rrf".to_string(),
            rrf_k: 60.0,
            max_distance: None,
            escalation_top_k: None,
        }
    }
}

impl SearchOptions {
    pub fn mode(&self) -> RankingMode {
        RankingMode::from_name(&self.ranking_mode)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_text: String,
    pub chunk_idx: usize,
    pub doc_idx: usize,
    pub original_doc: Document,
    pub score: f32,
}

/// How a retrieval ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalStatus {
    /// The literal query matched
    Direct,
    /// The literal query found nothing; the rewritten one matched
    Rewritten { query: String },
    NoMatch,
    NotInitialized,
    IndexEmpty,
}

#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub status: RetrievalStatus,
    pub results: Vec<SearchResult>,
}

impl Retrieval {
    fn empty(status: RetrievalStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
        }
    }
}

pub struct Searcher {
    store: Arc<StoreHandle>,
    embedding: Arc<EmbeddingService>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
    options: SearchOptions,
}

impl Searcher {
    pub fn new(
        store: Arc<StoreHandle>,
        embedding: Arc<EmbeddingService>,
        options: SearchOptions,
    ) -> Self {
        Self {
            store,
            embedding,
            rewriter: None,
            options,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Open the corpus at `paths`, building it if it has no index yet, and swap it in whole.
    ///
    /// Used for reloads and profile switches. Searches already running keep the store
    /// they started with. Returns `false` and keeps the current store when `paths` has
    /// an index but no chunk store.
    pub async fn reload(&self, indexer: &Indexer, paths: &RagPaths) -> Result<bool> {
        let Some(store) = indexer.open_or_build(paths).await? else {
            warn!(
                "Nothing to load from {}; keeping the current store",
                paths.index_path.display()
            );
            return Ok(false);
        };
        self.store.replace(store);
        Ok(true)
    }

    /// One retrieval pass over the current store.
    ///
    /// Fails with `IndexNotReady` when no store is installed and `IndexEmpty`
    /// when it holds no vectors. Chunks that do not resolve are skipped.
    pub async fn search_top_k(
        &self,
        query: &str,
        top_k: usize,
        mode: RankingMode,
    ) -> Result<Vec<SearchResult>> {
        let store = self.store.current().ok_or(RagError::IndexNotReady)?;
        if store.is_empty() {
            return Err(RagError::IndexEmpty);
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let ranked: Vec<(usize, f32)> = match mode {
            RankingMode::Dense => self
                .dense_ranking(&store, query, top_k)
                .await?
                .into_iter()
                .map(|(position, distance)| (position, 1.0 / (1.0 + distance)))
                .collect(),
            RankingMode::Tfidf => lexical::rank(query, &store.chunks().all_chunks, top_k)
                .into_iter()
                .map(|hit| (hit.position, hit.score))
                .collect(),
            RankingMode::Rrf => {
                // Wider dense pool for fusion
                let dense: Vec<usize> = self
                    .dense_ranking(&store, query, top_k.saturating_mul(2))
                    .await?
                    .into_iter()
                    .map(|(position, _)| position)
                    .collect();
                let lexical: Vec<usize> = lexical::rank(query, &store.chunks().all_chunks, top_k)
                    .into_iter()
                    .map(|hit| hit.position)
                    .collect();
                reciprocal_rank_fusion(self.options.rrf_k, top_k, &[dense, lexical])
                    .into_iter()
                    .map(|hit| (hit.position, hit.score))
                    .collect()
            }
        };

        debug!("{} ranking produced {} candidates", mode, ranked.len());
        Ok(hydrate(&store, ranked))
    }

    /// Search, and when nothing matches, rewrite the query and search exactly once more.
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        let mode = self.options.mode();
        let top_k = self.options.top_k;

        let first = match self.search_top_k(query, top_k, mode).await {
            Ok(results) => results,
            Err(err) => return unavailable(err),
        };
        if !first.is_empty() {
            return Ok(Retrieval {
                status: RetrievalStatus::Direct,
                results: first,
            });
        }

        let Some(rewriter) = &self.rewriter else {
            debug!("No results and no rewriter configured");
            return Ok(Retrieval::empty(RetrievalStatus::NoMatch));
        };

        info!("No results for '{}', rewriting query", query);
        let rewritten = match rewriter.rewrite(query).await {
            Ok(rewritten) => rewritten,
            Err(e) => {
                warn!("{}", RagError::RewriteProvider(format!("{:#}", e)));
                return Ok(Retrieval::empty(RetrievalStatus::NoMatch));
            }
        };

        let retry_k = self.options.escalation_top_k.unwrap_or(top_k);
        let second = match self.search_top_k(&rewritten, retry_k, mode).await {
            Ok(results) => results,
            Err(err) => return unavailable(err),
        };
        if second.is_empty() {
            info!("Rewritten query '{}' found nothing either", rewritten);
            return Ok(Retrieval::empty(RetrievalStatus::NoMatch));
        }

        Ok(Retrieval {
            status: RetrievalStatus::Rewritten { query: rewritten },
            results: second,
        })
    }

    /// Nearest chunks as `(position, distance)`. A failed query embedding yields no hits.
    async fn dense_ranking(
        &self,
        store: &RetrievalStore,
        query: &str,
        k: usize,
    ) -> Result<Vec<(usize, f32)>> {
        let vector = match self.embedding.encode_query(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(
                    "{}; continuing without dense results",
                    RagError::EmbeddingProvider(format!("{:#}", e))
                );
                return Ok(Vec::new());
            }
        };

        let neighbors = store.index().search(&vector, k)?;
        let max_distance = self.options.max_distance;
        Ok(neighbors
            .into_iter()
            .filter(|n| max_distance.map_or(true, |max| n.distance <= max))
            .map(|n| (n.position, n.distance))
            .collect())
    }
}

fn unavailable(err: RagError) -> Result<Retrieval> {
    match err {
        RagError::IndexNotReady => Ok(Retrieval::empty(RetrievalStatus::NotInitialized)),
        RagError::IndexEmpty => Ok(Retrieval::empty(RetrievalStatus::IndexEmpty)),
        other => Err(other),
    }
}

/// Attach chunk text and source document to each ranked position, dropping any that do not resolve.
fn hydrate(store: &RetrievalStore, ranked: Vec<(usize, f32)>) -> Vec<SearchResult> {
    ranked
        .into_iter()
        .filter_map(|(position, score)| match store.resolve(position) {
            Ok((text, doc_idx, document)) => Some(SearchResult {
                chunk_text: text.to_string(),
                chunk_idx: position,
                doc_idx,
                original_doc: document.clone(),
                score,
            }),
            Err(e) => {
                warn!("Skipping result: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedder::Embedder;
    use crate::search::index::{build_index, AnnIndex, FlatIndex, IndexConfig};
    use crate::search::store::ChunkStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DIMS: usize = 32;

    /// Hashed bag of words, so texts sharing words land close together.
    struct BagOfWords;

    fn bag_of_words(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMS];
        for word in text.to_lowercase().split_whitespace() {
            let bucket = word.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % DIMS] += 1.0;
        }
        v
    }

    #[async_trait]
    impl Embedder for BagOfWords {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(bag_of_words(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| bag_of_words(t)).collect())
        }

        fn dimensions(&self) -> usize {
            DIMS
        }

        async fn health_check(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct CountingRewriter {
        calls: AtomicUsize,
        answer: Option<String>,
    }

    impl CountingRewriter {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                answer: Some(answer.to_string()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                answer: None,
            })
        }
    }

    #[async_trait]
    impl QueryRewriter for CountingRewriter {
        async fn rewrite(&self, _query: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone().ok_or_else(|| anyhow!("rewriter offline"))
        }
    }

    fn store(texts: &[&str], map: &[usize], doc_count: usize) -> RetrievalStore {
        let documents = (0..doc_count)
            .map(|i| Document::new(i, format!("document {}", i), Default::default()))
            .collect();
        let chunks = ChunkStore {
            all_chunks: texts.iter().map(|s| s.to_string()).collect(),
            chunk_to_doc_map: map.to_vec(),
        };
        let vectors = texts.iter().map(|t| bag_of_words(t)).collect();
        let index = build_index(vectors, &IndexConfig::default()).unwrap();
        RetrievalStore::new(documents, chunks, index).unwrap()
    }

    fn searcher(store: Option<RetrievalStore>, mode: &str) -> Searcher {
        let handle = Arc::new(match store {
            Some(store) => StoreHandle::with_store(store),
            None => StoreHandle::new(),
        });
        let embedding = Arc::new(EmbeddingService::new(Arc::new(BagOfWords), 8191));
        let options = SearchOptions {
            top_k: 2,
            ranking_mode: mode.to_string(),
            ..Default::default()
        };
        Searcher::new(handle, embedding, options)
    }

    fn corpus() -> RetrievalStore {
        store(
            &[
                "city library opening hours",
                "recycling pickup schedule",
                "library card registration",
            ],
            &[0, 1, 2],
            3,
        )
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let searcher = searcher(None, "rrf");
        assert!(matches!(
            searcher.search_top_k("library", 2, RankingMode::Rrf).await,
            Err(RagError::IndexNotReady)
        ));
        let retrieval = searcher.retrieve("library").await.unwrap();
        assert_eq!(retrieval.status, RetrievalStatus::NotInitialized);
        assert!(retrieval.results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index() {
        let empty = RetrievalStore::new(
            Vec::new(),
            ChunkStore::default(),
            AnnIndex::Flat(FlatIndex::new(DIMS)),
        )
        .unwrap();
        let searcher = searcher(Some(empty), "dense");
        let retrieval = searcher.retrieve("anything").await.unwrap();
        assert_eq!(retrieval.status, RetrievalStatus::IndexEmpty);
    }

    #[tokio::test]
    async fn test_dense_mode_returns_nearest() {
        let searcher = searcher(Some(corpus()), "dense");
        let results = searcher
            .search_top_k("recycling pickup schedule", 2, RankingMode::Dense)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_idx, 1);
        assert_eq!(results[0].doc_idx, 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_rrf_prefers_chunks_found_by_both() {
        let searcher = searcher(Some(corpus()), "rrf");
        let results = searcher
            .search_top_k("library registration", 2, RankingMode::Rrf)
            .await
            .unwrap();
        assert_eq!(results[0].chunk_idx, 2);
        assert!(results.len() <= 2);
    }

    #[tokio::test]
    async fn test_huge_top_k_returns_every_chunk() {
        let searcher = searcher(Some(corpus()), "rrf");
        let results = searcher
            .search_top_k("library recycling", usize::MAX, RankingMode::Rrf)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_max_distance_drops_far_hits() {
        let mut searcher = searcher(Some(corpus()), "dense");
        searcher.options.max_distance = Some(0.5);
        let results = searcher
            .search_top_k("recycling pickup schedule", 3, RankingMode::Dense)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_idx, 1);
    }

    #[tokio::test]
    async fn test_corrupt_mapping_is_skipped() {
        let corrupt = store(&["library hours", "library fines"], &[0, 9], 1);
        let searcher = searcher(Some(corrupt), "tfidf");
        let results = searcher
            .search_top_k("library", 5, RankingMode::Tfidf)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_idx, 0);
    }

    #[tokio::test]
    async fn test_direct_hit_skips_rewrite() {
        let rewriter = CountingRewriter::answering("unused");
        let searcher = searcher(Some(corpus()), "tfidf").with_rewriter(rewriter.clone());
        let retrieval = searcher.retrieve("library").await.unwrap();
        assert_eq!(retrieval.status, RetrievalStatus::Direct);
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_escalation_rewrites_exactly_once() {
        let rewriter = CountingRewriter::answering("recycling schedule");
        let searcher = searcher(Some(corpus()), "tfidf").with_rewriter(rewriter.clone());
        let retrieval = searcher.retrieve("when is trash collected").await.unwrap();

        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            retrieval.status,
            RetrievalStatus::Rewritten {
                query: "recycling schedule".to_string()
            }
        );
        assert_eq!(retrieval.results[0].chunk_idx, 1);
    }

    #[tokio::test]
    async fn test_escalation_gives_up_after_one_retry() {
        let rewriter = CountingRewriter::answering("still nothing relevant");
        let searcher = searcher(Some(corpus()), "tfidf").with_rewriter(rewriter.clone());
        let retrieval = searcher.retrieve("zzz").await.unwrap();
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(retrieval.status, RetrievalStatus::NoMatch);
        assert!(retrieval.results.is_empty());
    }

    #[tokio::test]
    async fn test_rewrite_failure_returns_first_pass() {
        let rewriter = CountingRewriter::failing();
        let searcher = searcher(Some(corpus()), "tfidf").with_rewriter(rewriter.clone());
        let retrieval = searcher.retrieve("zzz").await.unwrap();
        assert_eq!(rewriter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(retrieval.status, RetrievalStatus::NoMatch);
    }
}
