use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{RagError, Result};
use crate::loader::load_documents;
use crate::types::Document;

use super::chunker::Chunker;
use super::embedder::EmbeddingService;
use super::index::{build_index, load_index, stage_index, IndexConfig, IndexKind, VectorIndex};
use super::store::{ChunkStore, RetrievalStore};

/// Where a corpus lives and where its build outputs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagPaths {
    pub data_dir: PathBuf,
    pub index_path: PathBuf,
    pub chunk_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct IndexResult {
    pub documents_loaded: usize,
    pub chunks_created: usize,
    /// Chunks whose embedding batch failed and were indexed as zero vectors
    pub degraded_chunks: usize,
    pub dimension: usize,
    pub kind: IndexKind,
}

pub struct Indexer {
    embedding: Arc<EmbeddingService>,
    chunker: Chunker,
    index_config: IndexConfig,
    batch_size: usize,
}

impl Indexer {
    pub fn new(
        embedding: Arc<EmbeddingService>,
        chunker: Chunker,
        index_config: IndexConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            embedding,
            chunker,
            index_config,
            batch_size: batch_size.max(1),
        }
    }

    /// Load, chunk, embed, index and persist a corpus. Rerunning overwrites the outputs.
    pub async fn init_rag(&self, paths: &RagPaths) -> Result<(IndexResult, RetrievalStore)> {
        let documents = load_documents(&paths.data_dir)?;
        self.build(documents, paths).await
    }

    /// Chunk, embed, index and persist already loaded documents.
    pub async fn build(
        &self,
        documents: Vec<Document>,
        paths: &RagPaths,
    ) -> Result<(IndexResult, RetrievalStore)> {
        if documents.is_empty() {
            return Err(RagError::NoDocuments(paths.data_dir.clone()));
        }

        let chunks = ChunkStore::from_chunks(self.chunker.chunk_documents(&documents));
        info!(
            "Chunked {} documents into {} chunks ({} strategy)",
            documents.len(),
            chunks.len(),
            self.chunker.strategy()
        );

        let vectors = self
            .embedding
            .encode(&chunks.all_chunks, self.batch_size)
            .await;
        let degraded_chunks = vectors
            .iter()
            .filter(|v| v.iter().all(|x| *x == 0.0))
            .count();
        if degraded_chunks > 0 {
            warn!(
                "{} of {} chunks were indexed with zero vectors",
                degraded_chunks,
                vectors.len()
            );
        }

        let index = build_index(vectors, &self.index_config)?;

        // Both files are fully written before either replaces its predecessor.
        let (_, staged_index) = stage_index(&index, &paths.index_path, Some(chunks.fingerprint()))?;
        let staged_chunks = chunks.stage(&paths.chunk_path)?;
        staged_chunks.commit()?;
        staged_index.commit()?;
        info!(
            "Wrote index to {} and chunks to {}",
            paths.index_path.display(),
            paths.chunk_path.display()
        );

        let result = IndexResult {
            documents_loaded: documents.len(),
            chunks_created: chunks.len(),
            degraded_chunks,
            dimension: index.dimension(),
            kind: index.kind(),
        };
        let store = RetrievalStore::new(documents, chunks, index)?;
        Ok((result, store))
    }

    /// Load the persisted store, building it first when no index exists yet.
    pub async fn open_or_build(&self, paths: &RagPaths) -> Result<Option<RetrievalStore>> {
        if !paths.index_path.exists() {
            info!(
                "No index at {}, building from {}",
                paths.index_path.display(),
                paths.data_dir.display()
            );
            let (_, store) = self.init_rag(paths).await?;
            return Ok(Some(store));
        }
        load_store(paths, &self.index_config)
    }
}

/// Load documents, chunk store and index for `paths`.
///
/// A missing index or chunk file is `Ok(None)`; a pair that does not line up is an error.
pub fn load_store(paths: &RagPaths, config: &IndexConfig) -> Result<Option<RetrievalStore>> {
    if !paths.index_path.exists() {
        info!("No index at {}", paths.index_path.display());
        return Ok(None);
    }
    let Some(chunks) = ChunkStore::load(&paths.chunk_path)? else {
        info!(
            "Index {} has no chunk store at {}",
            paths.index_path.display(),
            paths.chunk_path.display()
        );
        return Ok(None);
    };

    let documents = load_documents(&paths.data_dir)?;
    let (header, index) = load_index(&paths.index_path, config)?;

    if let Some(expected) = &header.chunk_fingerprint {
        if *expected != chunks.fingerprint() {
            warn!(
                "Chunk store {} does not match the one index {} was built with",
                paths.chunk_path.display(),
                paths.index_path.display()
            );
        }
    }
    if let Some(max_doc) = chunks.chunk_to_doc_map.iter().max() {
        if *max_doc >= documents.len() {
            warn!(
                "Chunks reference document {} but {} holds {} documents; affected results will be skipped",
                max_doc,
                paths.data_dir.display(),
                documents.len()
            );
        }
    }

    RetrievalStore::new(documents, chunks, index).map(Some)
}
