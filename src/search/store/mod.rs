mod chunks;
mod handle;
mod staged;

pub use chunks::ChunkStore;
pub use handle::StoreHandle;
pub use staged::StagedFile;

use crate::error::{RagError, Result};
use crate::types::Document;

use super::index::{AnnIndex, VectorIndex};

/// Documents, chunks and vectors for one corpus, aligned by position.
///
/// Construction checks `all_chunks`, `chunk_to_doc_map` and the index all have
/// the same length; a store that exists is aligned. It is never mutated after
/// construction, a rebuild produces a new one.
#[derive(Debug)]
pub struct RetrievalStore {
    documents: Vec<Document>,
    chunks: ChunkStore,
    index: AnnIndex,
}

impl RetrievalStore {
    pub fn new(documents: Vec<Document>, chunks: ChunkStore, index: AnnIndex) -> Result<Self> {
        if chunks.all_chunks.len() != chunks.chunk_to_doc_map.len()
            || chunks.all_chunks.len() != index.len()
        {
            return Err(RagError::Misaligned {
                chunks: chunks.all_chunks.len(),
                mappings: chunks.chunk_to_doc_map.len(),
                vectors: index.len(),
            });
        }
        Ok(Self {
            documents,
            chunks,
            index,
        })
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub fn index(&self) -> &AnnIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Resolve a chunk position to its text, document position and document.
    pub fn resolve(&self, position: usize) -> Result<(&str, usize, &Document)> {
        let text = self
            .chunks
            .all_chunks
            .get(position)
            .ok_or_else(|| RagError::AlignmentCorruption {
                chunk: position,
                detail: format!("only {} chunks", self.chunks.all_chunks.len()),
            })?;
        let doc_idx = *self.chunks.chunk_to_doc_map.get(position).ok_or_else(|| {
            RagError::AlignmentCorruption {
                chunk: position,
                detail: format!(
                    "only {} chunk-to-document entries",
                    self.chunks.chunk_to_doc_map.len()
                ),
            }
        })?;
        let document = self
            .documents
            .get(doc_idx)
            .ok_or_else(|| RagError::AlignmentCorruption {
                chunk: position,
                detail: format!(
                    "maps to document {} but only {} documents are loaded",
                    doc_idx,
                    self.documents.len()
                ),
            })?;
        Ok((text, doc_idx, document))
    }
}
