use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::search::chunker::Chunk;

use super::StagedFile;

/// Parallel arrays: `all_chunks[i]` came from document `chunk_to_doc_map[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStore {
    pub all_chunks: Vec<String>,
    pub chunk_to_doc_map: Vec<usize>,
}

/// On-disk shapes: the plain object, or an older array whose first element is the store.
#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedChunks {
    Plain(ChunkStore),
    Legacy(Vec<Value>),
}

impl ChunkStore {
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let (all_chunks, chunk_to_doc_map) = chunks.into_iter().map(|c| (c.text, c.doc_id)).unzip();
        Self {
            all_chunks,
            chunk_to_doc_map,
        }
    }

    pub fn len(&self) -> usize {
        self.all_chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_chunks.is_empty()
    }

    /// SHA-256 over every (document, text) pair, used to pair an index file with its chunks.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (text, doc) in self.all_chunks.iter().zip(&self.chunk_to_doc_map) {
            hasher.update((*doc as u64).to_le_bytes());
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Write the store beside `path`; nothing at `path` changes until the result is committed.
    pub fn stage(&self, path: &Path) -> Result<StagedFile> {
        let staged = StagedFile::write(path, |writer| Ok(serde_json::to_writer(writer, self)?))?;
        debug!("Staged {} chunks for {}", self.len(), path.display());
        Ok(staged)
    }

    /// Load a persisted chunk store. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("No chunk store at {}", path.display());
            return Ok(None);
        }

        let content = fs::read(path)?;
        let store = match serde_json::from_slice::<PersistedChunks>(&content)? {
            PersistedChunks::Plain(store) => store,
            PersistedChunks::Legacy(items) => {
                let first = items.into_iter().next().ok_or_else(|| RagError::DataLoad {
                    path: path.to_path_buf(),
                    reason: "legacy chunk store tuple is empty".to_string(),
                })?;
                info!("Reading legacy tuple-wrapped chunk store {}", path.display());
                serde_json::from_value(first)?
            }
        };
        Ok(Some(store))
    }
}
