use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use super::RetrievalStore;

/// Shared slot holding the live store.
///
/// Readers take an `Arc` snapshot and keep using it even if a rebuild installs
/// a replacement meanwhile. Writers swap the whole store in one step.
#[derive(Debug, Default)]
pub struct StoreHandle {
    slot: RwLock<Option<Arc<RetrievalStore>>>,
}

impl StoreHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: RetrievalStore) -> Self {
        Self {
            slot: RwLock::new(Some(Arc::new(store))),
        }
    }

    pub fn current(&self) -> Option<Arc<RetrievalStore>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `store`, returning the one it replaced.
    pub fn replace(&self, store: RetrievalStore) -> Option<Arc<RetrievalStore>> {
        let store = Arc::new(store);
        info!(
            "Installing retrieval store: {} documents, {} chunks",
            store.documents().len(),
            store.len()
        );
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::index::{build_index, IndexConfig};
    use crate::search::store::ChunkStore;
    use crate::types::Document;

    fn store(text: &str) -> RetrievalStore {
        let chunks = ChunkStore {
            all_chunks: vec![text.to_string()],
            chunk_to_doc_map: vec![0],
        };
        let index = build_index(vec![vec![1.0, 0.0]], &IndexConfig::default()).unwrap();
        RetrievalStore::new(vec![Document::new(0, text, Default::default())], chunks, index)
            .unwrap()
    }

    #[test]
    fn test_snapshot_survives_replacement() {
        let handle = StoreHandle::new();
        assert!(handle.current().is_none());

        handle.replace(store("first"));
        let snapshot = handle.current().unwrap();
        let previous = handle.replace(store("second"));

        assert_eq!(snapshot.chunks().all_chunks[0], "first");
        assert!(Arc::ptr_eq(&snapshot, &previous.unwrap()));
        assert_eq!(handle.current().unwrap().chunks().all_chunks[0], "second");
    }
}
