//! Nearest-neighbor indexes over chunk embeddings, addressed by chunk position.

mod flat;
mod hnsw;

pub use flat::FlatIndex;
pub use self::hnsw::{HnswIndex, HnswParams};

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::search::store::StagedFile;

const MAGIC: &[u8; 4] = b"DRIX";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    #[serde(rename = "FLAT", alias = "flat")]
    Flat,
    #[serde(rename = "HNSW", alias = "hnsw")]
    Hnsw,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Flat => "FLAT",
            IndexKind::Hnsw => "HNSW",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FLAT" => Ok(IndexKind::Flat),
            "HNSW" => Ok(IndexKind::Hnsw),
            other => Err(format!("unknown index kind '{}' (expected FLAT or HNSW)", other)),
        }
    }
}

/// One hit: chunk position and squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Read-only nearest-neighbor capability shared by the exact and approximate backends.
pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> IndexKind;
    fn len(&self) -> usize;
    fn dimension(&self) -> usize;

    /// Up to `k` neighbors, nearest first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub kind: IndexKind,
    pub ef_construction: usize,
    /// Applied at query time; re-applied on every load
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let params = HnswParams::default();
        Self {
            kind: IndexKind::Flat,
            ef_construction: params.ef_construction,
            ef_search: params.ef_search,
        }
    }
}

impl IndexConfig {
    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        }
    }
}

/// The index variants a store can hold.
#[derive(Debug, Serialize, Deserialize)]
pub enum AnnIndex {
    Flat(FlatIndex),
    Hnsw(HnswIndex),
}

impl VectorIndex for AnnIndex {
    fn kind(&self) -> IndexKind {
        match self {
            AnnIndex::Flat(index) => index.kind(),
            AnnIndex::Hnsw(index) => index.kind(),
        }
    }

    fn len(&self) -> usize {
        match self {
            AnnIndex::Flat(index) => index.len(),
            AnnIndex::Hnsw(index) => index.len(),
        }
    }

    fn dimension(&self) -> usize {
        match self {
            AnnIndex::Flat(index) => index.dimension(),
            AnnIndex::Hnsw(index) => index.dimension(),
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        match self {
            AnnIndex::Flat(index) => index.search(query, k),
            AnnIndex::Hnsw(index) => index.search(query, k),
        }
    }
}

/// Build an index from the full embedding matrix. Zero vectors is an error.
pub fn build_index(vectors: Vec<Vec<f32>>, config: &IndexConfig) -> Result<AnnIndex> {
    let dimension = vectors.first().map(Vec::len).ok_or(RagError::EmptyIndex)?;
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }

    let count = vectors.len();
    let index = match config.kind {
        IndexKind::Flat => {
            let mut flat = FlatIndex::new(dimension);
            for vector in &vectors {
                flat.add(vector)?;
            }
            AnnIndex::Flat(flat)
        }
        IndexKind::Hnsw => AnnIndex::Hnsw(HnswIndex::build(vectors, config.hnsw_params())?),
    };

    info!(
        "Built {} index: {} vectors, {} dimensions",
        config.kind, count, dimension
    );
    Ok(index)
}

/// Metadata written ahead of the index body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHeader {
    pub format_version: u32,
    pub kind: IndexKind,
    pub count: usize,
    pub dimension: usize,
    pub built_at: DateTime<Utc>,
    /// Fingerprint of the chunk store this index was built alongside
    pub chunk_fingerprint: Option<String>,
}

fn format_error(path: &Path, reason: impl fmt::Display) -> RagError {
    RagError::IndexFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Serialize an index beside `path`; nothing at `path` changes until the result is committed.
pub fn stage_index(
    index: &AnnIndex,
    path: &Path,
    chunk_fingerprint: Option<String>,
) -> Result<(IndexHeader, StagedFile)> {
    let header = IndexHeader {
        format_version: FORMAT_VERSION,
        kind: index.kind(),
        count: index.len(),
        dimension: index.dimension(),
        built_at: Utc::now(),
        chunk_fingerprint,
    };

    let staged = StagedFile::write(path, |writer| {
        writer.write_all(MAGIC)?;
        bincode::serialize_into(&mut *writer, &header).map_err(|e| format_error(path, e))?;
        bincode::serialize_into(&mut *writer, index).map_err(|e| format_error(path, e))?;
        Ok(())
    })?;

    debug!("Staged {} index for {}", header.kind, path.display());
    Ok((header, staged))
}

fn open_with_header(path: &Path) -> Result<(BufReader<File>, IndexHeader)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| format_error(path, "file is too short"))?;
    if &magic != MAGIC {
        return Err(format_error(path, "not a docrag index file"));
    }

    let header: IndexHeader =
        bincode::deserialize_from(&mut reader).map_err(|e| format_error(path, e))?;
    if header.format_version != FORMAT_VERSION {
        return Err(format_error(
            path,
            format!("unsupported format version {}", header.format_version),
        ));
    }
    Ok((reader, header))
}

/// Read only the header of a persisted index.
pub fn read_header(path: &Path) -> Result<IndexHeader> {
    open_with_header(path).map(|(_, header)| header)
}

/// Load a persisted index and restore its search-time parameters.
///
/// The file's own kind wins over `config.kind`; a disagreement is logged.
pub fn load_index(path: &Path, config: &IndexConfig) -> Result<(IndexHeader, AnnIndex)> {
    let (mut reader, header) = open_with_header(path)?;
    let mut index: AnnIndex =
        bincode::deserialize_from(&mut reader).map_err(|e| format_error(path, e))?;

    if index.kind() != header.kind
        || index.len() != header.count
        || index.dimension() != header.dimension
    {
        return Err(format_error(
            path,
            format!(
                "header says {} x {} ({}), body holds {} x {} ({})",
                header.count,
                header.dimension,
                header.kind,
                index.len(),
                index.dimension(),
                index.kind()
            ),
        ));
    }

    if header.kind != config.kind {
        warn!(
            "Index {} is {} but {} was configured; using the file's kind",
            path.display(),
            header.kind,
            config.kind
        );
    }

    if let AnnIndex::Hnsw(hnsw) = &mut index {
        hnsw.set_ef_search(config.ef_search);
        debug!("Restored efSearch={} on load", hnsw.ef_search());
    }

    info!(
        "Loaded {} index from {}: {} vectors, {} dimensions",
        header.kind,
        path.display(),
        header.count,
        header.dimension
    );
    Ok((header, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn save_index(index: &AnnIndex, path: &Path, fingerprint: Option<String>) {
        let (_, staged) = stage_index(index, path, fingerprint).unwrap();
        staged.commit().unwrap();
    }

    fn vectors() -> Vec<Vec<f32>> {
        (0..20)
            .map(|i| vec![i as f32, (i % 3) as f32, (i * i % 7) as f32])
            .collect()
    }

    #[test]
    fn test_index_kind_parsing() {
        assert_eq!("flat".parse::<IndexKind>().unwrap(), IndexKind::Flat);
        assert_eq!("HNSW".parse::<IndexKind>().unwrap(), IndexKind::Hnsw);
        assert!("ivf".parse::<IndexKind>().is_err());
    }

    #[test]
    fn test_build_from_zero_vectors_fails() {
        let result = build_index(Vec::new(), &IndexConfig::default());
        assert!(matches!(result, Err(RagError::EmptyIndex)));
    }

    #[test]
    fn test_build_rejects_uneven_dimensions() {
        let result = build_index(vec![vec![1.0, 2.0], vec![3.0]], &IndexConfig::default());
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_flat_round_trip_preserves_ranking() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.bin");
        let config = IndexConfig::default();
        let index = build_index(vectors(), &config).unwrap();
        save_index(&index, &path, Some("abc".to_string()));

        let (header, loaded) = load_index(&path, &config).unwrap();
        assert_eq!(header.kind, IndexKind::Flat);
        assert_eq!(header.count, 20);
        assert_eq!(header.dimension, 3);
        assert_eq!(header.chunk_fingerprint.as_deref(), Some("abc"));

        let query = [4.2, 1.0, 3.0];
        assert_eq!(index.search(&query, 20).unwrap(), loaded.search(&query, 20).unwrap());
    }

    #[test]
    fn test_hnsw_load_restores_ef_search() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.bin");
        let config = IndexConfig {
            kind: IndexKind::Hnsw,
            ef_search: 99,
            ..Default::default()
        };
        let index = build_index(vectors(), &config).unwrap();
        save_index(&index, &path, None);

        let (_, loaded) = load_index(&path, &config).unwrap();
        match loaded {
            AnnIndex::Hnsw(hnsw) => assert_eq!(hnsw.ef_search(), 99),
            AnnIndex::Flat(_) => panic!("expected an HNSW index"),
        }
    }

    #[test]
    fn test_load_keeps_file_kind_on_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.bin");
        let index = build_index(vectors(), &IndexConfig::default()).unwrap();
        save_index(&index, &path, None);

        let hnsw_config = IndexConfig {
            kind: IndexKind::Hnsw,
            ..Default::default()
        };
        let (_, loaded) = load_index(&path, &hnsw_config).unwrap();
        assert_eq!(loaded.kind(), IndexKind::Flat);
    }

    #[test]
    fn test_garbage_file_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.bin");
        std::fs::write(&path, b"not an index at all").unwrap();
        assert!(matches!(
            read_header(&path),
            Err(RagError::IndexFormat { .. })
        ));
    }
}
