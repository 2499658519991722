use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::search::{
    ChunkStrategy, EmbedderConfig, IndexConfig, IndexKind, RagPaths, RetryPolicy, RewriterConfig,
    SearchOptions,
};

pub const DEFAULT_CONFIG_FILE: &str = "docrag.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chunking: ChunkingConfig,
    pub embedding: EmbedderConfig,
    pub index: IndexConfig,
    pub search: SearchOptions,
    pub rewriter: RewriterConfig,
    pub retry: RetryPolicy,
    /// Corpus used when no profile is selected
    pub paths: ProfileConfig,
    /// Named corpora, selected with `--profile`
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub strategy: ChunkStrategy,
    /// Characters for `fixed`, tokens for `token` and `recursive`
    pub chunk_param: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Recursive,
            chunk_param: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub data_dir: PathBuf,
    pub index_path: PathBuf,
    pub chunk_path: PathBuf,
    /// Overrides `[index] kind` for this corpus
    pub index_kind: Option<IndexKind>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_path: PathBuf::from("docrag_index.bin"),
            chunk_path: PathBuf::from("docrag_chunks.json"),
            index_kind: None,
        }
    }
}

impl ProfileConfig {
    pub fn rag_paths(&self) -> RagPaths {
        RagPaths {
            data_dir: self.data_dir.clone(),
            index_path: self.index_path.clone(),
            chunk_path: self.chunk_path.clone(),
        }
    }
}

impl Config {
    /// Load `path`, or `docrag.toml` in the working directory when it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Paths and index settings for a profile, or for `[paths]` when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(RagPaths, IndexConfig)> {
        let profile = match name {
            None => &self.paths,
            Some(name) => match self.profiles.get(name) {
                Some(profile) => profile,
                None => {
                    let known: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
                    if known.is_empty() {
                        bail!("Unknown profile '{}': no profiles are configured", name);
                    }
                    bail!(
                        "Unknown profile '{}' (available: {})",
                        name,
                        known.join(", ")
                    );
                }
            },
        };

        let mut index = self.index.clone();
        if let Some(kind) = profile.index_kind {
            index.kind = kind;
        }
        Ok((profile.rag_paths(), index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.strategy, ChunkStrategy::Recursive);
        assert_eq!(config.chunking.chunk_param, 500);
        assert_eq!(config.embedding.batch_size, 10);
        assert_eq!(config.embedding.token_limit, 8191);
        assert_eq!(config.index.ef_construction, 80);
        assert_eq!(config.index.ef_search, 64);
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.rrf_k, 60.0);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.paths.index_path, PathBuf::from("docrag_index.bin"));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse(
            r#"
[chunking]
strategy = "fixed"

[index]
kind = "HNSW"

[search]
ranking_mode = "dense"
max_distance = 0.8

[profiles.books]
data_dir = "books"
index_path = "books.bin"
chunk_path = "books.json"
index_kind = "FLAT"
"#,
        )
        .unwrap();

        assert_eq!(config.chunking.strategy, ChunkStrategy::Fixed);
        assert_eq!(config.chunking.chunk_param, 500);
        assert_eq!(config.index.kind, IndexKind::Hnsw);
        assert_eq!(config.search.max_distance, Some(0.8));

        let (paths, index) = config.profile(Some("books")).unwrap();
        assert_eq!(paths.data_dir, PathBuf::from("books"));
        assert_eq!(index.kind, IndexKind::Flat);

        let (paths, index) = config.profile(None).unwrap();
        assert_eq!(paths.data_dir, PathBuf::from("data"));
        assert_eq!(index.kind, IndexKind::Hnsw);
    }

    #[test]
    fn test_unknown_profile() {
        let err = Config::default().profile(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[search]\ntop_k = 9\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().search.top_k, 9);
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
