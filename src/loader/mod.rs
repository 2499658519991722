//! Document loading for the three JSON shapes found in source directories.
//!
//! Each `*.json` file is parsed once into a [`DocumentSource`] and expanded into
//! canonical [`Document`]s. A file that fails to parse or matches no shape is
//! logged and skipped; the rest of the directory still loads.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::RagError;
use crate::types::{Document, DocumentMetadata};

/// One entry of a flat document list
#[derive(Debug, Deserialize)]
pub struct FlatEntry {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

/// The shapes a source file may take, detected once per file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DocumentSource {
    /// `[{"text": ..., "metadata": {...}}, ...]`
    FlatList(Vec<FlatEntry>),
    /// `{"title": ..., "pages": {"1": ..., "2": ...}}`
    TitlePages {
        title: String,
        pages: BTreeMap<String, Option<String>>,
    },
    /// `{"url": ..., "content": ...}`
    UrlContent { url: String, content: String },
}

impl DocumentSource {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Expand into documents, numbering them from `first_id`.
    pub fn into_documents(self, first_id: usize) -> Vec<Document> {
        let mut docs = Vec::new();
        let mut push = |text: String, metadata: DocumentMetadata| {
            let id = first_id + docs.len();
            docs.push(Document::new(id, text, metadata));
        };

        match self {
            DocumentSource::FlatList(entries) => {
                for entry in entries {
                    if entry.text.trim().is_empty() {
                        continue;
                    }
                    let metadata = entry
                        .metadata
                        .map(|m| {
                            m.into_iter()
                                .map(|(k, v)| (k, metadata_value(v)))
                                .collect()
                        })
                        .unwrap_or_default();
                    push(entry.text, metadata);
                }
            }
            DocumentSource::UrlContent { url, content } => {
                if !content.trim().is_empty() {
                    let mut metadata = DocumentMetadata::new();
                    metadata.insert("url".to_string(), url);
                    push(content, metadata);
                }
            }
            DocumentSource::TitlePages { title, pages } => {
                for (page, content) in ordered_pages(pages) {
                    let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
                        continue;
                    };
                    let mut metadata = DocumentMetadata::new();
                    metadata.insert("title".to_string(), title.clone());
                    metadata.insert("page".to_string(), page);
                    push(content, metadata);
                }
            }
        }

        docs
    }
}

/// Load every `*.json` file directly under `data_dir`, in file-name order.
///
/// Returns an error only when the directory itself cannot be read.
pub fn load_documents(data_dir: &Path) -> Result<Vec<Document>, RagError> {
    if !data_dir.is_dir() {
        return Err(RagError::DataLoad {
            path: data_dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut documents = Vec::new();
    let mut skipped = 0usize;

    for path in json_files(data_dir) {
        match load_file(&path, documents.len()) {
            Ok(docs) => {
                debug!("{}: {} documents", path.display(), docs.len());
                documents.extend(docs);
            }
            Err(e) => {
                warn!("{}", e);
                skipped += 1;
            }
        }
    }

    info!(
        "Loaded {} documents from {} ({} files skipped)",
        documents.len(),
        data_dir.display(),
        skipped
    );
    Ok(documents)
}

fn load_file(path: &Path, first_id: usize) -> Result<Vec<Document>, RagError> {
    let raw = fs::read_to_string(path).map_err(|e| RagError::DataLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let source = DocumentSource::parse(&raw).map_err(|_| RagError::DataLoad {
        path: path.to_path_buf(),
        reason: "expected a list of {text}, {url, content} or {title, pages}".to_string(),
    })?;
    Ok(source.into_documents(first_id))
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

/// Numeric page keys sort numerically ("2" before "10"); anything else sorts after, by text.
fn ordered_pages(pages: BTreeMap<String, Option<String>>) -> Vec<(String, Option<String>)> {
    let mut ordered: Vec<_> = pages.into_iter().collect();
    ordered.sort_by(|(a, _), (b, _)| {
        let key = |s: &str| s.trim().parse::<u64>().map_or((1, u64::MAX), |n| (0, n));
        key(a).cmp(&key(b)).then_with(|| a.cmp(b))
    });
    ordered
}

fn metadata_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) {
        fs::write(dir.path().join(name), body).unwrap();
    }

    #[test]
    fn test_detects_flat_list() {
        let source =
            DocumentSource::parse(r#"[{"text": "a", "metadata": {"k": 1}}, {"text": "b"}]"#)
                .unwrap();
        let docs = source.into_documents(0);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.get("k").map(String::as_str), Some("1"));
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn test_detects_url_content() {
        let source =
            DocumentSource::parse(r#"{"url": "https://x.org", "content": "hello"}"#).unwrap();
        let docs = source.into_documents(5);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, 5);
        assert_eq!(docs[0].url(), Some("https://x.org"));
    }

    #[test]
    fn test_title_pages_drops_empty_and_orders_numerically() {
        let source = DocumentSource::parse(
            r#"{"title": "Book", "pages": {"10": "ten", "2": "two", "3": "", "4": null}}"#,
        )
        .unwrap();
        let docs = source.into_documents(0);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "two");
        assert_eq!(docs[0].metadata.get("page").map(String::as_str), Some("2"));
        assert_eq!(docs[1].metadata.get("title").map(String::as_str), Some("Book"));
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        assert!(DocumentSource::parse(r#"{"name": "nothing useful"}"#).is_err());
    }

    #[test]
    fn test_load_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.json", r#"[{"text": "first"}]"#);
        write(&dir, "b.json", "{ not json");
        write(&dir, "c.json", r#"{"unexpected": true}"#);
        write(&dir, "d.json", r#"{"url": "u", "content": "second"}"#);
        write(&dir, "notes.txt", "ignored");

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "first");
        assert_eq!(docs[1].text, "second");
        assert_eq!(docs[1].id, 1);
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load_documents(&dir.path().join("missing")).is_err());
    }
}
