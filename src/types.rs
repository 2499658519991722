use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type DocumentMetadata = BTreeMap<String, String>;

/// A normalized source document. Its identity is its position in the loaded list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: usize,
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: usize, text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            id,
            text: text.into(),
            metadata,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.metadata.get("url").map(String::as_str)
    }

    /// Text handed to the chunker. URL-backed documents carry their URL into every chunk.
    pub fn indexable_text(&self) -> String {
        match self.url() {
            Some(url) => format!("URL: {}\n{}", url, self.text),
            None => self.text.clone(),
        }
    }
}
