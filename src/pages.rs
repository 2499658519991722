//! Page lookup over book files, memoized in a bounded LRU cache.
//!
//! A book is `<dir>/<name>.json` in one of two shapes: `{"title", "pages": {"1": "..."}}`
//! or `[{"pageNo": 1, "contents": ["..."]}, ...]`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Deserialize)]
struct PageItem {
    #[serde(rename = "pageNo")]
    page_no: Option<Value>,
    #[serde(default)]
    contents: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BookFile {
    Titled {
        pages: BTreeMap<String, Option<String>>,
    },
    PageList(Vec<PageItem>),
}

/// Page number to page text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Book {
    pages: BTreeMap<String, String>,
}

impl Book {
    fn from_file(file: BookFile) -> Self {
        let pages = match file {
            BookFile::Titled { pages, .. } => pages
                .into_iter()
                .filter_map(|(no, text)| text.map(|t| (no, t)))
                .collect(),
            BookFile::PageList(items) => items
                .into_iter()
                .enumerate()
                .map(|(idx, item)| {
                    let no = match item.page_no {
                        Some(Value::String(s)) => s,
                        Some(Value::Number(n)) => n.to_string(),
                        _ => (idx + 1).to_string(),
                    };
                    (no, item.contents.into_iter().next().unwrap_or_default())
                })
                .collect(),
        };
        Self { pages }
    }

    pub fn page(&self, page_no: &str) -> Option<&str> {
        self.pages
            .get(page_no)
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Text of the pages on either side of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacentPages {
    pub previous: Option<String>,
    pub next: Option<String>,
}

pub struct PageCache {
    dir: PathBuf,
    capacity: usize,
    books: HashMap<String, Arc<Book>>,
    /// Least recently used at the front
    order: VecDeque<String>,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_capacity(dir, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            dir: dir.into(),
            capacity,
            books: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.books.contains_key(name)
    }

    pub fn page(&mut self, name: &str, page_no: &str) -> Option<String> {
        let book = self.book(name)?;
        let text = book.page(page_no).map(str::to_string);
        if text.is_none() {
            debug!("No text for {} page {}", name, page_no);
        }
        text
    }

    /// Pages `page_no - 1` and `page_no + 1`. `None` for a missing book or a non-numeric page.
    pub fn adjacent(&mut self, name: &str, page_no: &str) -> Option<AdjacentPages> {
        let Ok(current) = page_no.trim().parse::<i64>() else {
            warn!("Page number '{}' is not numeric", page_no);
            return None;
        };
        let book = self.book(name)?;
        Some(AdjacentPages {
            previous: book.page(&(current - 1).to_string()).map(str::to_string),
            next: book.page(&(current + 1).to_string()).map(str::to_string),
        })
    }

    /// Cached book, reading it on a miss. Missing or unreadable books are cached as empty.
    pub fn book(&mut self, name: &str) -> Option<Arc<Book>> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            warn!("Rejecting book name '{}'", name);
            return None;
        }

        if let Some(book) = self.books.get(name).cloned() {
            self.touch(name);
            return (!book.is_empty()).then_some(book);
        }

        let book = Arc::new(self.read_book(name));
        if self.books.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                debug!("Evicting {} from page cache", evicted);
                self.books.remove(&evicted);
            }
        }
        self.books.insert(name.to_string(), Arc::clone(&book));
        self.order.push_back(name.to_string());

        (!book.is_empty()).then_some(book)
    }

    fn touch(&mut self, name: &str) {
        if let Some(pos) = self.order.iter().position(|n| n == name) {
            if let Some(key) = self.order.remove(pos) {
                self.order.push_back(key);
            }
        }
    }

    fn read_book(&self, name: &str) -> Book {
        let path = self.dir.join(format!("{}.json", name));
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => {
                debug!("Book file {} not found", path.display());
                return Book::default();
            }
        };
        match serde_json::from_str::<BookFile>(&content) {
            Ok(file) => Book::from_file(file),
            Err(e) => {
                warn!("Cannot parse book file {}: {}", path.display(), e);
                Book::default()
            }
        }
    }
}
