pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod pages;
pub mod search;
pub mod types;

pub use config::Config;
pub use error::{RagError, Result};
pub use types::{Document, DocumentMetadata};
