mod args;
mod index;
mod page;
mod search;
mod status;

pub use args::{Args, Command, IndexArgs, PageArgs, SearchArgs};
pub use index::run_index;
pub use page::run_page;
pub use search::run_search;
pub use status::run_status;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::search::{create_embedder, Embedder, EmbeddingService};

fn embedding_service(config: &Config) -> Result<(Arc<dyn Embedder>, Arc<EmbeddingService>)> {
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding, config.retry)?);
    let service = EmbeddingService::new(Arc::clone(&embedder), config.embedding.token_limit);
    Ok((embedder, Arc::new(service)))
}
