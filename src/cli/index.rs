use anyhow::{Context, Result};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::error::RagError;
use crate::loader::load_documents;
use crate::search::{Chunker, Indexer};

use super::args::IndexArgs;
use super::embedding_service;

static INDEXING: Emoji<'_, '_> = Emoji("📊 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");
static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "");
static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");

pub async fn run_index(config: &Config, profile: Option<&str>, opts: &IndexArgs) -> Result<()> {
    let (mut paths, mut index_config) = config.profile(profile)?;
    if let Some(dir) = &opts.data_dir {
        paths.data_dir = dir.clone();
    }
    if let Some(path) = &opts.index_path {
        paths.index_path = path.clone();
    }
    if let Some(path) = &opts.chunk_path {
        paths.chunk_path = path.clone();
    }
    if let Some(kind) = opts.kind {
        index_config.kind = kind;
    }
    let strategy = opts.strategy.unwrap_or(config.chunking.strategy);
    let chunk_param = opts.chunk_param.unwrap_or(config.chunking.chunk_param);

    let documents = load_documents(&paths.data_dir)?;
    if documents.is_empty() {
        return Err(RagError::NoDocuments(paths.data_dir.clone()).into());
    }

    let (embedder, embedding) = embedding_service(config)?;
    if !opts.no_check {
        println!(
            "{}Checking {} embedding provider...",
            INFO, config.embedding.provider
        );
        embedder
            .health_check()
            .await
            .context("Embedding provider is not reachable (use --no-check to index anyway)")?;
    }

    let indexer = Indexer::new(
        embedding,
        Chunker::new(strategy, chunk_param),
        index_config.clone(),
        config.embedding.batch_size,
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!(
        "{}Indexing {} documents from {}...",
        INDEXING,
        documents.len(),
        paths.data_dir.display()
    ));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let outcome = indexer.build(documents, &paths).await;
    pb.finish_and_clear();
    let (result, _) = outcome?;

    println!("\n{}Indexing complete!\n", SUCCESS);
    println!(
        "  Documents:       {}",
        style(result.documents_loaded).green()
    );
    println!(
        "  Chunks created:  {} ({} {})",
        style(result.chunks_created).cyan(),
        strategy,
        chunk_param
    );
    println!(
        "  Index:           {} ({} dimensions)",
        style(result.kind).yellow(),
        result.dimension
    );
    println!("  Index file:      {}", paths.index_path.display());
    println!("  Chunk file:      {}", paths.chunk_path.display());

    if result.degraded_chunks > 0 {
        println!(
            "\n{}{} chunks could not be embedded and were indexed as zero vectors",
            WARN,
            style(result.degraded_chunks).red()
        );
    }

    Ok(())
}
