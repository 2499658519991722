use std::sync::Arc;

use anyhow::Result;
use console::{style, Emoji};

use crate::config::Config;
use crate::search::{
    load_store, ChatRewriter, Chunker, Indexer, QueryRewriter, RetrievalStatus, Searcher,
    StoreHandle,
};

use super::args::SearchArgs;
use super::embedding_service;

static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "");
static FILE: Emoji<'_, '_> = Emoji("📄 ", "");
static REWRITE: Emoji<'_, '_> = Emoji("✏️  ", "");

const PREVIEW_CHARS: usize = 200;

pub async fn run_search(config: &Config, profile: Option<&str>, opts: &SearchArgs) -> Result<()> {
    let (paths, index_config) = config.profile(profile)?;
    let (_, embedding) = embedding_service(config)?;

    let mut options = config.search.clone();
    if let Some(top_k) = opts.top_k {
        options.top_k = top_k;
    }
    if let Some(mode) = &opts.mode {
        options.ranking_mode = mode.clone();
    }

    let handle = Arc::new(StoreHandle::new());
    let mut searcher = Searcher::new(Arc::clone(&handle), Arc::clone(&embedding), options);
    let loaded = if opts.build {
        let indexer = Indexer::new(
            embedding,
            Chunker::new(config.chunking.strategy, config.chunking.chunk_param),
            index_config,
            config.embedding.batch_size,
        );
        searcher.reload(&indexer, &paths).await?
    } else {
        match load_store(&paths, &index_config)? {
            Some(store) => {
                handle.replace(store);
                true
            }
            None => false,
        }
    };
    if !loaded {
        anyhow::bail!("No search index found. Run `docrag index` first to build the index.");
    }

    if config.rewriter.enabled && !opts.no_rewrite {
        let rewriter: Arc<dyn QueryRewriter> =
            Arc::new(ChatRewriter::new(&config.rewriter, config.retry)?);
        searcher = searcher.with_rewriter(rewriter);
    }

    let retrieval = searcher.retrieve(&opts.query).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&retrieval)?);
        return Ok(());
    }

    if retrieval.results.is_empty() {
        println!("No results found for: {}", style(&opts.query).italic());
        return Ok(());
    }

    if let RetrievalStatus::Rewritten { query } = &retrieval.status {
        println!(
            "{}No direct match, searched for: {}",
            REWRITE,
            style(query).yellow()
        );
    }

    println!(
        "\n{}Found {} results for: {} ({})\n",
        SEARCH,
        style(retrieval.results.len()).cyan(),
        style(&opts.query).yellow().bold(),
        searcher.options().mode()
    );

    for (i, result) in retrieval.results.iter().enumerate() {
        let source = result
            .original_doc
            .metadata
            .get("title")
            .or_else(|| result.original_doc.metadata.get("url"))
            .cloned()
            .unwrap_or_else(|| format!("document {}", result.doc_idx));
        let page = result
            .original_doc
            .metadata
            .get("page")
            .map(|p| format!(" p.{}", p))
            .unwrap_or_default();

        println!(
            "{} {}. {}{} {}",
            FILE,
            style(i + 1).dim(),
            style(source).green(),
            page,
            style(format!("(chunk {})", result.chunk_idx)).dim()
        );
        println!("   Score: {}", style(format!("{:.4}", result.score)).cyan());

        let preview: String = result.chunk_text.chars().take(PREVIEW_CHARS).collect();
        let preview = preview.split_whitespace().collect::<Vec<_>>().join(" ");
        if result.chunk_text.chars().count() > PREVIEW_CHARS {
            println!("   {}...", style(preview).dim());
        } else {
            println!("   {}", style(preview).dim());
        }
        println!();
    }

    Ok(())
}
