use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::search::{ChunkStrategy, IndexKind};

/// Build and query a hybrid vector + TF-IDF index over a directory of JSON documents.
#[derive(Parser, Debug)]
#[command(name = "docrag", version, about)]
pub struct Args {
    /// Config file (default: ./docrag.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Named corpus from [profiles.<name>]
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the index and chunk store from the data directory
    Index(IndexArgs),
    /// Query the index
    Search(SearchArgs),
    /// Show what is currently built for the profile
    Status,
    /// Look up a page of a book file
    Page(PageArgs),
}

#[derive(ClapArgs, Debug, Default)]
pub struct IndexArgs {
    /// Directory of *.json documents
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub strategy: Option<ChunkStrategy>,

    /// Characters for fixed, tokens for token and recursive
    #[arg(long)]
    pub chunk_param: Option<usize>,

    #[arg(long)]
    pub kind: Option<IndexKind>,

    #[arg(long)]
    pub index_path: Option<PathBuf>,

    #[arg(long)]
    pub chunk_path: Option<PathBuf>,

    /// Skip the embedding provider health check
    #[arg(long)]
    pub no_check: bool,
}

#[derive(ClapArgs, Debug, Default)]
pub struct SearchArgs {
    pub query: String,

    /// Number of results
    #[arg(short = 'n', long)]
    pub top_k: Option<usize>,

    /// dense, tfidf or rrf
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Do not rewrite the query when nothing matches
    #[arg(long)]
    pub no_rewrite: bool,

    /// Build the index first when none exists
    #[arg(long)]
    pub build: bool,
}

#[derive(ClapArgs, Debug)]
pub struct PageArgs {
    /// Book file name without .json
    pub book: String,

    pub page: String,

    /// Directory holding book files (default: the profile's data directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Also show the previous and next pages
    #[arg(long)]
    pub adjacent: bool,
}
