use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use docrag::cli::{run_index, run_page, run_search, run_status, Args, Command};
use docrag::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for --json
    let default_level = if args.verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref())?;
    let profile = args.profile.as_deref();

    match args.command {
        Command::Index(opts) => run_index(&config, profile, &opts).await,
        Command::Search(opts) => run_search(&config, profile, &opts).await,
        Command::Status => run_status(&config, profile),
        Command::Page(opts) => run_page(&config, profile, &opts),
    }
}
