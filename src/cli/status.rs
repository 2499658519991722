use anyhow::Result;
use console::{style, Emoji};

use crate::config::Config;
use crate::search::index::read_header;
use crate::search::ChunkStore;

static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");
static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "");

pub fn run_status(config: &Config, profile: Option<&str>) -> Result<()> {
    let (paths, index_config) = config.profile(profile)?;

    if !paths.index_path.exists() {
        println!("{}No index found at {}", INFO, paths.index_path.display());
        println!("Run `docrag index` to build the search index.");
        return Ok(());
    }

    let header = read_header(&paths.index_path)?;
    let chunks = ChunkStore::load(&paths.chunk_path)?;
    let size = std::fs::metadata(&paths.index_path)?.len();

    println!("\n{}Index Status: {}\n", INFO, paths.index_path.display());
    println!("  Kind:            {}", style(header.kind).yellow());
    println!("  Vectors:         {}", style(header.count).green());
    println!("  Dimensions:      {}", header.dimension);
    println!("  Index size:      {} KB", size / 1024);
    println!(
        "  Built:           {}",
        style(header.built_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    if header.kind != index_config.kind {
        println!(
            "  {}configured kind is {}, the file's kind is used",
            WARN, index_config.kind
        );
    }

    match chunks {
        Some(chunks) => {
            println!("  Chunks:          {}", style(chunks.len()).cyan());
            if chunks.len() != header.count {
                println!(
                    "\n{}Chunk store has {} chunks but the index holds {} vectors",
                    WARN,
                    chunks.len(),
                    header.count
                );
            } else if header
                .chunk_fingerprint
                .as_deref()
                .is_some_and(|fp| fp != chunks.fingerprint())
            {
                println!(
                    "\n{}Chunk store {} was not built with this index",
                    WARN,
                    paths.chunk_path.display()
                );
            }
        }
        None => println!(
            "  Chunks:          {} (missing {})",
            style(0).red(),
            paths.chunk_path.display()
        ),
    }

    Ok(())
}
