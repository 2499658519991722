use anyhow::Result;
use console::style;

use crate::config::Config;
use crate::pages::PageCache;

use super::args::PageArgs;

pub fn run_page(config: &Config, profile: Option<&str>, opts: &PageArgs) -> Result<()> {
    let (paths, _) = config.profile(profile)?;
    let dir = opts.dir.clone().unwrap_or(paths.data_dir);
    let mut cache = PageCache::new(dir);

    let Some(text) = cache.page(&opts.book, &opts.page) else {
        anyhow::bail!("No page {} in book '{}'", opts.page, opts.book);
    };

    println!("{}", style(format!("{} p.{}", opts.book, opts.page)).green().bold());
    println!("{}", text);

    if opts.adjacent {
        if let Some(around) = cache.adjacent(&opts.book, &opts.page) {
            for (label, page) in [("previous", around.previous), ("next", around.next)] {
                if let Some(page) = page {
                    println!("\n{}", style(format!("[{} page]", label)).dim());
                    println!("{}", page);
                }
            }
        }
    }

    Ok(())
}
