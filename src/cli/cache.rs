use anyhow::Context;
use clap::Subcommand;
use switchyard_llm::{ContentCache, RouterSettings};

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show entry count and size
    Stats,
    /// Delete expired and invalid entries
    Purge,
}

pub fn run(settings: RouterSettings, action: &CacheAction) -> anyhow::Result<()> {
    let cache = ContentCache::new(&settings.cache);

    match action {
        CacheAction::Stats => {
            let stats = cache
                .stats()
                .with_context(|| format!("Failed to scan {}", cache.dir().display()))?;
            println!("Cache directory: {}", cache.dir().display());
            println!("  Entries: {}", stats.entries);
            println!("  Size:    {} bytes", stats.bytes);
            println!("  Expired: {} (ttl {}s)", stats.expired, settings.cache.ttl_secs);
            println!("  Invalid: {}", stats.invalid);
        }
        CacheAction::Purge => {
            let removed = cache
                .purge_expired()
                .with_context(|| format!("Failed to purge {}", cache.dir().display()))?;
            println!("Removed {removed} entries from {}", cache.dir().display());
        }
    }
    Ok(())
}
