//! Move a resource

use anyhow::{bail, Result};
use cli_lib::GuardedStore;
use owo_colors::OwoColorize;
use rstore_core::StoreConfig;

pub fn run(config: &StoreConfig, source: &str, target: &str) -> Result<()> {
    let guarded = GuardedStore::from_config(config)?;

    if !guarded.rename(source, target)? {
        bail!("Could not move '{}' to '{}'", source, target);
    }
    println!("{} Moved {} → {}", "✓".green(), source.yellow(), target.cyan());

    Ok(())
}
