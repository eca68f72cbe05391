//! Delete a resource

use anyhow::Result;
use cli_lib::GuardedStore;
use owo_colors::OwoColorize;
use rstore_core::StoreConfig;

pub fn run(config: &StoreConfig, path: &str) -> Result<()> {
    let guarded = GuardedStore::from_config(config)?;

    if guarded.delete(path)? {
        println!("{} Deleted {}", "✓".green(), path.yellow());
    } else {
        println!("{} Nothing at {}", "!".yellow(), path.yellow());
    }

    Ok(())
}
