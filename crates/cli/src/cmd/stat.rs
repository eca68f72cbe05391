//! Show resource details

use anyhow::{Context, Result};
use cli_lib::util;
use owo_colors::OwoColorize;
use rstore_core::resources;
use rstore_core::{FileSystemResourceStore, ResourceStore, ResourceType, StoreConfig};

pub fn run(config: &StoreConfig, path: &str) -> Result<()> {
    let store = FileSystemResourceStore::from_config(config)
        .with_context(|| format!("Failed to open store at {}", config.root.display()))?;
    let resource = store.get(path)?;

    println!("{}", "Resource".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Path:          {}", util::display_path(&resource.path()).cyan());
    println!("Type:          {}", resource.resource_type());
    println!("URL:           {}", resources::to_url(&resource).dimmed());

    let Some(native) = resources::find(&resource)? else {
        println!("  {}", "Does not exist".dimmed());
        return Ok(());
    };
    println!("Native:        {}", util::absolute(&native).display());

    match resource.resource_type() {
        ResourceType::Directory => {
            println!("Children:      {}", resource.list()?.len());
        }
        _ => {
            let size = std::fs::metadata(&native)?.len();
            println!("Size:          {}", util::format_size(size));
        }
    }
    if let Some(modified) = resource.last_modified()? {
        println!(
            "Modified:      {} ({} ms)",
            util::format_age(modified),
            util::epoch_ms(modified).to_string().dimmed()
        );
    }

    Ok(())
}
