//! List directory contents

use anyhow::{Context, Result};
use cli_lib::util;
use owo_colors::OwoColorize;
use rstore_core::resources::{self, AnyFilter, ExtensionFilter, ResourceFilter};
use rstore_core::{FileSystemResourceStore, ResourceStore, ResourceType, StoreConfig};

pub fn run(config: &StoreConfig, path: &str, recursive: bool, ext: &[String]) -> Result<()> {
    let store = FileSystemResourceStore::from_config(config)
        .with_context(|| format!("Failed to open store at {}", config.root.display()))?;
    let dir = store.get(path)?;

    match dir.resource_type() {
        ResourceType::Directory => {}
        ResourceType::Resource => anyhow::bail!("'{}' is not a directory", path),
        ResourceType::Undefined => anyhow::bail!("'{}' does not exist", path),
    }

    let extension_filter;
    let filter: &dyn ResourceFilter = if ext.is_empty() {
        &AnyFilter
    } else {
        extension_filter = ExtensionFilter::new(ext);
        &extension_filter
    };

    let entries = resources::list(&dir, filter, recursive)?;
    if entries.is_empty() {
        println!("  {}", "(empty)".dimmed());
        return Ok(());
    }

    for entry in entries {
        let shown = if recursive {
            entry.path()
        } else {
            entry.name().to_string()
        };
        if entry.resource_type() == ResourceType::Directory {
            println!("{}/", shown.cyan());
        } else {
            let age = entry
                .last_modified()?
                .map(util::format_age)
                .unwrap_or_default();
            println!("{}  {}", shown, age.dimmed());
        }
    }

    Ok(())
}
