//! Print resource content to stdout

use anyhow::{Context, Result};
use rstore_core::resources;
use rstore_core::{FileSystemResourceStore, ResourceStore, StoreConfig};
use std::io::{self, Write};

pub fn run(config: &StoreConfig, path: &str) -> Result<()> {
    let store = FileSystemResourceStore::from_config(config)
        .with_context(|| format!("Failed to open store at {}", config.root.display()))?;
    // accepts `resource:` URLs as well as plain store paths
    let resource = if path.contains(':') {
        resources::from_url(&store.root_resource(), path)?
            .with_context(|| format!("'{}' is not a location in this store", path))?
    } else {
        store.get(path)?
    };

    let mut input = resource
        .open_read()
        .with_context(|| format!("Cannot read '{}'", path))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut input, &mut out)?;
    out.flush()?;

    Ok(())
}
