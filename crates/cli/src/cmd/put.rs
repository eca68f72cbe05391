//! Write a resource through the guarded store

use anyhow::{Context, Result};
use cli_lib::GuardedStore;
use owo_colors::OwoColorize;
use rstore_core::StoreConfig;
use rstore_watcher::Kind;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub fn run(config: &StoreConfig, path: &str, from: Option<&Path>) -> Result<()> {
    let guarded = GuardedStore::from_config(config)?;

    let mut input: Box<dyn Read> = match from {
        Some(file) => Box::new(
            File::open(file).with_context(|| format!("Failed to open {}", file.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let kind = guarded.write(path, &mut input)?;
    let verb = match kind {
        Kind::EntryCreate => "Created",
        _ => "Updated",
    };
    println!("{} {} {}", "✓".green(), verb, path.yellow());

    Ok(())
}
