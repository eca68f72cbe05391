//! Hold a lock from the configured provider

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use rstore_core::StoreConfig;
use rstore_locks::provider_from_config;
use std::time::{Duration, Instant};

pub fn run(config: &StoreConfig, key: &str, hold_ms: u64) -> Result<()> {
    let provider = provider_from_config(&config.locking, &config.lock_root());

    let started = Instant::now();
    let mut lock = provider
        .acquire(key)
        .with_context(|| format!("Failed to lock '{}'", key))?;
    println!(
        "{} Locked {} after {} ms",
        "✓".green(),
        key.yellow(),
        started.elapsed().as_millis()
    );

    if hold_ms > 0 {
        println!("  {}", format!("Holding for {} ms", hold_ms).dimmed());
        std::thread::sleep(Duration::from_millis(hold_ms));
    }
    lock.release()?;
    println!("{} Released {}", "✓".green(), key.yellow());

    Ok(())
}
