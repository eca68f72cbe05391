//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use rstore_core::config::CONFIG_FILE_NAME;
use rstore_core::StoreConfig;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Resolve the store configuration
///
/// An explicit `--config` file wins. Otherwise `<root>/rstore.toml` is used
/// when present, and plain defaults for `root` when not.
pub fn load_config(root: Option<&Path>, config: Option<&Path>) -> Result<StoreConfig> {
    if let Some(path) = config {
        let mut loaded = StoreConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        if let Some(root) = root {
            loaded.root = root.to_path_buf();
        }
        return Ok(loaded);
    }

    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let candidate = root.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        let mut loaded = StoreConfig::load(&candidate)
            .with_context(|| format!("Failed to load config {}", candidate.display()))?;
        loaded.root = root;
        return Ok(loaded);
    }

    let mut defaults = StoreConfig::for_root(root);
    defaults.apply_env();
    Ok(defaults)
}

/// Format size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a modification time relative to now ("3m ago")
pub fn format_age(time: SystemTime) -> String {
    let now = SystemTime::now();
    let secs = match now.duration_since(time) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(_) => return "in the future".to_string(),
    };

    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

/// Milliseconds since the Unix epoch
pub fn epoch_ms(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Display form of a store path; the root prints as `/`
pub fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Absolute form of `path` for messages
pub fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstore_core::LockProviderKind;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_format_age() {
        let then = SystemTime::now() - Duration::from_secs(125);
        assert_eq!(format_age(then), "2m ago");
    }

    #[test]
    fn test_display_path() {
        assert_eq!(display_path(""), "/");
        assert_eq!(display_path("a/b"), "a/b");
    }

    #[test]
    fn test_load_config_from_root() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[locking]\nprovider = \"file\"\ntimeout_ms = 250\n",
        )
        .unwrap();

        let config = load_config(Some(temp_dir.path()), None).unwrap();
        assert_eq!(config.root, temp_dir.path());
        assert_eq!(config.locking.provider, LockProviderKind::File);
        assert_eq!(config.locking.timeout_ms, 250);
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(Some(temp_dir.path()), None).unwrap();
        assert_eq!(config.locking.provider, LockProviderKind::Memory);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.toml");
        assert!(load_config(None, Some(&missing)).is_err());
    }
}
