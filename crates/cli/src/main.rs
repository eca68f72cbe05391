//! rstore CLI - inspect and edit a resource store

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

/// rstore - Hierarchical resource store with change notification and locking
#[derive(Parser)]
#[command(name = "rstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store root directory (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Configuration file (default: <root>/rstore.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the children of a directory
    Ls {
        /// Store path (default: root)
        #[arg(default_value = "")]
        path: String,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Only show leaves with these extensions (comma separated)
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,
    },
    /// Print the content of a resource (store path or `resource:` URL)
    Cat {
        path: String,
    },
    /// Write a resource from stdin or a file
    Put {
        path: String,
        /// Read content from this file instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Delete a resource or directory tree
    Rm {
        path: String,
    },
    /// Move a resource or directory tree
    Mv {
        source: String,
        target: String,
    },
    /// Show type, size and modification time
    Stat {
        path: String,
    },
    /// Acquire a lock and hold it for a while
    Lock {
        key: String,
        /// How long to hold the lock (default: 0)
        #[arg(long, default_value = "0")]
        hold_ms: u64,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = cli_lib::util::load_config(cli.root.as_deref(), cli.config.as_deref())?;

    match cli.command {
        Commands::Ls { path, recursive, ext } => cmd::ls::run(&config, &path, recursive, &ext),
        Commands::Cat { path } => cmd::cat::run(&config, &path),
        Commands::Put { path, from } => cmd::put::run(&config, &path, from.as_deref()),
        Commands::Rm { path } => cmd::rm::run(&config, &path),
        Commands::Mv { source, target } => cmd::mv::run(&config, &source, &target),
        Commands::Stat { path } => cmd::stat::run(&config, &path),
        Commands::Lock { key, hold_ms } => cmd::lock::run(&config, &key, hold_ms),
    }
}
