//! Filecache - command line access to a filesystem cache
//!
//! Reads, writes and maintains one cache key from the shell.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filecache::{CacheOptions, Expire, HistoryCache};

/// Inspect and maintain a filesystem cache key.
///
/// Options not given on the command line come from `FILECACHE_DIR`,
/// `FILECACHE_EXPIRE`, `FILECACHE_HISTORY_LIMIT` and `FILECACHE_CLEANUP`.
#[derive(Debug, Parser)]
#[command(name = "filecache", version, about)]
struct Cli {
    /// Container directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Expiration keyword (minute, hourly, workday, halfday, nightly, weekly, monthly) or seconds
    #[arg(long)]
    expire: Option<String>,

    /// Number of retained history states
    #[arg(long)]
    history_limit: Option<usize>,

    /// Regex a value must match to be stored
    #[arg(long)]
    must_match: Option<String>,

    /// Regex a value must not match to be stored
    #[arg(long)]
    must_not_match: Option<String>,

    /// Cache key
    key: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current value
    ///
    /// Opens the cache with the given options: if they differ from the stored
    /// policy, the stored history is discarded first.
    Get,
    /// Store a value (JSON, or plain text if it does not parse)
    Set {
        value: String,
        /// JSON object recorded alongside the history state
        #[arg(long)]
        extra: Option<String>,
    },
    /// Print the retained history records as stored, without reconciling
    History,
    /// Print the catalog as stored, without reconciling
    Catalog,
    /// Mark the current value stale
    Invalidate,
    /// Remove files not referenced by the history, if due
    Cleanup,
    /// Delete everything stored under the key
    Clear,
}

impl Cli {
    fn options(&self) -> CacheOptions {
        let mut options = CacheOptions::from_env();
        if let Some(dir) = &self.dir {
            options.container = dir.clone();
        }
        if let Some(expire) = &self.expire {
            options.expire = expire.parse().unwrap_or(Expire::Nightly);
        }
        if let Some(limit) = self.history_limit {
            options.history_limit = limit;
        }
        options.must_match = self.must_match.clone();
        options.must_not_match = self.must_not_match.clone();
        options
    }
}

fn main() -> Result<ExitCode> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filecache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let options = cli.options();
    debug!(
        "Options: container={}, expire={}, history_limit={}",
        options.container.display(),
        options.expire,
        options.history_limit
    );

    // Inspection reads the catalog as stored and never reinitializes the key
    if let Command::History | Command::Catalog = cli.command {
        let Some(catalog) = HistoryCache::stored_catalog(&cli.key, &options)? else {
            info!("No catalog stored for '{}'", cli.key);
            return Ok(ExitCode::FAILURE);
        };
        let text = match cli.command {
            Command::History => serde_json::to_string_pretty(&catalog.history)?,
            _ => serde_json::to_string_pretty(&catalog)?,
        };
        println!("{}", text);
        return Ok(ExitCode::SUCCESS);
    }

    let mut cache = HistoryCache::open(cli.key.clone(), options)
        .with_context(|| format!("failed to open cache '{}'", cli.key))?;

    match cli.command {
        Command::Get => match cache.get::<Value>()? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => {
                info!("No value available for '{}'", cli.key);
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Set { value, extra } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let extra = match extra {
                Some(extra) => serde_json::from_str::<Map<String, Value>>(&extra)
                    .context("--extra must be a JSON object")?,
                None => Map::new(),
            };
            let record = cache.set(&value, extra)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::History | Command::Catalog => {}
        Command::Invalidate => cache.invalidate()?,
        Command::Cleanup => {
            if !cache.cleanup()? {
                info!("Cleanup for '{}' is not due yet", cli.key);
            }
        }
        Command::Clear => cache.clear()?,
    }

    Ok(ExitCode::SUCCESS)
}
