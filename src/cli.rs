//! Command-line interface parsing for swrcache
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into the cache configuration and store used by the binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::{CacheConfig, FileStore, PersistentStore, DEFAULT_NAMESPACE};

/// Default freshness window for `fetch`: five minutes
pub const DEFAULT_TTL_MS: u64 = 300_000;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The TTL is not a positive integer
    #[error("Invalid TTL: '{0}'. Expected a positive number of milliseconds")]
    InvalidTtl(String),

    /// No cache directory was given and none could be determined
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,
}

/// swrcache - read JSON endpoints through a stale-while-revalidate disk cache
#[derive(Parser, Debug)]
#[command(name = "swrcache")]
#[command(about = "Read JSON endpoints through a stale-while-revalidate cache")]
#[command(version)]
pub struct Cli {
    /// Directory for persisted entries (defaults to the platform cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Prefix applied to every persisted key
    #[arg(long, global = true, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch a JSON document through the cache and print it
    ///
    /// Examples:
    ///   swrcache fetch https://shop.example/api/products/latest --key home:latest
    ///   swrcache fetch https://shop.example/api/categories --ttl-ms 60000
    Fetch {
        /// URL of the JSON document
        url: String,

        /// Cache key (defaults to the URL)
        #[arg(long)]
        key: Option<String>,

        /// Freshness window in milliseconds
        #[arg(long, default_value_t = DEFAULT_TTL_MS, value_parser = parse_ttl_arg)]
        ttl_ms: u64,

        /// Coalesce concurrent loads of the same key
        #[arg(long)]
        single_flight: bool,
    },

    /// Show the persisted entry for a key
    Inspect {
        /// Cache key
        key: String,
    },
}

/// Parses a TTL argument, rejecting zero and non-numeric input
///
/// # Returns
/// * `Ok(u64)` if the string is a positive integer
/// * `Err(CliError::InvalidTtl)` otherwise
pub fn parse_ttl_arg(s: &str) -> Result<u64, CliError> {
    match s.parse::<u64>() {
        Ok(ttl) if ttl > 0 => Ok(ttl),
        _ => Err(CliError::InvalidTtl(s.to_string())),
    }
}

impl Cli {
    /// Cache configuration implied by the arguments
    pub fn cache_config(&self) -> CacheConfig {
        let single_flight = matches!(
            self.command,
            Command::Fetch {
                single_flight: true,
                ..
            }
        );
        CacheConfig::new()
            .with_namespace(self.namespace.clone())
            .with_single_flight(single_flight)
    }

    /// Persistent store for the chosen cache directory
    pub fn store(&self) -> Result<Arc<dyn PersistentStore>, CliError> {
        let store = match &self.cache_dir {
            Some(dir) => FileStore::with_dir(dir.clone()),
            None => FileStore::new().ok_or(CliError::NoCacheDir)?,
        };
        Ok(Arc::new(store))
    }
}
