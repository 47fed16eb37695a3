//! swrcache - read JSON endpoints through a stale-while-revalidate cache
//!
//! Fetched documents are kept on disk; repeated runs within the TTL are
//! served from disk while the document is refreshed in the background.

use std::process::ExitCode;

use clap::Parser;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use swrcache::cache::{Clock, SwrCache, SystemClock};
use swrcache::cli::{Cli, Command};
use swrcache::fetch::JsonFetcher;

/// Sends log output to stderr so stdout only carries JSON
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Reads `url` through the cache and prints the document
async fn run_fetch(
    cache: &SwrCache,
    url: &str,
    key: &str,
    ttl_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = JsonFetcher::new();
    let value: Value = cache.get(key, ttl_ms, fetcher.loader(url)).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    // A persisted hit leaves a refresh running; let it land before exiting
    cache.wait_for_refreshes().await;
    debug!(stats = ?cache.stats(), "fetch finished");
    Ok(())
}

/// Prints the persisted entry for `key`; returns false if there is none
fn run_inspect(cache: &SwrCache, key: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let Some(entry) = cache.entries().read::<Value>(key) else {
        eprintln!("No usable entry for '{}'", key);
        return Ok(false);
    };

    let now = SystemClock.now_ms();
    let report = json!({
        "key": key,
        "storageKey": cache.entries().storage_key(key),
        "storedAt": entry.stored_at,
        "ttlMs": entry.ttl_ms,
        "ageMs": entry.age_ms(now),
        "fresh": entry.is_fresh(now),
        "value": entry.value,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    let cache = SwrCache::new(cli.store()?, cli.cache_config());

    match &cli.command {
        Command::Fetch {
            url, key, ttl_ms, ..
        } => {
            let key = key.as_deref().unwrap_or(url);
            run_fetch(&cache, url, key, *ttl_ms).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { key } => {
            if run_inspect(&cache, key)? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
