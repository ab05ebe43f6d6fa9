//! Configuration resolution for gaz-review
//!
//! Each value is resolved across tiers, highest priority first:
//! - index URL: command line → `GAZ_INDEX_URL` → TOML `[index] url`
//! - bulk chunk size: database setting → `GAZ_BULK_CHUNK_SIZE` → TOML
//! - canonical authority: `GAZ_CANONICAL_AUTHORITY` → TOML
//!
//! A value found in more than one tier is logged so a stale override is easy
//! to spot.

use gaz_common::config::TomlConfig;
use gaz_common::Result;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::Authority;

pub const BULK_CHUNK_SIZE_SETTING: &str = "review_bulk_chunk_size";

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewConfig {
    /// `None` selects the in-process index
    pub index_url: Option<String>,
    pub index_name: String,
    pub index_timeout: Duration,
    pub bulk_chunk_size: usize,
    pub canonical: Authority,
}

impl ReviewConfig {
    pub async fn resolve(
        db: &SqlitePool,
        toml_config: &TomlConfig,
        cli_index_url: Option<String>,
    ) -> Result<Self> {
        let config = Self {
            index_url: resolve_index_url(cli_index_url, toml_config),
            index_name: toml_config.index.name.clone(),
            index_timeout: Duration::from_millis(toml_config.index.timeout_ms),
            bulk_chunk_size: resolve_bulk_chunk_size(db, toml_config).await?,
            canonical: resolve_canonical_authority(toml_config),
        };

        info!(
            index = config.index_url.as_deref().unwrap_or("in-process"),
            index_name = %config.index_name,
            bulk_chunk_size = config.bulk_chunk_size,
            canonical = %config.canonical,
            "Configuration resolved"
        );

        Ok(config)
    }
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn resolve_index_url(cli: Option<String>, toml_config: &TomlConfig) -> Option<String> {
    let cli = cli.filter(|v| !v.trim().is_empty());
    let env = env_value("GAZ_INDEX_URL");
    let toml = toml_config.index.url.clone().filter(|v| !v.trim().is_empty());

    let sources: Vec<&str> = [("command line", cli.is_some()), ("environment", env.is_some()), ("TOML", toml.is_some())]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect();
    if sources.len() > 1 {
        warn!(
            "Index URL found in multiple sources: {}. Using {}.",
            sources.join(", "),
            sources[0]
        );
    }

    cli.or(env).or(toml)
}

/// Chunk size for bulk index deletes; non-positive values are ignored
pub async fn resolve_bulk_chunk_size(db: &SqlitePool, toml_config: &TomlConfig) -> Result<usize> {
    let db_value = gaz_common::db::get_setting_i64(db, BULK_CHUNK_SIZE_SETTING, 0).await?;
    if db_value > 0 {
        return Ok(db_value as usize);
    }

    if let Some(value) = env_value("GAZ_BULK_CHUNK_SIZE") {
        match value.parse::<usize>() {
            Ok(size) if size > 0 => return Ok(size),
            _ => warn!(value = %value, "Ignoring invalid GAZ_BULK_CHUNK_SIZE"),
        }
    }

    Ok(toml_config.review.bulk_chunk_size.max(1))
}

pub fn resolve_canonical_authority(toml_config: &TomlConfig) -> Authority {
    match env_value("GAZ_CANONICAL_AUTHORITY") {
        Some(value) => Authority::new(value),
        None => Authority::new(toml_config.review.canonical_authority.clone()),
    }
}
