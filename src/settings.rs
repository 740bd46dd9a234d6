use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "BLOG";

/// Runtime settings, read from `BLOG_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: String,
    /// Tenant scoping rows in the primary schema.
    pub tenant_id: String,
    /// Object storage origin, e.g. `https://xyz.supabase.co`. Hero probing is off without it.
    pub storage_base_url: Option<String>,
    /// Service key for the storage listing API.
    pub storage_key: Option<String>,
    pub hero_bucket: String,
    pub http_timeout_secs: u64,
    pub db_timeout_secs: u64,
    /// Expire hero cache entries after this many seconds (never, when unset).
    pub hero_cache_ttl_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: "data/blog.sqlite".to_string(),
            tenant_id: "default".to_string(),
            storage_base_url: None,
            storage_key: None,
            hero_bucket: "blog-images".to_string(),
            http_timeout_secs: 8,
            db_timeout_secs: 8,
            hero_cache_ttl_secs: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read BLOG_* settings")?
            .try_deserialize()
            .context("Invalid BLOG_* settings")
    }

    /// Storage origin with blank values treated as unset.
    pub fn storage_base(&self) -> Option<&str> {
        non_blank(self.storage_base_url.as_deref())
    }

    pub fn storage_key(&self) -> Option<&str> {
        non_blank(self.storage_key.as_deref())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }

    pub fn hero_cache_ttl(&self) -> Option<Duration> {
        self.hero_cache_ttl_secs.map(Duration::from_secs)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_probing() {
        let s = Settings::default();
        assert!(s.storage_base().is_none());
        assert_eq!(s.hero_bucket, "blog-images");
        assert_eq!(s.http_timeout(), Duration::from_secs(8));
        assert!(s.hero_cache_ttl().is_none());
    }

    #[test]
    fn blank_storage_base_is_unset() {
        let s = Settings {
            storage_base_url: Some("   ".into()),
            storage_key: Some(String::new()),
            ..Settings::default()
        };
        assert!(s.storage_base().is_none());
        assert!(s.storage_key().is_none());
    }
}
