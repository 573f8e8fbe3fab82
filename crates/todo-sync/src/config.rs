//! Connection settings for the hosted record table and image bucket

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::engine::DEFAULT_IMAGE_CACHE_CAPACITY;

pub const URL_ENV: &str = "SUPABASE_URL";
pub const API_KEY_ENV: &str = "SUPABASE_KEY";
pub const TABLE_ENV: &str = "TODO_SYNC_TABLE";
pub const BUCKET_ENV: &str = "TODO_SYNC_BUCKET";
pub const TIMEOUT_ENV: &str = "TODO_SYNC_TIMEOUT_SECS";

pub const DEFAULT_TABLE: &str = "todos";
pub const DEFAULT_BUCKET: &str = "todos_images";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Project URL, e.g. `https://<project>.supabase.co`
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Keep decoded images in memory, keyed by blob path
    #[serde(default = "default_cache_images")]
    pub cache_images: bool,
    /// Most decoded images kept at once, least recently used evicted first
    #[serde(default = "default_image_cache_capacity")]
    pub image_cache_capacity: usize,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("bucket", &self.bucket)
            .field("timeout_secs", &self.timeout_secs)
            .field("cache_images", &self.cache_images)
            .field("image_cache_capacity", &self.image_cache_capacity)
            .finish()
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_cache_images() -> bool {
    true
}

fn default_image_cache_capacity() -> usize {
    DEFAULT_IMAGE_CACHE_CAPACITY
}

impl SyncConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: default_table(),
            bucket: default_bucket(),
            timeout_secs: default_timeout_secs(),
            cache_images: default_cache_images(),
            image_cache_capacity: default_image_cache_capacity(),
        }
    }

    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup(URL_ENV).with_context(|| format!("{} is not set", URL_ENV))?;
        let api_key = lookup(API_KEY_ENV).with_context(|| format!("{} is not set", API_KEY_ENV))?;

        let mut config = Self::new(url, api_key);
        if let Some(table) = lookup(TABLE_ENV) {
            config.table = table;
        }
        if let Some(bucket) = lookup(BUCKET_ENV) {
            config.bucket = bucket;
        }
        if let Some(timeout) = lookup(TIMEOUT_ENV) {
            config.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds, got '{}'", TIMEOUT_ENV, timeout))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load settings from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SyncConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.url)
            .with_context(|| format!("Invalid project URL '{}'", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Project URL must use http or https, got '{}'", self.url);
        }
        if self.api_key.trim().is_empty() {
            bail!("API key is empty");
        }
        if self.table.is_empty() || self.bucket.is_empty() {
            bail!("table and bucket names must not be empty");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Cache size handed to the engine, zero when caching is off
    pub fn effective_image_cache_capacity(&self) -> usize {
        if self.cache_images {
            self.image_cache_capacity
        } else {
            0
        }
    }
}
