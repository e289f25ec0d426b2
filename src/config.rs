use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::cache::TtlPolicy;

pub const API_KEY_ENV: &str = "NEWS_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Directory served for everything outside `/api`
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub client: CoordinatorConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_static_dir() -> String {
    "public".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5500".to_string(),
        "http://127.0.0.1:5500".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_country")]
    pub country: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            language: default_language(),
            country: default_country(),
            timeout: default_timeout(),
        }
    }
}

fn default_upstream_url() -> String {
    "https://newsdata.io/api/1/news".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_country() -> String {
    "in".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// TTLs in seconds for the two cache tiers
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_short_ttl")]
    pub short_ttl: u64,
    #[serde(default = "default_long_ttl")]
    pub long_ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            short_ttl: default_short_ttl(),
            long_ttl: default_long_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> TtlPolicy {
        TtlPolicy {
            short: Duration::from_secs(self.short_ttl),
            long: Duration::from_secs(self.long_ttl),
        }
    }
}

fn default_short_ttl() -> u64 {
    5 * 60
}

fn default_long_ttl() -> u64 {
    15 * 60
}

/// Settings for the client-side fetch coordinator.
#[derive(Debug, Deserialize, Clone)]
pub struct CoordinatorConfig {
    /// Origin of the proxy, e.g. `http://localhost:3000`
    #[serde(default = "default_client_base_url")]
    pub base_url: String,
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_client_base_url(),
            placeholder_image: default_placeholder_image(),
            timeout: default_timeout(),
        }
    }
}

impl CoordinatorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

fn default_client_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_placeholder_image() -> String {
    "/images/placeholder.png".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Read the upstream API key from the environment, loading `.env` first.
    pub fn api_key() -> anyhow::Result<String> {
        let _ = dotenvy::dotenv();
        std::env::var(API_KEY_ENV)
            .map_err(|_| anyhow::anyhow!("{} is not set", API_KEY_ENV))
    }
}
