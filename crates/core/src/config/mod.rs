//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (VRCACHE_*)
//! 2. TOML config file (if VRCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::manifest::{self, Manifest};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (VRCACHE_*)
/// 2. TOML config file (if VRCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the current cache store. Encodes the asset-set version;
    /// bumping it orphans every older store, which activation then deletes.
    ///
    /// Set via VRCACHE_CACHE_NAME environment variable.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// URL the worker controls; manifest paths resolve against it and its
    /// origin decides which responses count as same-origin.
    ///
    /// Set via VRCACHE_SCOPE_URL environment variable.
    #[serde(default = "default_scope_url")]
    pub scope_url: String,

    /// Asset paths pre-cached on install.
    #[serde(default = "manifest::default_assets")]
    pub assets: Vec<String>,

    /// Path to SQLite cache database.
    ///
    /// Set via VRCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via VRCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via VRCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects the HTTP client follows.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Take control of already-open clients right after activation.
    ///
    /// Set via VRCACHE_CLAIM_CLIENTS environment variable.
    #[serde(default = "default_true")]
    pub claim_clients: bool,
}

fn default_cache_name() -> String {
    "video-reverser-cache-v1".into()
}

fn default_scope_url() -> String {
    "http://localhost:8080/video-reverser/".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./vrcache.sqlite")
}

fn default_user_agent() -> String {
    "vrcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            scope_url: default_scope_url(),
            assets: manifest::default_assets(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            claim_clients: true,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::new(self.assets.clone())
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("VRCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("VRCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
