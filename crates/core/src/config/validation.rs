//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_name` or `user_agent` is empty
    /// - `scope_url` is not an http(s) URL ending in `/`
    /// - `assets` is empty
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "cache_name".into(), reason: "must not be empty".into() });
        }

        let scope = url::Url::parse(&self.scope_url)
            .map_err(|e| ConfigError::Invalid { field: "scope_url".into(), reason: e.to_string() })?;
        if !matches!(scope.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid { field: "scope_url".into(), reason: "must be http or https".into() });
        }
        if !scope.path().ends_with('/') {
            return Err(ConfigError::Invalid { field: "scope_url".into(), reason: "must end with '/'".into() });
        }

        if self.assets.is_empty() {
            return Err(ConfigError::Invalid { field: "assets".into(), reason: "must list at least one asset".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if !has_version_suffix(&self.cache_name) {
            tracing::warn!(cache_name = %self.cache_name, "cache_name has no -v<N> version suffix");
        }

        Ok(())
    }
}

/// Whether `name` ends in `-v` followed by digits, e.g. `app-cache-v3`.
fn has_version_suffix(name: &str) -> bool {
    name.rsplit_once("-v")
        .is_some_and(|(_, version)| !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()))
}
