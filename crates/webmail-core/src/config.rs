//! Composer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use webmail_soap::ServerConfig;

use crate::{Error, Result};

/// Bounded retry policy for transient failures.
///
/// The delay before retry `n` (1-based) is
/// `initial_backoff_ms * multiplier^(n-1)`, capped at `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Growth factor between retries.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            multiplier: 2,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            multiplier: 1,
            max_backoff_ms: 0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier).saturating_pow(attempt.saturating_sub(1));
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Settings for the draft editor, autosave and send pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Mail server connection.
    pub server: ServerConfig,
    /// Quiet period after the last edit before a draft is saved.
    pub autosave_debounce_ms: u64,
    /// Undo-send window in seconds.
    pub send_countdown_secs: u32,
    /// Retry policy for draft saves.
    pub retry: RetryPolicy,
    /// Default search page size.
    pub search_page_size: u32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            autosave_debounce_ms: 2_000,
            send_countdown_secs: 3,
            retry: RetryPolicy::default(),
            search_page_size: 100,
        }
    }
}

impl ComposerConfig {
    /// Debounce interval as a `Duration`.
    #[must_use]
    pub const fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    /// Default config file location (`<config dir>/webmail/composer.json`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("webmail")
            .join("composer.json")
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration at `path`, falling back to defaults when the
    /// file is missing or unreadable.
    pub async fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::load(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load composer config from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Writes the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        tracing::info!("Composer config saved to {:?}", path);
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.multiplier == 0 {
            return Err(Error::Config("retry.multiplier must be at least 1".into()));
        }
        if self.search_page_size == 0 {
            return Err(Error::Config("search_page_size must be at least 1".into()));
        }
        Ok(())
    }
}
