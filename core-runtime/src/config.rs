//! # Core Configuration Module
//!
//! Provides configuration management for the podcast core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all necessary dependencies and settings for the core.
//! It enforces fail-fast validation so a missing API key or database path is
//! reported before any component starts.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite file backing the local store
//! - `listen_api_key` - ListenAPI credential sent with every catalog request
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `SettingsStore` - Preferences (desktop default: SQLite next to the database)
//! - `Clock` - Time source (default: system clock)
//! - `LoggerSink` - Host log forwarding (default: none)
//!
//! Defaults are resolved by `core-service` when the `desktop-shims` feature is
//! enabled; on other platforms a missing bridge is a `CapabilityMissing` error.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/podcasts.db")
//!     .listen_api_key(std::env::var("LISTEN_API_KEY")?)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, LoggerSink, SettingsStore, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Production ListenAPI endpoint.
pub const DEFAULT_LISTEN_API_BASE_URL: &str = "https://listen-api.listennotes.com/api/v2";

/// Environment variable read by [`CatalogApiConfig::from_env`].
pub const LISTEN_API_KEY_ENV: &str = "LISTEN_API_KEY";

/// Core configuration for the podcast core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Remote catalog settings
    pub catalog: CatalogApiConfig,

    /// HTTP client for catalog requests (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// Preferences storage (optional with desktop default)
    pub settings_store: Option<Arc<dyn SettingsStore>>,

    /// Host log forwarding, installed by the service at startup
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Time source used for progress timestamps
    pub clock: Arc<dyn Clock>,

    /// Feature flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("catalog", &self.catalog)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "settings_store",
                &self.settings_store.as_ref().map(|_| "SettingsStore { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Persist listening progress from playback events
    pub enable_progress_tracking: bool,

    /// Start episodes from their stored position
    pub enable_resume_playback: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_progress_tracking: true,
            enable_resume_playback: true,
        }
    }
}

/// Connection settings for the ListenAPI catalog.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogApiConfig {
    /// API root without trailing slash
    pub base_url: String,

    /// Value of the `X-ListenAPI-Key` header
    pub api_key: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Attempts per request, including the first one
    pub max_attempts: u32,
}

impl Default for CatalogApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LISTEN_API_BASE_URL.to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(15),
            max_attempts: 3,
        }
    }
}

// The key must never reach logs.
impl std::fmt::Debug for CatalogApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl CatalogApiConfig {
    /// Creates a configuration for the production endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Reads the API key from `LISTEN_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(LISTEN_API_KEY_ENV).map_err(|_| {
            Error::Config(format!("{} is not set", LISTEN_API_KEY_ENV))
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config(
                "ListenAPI key cannot be empty. Set it with listen_api_key() or LISTEN_API_KEY."
                    .to_string(),
            ));
        }

        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Catalog base URL must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Catalog request timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 || self.max_attempts > 10 {
            return Err(Error::Config(
                "Catalog max attempts must be between 1 and 10".to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.catalog.validate()?;

        if self.features.enable_resume_playback && !self.features.enable_progress_tracking {
            return Err(Error::Config(
                "Resume playback requires progress tracking. \
                 Enable progress tracking or disable resume playback."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    catalog: CatalogApiConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/path/to/podcasts.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the ListenAPI key (required).
    pub fn listen_api_key(mut self, key: impl Into<String>) -> Self {
        self.catalog.api_key = key.into();
        self
    }

    /// Overrides the catalog endpoint, e.g. the ListenAPI mock server.
    pub fn listen_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.catalog = self.catalog.with_base_url(url);
        self
    }

    /// Replaces all catalog settings at once.
    pub fn catalog(mut self, catalog: CatalogApiConfig) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the settings store implementation.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Forwards core logs to the host.
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_progress_tracking(mut self, enable: bool) -> Self {
        self.features.enable_progress_tracking = enable;
        self
    }

    pub fn enable_resume_playback(mut self, enable: bool) -> Self {
        self.features.enable_resume_playback = enable;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when the database path is missing or a setting is invalid
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Call database_path() first.".to_string())
        })?;

        let config = CoreConfig {
            database_path,
            catalog: self.catalog,
            http_client: self.http_client,
            settings_store: self.settings_store,
            logger_sink: self.logger_sink,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            features: self.features,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_minimal() {
        let config = CoreConfig::builder()
            .database_path("/tmp/podcasts.db")
            .listen_api_key("key")
            .build()
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/podcasts.db"));
        assert_eq!(config.catalog.base_url, DEFAULT_LISTEN_API_BASE_URL);
        assert!(config.http_client.is_none());
        assert!(config.features.enable_progress_tracking);
    }

    #[test]
    fn test_missing_database_path() {
        let err = CoreConfig::builder().listen_api_key("key").build().unwrap_err();
        assert!(err.to_string().contains("Database path is required"));
    }

    #[test]
    fn test_missing_api_key() {
        let err = CoreConfig::builder()
            .database_path("/tmp/podcasts.db")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ListenAPI key"));
    }

    #[test]
    fn test_base_url_is_normalized() {
        let config = CoreConfig::builder()
            .database_path("/tmp/podcasts.db")
            .listen_api_key("key")
            .listen_api_base_url("https://listen-api-test.listennotes.com/api/v2/")
            .build()
            .unwrap();

        assert_eq!(
            config.catalog.base_url,
            "https://listen-api-test.listennotes.com/api/v2"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let catalog = CatalogApiConfig::new("key").with_base_url("ftp://example.com");
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_resume_requires_progress_tracking() {
        let result = CoreConfig::builder()
            .database_path("/tmp/podcasts.db")
            .listen_api_key("key")
            .enable_progress_tracking(false)
            .build();
        assert!(result.is_err());

        let config = CoreConfig::builder()
            .database_path("/tmp/podcasts.db")
            .listen_api_key("key")
            .enable_progress_tracking(false)
            .enable_resume_playback(false)
            .build()
            .unwrap();
        assert!(!config.features.enable_resume_playback);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let catalog = CatalogApiConfig::new("super-secret");
        let debug = format!("{:?}", catalog);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
