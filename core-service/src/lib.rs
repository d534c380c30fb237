//! # Core Service
//!
//! Façade wiring the podcast core together for host applications.
//!
//! ## Overview
//!
//! [`CoreService`] turns a [`CoreConfig`] and a platform [`EngineFactory`]
//! into a running core:
//!
//! - a [`LibraryStore`] on the configured SQLite database
//! - the ListenAPI [`CatalogClient`]
//! - the cache-first [`Repository`] and the [`PlayerRepository`]
//! - one [`EventBus`] shared by the playback host, the repositories and the
//!   progress recorder
//! - a [`PlaybackLifecycle`] handing out [`PlayerController`]s
//!
//! Desktop apps enable the `desktop-shims` feature (the default), which fills
//! in a missing `HttpClient` or `SettingsStore` with the `bridge-desktop`
//! implementations. Without it both bridges must be injected.
//!
//! ## Usage
//!
//! ```ignore
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/podcasts.db")
//!     .listen_api_key(api_key)
//!     .build()?;
//! let core = CoreService::new(config, engine_factory).await?;
//!
//! let player = core.player_controller("main-ui")?;
//! player.play_episode_by_id("4d3fe717742d4963a85562e9f84d8c79").await?;
//! ```

pub mod error;
pub mod lifecycle;
pub mod player;
pub mod player_repository;
pub mod progress;
pub mod repository;
pub mod state;

pub use error::{CoreError, Result};
pub use lifecycle::{EngineFactory, PlaybackLifecycle};
pub use player::PlayerController;
pub use player_repository::{PlayerRepository, StorePlayerRepository, COMPLETION_THRESHOLD_MS};
pub use progress::ProgressRecorder;
pub use repository::{CacheFirstRepository, Repository};
pub use state::State;

use std::sync::Arc;

use bridge_traits::{Clock, HttpClient, SettingsStore};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::LibraryStore;
use core_playback::PlaybackConfig;
use core_runtime::config::{CoreConfig, FeatureFlags};
use core_runtime::events::EventBus;
use core_runtime::logging::{init_logging, strip_path, LoggingConfig};
use parking_lot::Mutex;
use provider_listennotes::{CatalogClient, ListenNotesClient};
use tracing::{debug, info};

/// Capacity of the shared event bus.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// File name of the default settings database, created next to the library
/// database.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
const SETTINGS_DB_FILE: &str = "settings.db";

/// Explicit components for [`CoreService::from_parts`].
pub struct CoreParts {
    pub store: LibraryStore,
    pub catalog: Arc<dyn CatalogClient>,
    pub clock: Arc<dyn Clock>,
    pub features: FeatureFlags,
    pub engine_factory: EngineFactory,
    pub playback: PlaybackConfig,
}

/// Primary façade exposed to host applications.
pub struct CoreService {
    store: LibraryStore,
    catalog: Arc<dyn CatalogClient>,
    repository: Arc<dyn Repository>,
    player_repository: Arc<dyn PlayerRepository>,
    event_bus: EventBus,
    lifecycle: Arc<PlaybackLifecycle>,
    recorder: Mutex<Option<ProgressRecorder>>,
    features: FeatureFlags,
}

impl CoreService {
    /// Open the database, build the catalog client and start progress
    /// tracking. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `CoreError::Runtime` when the configuration is invalid
    /// - `CoreError::CapabilityMissing` when a bridge has no platform default
    /// - `CoreError::Library` when the database cannot be opened or migrated
    pub async fn new(config: CoreConfig, engine_factory: EngineFactory) -> Result<Self> {
        config.validate()?;

        if let Some(sink) = &config.logger_sink {
            // A host that already installed a subscriber keeps it.
            if let Err(e) = init_logging(LoggingConfig::default().with_logger_sink(Arc::clone(sink)))
            {
                debug!(error = %e, "Logging already initialized");
            }
        }

        let http_client = resolve_http_client(&config)?;
        let settings_store = resolve_settings_store(&config).await?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let store = LibraryStore::new(pool, settings_store).await?;
        let catalog = Arc::new(ListenNotesClient::new(http_client, config.catalog.clone()));

        let database_path = config.database_path.to_string_lossy();
        info!(
            database = strip_path(&database_path),
            catalog = %config.catalog.base_url,
            "Core service initialized"
        );

        Ok(Self::from_parts(CoreParts {
            store,
            catalog,
            clock: Arc::clone(&config.clock),
            features: config.features,
            engine_factory,
            playback: PlaybackConfig::default(),
        }))
    }

    /// Assemble the service from explicit components. Must be called within
    /// a tokio runtime.
    pub fn from_parts(parts: CoreParts) -> Self {
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

        let repository: Arc<dyn Repository> = Arc::new(
            CacheFirstRepository::new(parts.store.clone(), Arc::clone(&parts.catalog))
                .with_event_bus(event_bus.clone()),
        );
        let player_repository: Arc<dyn PlayerRepository> = Arc::new(
            StorePlayerRepository::new(parts.store.clone(), parts.clock)
                .with_event_bus(event_bus.clone()),
        );

        let recorder = parts
            .features
            .enable_progress_tracking
            .then(|| ProgressRecorder::start(&event_bus, Arc::clone(&player_repository)));

        let lifecycle = Arc::new(PlaybackLifecycle::new(
            parts.engine_factory,
            parts.playback,
            event_bus.clone(),
        ));

        Self {
            store: parts.store,
            catalog: parts.catalog,
            repository,
            player_repository,
            event_bus,
            lifecycle,
            recorder: Mutex::new(recorder),
            features: parts.features,
        }
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn catalog(&self) -> Arc<dyn CatalogClient> {
        Arc::clone(&self.catalog)
    }

    pub fn repository(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repository)
    }

    pub fn player_repository(&self) -> Arc<dyn PlayerRepository> {
        Arc::clone(&self.player_repository)
    }

    /// Bus carrying playback, catalog and library events.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn lifecycle(&self) -> Arc<PlaybackLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    /// New player bound to the shared playback host. It connects on first
    /// use.
    ///
    /// # Errors
    ///
    /// `CoreError::Playback` when the playback configuration is invalid.
    pub fn player_controller(&self, name: impl Into<String>) -> Result<PlayerController> {
        PlayerController::new(
            name,
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.player_repository),
            self.store.clone(),
            self.features.enable_resume_playback,
        )
    }

    /// Stop the playback host, then the progress recorder so the final
    /// position is saved.
    pub async fn shutdown(&self) -> Result<()> {
        self.lifecycle.shutdown().await?;

        let recorder = self.recorder.lock().take();
        if let Some(recorder) = recorder {
            recorder.stop().await;
        }
        info!("Core service shut down");
        Ok(())
    }
}

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
fn resolve_http_client(config: &CoreConfig) -> Result<Arc<dyn HttpClient>> {
    if let Some(client) = &config.http_client {
        return Ok(Arc::clone(client));
    }
    let client = bridge_desktop::ReqwestHttpClient::with_timeout(config.catalog.request_timeout)
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    Ok(Arc::new(client))
}

#[cfg(not(all(feature = "desktop-shims", not(target_arch = "wasm32"))))]
fn resolve_http_client(config: &CoreConfig) -> Result<Arc<dyn HttpClient>> {
    config
        .http_client
        .clone()
        .ok_or_else(|| CoreError::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "No HTTP client provided and no platform default is available".to_string(),
        })
}

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
async fn resolve_settings_store(config: &CoreConfig) -> Result<Arc<dyn SettingsStore>> {
    if let Some(store) = &config.settings_store {
        return Ok(Arc::clone(store));
    }
    let path = config.database_path.with_file_name(SETTINGS_DB_FILE);
    let store = bridge_desktop::SqliteSettingsStore::new(path)
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    Ok(Arc::new(store))
}

#[cfg(not(all(feature = "desktop-shims", not(target_arch = "wasm32"))))]
async fn resolve_settings_store(config: &CoreConfig) -> Result<Arc<dyn SettingsStore>> {
    config
        .settings_store
        .clone()
        .ok_or_else(|| CoreError::CapabilityMissing {
            capability: "SettingsStore".to_string(),
            message: "No settings store provided and no platform default is available".to_string(),
        })
}
