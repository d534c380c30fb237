//! # Player Controller
//!
//! A [`PlaybackClient`] bound to the shared playback host.
//!
//! ## Overview
//!
//! The controller holds one lifecycle reference while connected, resolves
//! episodes through the [`PlayerRepository`], resumes them from their stored
//! position and reconnects on its own when the host goes away.

use std::sync::{Arc, Weak};

use core_library::LibraryStore;
use core_playback::{ConnectionState, PlaybackClient};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{CoreError, Result};
use crate::lifecycle::PlaybackLifecycle;
use crate::player_repository::PlayerRepository;

struct Inner {
    client: PlaybackClient,
    lifecycle: Arc<PlaybackLifecycle>,
    player: Arc<dyn PlayerRepository>,
    store: LibraryStore,
    resume_playback: bool,
    /// Set while holding a lifecycle reference. Held across connect and
    /// disconnect so each takes or gives back at most one reference.
    watcher: Mutex<Option<CancellationToken>>,
}

#[derive(Clone)]
pub struct PlayerController {
    inner: Arc<Inner>,
}

impl PlayerController {
    pub fn new(
        name: impl Into<String>,
        lifecycle: Arc<PlaybackLifecycle>,
        player: Arc<dyn PlayerRepository>,
        store: LibraryStore,
        resume_playback: bool,
    ) -> Result<Self> {
        let client = PlaybackClient::new(name, lifecycle.config().clone())?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                lifecycle,
                player,
                store,
                resume_playback,
                watcher: Mutex::new(None),
            }),
        })
    }

    /// Client streams: current episode, state, position, connection.
    pub fn client(&self) -> &PlaybackClient {
        &self.inner.client
    }

    /// Acquire the host and connect. No-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut watcher = self.inner.watcher.lock().await;
        if watcher.is_some() {
            if !self.inner.client.is_connected() {
                self.inner.reconnect().await?;
            }
            return Ok(());
        }

        let handle = self.inner.lifecycle.acquire().await?;
        if let Err(e) = self.inner.client.init_connection(handle).await {
            self.inner.lifecycle.release().await?;
            return Err(e.into());
        }

        let token = CancellationToken::new();
        *watcher = Some(token.clone());
        tokio::spawn(watch_connection(Arc::downgrade(&self.inner), token));
        Ok(())
    }

    /// Disconnect and give the lifecycle reference back. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        let mut watcher = self.inner.watcher.lock().await;
        let Some(token) = watcher.take() else {
            return Ok(());
        };
        token.cancel();
        self.inner.client.close().await;
        self.inner.lifecycle.release().await
    }

    /// Play a cached episode, resuming from its stored position.
    #[instrument(skip(self))]
    pub async fn play_episode_by_id(&self, episode_id: &str) -> Result<()> {
        self.connect().await?;
        let (episode, publisher, start) = self.inner.resolve(episode_id).await?;
        self.inner
            .client
            .play_episode(&episode, &publisher, start)
            .await?;
        Ok(())
    }

    /// Load the last played episode, paused at its stored position.
    ///
    /// Returns `false` when no episode was played before or it is no longer
    /// cached.
    pub async fn restore_last_episode(&self) -> Result<bool> {
        let Some(episode_id) = self.inner.player.last_episode_id().next().await.flatten() else {
            return Ok(false);
        };

        let (episode, publisher, start) = match self.inner.resolve(&episode_id).await {
            Ok(resolved) => resolved,
            Err(CoreError::NotFound { .. }) => {
                warn!(episode_id, "Last episode is no longer cached");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.connect().await?;
        self.inner
            .client
            .load_episode(&episode, &publisher, start)
            .await?;
        info!(episode_id, start_position_ms = start, "Last episode restored");
        Ok(true)
    }

    /// Reconnect to the running host, restarting it if it went away.
    pub async fn reconnect(&self) -> Result<()> {
        self.inner.reconnect().await
    }
}

impl Inner {
    async fn resolve(
        &self,
        episode_id: &str,
    ) -> Result<(core_library::Episode, String, u64)> {
        let episode = self
            .player
            .get_episode(episode_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Episode", episode_id))?;

        let publisher = self
            .store
            .podcast(&episode.podcast_id)
            .await?
            .map(|podcast| podcast.publisher)
            .unwrap_or_default();

        let start = if self.resume_playback {
            self.player
                .get_episode_position(episode_id)
                .await?
                .unwrap_or(0)
        } else {
            0
        };

        Ok((episode, publisher, start))
    }

    async fn reconnect(&self) -> Result<()> {
        let handle = self.lifecycle.current().await?;
        self.client.init_connection(handle).await?;
        info!("Player reconnected to playback host");
        Ok(())
    }
}

async fn watch_connection(inner: Weak<Inner>, token: CancellationToken) {
    let Some(mut state) = inner.upgrade().map(|inner| inner.client.connection_state()) else {
        return;
    };

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            changed = state.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        if *state.borrow_and_update() != ConnectionState::Reconnecting {
            continue;
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if let Err(e) = inner.reconnect().await {
            warn!(error = %e, "Reconnect to playback host failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player_repository::StorePlayerRepository;
    use bridge_desktop::SqliteSettingsStore;
    use bridge_traits::playback::MediaEngine;
    use bridge_traits::SystemClock;
    use core_library::models::{Episode, EpisodeProgress, Podcast};
    use core_playback::testing::ScriptedEngine;
    use core_playback::{PlaybackConfig, PlaybackState};
    use core_runtime::events::EventBus;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Fixture {
        engine: ScriptedEngine,
        lifecycle: Arc<PlaybackLifecycle>,
        store: LibraryStore,
        controller: PlayerController,
    }

    async fn fixture(resume_playback: bool) -> Fixture {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let store = LibraryStore::in_memory(settings).await.unwrap();

        let mut podcast = Podcast::new("p1", "Show");
        podcast.publisher = "Gimlet".to_string();
        store.upsert_podcast(&podcast).await.unwrap();
        let mut episode = Episode::new("e1", "p1", "Pilot", "https://cdn/e1.mp3");
        episode.audio_length = 600;
        store.upsert_episodes(&[episode]).await.unwrap();

        let engine = ScriptedEngine::new();
        let factory_engine = engine.clone();
        let lifecycle = Arc::new(PlaybackLifecycle::new(
            Arc::new(move || Box::new(factory_engine.clone()) as Box<dyn MediaEngine>),
            PlaybackConfig::default(),
            EventBus::new(16),
        ));
        let player = Arc::new(StorePlayerRepository::new(store.clone(), Arc::new(SystemClock)));
        let controller = PlayerController::new(
            "ui",
            Arc::clone(&lifecycle),
            player,
            store.clone(),
            resume_playback,
        )
        .unwrap();

        Fixture {
            engine,
            lifecycle,
            store,
            controller,
        }
    }

    #[tokio::test]
    async fn test_play_by_id_resumes_from_stored_position() {
        let f = fixture(true).await;
        f.store
            .save_progress(&EpisodeProgress::new("e1", 42_000))
            .await
            .unwrap();

        f.controller.play_episode_by_id("e1").await.unwrap();

        let client = f.controller.client();
        let mut state = client.playback_state();
        timeout(Duration::from_secs(5), state.wait_for(|s| *s == PlaybackState::Playing))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(client.current_episode().borrow().publisher, "Gimlet");
        assert_eq!(*client.current_position().borrow(), 42_000);
    }

    #[tokio::test]
    async fn test_resume_disabled_starts_at_zero() {
        let f = fixture(false).await;
        f.store
            .save_progress(&EpisodeProgress::new("e1", 42_000))
            .await
            .unwrap();

        f.controller.play_episode_by_id("e1").await.unwrap();
        let snapshot = f
            .controller
            .client()
            .session_handle()
            .unwrap()
            .snapshot()
            .await
            .unwrap();
        assert_eq!(snapshot.position_ms, 0);
    }

    #[tokio::test]
    async fn test_unknown_episode_is_not_found() {
        let f = fixture(true).await;
        let error = f.controller.play_episode_by_id("missing").await.unwrap_err();
        assert!(matches!(error, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_restore_last_episode_loads_paused() {
        let f = fixture(true).await;
        assert!(!f.controller.restore_last_episode().await.unwrap());

        f.store.set_last_episode_id("e1").await.unwrap();
        assert!(f.controller.restore_last_episode().await.unwrap());

        let snapshot = f
            .controller
            .client()
            .session_handle()
            .unwrap()
            .snapshot()
            .await
            .unwrap();
        assert_eq!(snapshot.state, PlaybackState::Paused);
        assert!(!f.engine.calls().contains(&"play".to_string()));
    }

    #[tokio::test]
    async fn test_reconnects_after_host_loss() {
        let f = fixture(true).await;
        f.controller.connect().await.unwrap();
        let first = f.controller.client().session_handle().unwrap();

        first.shutdown().await.unwrap();

        let second = timeout(Duration::from_secs(5), async {
            loop {
                match f.controller.client().session_handle() {
                    Some(handle) if handle.session_id() != first.session_id() => break handle,
                    _ => tokio::task::yield_now().await,
                }
            }
        })
        .await
        .unwrap();
        assert!(second.is_alive());
        assert_eq!(f.lifecycle.holders().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_releases_host() {
        let f = fixture(true).await;
        f.controller.connect().await.unwrap();
        f.controller.connect().await.unwrap();
        assert_eq!(f.lifecycle.holders().await, 1);

        f.controller.disconnect().await.unwrap();
        f.controller.disconnect().await.unwrap();
        assert!(!f.lifecycle.is_running().await);
    }

    #[tokio::test]
    async fn test_concurrent_connects_take_one_reference() {
        let f = fixture(true).await;
        let (first, second) = tokio::join!(f.controller.connect(), f.controller.connect());
        first.unwrap();
        second.unwrap();
        assert_eq!(f.lifecycle.holders().await, 1);

        f.controller.disconnect().await.unwrap();
        assert_eq!(f.lifecycle.holders().await, 0);
        assert!(!f.lifecycle.is_running().await);
    }

    #[tokio::test]
    async fn test_invalid_playback_config_is_rejected() {
        let f = fixture(true).await;
        let lifecycle = Arc::new(PlaybackLifecycle::new(
            Arc::new(|| Box::new(ScriptedEngine::new()) as Box<dyn MediaEngine>),
            PlaybackConfig::default().with_position_poll_interval(Duration::ZERO),
            EventBus::new(16),
        ));
        let player = Arc::new(StorePlayerRepository::new(f.store.clone(), Arc::new(SystemClock)));

        let result = PlayerController::new("ui", lifecycle, player, f.store.clone(), true);
        assert!(matches!(
            result,
            Err(CoreError::Playback(core_playback::PlaybackError::Config(_)))
        ));
    }
}
