//! Reference-counted ownership of the playback session host.
//!
//! The first [`acquire`](PlaybackLifecycle::acquire) starts a host, later
//! ones share its handle, and the last [`release`](PlaybackLifecycle::release)
//! shuts it down.

use std::sync::Arc;

use bridge_traits::playback::MediaEngine;
use core_playback::{
    ConnectionError, ConnectionPolicy, PlaybackConfig, PlaybackError, PlaybackSessionHost,
    SessionHandle,
};
use core_runtime::events::EventBus;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;

/// Builds a fresh platform engine for every host start.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn MediaEngine> + Send + Sync>;

#[derive(Default)]
struct Running {
    handle: Option<SessionHandle>,
    holders: usize,
    closed: bool,
}

pub struct PlaybackLifecycle {
    engine_factory: EngineFactory,
    config: PlaybackConfig,
    event_bus: EventBus,
    policy: Option<Arc<dyn ConnectionPolicy>>,
    running: Mutex<Running>,
}

impl PlaybackLifecycle {
    pub fn new(engine_factory: EngineFactory, config: PlaybackConfig, event_bus: EventBus) -> Self {
        Self {
            engine_factory,
            config,
            event_bus,
            policy: None,
            running: Mutex::new(Running::default()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ConnectionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Register a holder and return the shared handle, starting the host if
    /// needed.
    pub async fn acquire(&self) -> Result<SessionHandle> {
        let mut running = self.running.lock().await;
        let handle = self.live_handle(&mut running)?;
        running.holders += 1;
        debug!(holders = running.holders, "Playback host acquired");
        Ok(handle)
    }

    /// Handle of the running host, restarting it if it went away, without
    /// registering a new holder.
    pub async fn current(&self) -> Result<SessionHandle> {
        let mut running = self.running.lock().await;
        self.live_handle(&mut running)
    }

    /// Drop a holder; the last one stops the host.
    pub async fn release(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        running.holders = running.holders.saturating_sub(1);
        debug!(holders = running.holders, "Playback host released");

        if running.holders == 0 {
            if let Some(handle) = running.handle.take() {
                handle.shutdown().await?;
                info!(session_id = %handle.session_id(), "Playback host stopped");
            }
        }
        Ok(())
    }

    /// Stop the host regardless of outstanding holders. Later `acquire` and
    /// `current` calls fail with `HostUnavailable`.
    pub async fn shutdown(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        running.closed = true;
        running.holders = 0;
        if let Some(handle) = running.handle.take() {
            handle.shutdown().await?;
            info!(session_id = %handle.session_id(), "Playback host shut down");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .handle
            .as_ref()
            .is_some_and(SessionHandle::is_alive)
    }

    pub async fn holders(&self) -> usize {
        self.running.lock().await.holders
    }

    fn live_handle(&self, running: &mut Running) -> Result<SessionHandle> {
        if running.closed {
            return Err(PlaybackError::from(ConnectionError::HostUnavailable).into());
        }
        if let Some(handle) = running.handle.as_ref().filter(|h| h.is_alive()) {
            return Ok(handle.clone());
        }

        let mut builder = PlaybackSessionHost::builder((self.engine_factory)())
            .config(self.config.clone())
            .event_bus(self.event_bus.clone());
        if let Some(policy) = &self.policy {
            builder = builder.policy(Arc::clone(policy));
        }

        let handle = builder.start()?;
        running.handle = Some(handle.clone());
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_playback::testing::ScriptedEngine;

    fn lifecycle(engine: &ScriptedEngine) -> PlaybackLifecycle {
        let engine = engine.clone();
        PlaybackLifecycle::new(
            Arc::new(move || Box::new(engine.clone()) as Box<dyn MediaEngine>),
            PlaybackConfig::default(),
            EventBus::new(16),
        )
    }

    #[tokio::test]
    async fn test_holders_share_one_host() {
        let engine = ScriptedEngine::new();
        let lifecycle = lifecycle(&engine);

        let first = lifecycle.acquire().await.unwrap();
        let second = lifecycle.acquire().await.unwrap();
        assert_eq!(first.session_id(), second.session_id());
        assert_eq!(lifecycle.holders().await, 2);

        lifecycle.release().await.unwrap();
        assert!(lifecycle.is_running().await);

        lifecycle.release().await.unwrap();
        assert!(!lifecycle.is_running().await);
        assert!(!first.is_alive());
        assert!(engine.calls().contains(&"release".to_string()));
    }

    #[tokio::test]
    async fn test_acquire_after_stop_starts_new_host() {
        let lifecycle = lifecycle(&ScriptedEngine::new());

        let first = lifecycle.acquire().await.unwrap();
        lifecycle.release().await.unwrap();
        let second = lifecycle.acquire().await.unwrap();

        assert_ne!(first.session_id(), second.session_id());
        assert!(second.is_alive());
    }

    #[tokio::test]
    async fn test_current_restarts_dead_host_without_new_holder() {
        let lifecycle = lifecycle(&ScriptedEngine::new());

        let first = lifecycle.acquire().await.unwrap();
        first.shutdown().await.unwrap();

        let replacement = lifecycle.current().await.unwrap();
        assert_ne!(first.session_id(), replacement.session_id());
        assert_eq!(lifecycle.holders().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_host_for_good() {
        let lifecycle = lifecycle(&ScriptedEngine::new());

        let handle = lifecycle.acquire().await.unwrap();
        lifecycle.acquire().await.unwrap();
        lifecycle.shutdown().await.unwrap();

        assert!(!handle.is_alive());
        assert!(!lifecycle.is_running().await);
        assert!(lifecycle.acquire().await.is_err());
        assert!(lifecycle.current().await.is_err());
    }
}
