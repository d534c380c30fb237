//! # Playback Client Adapter
//!
//! Bridges one consumer (a UI, a notification) to the playback session host.
//!
//! ## Overview
//!
//! [`PlaybackClient`] mirrors the host state into `watch` channels that
//! replay their current value to new subscribers:
//!
//! - [`current_episode`](PlaybackClient::current_episode)
//! - [`playback_state`](PlaybackClient::playback_state)
//! - [`current_position`](PlaybackClient::current_position)
//! - [`connection_state`](PlaybackClient::connection_state)
//!
//! While the host is `Playing`, one polling loop samples the host position
//! every `position_poll_interval`. Every state transition and position jump
//! bumps a generation counter under the poll lock, and a loop publishes only
//! while its generation is current, so a stale sample is never published
//! after the state moved on.
//!
//! If the host goes away the client stops polling and reports
//! [`ConnectionState::Reconnecting`]; the owner reconnects with
//! [`init_connection`](PlaybackClient::init_connection) and a fresh handle.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use core_library::models::Episode;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PlaybackConfig;
use crate::episode::{media_item_for, CurrentEpisode};
use crate::error::{ConnectionError, PlaybackError, Result};
use crate::host::SessionHandle;
use crate::state::{
    clamp_position, ConnectionState, HostEvent, PlaybackSnapshot, PlaybackState, PositionSample,
    UNKNOWN_DURATION,
};

#[derive(Clone)]
struct Link {
    handle: SessionHandle,
    client_id: Uuid,
    /// Cancels the event forwarding task
    events: CancellationToken,
}

#[derive(Default)]
struct PollGuard {
    generation: u64,
    token: Option<CancellationToken>,
}

impl PollGuard {
    fn is_running(&self) -> bool {
        self.token.is_some()
    }

    /// Invalidate the running loop, if any.
    fn stop(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

struct Inner {
    name: String,
    config: PlaybackConfig,
    episode: watch::Sender<CurrentEpisode>,
    state: watch::Sender<PlaybackState>,
    position: watch::Sender<u64>,
    connection: watch::Sender<ConnectionState>,
    duration: AtomicU64,
    link: Mutex<Option<Link>>,
    poll: Mutex<PollGuard>,
}

/// Client-side view of the playback session.
#[derive(Clone)]
pub struct PlaybackClient {
    inner: Arc<Inner>,
}

impl PlaybackClient {
    /// # Errors
    ///
    /// `PlaybackError::Config` when `config` is invalid, e.g. a zero poll
    /// interval.
    pub fn new(name: impl Into<String>, config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                episode: watch::Sender::new(CurrentEpisode::empty()),
                state: watch::Sender::new(PlaybackState::Idle),
                position: watch::Sender::new(0),
                connection: watch::Sender::new(ConnectionState::Disconnected),
                duration: AtomicU64::new(UNKNOWN_DURATION),
                link: Mutex::new(None),
                poll: Mutex::new(PollGuard::default()),
            }),
        })
    }

    // ========================================================================
    // Streams
    // ========================================================================

    pub fn current_episode(&self) -> watch::Receiver<CurrentEpisode> {
        self.inner.episode.subscribe()
    }

    pub fn playback_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state.subscribe()
    }

    /// Position in milliseconds, never above [`duration`](Self::duration).
    pub fn current_position(&self) -> watch::Receiver<u64> {
        self.inner.position.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// Duration of the loaded item; [`UNKNOWN_DURATION`] while not connected
    /// or unknown.
    pub fn duration(&self) -> u64 {
        self.inner.duration.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.lock().is_some()
    }

    /// Handle of the host this client is connected to.
    pub fn session_handle(&self) -> Option<SessionHandle> {
        self.inner.link.lock().as_ref().map(|link| link.handle.clone())
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Connect to the host behind `handle` and mirror its state.
    ///
    /// An existing connection is closed first.
    pub async fn init_connection(&self, handle: SessionHandle) -> Result<()> {
        if self.is_connected() {
            self.close().await;
        }

        let connection = handle.connect(self.inner.name.clone()).await?;
        let token = CancellationToken::new();

        *self.inner.link.lock() = Some(Link {
            handle,
            client_id: connection.client_id,
            events: token.clone(),
        });
        self.inner.seed(&connection.snapshot);
        publish(&self.inner.connection, ConnectionState::Connected);

        tokio::spawn(forward_events(
            Arc::downgrade(&self.inner),
            connection.client_id,
            connection.events,
            token,
        ));

        info!(
            client = %self.inner.name,
            session_id = %connection.session_id,
            state = ?connection.snapshot.state,
            "Playback client connected"
        );
        Ok(())
    }

    /// Stop polling and event forwarding, then disconnect. Idempotent.
    pub async fn close(&self) {
        let link = self.inner.link.lock().take();
        self.inner.poll.lock().stop();
        self.inner.duration.store(UNKNOWN_DURATION, Ordering::Release);
        publish(&self.inner.connection, ConnectionState::Disconnected);

        if let Some(link) = link {
            link.events.cancel();
            if let Err(e) = link.handle.disconnect(link.client_id).await {
                debug!(error = %e, "Disconnect from stopped host ignored");
            }
            info!(client = %self.inner.name, "Playback client closed");
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Load `episode` and start playing it from `start_position_ms`.
    ///
    /// `Paused` is published before the host confirms the load; a failed
    /// load rolls the state back to `Error`.
    pub async fn play_episode(
        &self,
        episode: &Episode,
        publisher: &str,
        start_position_ms: u64,
    ) -> Result<()> {
        self.load_episode(episode, publisher, start_position_ms)
            .await?;
        self.play().await
    }

    /// Load `episode` without starting playback.
    pub async fn load_episode(
        &self,
        episode: &Episode,
        publisher: &str,
        start_position_ms: u64,
    ) -> Result<()> {
        let item = media_item_for(episode, publisher, start_position_ms)?;
        let link = self.inner.require_link("load_episode")?;

        info!(episode_id = %episode.id, start_position_ms, "Loading episode");
        self.inner.duration.store(
            item.duration_ms().unwrap_or(UNKNOWN_DURATION),
            Ordering::Release,
        );
        self.inner.set_state(PlaybackState::Paused);

        if let Err(e) = link.handle.set_media(item).await {
            if e.is_host_unavailable() {
                self.inner.host_lost(link.client_id);
            } else {
                self.inner.set_state(PlaybackState::Error);
            }
            error!(episode_id = %episode.id, error = %e, "Failed to load episode");
            return Err(e);
        }
        Ok(())
    }

    pub async fn play(&self) -> Result<()> {
        self.command("play", |handle| async move { handle.play().await })
            .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.command("pause", |handle| async move { handle.pause().await })
            .await
    }

    /// Seek to `position_ms`, clamped into `[0, duration]`.
    ///
    /// The clamped position is published before the host confirms it.
    pub async fn seek_to(&self, position_ms: i64) -> Result<u64> {
        let link = self.inner.require_link("seek_to")?;

        let target = clamp_position(position_ms, self.duration());
        self.inner.jump_to(target);

        let applied = self
            .forward(link, |handle| async move { handle.seek(position_ms).await })
            .await?;
        if applied != target {
            self.inner.jump_to(applied);
        }
        Ok(applied)
    }

    pub async fn skip_forward(&self) -> Result<u64> {
        let current = self.host_position().await?;
        self.seek_to(current.saturating_add(self.inner.config.skip_forward_ms()))
            .await
    }

    pub async fn skip_backward(&self) -> Result<u64> {
        let current = self.host_position().await?;
        self.seek_to(current.saturating_sub(self.inner.config.skip_backward_ms()))
            .await
    }

    async fn host_position(&self) -> Result<i64> {
        let sample: PositionSample = self
            .command("position", |handle| async move { handle.position().await })
            .await?;
        Ok(i64::try_from(sample.position_ms).unwrap_or(i64::MAX))
    }

    async fn command<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let link = self.inner.require_link(operation)?;
        self.forward(link, call).await
    }

    async fn forward<T, F, Fut>(&self, link: Link, call: F) -> Result<T>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = call(link.handle.clone()).await;
        if let Err(e) = &result {
            if e.is_host_unavailable() {
                self.inner.host_lost(link.client_id);
            }
        }
        result
    }
}

impl Inner {
    fn require_link(&self, operation: &str) -> Result<Link> {
        match self.link.lock().as_ref() {
            Some(link) => Ok(link.clone()),
            None => {
                let reason = ConnectionError::NotConnected;
                error!(client = %self.name, operation, "{}", reason);
                Err(PlaybackError::invalid(format!("{}: {}", operation, reason)))
            }
        }
    }

    fn seed(self: &Arc<Self>, snapshot: &PlaybackSnapshot) {
        self.duration.store(snapshot.duration_ms, Ordering::Release);
        publish(
            &self.episode,
            CurrentEpisode::from_metadata(snapshot.metadata.as_ref()),
        );
        self.jump_to(snapshot.position_ms);
        self.set_state(snapshot.state);
    }

    fn apply(self: &Arc<Self>, event: HostEvent) {
        match event {
            HostEvent::StateChanged(state) => self.set_state(state),
            HostEvent::ItemChanged {
                loaded,
                metadata,
                position_ms,
                duration_ms,
            } => {
                self.duration.store(duration_ms, Ordering::Release);
                let episode = if loaded {
                    CurrentEpisode::from_metadata(metadata.as_ref())
                } else {
                    CurrentEpisode::empty()
                };
                publish(&self.episode, episode);
                self.jump_to(position_ms);
            }
            HostEvent::PositionDiscontinuity {
                position_ms,
                duration_ms,
            } => {
                self.duration.store(duration_ms, Ordering::Release);
                self.jump_to(position_ms);
            }
        }
    }

    /// Publish `state` and start or stop polling in the same critical
    /// section.
    fn set_state(self: &Arc<Self>, state: PlaybackState) {
        let mut poll = self.poll.lock();
        if state.is_playing() {
            if !poll.is_running() {
                self.start_polling(&mut poll);
            }
        } else {
            poll.stop();
        }
        publish(&self.state, state);
    }

    /// Publish a discontinuous position and drop any in-flight sample.
    fn jump_to(self: &Arc<Self>, position_ms: u64) {
        let mut poll = self.poll.lock();
        poll.stop();
        publish(&self.position, position_ms);
        if self.state.borrow().is_playing() {
            self.start_polling(&mut poll);
        }
    }

    fn start_polling(self: &Arc<Self>, poll: &mut PollGuard) {
        poll.stop();
        let token = CancellationToken::new();
        poll.token = Some(token.clone());

        debug!(client = %self.name, generation = poll.generation, "Position polling started");
        tokio::spawn(poll_position(
            Arc::downgrade(self),
            poll.generation,
            token,
            self.config.position_poll_interval,
        ));
    }

    fn publish_sample(&self, generation: u64, sample: PositionSample) {
        let poll = self.poll.lock();
        if poll.generation != generation {
            return;
        }
        if sample.duration_ms != UNKNOWN_DURATION {
            self.duration.store(sample.duration_ms, Ordering::Release);
        }
        if sample.position_ms <= sample.duration_ms {
            publish(&self.position, sample.position_ms);
        }
    }

    /// Drop the link to a host that went away.
    fn host_lost(&self, client_id: Uuid) {
        let link = {
            let mut link = self.link.lock();
            match link.as_ref() {
                Some(current) if current.client_id == client_id => link.take(),
                _ => None,
            }
        };
        let Some(link) = link else {
            return;
        };

        link.events.cancel();
        self.poll.lock().stop();
        self.duration.store(UNKNOWN_DURATION, Ordering::Release);
        publish(&self.connection, ConnectionState::Reconnecting);
        warn!(client = %self.name, session_id = %link.handle.session_id(), "Playback host lost");
    }

    async fn resync(self: &Arc<Self>, client_id: Uuid) {
        let Some(link) = self.link.lock().clone() else {
            return;
        };
        match link.handle.snapshot().await {
            Ok(snapshot) => self.seed(&snapshot),
            Err(e) => {
                warn!(error = %e, "Resync after lag failed");
                if e.is_host_unavailable() {
                    self.host_lost(client_id);
                }
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.poll.get_mut().stop();
        if let Some(link) = self.link.get_mut().take() {
            link.events.cancel();
            link.handle.disconnect_detached(link.client_id);
        }
    }
}

/// Publish `value` unless it equals the current one.
fn publish<T: PartialEq>(sender: &watch::Sender<T>, value: T) {
    sender.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

async fn forward_events(
    inner: Weak<Inner>,
    client_id: Uuid,
    mut events: broadcast::Receiver<HostEvent>,
    token: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            received = events.recv() => received,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };

        match received {
            Ok(event) => inner.apply(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(client = %inner.name, skipped, "Host events lagged, resyncing");
                inner.resync(client_id).await;
            }
            Err(broadcast::error::RecvError::Closed) => {
                inner.host_lost(client_id);
                return;
            }
        }
    }
}

async fn poll_position(
    inner: Weak<Inner>,
    generation: u64,
    token: CancellationToken,
    period: std::time::Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let link = match inner.upgrade() {
            Some(inner) => inner.link.lock().clone(),
            None => return,
        };
        let Some(link) = link else {
            return;
        };

        let sample = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            sample = link.handle.position() => sample,
        };

        let Some(inner) = inner.upgrade() else {
            return;
        };
        match sample {
            Ok(sample) => inner.publish_sample(generation, sample),
            Err(e) if e.is_host_unavailable() => {
                inner.host_lost(link.client_id);
                return;
            }
            Err(e) => debug!(error = %e, "Position sample failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PlaybackSessionHost;
    use crate::testing::ScriptedEngine;
    use bridge_traits::playback::EngineEvent;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn episode(id: &str, audio_length: i64) -> Episode {
        let mut episode = Episode::new(id, "pod-1", format!("Episode {}", id), format!("https://cdn/{}.mp3", id));
        episode.audio_length = audio_length;
        episode
    }

    fn start(engine: &ScriptedEngine) -> SessionHandle {
        PlaybackSessionHost::builder(Box::new(engine.clone()))
            .start()
            .unwrap()
    }

    async fn connected(handle: &SessionHandle) -> PlaybackClient {
        let client = PlaybackClient::new("test", PlaybackConfig::default()).unwrap();
        client.init_connection(handle.clone()).await.unwrap();
        client
    }

    async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        timeout(Duration::from_secs(30), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for value")
            .expect("sender dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_before_connection_fails_fast() {
        let client = PlaybackClient::new("test", PlaybackConfig::default()).unwrap();

        assert!(matches!(
            client.play().await,
            Err(PlaybackError::InvalidCommand(_))
        ));
        assert!(matches!(
            client.seek_to(10).await,
            Err(PlaybackError::InvalidCommand(_))
        ));
        assert_eq!(client.duration(), UNKNOWN_DURATION);
        assert_eq!(
            *client.connection_state().borrow(),
            ConnectionState::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_scenario_clamps_and_publishes() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;

        client.play_episode(&episode("e1", 600), "", 0).await.unwrap();
        client.pause().await.unwrap();

        assert_eq!(client.seek_to(-500).await.unwrap(), 0);
        assert_eq!(*client.current_position().borrow(), 0);

        assert_eq!(client.seek_to(999_999).await.unwrap(), 600_000);
        assert_eq!(*client.current_position().borrow(), 600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_paused_then_playing() {
        let engine = ScriptedEngine::new();
        engine.hold_loads();
        let handle = start(&engine);
        let client = connected(&handle).await;
        let mut state = client.playback_state();

        let playing = {
            let client = client.clone();
            tokio::spawn(async move { client.play_episode(&episode("e1", 600), "Gimlet", 0).await })
        };

        wait_for(&mut state, |s| *s == PlaybackState::Paused).await;
        assert!(!playing.is_finished());

        engine.release_load();
        playing.await.unwrap().unwrap();
        wait_for(&mut state, |s| *s == PlaybackState::Playing).await;

        let current = client.current_episode().borrow().clone();
        assert_eq!(current.id, "e1");
        assert_eq!(current.publisher, "Gimlet");
        assert_eq!(client.duration(), 600_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_rolls_back_and_new_episode_recovers() {
        let engine = ScriptedEngine::new();
        engine.fail_next_load(2004, "source error");
        let handle = start(&engine);
        let client = connected(&handle).await;

        let error = client
            .play_episode(&episode("bad", 600), "", 0)
            .await
            .unwrap_err();
        assert_eq!(error.engine_code(), Some(2004));
        assert_eq!(*client.playback_state().borrow(), PlaybackState::Error);

        client.play_episode(&episode("good", 600), "", 0).await.unwrap();
        let mut state = client.playback_state();
        wait_for(&mut state, |s| *s == PlaybackState::Playing).await;
        assert_eq!(client.current_episode().borrow().id, "good");
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_pause_idempotent_through_client() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;

        client.play_episode(&episode("e1", 600), "", 0).await.unwrap();
        client.play().await.unwrap();
        client.pause().await.unwrap();
        client.pause().await.unwrap();

        let plays = engine.calls().iter().filter(|c| *c == "play").count();
        let pauses = engine.calls().iter().filter(|c| *c == "pause").count();
        assert_eq!((plays, pauses), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_resyncs_from_snapshot() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let first = connected(&handle).await;
        first
            .play_episode(&episode("e1", 600), "Gimlet", 42_000)
            .await
            .unwrap();

        let late = connected(&handle).await;
        assert_eq!(*late.playback_state().borrow(), PlaybackState::Playing);
        assert_eq!(late.current_episode().borrow().id, "e1");
        assert_eq!(*late.current_position().borrow(), 42_000);
        assert_eq!(late.duration(), 600_000);
        assert_eq!(handle.client_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_polling_loop_while_playing() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;

        client.play_episode(&episode("e1", 600), "", 0).await.unwrap();
        // Repeated transitions into Playing must not stack loops.
        client.pause().await.unwrap();
        client.play().await.unwrap();
        client.play().await.unwrap();
        client.seek_to(1_000).await.unwrap();
        sleep(Duration::from_millis(10)).await;

        let before = engine.position_reads();
        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(engine.position_reads() - before, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_publishes_host_position() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;
        let mut position = client.current_position();

        client.play_episode(&episode("e1", 600), "", 0).await.unwrap();
        engine.set_position(5_000);
        wait_for(&mut position, |p| *p == 5_000).await;

        client.pause().await.unwrap();
        engine.set_position(9_000);
        sleep(Duration::from_secs(3)).await;
        assert_eq!(*client.current_position().borrow(), 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_clears_episode() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;
        let mut state = client.playback_state();

        client.play_episode(&episode("e1", 600), "", 0).await.unwrap();
        engine.fire(EngineEvent::Completed);

        wait_for(&mut state, |s| *s == PlaybackState::Idle).await;
        assert!(client.current_episode().borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_shutdown_moves_to_reconnecting() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;
        let mut connection = client.connection_state();

        client.play_episode(&episode("e1", 600), "", 0).await.unwrap();
        handle.shutdown().await.unwrap();

        wait_for(&mut connection, |c| *c == ConnectionState::Reconnecting).await;
        assert_eq!(client.duration(), UNKNOWN_DURATION);
        assert!(matches!(
            client.play().await,
            Err(PlaybackError::InvalidCommand(_))
        ));

        let fresh = start(&ScriptedEngine::new());
        client.init_connection(fresh).await.unwrap();
        assert_eq!(*client.connection_state().borrow(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_disconnects() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;
        assert_eq!(handle.client_count(), 1);

        client.close().await;
        client.close().await;

        assert_eq!(handle.client_count(), 0);
        assert!(!client.is_connected());
        assert_eq!(
            *client.connection_state().borrow(),
            ConnectionState::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_is_rejected() {
        let config = PlaybackConfig::default().with_position_poll_interval(Duration::ZERO);
        assert!(matches!(
            PlaybackClient::new("test", config),
            Err(PlaybackError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_error_while_playing_stops_polling() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;
        let mut state = client.playback_state();

        client.play_episode(&episode("e1", 600), "", 0).await.unwrap();
        wait_for(&mut state, |s| *s == PlaybackState::Playing).await;

        engine.fire(EngineEvent::Error {
            code: 2001,
            message: "network lost".to_string(),
        });
        wait_for(&mut state, |s| *s == PlaybackState::Error).await;
        sleep(Duration::from_millis(10)).await;

        let before = engine.position_reads();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(engine.position_reads(), before);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bare_uri_item_publishes_empty_episode() {
        let engine = ScriptedEngine::new();
        let handle = start(&engine);
        let client = connected(&handle).await;
        let mut current = client.current_episode();

        client.load_episode(&episode("e1", 600), "Gimlet", 0).await.unwrap();
        wait_for(&mut current, |e| e.id == "e1").await;

        handle
            .set_media(bridge_traits::playback::MediaItem::new("https://cdn/bare.mp3"))
            .await
            .unwrap();

        wait_for(&mut current, CurrentEpisode::is_empty).await;
        assert_eq!(*client.playback_state().borrow(), PlaybackState::Paused);
        assert_eq!(client.duration(), UNKNOWN_DURATION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagged_events_resync_from_snapshot() {
        let engine = ScriptedEngine::new();
        let handle = PlaybackSessionHost::builder(Box::new(engine.clone()))
            .config(PlaybackConfig::default().with_channel_capacities(32, 1))
            .start()
            .unwrap();
        let client = connected(&handle).await;
        let mut current = client.current_episode();

        // One load publishes ItemChanged then StateChanged, overflowing the
        // single-slot channel before the client reads either.
        let item = media_item_for(&episode("e1", 600), "Gimlet", 42_000).unwrap();
        handle.set_media(item).await.unwrap();

        wait_for(&mut current, |e| e.id == "e1").await;
        assert_eq!(*client.playback_state().borrow(), PlaybackState::Paused);
        assert_eq!(*client.current_position().borrow(), 42_000);
        assert_eq!(client.duration(), 600_000);
        assert!(client.is_connected());
    }
}
