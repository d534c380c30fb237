//! Multi-client session tests
//!
//! Drives one host from two clients and checks that both mirror the same
//! state, and that transitions reach the runtime event bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::playback::{EngineListener, MediaEngine, MediaItem};
use core_library::models::Episode;
use core_playback::{
    ConnectionState, PlaybackClient, PlaybackConfig, PlaybackSessionHost, PlaybackState,
    SessionHandle,
};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::timeout;

// ============================================================================
// In-memory Engine
// ============================================================================

#[derive(Default)]
struct MemoryEngine {
    position_ms: Arc<Mutex<u64>>,
    duration_ms: Option<u64>,
}

#[async_trait]
impl MediaEngine for MemoryEngine {
    fn set_listener(&mut self, _listener: Arc<dyn EngineListener>) {}

    async fn reset(&mut self) -> BridgeResult<()> {
        *self.position_ms.lock() = 0;
        self.duration_ms = None;
        Ok(())
    }

    async fn load(&mut self, item: &MediaItem) -> BridgeResult<()> {
        *self.position_ms.lock() = item.start_position_ms;
        self.duration_ms = item.duration_ms();
        Ok(())
    }

    async fn prepare(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    async fn play(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    async fn pause(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> BridgeResult<()> {
        *self.position_ms.lock() = position.as_millis() as u64;
        Ok(())
    }

    fn position(&self) -> Duration {
        Duration::from_millis(*self.position_ms.lock())
    }

    fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    async fn release(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn episode(id: &str) -> Episode {
    let mut episode = Episode::new(id, "pod-1", format!("Episode {}", id), format!("https://cdn/{}.mp3", id));
    episode.audio_length = 1_800;
    episode
}

async fn client(name: &str, handle: &SessionHandle) -> PlaybackClient {
    let client = PlaybackClient::new(name, PlaybackConfig::default()).unwrap();
    client.init_connection(handle.clone()).await.unwrap();
    client
}

async fn wait_for<T>(rx: &mut watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) {
    timeout(Duration::from_secs(30), rx.wait_for(predicate))
        .await
        .expect("timed out")
        .expect("sender dropped");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_clients_mirror_one_session() {
    let handle = PlaybackSessionHost::builder(Box::new(MemoryEngine::default()))
        .start()
        .unwrap();
    let ui = client("ui", &handle).await;
    let notification = client("notification", &handle).await;

    ui.play_episode(&episode("e1"), "Gimlet", 0).await.unwrap();

    let mut state = notification.playback_state();
    wait_for(&mut state, |s| *s == PlaybackState::Playing).await;
    assert_eq!(notification.current_episode().borrow().id, "e1");
    assert_eq!(notification.duration(), 1_800_000);

    // A seek from one client lands on the other without waiting for a poll.
    let mut position = notification.current_position();
    assert_eq!(ui.seek_to(90_000).await.unwrap(), 90_000);
    wait_for(&mut position, |p| *p == 90_000).await;

    notification.pause().await.unwrap();
    let mut state = ui.playback_state();
    wait_for(&mut state, |s| *s == PlaybackState::Paused).await;
}

#[tokio::test(start_paused = true)]
async fn test_session_events_reach_the_bus() {
    let bus = EventBus::new(32);
    let mut events = bus.subscribe();
    let handle = PlaybackSessionHost::builder(Box::new(MemoryEngine::default()))
        .event_bus(bus.clone())
        .start()
        .unwrap();
    let ui = client("ui", &handle).await;

    ui.play_episode(&episode("e1"), "", 0).await.unwrap();
    ui.seek_to(60_000).await.unwrap();
    ui.play_episode(&episode("e2"), "", 0).await.unwrap();

    let mut received = Vec::new();
    while let Ok(Ok(CoreEvent::Playback(event))) =
        timeout(Duration::from_millis(100), events.recv()).await
    {
        received.push(event);
    }

    assert!(matches!(
        &received[0],
        PlaybackEvent::Started { episode_id, .. } if episode_id == "e1"
    ));
    assert!(received.contains(&PlaybackEvent::Seeked {
        episode_id: "e1".to_string(),
        position_ms: 60_000,
    }));
    assert!(received.contains(&PlaybackEvent::Stopped {
        episode_id: "e1".to_string(),
        position_ms: 60_000,
        duration_ms: 1_800_000,
    }));
    assert!(matches!(
        received.last(),
        Some(PlaybackEvent::Started { episode_id, .. }) if episode_id == "e2"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_client_is_disconnected() {
    let handle = PlaybackSessionHost::builder(Box::new(MemoryEngine::default()))
        .start()
        .unwrap();
    let ui = client("ui", &handle).await;
    let notification = client("notification", &handle).await;
    assert_eq!(handle.client_count(), 2);

    drop(notification);

    let mut count = handle.watch_client_count();
    wait_for(&mut count, |c| *c == 1).await;
    assert_eq!(*ui.connection_state().borrow(), ConnectionState::Connected);
}
