//! Player-side persistence: episodes to play, resume positions and the last
//! played episode.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_library::models::{Episode, EpisodeProgress};
use core_library::LibraryStore;
use core_playback::UNKNOWN_DURATION;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use futures::stream::BoxStream;
use tracing::{debug, info};

use crate::error::Result;

/// Remaining time under which an episode counts as finished.
pub const COMPLETION_THRESHOLD_MS: u64 = 30_000;

#[async_trait]
pub trait PlayerRepository: Send + Sync {
    async fn get_episode(&self, episode_id: &str) -> Result<Option<Episode>>;

    /// Stored resume position, `None` if the episode was never played.
    async fn get_episode_position(&self, episode_id: &str) -> Result<Option<u64>>;

    async fn set_last_episode_id(&self, episode_id: &str) -> Result<()>;

    /// Current last played episode id, then every change.
    fn last_episode_id(&self) -> BoxStream<'static, Option<String>>;

    /// Persist the position of an episode, marking it completed when less
    /// than [`COMPLETION_THRESHOLD_MS`] remains.
    async fn update_episode_state(
        &self,
        episode_id: &str,
        position_ms: u64,
        duration_ms: u64,
    ) -> Result<()>;

    async fn mark_episode_completed(&self, episode_id: &str) -> Result<()>;
}

/// [`PlayerRepository`] backed by the [`LibraryStore`].
///
/// Publishes [`LibraryEvent::ProgressSaved`] for every write when an
/// [`EventBus`] is attached.
pub struct StorePlayerRepository {
    store: LibraryStore,
    clock: Arc<dyn Clock>,
    events: Option<EventBus>,
}

impl StorePlayerRepository {
    pub fn new(store: LibraryStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    fn saved(&self, episode_id: &str, position_ms: u64, completed: bool) {
        let Some(bus) = &self.events else {
            return;
        };
        let event = CoreEvent::Library(LibraryEvent::ProgressSaved {
            episode_id: episode_id.to_string(),
            position_ms,
            completed,
        });
        if bus.emit(event).is_err() {
            debug!("No subscribers for progress event");
        }
    }
}

fn is_near_end(position_ms: u64, duration_ms: u64) -> bool {
    duration_ms != UNKNOWN_DURATION
        && duration_ms > 0
        && duration_ms.saturating_sub(position_ms) < COMPLETION_THRESHOLD_MS
}

#[async_trait]
impl PlayerRepository for StorePlayerRepository {
    async fn get_episode(&self, episode_id: &str) -> Result<Option<Episode>> {
        Ok(self.store.episode(episode_id).await?)
    }

    async fn get_episode_position(&self, episode_id: &str) -> Result<Option<u64>> {
        let progress = self.store.progress(episode_id).await?;
        Ok(progress.map(|p| p.position()))
    }

    async fn set_last_episode_id(&self, episode_id: &str) -> Result<()> {
        self.store.set_last_episode_id(episode_id).await?;
        debug!(episode_id, "Last episode updated");
        Ok(())
    }

    fn last_episode_id(&self) -> BoxStream<'static, Option<String>> {
        self.store.observe_last_episode_id()
    }

    async fn update_episode_state(
        &self,
        episode_id: &str,
        position_ms: u64,
        duration_ms: u64,
    ) -> Result<()> {
        if is_near_end(position_ms, duration_ms) {
            return self.mark_episode_completed(episode_id).await;
        }

        let progress = EpisodeProgress {
            updated_at: self.clock.unix_timestamp(),
            ..EpisodeProgress::new(episode_id, position_ms)
        };
        self.store.save_progress(&progress).await?;
        debug!(episode_id, position_ms, duration_ms, "Episode position saved");
        self.saved(episode_id, position_ms, false);
        Ok(())
    }

    async fn mark_episode_completed(&self, episode_id: &str) -> Result<()> {
        self.store
            .mark_completed(episode_id, self.clock.unix_timestamp())
            .await?;
        info!(episode_id, "Episode completed");
        self.saved(episode_id, 0, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::SqliteSettingsStore;
    use bridge_traits::time::FixedClock;
    use futures::StreamExt;

    async fn repository() -> (StorePlayerRepository, LibraryStore) {
        let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let store = LibraryStore::in_memory(settings).await.unwrap();
        let clock = Arc::new(FixedClock(
            "2024-05-01T12:00:00Z".parse().expect("valid timestamp"),
        ));
        (StorePlayerRepository::new(store.clone(), clock), store)
    }

    #[test]
    fn test_completion_threshold() {
        assert!(is_near_end(580_000, 600_000));
        assert!(!is_near_end(570_000, 600_000));
        assert!(is_near_end(600_000, 600_000));
        assert!(!is_near_end(5_000, UNKNOWN_DURATION));
        assert!(!is_near_end(0, 0));
    }

    #[tokio::test]
    async fn test_position_saved_with_clock_timestamp() {
        let (repository, store) = repository().await;

        repository
            .update_episode_state("e1", 120_000, 600_000)
            .await
            .unwrap();

        assert_eq!(
            repository.get_episode_position("e1").await.unwrap(),
            Some(120_000)
        );
        let progress = store.progress("e1").await.unwrap().unwrap();
        assert!(!progress.completed);
        assert_eq!(progress.updated_at, 1_714_564_800);
    }

    #[tokio::test]
    async fn test_near_end_is_stored_completed_at_zero() {
        let (repository, store) = repository().await;

        repository
            .update_episode_state("e1", 590_000, 600_000)
            .await
            .unwrap();

        let progress = store.progress("e1").await.unwrap().unwrap();
        assert!(progress.completed);
        assert_eq!(progress.position(), 0);
    }

    #[tokio::test]
    async fn test_unknown_episode_has_no_position() {
        let (repository, _) = repository().await;
        assert_eq!(repository.get_episode_position("nope").await.unwrap(), None);
        assert!(repository.get_episode("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_episode_stream() {
        let (repository, _) = repository().await;
        let mut ids = repository.last_episode_id();
        assert_eq!(ids.next().await, Some(None));

        repository.set_last_episode_id("e7").await.unwrap();
        assert_eq!(ids.next().await, Some(Some("e7".to_string())));
    }

    #[tokio::test]
    async fn test_progress_writes_are_published() {
        let (repository, _) = repository().await;
        let bus = EventBus::new(8);
        let mut events = bus.subscribe();
        let repository = repository.with_event_bus(bus);

        repository
            .update_episode_state("e1", 120_000, 600_000)
            .await
            .unwrap();
        repository
            .update_episode_state("e1", 590_000, 600_000)
            .await
            .unwrap();

        assert_eq!(
            events.try_recv().unwrap(),
            CoreEvent::Library(LibraryEvent::ProgressSaved {
                episode_id: "e1".to_string(),
                position_ms: 120_000,
                completed: false,
            })
        );
        assert_eq!(
            events.try_recv().unwrap(),
            CoreEvent::Library(LibraryEvent::ProgressSaved {
                episode_id: "e1".to_string(),
                position_ms: 0,
                completed: true,
            })
        );
    }
}
