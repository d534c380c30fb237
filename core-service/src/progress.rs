//! Persists listening progress from playback events on the event bus.

use std::sync::Arc;

use core_runtime::events::{CoreEvent, EventBus, EventStream, PlaybackEvent, RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::player_repository::PlayerRepository;

/// Background task writing playback transitions to the
/// [`PlayerRepository`].
///
/// - `Started` records the last played episode
/// - `Paused` and `Stopped` save the position
/// - `Completed` marks the episode completed
pub struct ProgressRecorder {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ProgressRecorder {
    /// Subscribe to `bus` and start recording. Must be called within a tokio
    /// runtime.
    pub fn start(bus: &EventBus, player: Arc<dyn PlayerRepository>) -> Self {
        let token = CancellationToken::new();
        let mut events = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Playback(_)));
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => {
                        // Events already queued still get written.
                        loop {
                            match events.try_recv() {
                                Some(Ok(CoreEvent::Playback(event))) => {
                                    record(player.as_ref(), event).await
                                }
                                Some(Ok(_)) | Some(Err(RecvError::Lagged(_))) => {}
                                Some(Err(RecvError::Closed)) | None => break,
                            }
                        }
                        break;
                    }
                    event = events.recv() => event,
                };

                match event {
                    Ok(CoreEvent::Playback(event)) => record(player.as_ref(), event).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Progress recorder lagged behind playback events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Progress recorder stopped");
        });

        Self { token, task }
    }

    /// Stop recording and wait for the task to finish. Events emitted before
    /// the call are still recorded.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Progress recorder task failed");
        }
    }
}

async fn record(player: &dyn PlayerRepository, event: PlaybackEvent) {
    let result = match &event {
        PlaybackEvent::Started { episode_id, .. } => player.set_last_episode_id(episode_id).await,
        PlaybackEvent::Paused {
            episode_id,
            position_ms,
            duration_ms,
        }
        | PlaybackEvent::Stopped {
            episode_id,
            position_ms,
            duration_ms,
        } => {
            player
                .update_episode_state(episode_id, *position_ms, *duration_ms)
                .await
        }
        PlaybackEvent::Completed { episode_id } => player.mark_episode_completed(episode_id).await,
        PlaybackEvent::Resumed { .. } | PlaybackEvent::Seeked { .. } | PlaybackEvent::Error { .. } => {
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(error = %e, event = event.description(), "Failed to record playback progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use core_library::models::Episode;
    use futures::stream::BoxStream;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        Player {}

        #[async_trait]
        impl PlayerRepository for Player {
            async fn get_episode(&self, episode_id: &str) -> Result<Option<Episode>>;
            async fn get_episode_position(&self, episode_id: &str) -> Result<Option<u64>>;
            async fn set_last_episode_id(&self, episode_id: &str) -> Result<()>;
            fn last_episode_id(&self) -> BoxStream<'static, Option<String>>;
            async fn update_episode_state(
                &self,
                episode_id: &str,
                position_ms: u64,
                duration_ms: u64,
            ) -> Result<()>;
            async fn mark_episode_completed(&self, episode_id: &str) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn test_events_are_recorded() {
        let bus = EventBus::new(16);
        let (done_tx, mut done) = tokio::sync::mpsc::unbounded_channel();

        let mut player = MockPlayer::new();
        player
            .expect_set_last_episode_id()
            .withf(|id| id == "e1")
            .times(1)
            .returning(|_| Ok(()));
        player
            .expect_update_episode_state()
            .withf(|id, position, duration| id == "e1" && *position == 42_000 && *duration == 600_000)
            .times(1)
            .returning(|_, _, _| Ok(()));
        player
            .expect_mark_episode_completed()
            .withf(|id| id == "e1")
            .times(1)
            .returning(move |_| {
                let _ = done_tx.send(());
                Ok(())
            });

        let recorder = ProgressRecorder::start(&bus, Arc::new(player));

        let episode_id = "e1".to_string();
        for event in [
            PlaybackEvent::Started {
                episode_id: episode_id.clone(),
                title: "Pilot".to_string(),
            },
            PlaybackEvent::Seeked {
                episode_id: episode_id.clone(),
                position_ms: 42_000,
            },
            PlaybackEvent::Paused {
                episode_id: episode_id.clone(),
                position_ms: 42_000,
                duration_ms: 600_000,
            },
            PlaybackEvent::Completed { episode_id },
        ] {
            bus.emit(CoreEvent::Playback(event)).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), done.recv())
            .await
            .unwrap();
        recorder.stop().await;
    }
}
