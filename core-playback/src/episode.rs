//! The episode currently loaded in the player, as seen by the UI.

use bridge_traits::playback::{MediaItem, MediaMetadata};
use core_library::models::Episode;
use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// Display fields of the active media item.
///
/// A blank `id` marks the empty value published while nothing is loaded or
/// the loaded item carries no metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentEpisode {
    pub id: String,
    pub title: String,
    pub publisher: String,
    pub image_url: String,
}

impl CurrentEpisode {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.id.trim().is_empty()
    }

    pub fn from_metadata(metadata: Option<&MediaMetadata>) -> Self {
        metadata.map(Self::from).unwrap_or_default()
    }
}

impl From<&MediaMetadata> for CurrentEpisode {
    fn from(metadata: &MediaMetadata) -> Self {
        Self {
            id: metadata.media_id.clone(),
            title: metadata.title.clone(),
            publisher: metadata.publisher.clone(),
            image_url: metadata.image_url.clone(),
        }
    }
}

/// Build the media item for `episode`, starting at `start_position_ms`.
///
/// The episode's audio URL is required; its length in seconds becomes the
/// metadata duration.
pub fn media_item_for(episode: &Episode, publisher: &str, start_position_ms: u64) -> Result<MediaItem> {
    if episode.id.trim().is_empty() {
        return Err(PlaybackError::NotPlayable("episode id is empty".to_string()));
    }
    if episode.audio.trim().is_empty() {
        return Err(PlaybackError::NotPlayable(format!(
            "episode {} has no audio URL",
            episode.id
        )));
    }

    let duration_ms = episode.duration_ms();
    let start = match duration_ms {
        Some(duration) => start_position_ms.min(duration),
        None => start_position_ms,
    };

    Ok(MediaItem::new(episode.audio.clone())
        .with_metadata(MediaMetadata {
            media_id: episode.id.clone(),
            title: episode.title.clone(),
            publisher: publisher.to_string(),
            image_url: episode.image.clone(),
            duration_ms,
        })
        .with_start_position(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode() -> Episode {
        let mut episode = Episode::new("ep-1", "pod-1", "Pilot", "https://cdn/ep-1.mp3");
        episode.image = "https://img/ep-1.jpg".to_string();
        episode.audio_length = 600;
        episode
    }

    #[test]
    fn test_empty_sentinel() {
        assert!(CurrentEpisode::empty().is_empty());
        assert!(CurrentEpisode::from_metadata(None).is_empty());
    }

    #[test]
    fn test_media_item_for_episode() {
        let item = media_item_for(&episode(), "Gimlet", 42_000).unwrap();
        assert_eq!(item.uri, "https://cdn/ep-1.mp3");
        assert_eq!(item.duration_ms(), Some(600_000));
        assert_eq!(item.start_position_ms, 42_000);

        let current = CurrentEpisode::from_metadata(item.metadata.as_ref());
        assert_eq!(current.id, "ep-1");
        assert_eq!(current.publisher, "Gimlet");
        assert_eq!(current.image_url, "https://img/ep-1.jpg");
    }

    #[test]
    fn test_start_position_clamped_to_length() {
        let item = media_item_for(&episode(), "Gimlet", 10_000_000).unwrap();
        assert_eq!(item.start_position_ms, 600_000);
    }

    #[test]
    fn test_episode_without_audio_is_not_playable() {
        let mut silent = episode();
        silent.audio = String::new();
        assert!(matches!(
            media_item_for(&silent, "", 0),
            Err(PlaybackError::NotPlayable(_))
        ));
    }
}
