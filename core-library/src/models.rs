//! Domain models for the podcast catalog cache
//!
//! Rows map one-to-one onto the tables in `migrations/`. Integer columns use
//! `i64` so they round-trip through SQLite without conversion.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Marker stored in `podcasts.best_for_genre` when a podcast is not part of
/// any best-of list.
pub const NO_GENRE_ID: i64 = -1;

/// Marker stored in `genres.parent_id` for top-level genres.
pub const NO_PARENT_GENRE: i64 = -1;

// =============================================================================
// Domain Models
// =============================================================================

/// Podcast show as cached from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Podcast {
    /// Catalog identifier
    pub id: String,
    pub title: String,
    pub description: String,
    /// Artwork URL
    pub image: String,
    pub publisher: String,
    pub explicit_content: bool,
    /// Total number of episodes reported by the catalog
    pub episode_count: i64,
    /// Publication date of the newest episode (epoch millis)
    pub latest_pub_date: i64,
    /// Local-only flag, never overwritten by catalog refreshes
    pub subscribed: bool,
    /// Genre whose best-of list contains this podcast, or [`NO_GENRE_ID`]
    pub best_for_genre: i64,
    /// Last time the row was written (epoch seconds)
    pub updated_at: i64,
}

impl Podcast {
    /// Create a podcast with only the required fields set
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            image: String::new(),
            publisher: String::new(),
            explicit_content: false,
            episode_count: 0,
            latest_pub_date: 0,
            subscribed: false,
            best_for_genre: NO_GENRE_ID,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Podcast id cannot be empty".to_string());
        }

        if self.episode_count < 0 {
            return Err("Podcast episode count cannot be negative".to_string());
        }

        Ok(())
    }

    pub fn is_best_for(&self, genre_id: i64) -> bool {
        self.best_for_genre != NO_GENRE_ID && self.best_for_genre == genre_id
    }
}

/// Single podcast episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Episode {
    pub id: String,
    /// Owning podcast
    pub podcast_id: String,
    pub title: String,
    pub description: String,
    pub image: String,
    /// Audio stream URL
    pub audio: String,
    /// Length in seconds
    pub audio_length: i64,
    pub explicit_content: bool,
    /// Publication date (epoch millis)
    pub date: i64,
}

impl Episode {
    pub fn new(
        id: impl Into<String>,
        podcast_id: impl Into<String>,
        title: impl Into<String>,
        audio: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            podcast_id: podcast_id.into(),
            title: title.into(),
            description: String::new(),
            image: String::new(),
            audio: audio.into(),
            audio_length: 0,
            explicit_content: false,
            date: 0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Episode id cannot be empty".to_string());
        }

        if self.podcast_id.trim().is_empty() {
            return Err("Episode podcast id cannot be empty".to_string());
        }

        if self.audio_length < 0 {
            return Err("Episode audio length cannot be negative".to_string());
        }

        Ok(())
    }

    /// Episode length in milliseconds, `None` when the catalog reported none
    pub fn duration_ms(&self) -> Option<u64> {
        if self.audio_length > 0 {
            Some(self.audio_length as u64 * 1000)
        } else {
            None
        }
    }
}

/// Catalog genre
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Genre {
    pub id: i64,
    pub name: String,
    /// Parent genre, or [`NO_PARENT_GENRE`]
    pub parent_id: i64,
}

impl Genre {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: NO_PARENT_GENRE,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id == NO_PARENT_GENRE
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Genre name cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Saved listening position for one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EpisodeProgress {
    pub episode_id: String,
    pub position_ms: i64,
    pub completed: bool,
    /// Epoch seconds
    pub updated_at: i64,
}

impl EpisodeProgress {
    pub fn new(episode_id: impl Into<String>, position_ms: u64) -> Self {
        Self {
            episode_id: episode_id.into(),
            position_ms: i64::try_from(position_ms).unwrap_or(i64::MAX),
            completed: false,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn completed(episode_id: impl Into<String>) -> Self {
        Self {
            completed: true,
            ..Self::new(episode_id, 0)
        }
    }

    pub fn position(&self) -> u64 {
        self.position_ms.max(0) as u64
    }
}

/// Podcast together with its cached episodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastWithEpisodes {
    pub podcast: Podcast,
    pub episodes: Vec<Episode>,
}

/// Episode ordering, shared by the catalog API and local queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    RecentFirst,
    OldestFirst,
}

impl SortOrder {
    /// Value of the catalog's `sort` query parameter
    pub fn as_api_str(&self) -> &'static str {
        match self {
            SortOrder::RecentFirst => "recent_first",
            SortOrder::OldestFirst => "oldest_first",
        }
    }

    pub(crate) fn sql_direction(&self) -> &'static str {
        match self {
            SortOrder::RecentFirst => "DESC",
            SortOrder::OldestFirst => "ASC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_podcast_new_defaults() {
        let podcast = Podcast::new("pod-1", "Hardcore History");
        assert_eq!(podcast.best_for_genre, NO_GENRE_ID);
        assert!(!podcast.subscribed);
        assert!(podcast.updated_at > 0);
        assert!(!podcast.is_best_for(NO_GENRE_ID));
    }

    #[test]
    fn test_podcast_validation() {
        let mut podcast = Podcast::new("pod-1", "Title");
        assert!(podcast.validate().is_ok());

        podcast.id = "  ".to_string();
        assert!(podcast.validate().is_err());

        podcast.id = "pod-1".to_string();
        podcast.episode_count = -3;
        assert!(podcast.validate().is_err());
    }

    #[test]
    fn test_episode_validation() {
        let mut episode = Episode::new("ep-1", "pod-1", "Pilot", "https://cdn/ep-1.mp3");
        assert!(episode.validate().is_ok());

        episode.audio_length = -1;
        assert!(episode.validate().is_err());

        episode.audio_length = 10;
        episode.podcast_id = String::new();
        assert!(episode.validate().is_err());
    }

    #[test]
    fn test_episode_duration_ms() {
        let mut episode = Episode::new("ep-1", "pod-1", "Pilot", "https://cdn/ep-1.mp3");
        assert_eq!(episode.duration_ms(), None);

        episode.audio_length = 95;
        assert_eq!(episode.duration_ms(), Some(95_000));
    }

    #[test]
    fn test_genre_parent() {
        let genre = Genre::new(68, "TV & Film");
        assert!(genre.is_top_level());

        let child = Genre::new(69, "Film Reviews").with_parent(68);
        assert!(!child.is_top_level());
        assert_eq!(child.parent_id, 68);
    }

    #[test]
    fn test_sort_order_strings() {
        assert_eq!(SortOrder::default(), SortOrder::RecentFirst);
        assert_eq!(SortOrder::RecentFirst.as_api_str(), "recent_first");
        assert_eq!(SortOrder::OldestFirst.to_string(), "oldest_first");
        assert_eq!(SortOrder::OldestFirst.sql_direction(), "ASC");
    }

    #[test]
    fn test_progress_completed_resets_position() {
        let progress = EpisodeProgress::completed("ep-9");
        assert!(progress.completed);
        assert_eq!(progress.position(), 0);
    }
}
