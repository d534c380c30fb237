//! ListenAPI v2 response types
//!
//! Data structures for deserializing ListenAPI responses, plus their
//! conversions into `core-library` models. Fields the catalog may omit
//! default to empty values.

use core_library::models::{Episode, Genre, Podcast, NO_GENRE_ID, NO_PARENT_GENRE};
use serde::{Deserialize, Serialize};

/// `GET /search?type=episode`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEpisodeResponse {
    /// Results in this page
    #[serde(default)]
    pub count: i64,
    /// Results across all pages
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub results: Vec<SearchEpisodeItem>,
    /// Value for the `offset` parameter of the next page
    #[serde(default)]
    pub next_offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEpisodeItem {
    pub id: String,
    pub title_original: String,
    #[serde(default)]
    pub description_original: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub audio: String,
    #[serde(default)]
    pub audio_length_sec: i64,
    pub podcast: SearchEpisodePodcast,
    #[serde(default)]
    pub explicit_content: bool,
    #[serde(default)]
    pub pub_date_ms: i64,
}

/// Podcast summary embedded in an episode search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEpisodePodcast {
    pub id: String,
    pub title_original: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub publisher_original: String,
}

/// `GET /search?type=podcast`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPodcastResponse {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub results: Vec<SearchPodcastItem>,
    #[serde(default)]
    pub next_offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPodcastItem {
    pub id: String,
    pub title_original: String,
    #[serde(default)]
    pub description_original: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub publisher_original: String,
    #[serde(default)]
    pub explicit_content: bool,
    #[serde(default)]
    pub total_episodes: i64,
    #[serde(default)]
    pub latest_pub_date_ms: i64,
}

/// `GET /best_podcasts`
#[derive(Debug, Clone, Deserialize)]
pub struct BestPodcastsResponse {
    #[serde(default)]
    pub podcasts: Vec<PodcastItem>,
    /// Genre the list was built for
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub has_next: bool,
}

/// Podcast object as returned by `best_podcasts` and `podcasts/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub explicit_content: bool,
    #[serde(default)]
    pub total_episodes: i64,
    #[serde(default)]
    pub latest_pub_date_ms: i64,
}

/// `GET /podcasts/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct PodcastResponse {
    #[serde(flatten)]
    pub podcast: PodcastItem,
    #[serde(default)]
    pub episodes: Vec<EpisodeItem>,
    /// Cursor for the next episode page, absent on the last page
    #[serde(default)]
    pub next_episode_pub_date: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub audio: String,
    #[serde(default)]
    pub audio_length_sec: i64,
    #[serde(default)]
    pub explicit_content: bool,
    #[serde(default)]
    pub pub_date_ms: i64,
}

/// `GET /genres`
#[derive(Debug, Clone, Deserialize)]
pub struct GenresResponse {
    #[serde(default)]
    pub genres: Vec<GenreItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreItem {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

// =============================================================================
// Conversions
// =============================================================================

impl PodcastItem {
    /// Convert into a storable podcast; local flags start cleared
    pub fn into_podcast(self, best_for_genre: i64) -> Podcast {
        Podcast {
            id: self.id,
            title: self.title,
            description: self.description,
            image: self.image,
            publisher: self.publisher,
            explicit_content: self.explicit_content,
            episode_count: self.total_episodes,
            latest_pub_date: self.latest_pub_date_ms,
            subscribed: false,
            best_for_genre,
            updated_at: chrono_now(),
        }
    }
}

impl SearchPodcastItem {
    pub fn into_podcast(self) -> Podcast {
        Podcast {
            id: self.id,
            title: self.title_original,
            description: self.description_original,
            image: self.image,
            publisher: self.publisher_original,
            explicit_content: self.explicit_content,
            episode_count: self.total_episodes,
            latest_pub_date: self.latest_pub_date_ms,
            subscribed: false,
            best_for_genre: NO_GENRE_ID,
            updated_at: chrono_now(),
        }
    }
}

impl EpisodeItem {
    pub fn into_episode(self, podcast_id: &str) -> Episode {
        Episode {
            id: self.id,
            podcast_id: podcast_id.to_string(),
            title: self.title,
            description: self.description,
            image: self.image,
            audio: self.audio,
            audio_length: self.audio_length_sec.max(0),
            explicit_content: self.explicit_content,
            date: self.pub_date_ms,
        }
    }
}

impl SearchEpisodeItem {
    pub fn into_episode(self) -> Episode {
        Episode {
            id: self.id,
            podcast_id: self.podcast.id,
            title: self.title_original,
            description: self.description_original,
            image: self.image,
            audio: self.audio,
            audio_length: self.audio_length_sec.max(0),
            explicit_content: self.explicit_content,
            date: self.pub_date_ms,
        }
    }
}

impl From<GenreItem> for Genre {
    fn from(item: GenreItem) -> Self {
        Genre {
            id: item.id,
            name: item.name,
            parent_id: item.parent_id.unwrap_or(NO_PARENT_GENRE),
        }
    }
}

fn chrono_now() -> i64 {
    chrono::Utc::now().timestamp()
}
