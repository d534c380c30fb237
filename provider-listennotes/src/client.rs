//! ListenAPI client implementation
//!
//! [`ListenNotesClient`] implements [`CatalogClient`] over the bridge
//! [`HttpClient`]. Every request carries the `X-ListenAPI-Key` header and is
//! sent through `execute_with_retry`, so transient 429/5xx responses are
//! retried by the platform client before a status reaches this module.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_library::models::{Episode, Genre, Podcast, SortOrder, NO_GENRE_ID};
use core_runtime::config::CatalogApiConfig;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{ListenNotesError, Result};
use crate::types::{
    BestPodcastsResponse, GenresResponse, PodcastResponse, SearchEpisodeResponse,
    SearchPodcastResponse,
};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-ListenAPI-Key";

// =============================================================================
// Catalog results
// =============================================================================

/// What a search looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchKind {
    #[default]
    Episode,
    Podcast,
}

impl SearchKind {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            SearchKind::Episode => "episode",
            SearchKind::Podcast => "podcast",
        }
    }
}

/// Episode search hit with the owning podcast's display fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeHit {
    pub episode: Episode,
    pub podcast_title: String,
    pub podcast_image: String,
    pub publisher: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchHit {
    Episode(EpisodeHit),
    Podcast(Podcast),
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Matches across all pages
    pub total_count: i64,
    /// Offset to request for the following page
    pub next_offset: i64,
}

impl SearchResults {
    pub fn has_more(&self) -> bool {
        self.next_offset > 0 && self.next_offset < self.total_count
    }
}

/// One page of a genre's best podcasts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestPodcasts {
    pub genre_id: i64,
    pub genre_name: String,
    /// Podcasts with `best_for_genre` set to `genre_id`
    pub items: Vec<Podcast>,
    pub has_next_page: bool,
}

/// Podcast details with one page of episodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodcastPage {
    pub podcast: Podcast,
    pub episodes: Vec<Episode>,
    /// Cursor for the next page, `None` once all episodes were served
    pub next_episode_pub_date: Option<i64>,
}

// =============================================================================
// Client trait
// =============================================================================

/// Remote podcast catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Full-text search; `offset` comes from a previous page's `next_offset`
    async fn search(&self, query: &str, kind: SearchKind, offset: i64) -> Result<SearchResults>;

    /// Best podcasts for a genre; pages start at 1
    async fn get_best_podcasts(&self, genre_id: i64, page: u32) -> Result<BestPodcasts>;

    async fn get_genres(&self) -> Result<Vec<Genre>>;

    /// Podcast details plus the page of episodes published before
    /// `next_episode_pub_date` (or the first page when `None`)
    async fn get_podcast(
        &self,
        id: &str,
        next_episode_pub_date: Option<i64>,
        sort: SortOrder,
    ) -> Result<PodcastPage>;
}

// =============================================================================
// ListenAPI implementation
// =============================================================================

/// ListenAPI v2 client
///
/// # Example
///
/// ```ignore
/// use provider_listennotes::{CatalogClient, ListenNotesClient, SearchKind};
///
/// let client = ListenNotesClient::new(http_client, CatalogApiConfig::new(api_key));
/// let page = client.search("star wars", SearchKind::Podcast, 0).await?;
/// ```
pub struct ListenNotesClient {
    http_client: Arc<dyn HttpClient>,
    config: CatalogApiConfig,
    retry_policy: RetryPolicy,
}

impl ListenNotesClient {
    pub fn new(http_client: Arc<dyn HttpClient>, config: CatalogApiConfig) -> Self {
        let retry_policy = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            ..RetryPolicy::default()
        };

        Self {
            http_client,
            config,
            retry_policy,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, format!("{}{}", self.config.base_url, path))
            .header(API_KEY_HEADER, self.config.api_key.clone())
            .header("Accept", "application/json")
            .timeout(self.config.request_timeout)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T> {
        let url = request.url.clone();
        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Catalog request failed");
                ListenNotesError::from(e)
            })?;

        check_status(&response)?;

        serde_json::from_slice(&response.body).map_err(|e| {
            warn!(url = %url, error = %e, "Unexpected catalog response body");
            ListenNotesError::Parse(e.to_string())
        })
    }
}

fn check_status(response: &HttpResponse) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        401 | 403 => Err(ListenNotesError::Unauthorized {
            status: response.status,
        }),
        429 => Err(ListenNotesError::RateLimited {
            retry_after_seconds: response
                .header("Retry-After")
                .and_then(|v| v.trim().parse().ok()),
        }),
        status => Err(ListenNotesError::Api {
            status,
            message: String::from_utf8_lossy(&response.body).trim().to_string(),
        }),
    }
}

#[async_trait]
impl CatalogClient for ListenNotesClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, kind: SearchKind, offset: i64) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ListenNotesError::InvalidRequest(
                "search query cannot be empty".to_string(),
            ));
        }

        let request = self
            .request("/search")
            .query_param("q", query)
            .query_param("type", kind.as_api_str())
            .query_param("offset", offset.max(0));

        let results = match kind {
            SearchKind::Episode => {
                let response: SearchEpisodeResponse = self.get_json(request).await?;
                SearchResults {
                    total_count: response.total,
                    next_offset: response.next_offset,
                    hits: response
                        .results
                        .into_iter()
                        .map(|item| {
                            let podcast_title = item.podcast.title_original.clone();
                            let podcast_image = item.podcast.image.clone();
                            let publisher = item.podcast.publisher_original.clone();
                            SearchHit::Episode(EpisodeHit {
                                episode: item.into_episode(),
                                podcast_title,
                                podcast_image,
                                publisher,
                            })
                        })
                        .collect(),
                }
            }
            SearchKind::Podcast => {
                let response: SearchPodcastResponse = self.get_json(request).await?;
                SearchResults {
                    total_count: response.total,
                    next_offset: response.next_offset,
                    hits: response
                        .results
                        .into_iter()
                        .map(|item| SearchHit::Podcast(item.into_podcast()))
                        .collect(),
                }
            }
        };

        debug!(
            hits = results.hits.len(),
            total = results.total_count,
            "Search completed"
        );
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn get_best_podcasts(&self, genre_id: i64, page: u32) -> Result<BestPodcasts> {
        if genre_id == NO_GENRE_ID {
            return Err(ListenNotesError::InvalidRequest(
                "best podcasts need a genre id".to_string(),
            ));
        }

        let request = self
            .request("/best_podcasts")
            .query_param("genre_id", genre_id)
            .query_param("page", page.max(1));

        let response: BestPodcastsResponse = self.get_json(request).await?;
        let genre_id = response.id;

        info!(
            genre_id,
            count = response.podcasts.len(),
            has_next = response.has_next,
            "Fetched best podcasts"
        );

        Ok(BestPodcasts {
            genre_id,
            genre_name: response.name,
            items: response
                .podcasts
                .into_iter()
                .map(|item| item.into_podcast(genre_id))
                .collect(),
            has_next_page: response.has_next,
        })
    }

    #[instrument(skip(self))]
    async fn get_genres(&self) -> Result<Vec<Genre>> {
        let request = self.request("/genres").query_param("top_level_only", 0);
        let response: GenresResponse = self.get_json(request).await?;

        info!(count = response.genres.len(), "Fetched genres");
        Ok(response.genres.into_iter().map(Genre::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_podcast(
        &self,
        id: &str,
        next_episode_pub_date: Option<i64>,
        sort: SortOrder,
    ) -> Result<PodcastPage> {
        if id.trim().is_empty() {
            return Err(ListenNotesError::InvalidRequest(
                "podcast id cannot be empty".to_string(),
            ));
        }

        let mut request = self
            .request(&format!("/podcasts/{}", urlencoding::encode(id)))
            .query_param("sort", sort.as_api_str());
        if let Some(cursor) = next_episode_pub_date {
            request = request.query_param("next_episode_pub_date", cursor);
        }

        let response: PodcastResponse = self.get_json(request).await?;
        let podcast_id = response.podcast.id.clone();
        let episodes: Vec<Episode> = response
            .episodes
            .into_iter()
            .map(|item| item.into_episode(&podcast_id))
            .collect();

        debug!(
            podcast_id = %podcast_id,
            episodes = episodes.len(),
            next = ?response.next_episode_pub_date,
            "Fetched podcast page"
        );

        Ok(PodcastPage {
            podcast: response.podcast.into_podcast(NO_GENRE_ID),
            episodes,
            next_episode_pub_date: response.next_episode_pub_date,
        })
    }
}
