//! # Catalog Repository
//!
//! Cache-first access to podcasts, episodes and genres.
//!
//! ## Overview
//!
//! Reads are served from the [`LibraryStore`]. When the store has nothing
//! for a request, the repository fetches it from the [`CatalogClient`],
//! writes it to the store, and the store's change notifications deliver the
//! result. Every stream starts with [`State::Loading`]; a fetch failure with
//! an empty cache ends the stream with [`State::Error`].
//!
//! With an [`EventBus`] attached, catalog fetches publish
//! [`CatalogEvent`]s and store writes publish [`LibraryEvent`]s.

use std::collections::{HashMap, HashSet};
use std::future::{ready, Future};
use std::sync::Arc;

use async_trait::async_trait;
use core_library::models::{Genre, Podcast, PodcastWithEpisodes, SortOrder};
use core_library::LibraryStore;
use core_runtime::events::{CatalogEvent, CoreEvent, EventBus, LibraryEvent};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use provider_listennotes::{CatalogClient, SearchKind, SearchResults};
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};
use crate::state::State;

/// Podcast data used by the UI.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Podcast by id, fetched from the catalog when not cached.
    fn get_podcast(&self, id: &str) -> BoxStream<'static, State<Podcast>>;

    /// Podcast with its cached episodes in `sort` order.
    fn get_podcast_with_episodes(
        &self,
        id: &str,
        sort: SortOrder,
    ) -> BoxStream<'static, State<PodcastWithEpisodes>>;

    /// Fetch the first page of episodes and reset the pagination cursor.
    async fn fetch_episodes(&self, id: &str, sort: SortOrder) -> Result<()>;

    /// Fetch the next page of episodes. Returns `false` once every page was
    /// fetched.
    async fn fetch_more_episodes(&self, id: &str, sort: SortOrder) -> Result<bool>;

    async fn update_subscription(&self, podcast_id: &str, subscribed: bool) -> Result<()>;

    fn subscriptions(&self) -> BoxStream<'static, State<Vec<Podcast>>>;

    /// Best podcasts for a genre, fetched when none are cached.
    fn get_best_podcasts(&self, genre_id: i64) -> BoxStream<'static, State<Vec<Podcast>>>;

    /// Fetch the best podcasts for a genre and store them.
    async fn fetch_best_podcasts(&self, genre_id: i64) -> Result<()>;

    /// Replace the best list of a genre with a fresh one. Podcasts dropped
    /// from the list stay stored. `current` is the list on screen; when the
    /// fresh list has the same podcasts nothing is written.
    async fn refresh_best_podcasts(&self, genre_id: i64, current: &[Podcast]) -> Result<()>;

    fn get_genres(&self) -> BoxStream<'static, State<Vec<Genre>>>;

    async fn search(&self, query: &str, kind: SearchKind, offset: i64) -> Result<SearchResults>;
}

/// Next-page cursor per podcast and sort order. `None` once exhausted.
type Cursors = Mutex<HashMap<(String, SortOrder), Option<i64>>>;

/// [`Repository`] over the local store and the remote catalog.
#[derive(Clone)]
pub struct CacheFirstRepository {
    store: LibraryStore,
    catalog: Arc<dyn CatalogClient>,
    cursors: Arc<Cursors>,
    events: Option<EventBus>,
}

impl CacheFirstRepository {
    pub fn new(store: LibraryStore, catalog: Arc<dyn CatalogClient>) -> Self {
        Self {
            store,
            catalog,
            cursors: Arc::new(Mutex::new(HashMap::new())),
            events: None,
        }
    }

    /// Publish fetch and store events on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.events {
            if bus.emit(event).is_err() {
                debug!("No subscribers for repository event");
            }
        }
    }

    /// Await a catalog request, reporting its outcome on the bus.
    async fn fetched<T, F, N>(&self, resource: &str, request: F, items: N) -> Result<T>
    where
        F: Future<Output = provider_listennotes::Result<T>>,
        N: Fn(&T) -> usize,
    {
        match request.await {
            Ok(value) => {
                self.emit(CoreEvent::Catalog(CatalogEvent::FetchCompleted {
                    resource: resource.to_string(),
                    items: items(&value),
                }));
                Ok(value)
            }
            Err(e) => {
                self.emit(CoreEvent::Catalog(CatalogEvent::FetchFailed {
                    resource: resource.to_string(),
                    message: e.to_string(),
                }));
                Err(e.into())
            }
        }
    }

    async fn fetch_page(&self, id: &str, sort: SortOrder, cursor: Option<i64>) -> Result<()> {
        let page = self
            .fetched("podcast", self.catalog.get_podcast(id, cursor, sort), |page| {
                page.episodes.len()
            })
            .await?;
        debug!(
            podcast_id = id,
            episodes = page.episodes.len(),
            next = ?page.next_episode_pub_date,
            "Fetched episode page"
        );

        self.store.upsert_podcast(&page.podcast).await?;
        self.store.upsert_episodes(&page.episodes).await?;
        self.cursors
            .lock()
            .insert((id.to_string(), sort), page.next_episode_pub_date);
        self.emit(CoreEvent::Library(LibraryEvent::EpisodesUpdated {
            podcast_id: id.to_string(),
            count: page.episodes.len(),
        }));
        Ok(())
    }

    async fn ensure_podcast(&self, id: &str) -> Result<()> {
        if self.store.podcast(id).await?.is_some() {
            return Ok(());
        }
        self.fetch_page(id, SortOrder::default(), None).await
    }

    async fn ensure_episodes(&self, id: &str, sort: SortOrder) -> Result<()> {
        let cached = self.store.podcast(id).await?.is_some()
            && self.store.episode_count(id).await? > 0;
        if cached {
            return Ok(());
        }
        self.fetch_page(id, sort, None).await
    }

    async fn ensure_best_podcasts(&self, genre_id: i64) -> Result<()> {
        if !self.store.best_podcasts(genre_id).await?.is_empty() {
            return Ok(());
        }
        self.fetch_best_podcasts(genre_id).await
    }

    async fn ensure_genres(&self) -> Result<()> {
        if !self.store.genres().await?.is_empty() {
            return Ok(());
        }
        let genres = self
            .fetched("genres", self.catalog.get_genres(), Vec::len)
            .await?;
        info!(count = genres.len(), "Fetched genres");
        self.store.replace_genres(&genres).await?;
        Ok(())
    }
}

/// `Loading`, then run `ensure`; on success follow `observe`, otherwise
/// emit the failure.
fn cache_first<T, E, O>(ensure: E, observe: O) -> BoxStream<'static, State<T>>
where
    T: Send + 'static,
    E: Future<Output = Result<()>> + Send + 'static,
    O: FnOnce() -> BoxStream<'static, core_library::Result<Option<T>>> + Send + 'static,
{
    let load = async move {
        match ensure.await {
            Ok(()) => observe()
                .filter_map(|row| {
                    ready(match row {
                        Ok(Some(value)) => Some(State::Success(value)),
                        Ok(None) => None,
                        Err(e) => Some(State::error(e)),
                    })
                })
                .boxed(),
            Err(e) => {
                warn!(error = %e, "Cache-first load failed");
                stream::once(ready(State::error(e))).boxed()
            }
        }
    };

    stream::once(ready(State::Loading))
        .chain(stream::once(load).flatten())
        .boxed()
}

fn some<T: Send + 'static>(
    rows: BoxStream<'static, core_library::Result<T>>,
) -> BoxStream<'static, core_library::Result<Option<T>>> {
    rows.map(|row| row.map(Some)).boxed()
}

#[async_trait]
impl Repository for CacheFirstRepository {
    fn get_podcast(&self, id: &str) -> BoxStream<'static, State<Podcast>> {
        let repository = self.clone();
        let store = self.store.clone();
        let id = id.to_string();
        let observed = id.clone();

        cache_first(
            async move { repository.ensure_podcast(&id).await },
            move || store.observe_podcast(&observed),
        )
    }

    fn get_podcast_with_episodes(
        &self,
        id: &str,
        sort: SortOrder,
    ) -> BoxStream<'static, State<PodcastWithEpisodes>> {
        let repository = self.clone();
        let store = self.store.clone();
        let id = id.to_string();
        let observed = id.clone();

        cache_first(
            async move { repository.ensure_episodes(&id, sort).await },
            move || store.observe_podcast_with_episodes(&observed, sort),
        )
    }

    #[instrument(skip(self))]
    async fn fetch_episodes(&self, id: &str, sort: SortOrder) -> Result<()> {
        self.fetch_page(id, sort, None).await
    }

    #[instrument(skip(self))]
    async fn fetch_more_episodes(&self, id: &str, sort: SortOrder) -> Result<bool> {
        let cursor = self.cursors.lock().get(&(id.to_string(), sort)).copied();
        match cursor {
            // Nothing fetched yet in this order.
            None => self.fetch_page(id, sort, None).await?,
            Some(None) => {
                debug!(podcast_id = id, "All episode pages fetched");
                return Ok(false);
            }
            Some(Some(next)) => self.fetch_page(id, sort, Some(next)).await?,
        }

        let more = matches!(
            self.cursors.lock().get(&(id.to_string(), sort)),
            Some(Some(_))
        );
        Ok(more)
    }

    async fn update_subscription(&self, podcast_id: &str, subscribed: bool) -> Result<()> {
        self.store
            .update_subscription(podcast_id, subscribed)
            .await?;
        info!(podcast_id, subscribed, "Subscription updated");
        self.emit(CoreEvent::Library(LibraryEvent::SubscriptionChanged {
            podcast_id: podcast_id.to_string(),
            subscribed,
        }));
        Ok(())
    }

    fn subscriptions(&self) -> BoxStream<'static, State<Vec<Podcast>>> {
        let store = self.store.clone();
        cache_first(async { Ok(()) }, move || {
            some(store.observe_subscriptions())
        })
    }

    fn get_best_podcasts(&self, genre_id: i64) -> BoxStream<'static, State<Vec<Podcast>>> {
        let repository = self.clone();
        let store = self.store.clone();

        cache_first(
            async move { repository.ensure_best_podcasts(genre_id).await },
            move || some(store.observe_best_podcasts(genre_id)),
        )
    }

    #[instrument(skip(self))]
    async fn fetch_best_podcasts(&self, genre_id: i64) -> Result<()> {
        let best = self
            .fetched(
                "best_podcasts",
                self.catalog.get_best_podcasts(genre_id, 1),
                |best| best.items.len(),
            )
            .await?;
        info!(genre_id, count = best.items.len(), "Fetched best podcasts");
        self.store.upsert_podcasts(&best.items).await?;
        Ok(())
    }

    #[instrument(skip(self, current), fields(current = current.len()))]
    async fn refresh_best_podcasts(&self, genre_id: i64, current: &[Podcast]) -> Result<()> {
        let best = self
            .fetched(
                "best_podcasts",
                self.catalog.get_best_podcasts(genre_id, 1),
                |best| best.items.len(),
            )
            .await?;

        let fresh: HashSet<&str> = best.items.iter().map(|p| p.id.as_str()).collect();
        let dropped = current
            .iter()
            .filter(|p| !fresh.contains(p.id.as_str()))
            .count();
        if dropped == 0 && current.len() == fresh.len() {
            debug!(genre_id, "Best podcasts unchanged");
            return Ok(());
        }

        self.store
            .replace_best_podcasts(genre_id, &best.items)
            .await?;
        info!(
            genre_id,
            count = best.items.len(),
            dropped,
            "Best podcasts refreshed"
        );
        self.emit(CoreEvent::Library(LibraryEvent::BestPodcastsRefreshed {
            genre_id,
            count: best.items.len(),
        }));
        Ok(())
    }

    fn get_genres(&self) -> BoxStream<'static, State<Vec<Genre>>> {
        let repository = self.clone();
        let store = self.store.clone();

        cache_first(
            async move { repository.ensure_genres().await },
            move || some(store.observe_genres()),
        )
    }

    async fn search(&self, query: &str, kind: SearchKind, offset: i64) -> Result<SearchResults> {
        self.catalog
            .search(query, kind, offset)
            .await
            .map_err(CoreError::from)
    }
}
