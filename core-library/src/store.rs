//! # Library Store
//!
//! Composes the repositories behind one handle and adds change
//! notification: every write bumps a per-table version, and the
//! `observe_*` streams re-run their query whenever a table they read from
//! changes. Each stream yields the current value first and skips
//! re-emitting a value equal to the previous one.
//!
//! The id of the last played episode lives in the bridge
//! [`SettingsStore`] rather than SQLite, with its own watch channel.

use crate::db::create_test_pool;
use crate::error::Result;
use crate::models::{Episode, EpisodeProgress, Genre, Podcast, PodcastWithEpisodes, SortOrder};
use crate::repositories::{
    EpisodeRepository, GenreRepository, PodcastRepository, ProgressRepository,
    SqliteEpisodeRepository, SqliteGenreRepository, SqlitePodcastRepository,
    SqliteProgressRepository,
};
use bridge_traits::storage::SettingsStore;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Settings key holding the last played episode id
pub const LAST_EPISODE_ID_KEY: &str = "player.last_episode_id";

/// Tables whose changes can be observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Podcasts,
    Episodes,
    Genres,
    Progress,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Versions {
    podcasts: u64,
    episodes: u64,
    genres: u64,
    progress: u64,
}

impl Versions {
    fn get(&self, table: Table) -> u64 {
        match table {
            Table::Podcasts => self.podcasts,
            Table::Episodes => self.episodes,
            Table::Genres => self.genres,
            Table::Progress => self.progress,
        }
    }

    fn bump(&mut self, table: Table) {
        let slot = match table {
            Table::Podcasts => &mut self.podcasts,
            Table::Episodes => &mut self.episodes,
            Table::Genres => &mut self.genres,
            Table::Progress => &mut self.progress,
        };
        *slot = slot.wrapping_add(1);
    }

    fn stamp(&self, tables: &[Table]) -> Vec<u64> {
        tables.iter().map(|t| self.get(*t)).collect()
    }
}

/// Cheaply cloneable handle over the podcast cache
#[derive(Clone)]
pub struct LibraryStore {
    pool: SqlitePool,
    podcasts: Arc<dyn PodcastRepository>,
    episodes: Arc<dyn EpisodeRepository>,
    genres: Arc<dyn GenreRepository>,
    progress: Arc<dyn ProgressRepository>,
    settings: Arc<dyn SettingsStore>,
    versions: Arc<watch::Sender<Versions>>,
    last_episode: Arc<watch::Sender<Option<String>>>,
}

impl LibraryStore {
    /// Build a store over `pool`, loading the last episode id from `settings`
    pub async fn new(pool: SqlitePool, settings: Arc<dyn SettingsStore>) -> Result<Self> {
        let last = settings.get_string(LAST_EPISODE_ID_KEY).await?;
        let (versions, _) = watch::channel(Versions::default());
        let (last_episode, _) = watch::channel(last.filter(|id| !id.is_empty()));

        Ok(Self {
            podcasts: Arc::new(SqlitePodcastRepository::new(pool.clone())),
            episodes: Arc::new(SqliteEpisodeRepository::new(pool.clone())),
            genres: Arc::new(SqliteGenreRepository::new(pool.clone())),
            progress: Arc::new(SqliteProgressRepository::new(pool.clone())),
            pool,
            settings,
            versions: Arc::new(versions),
            last_episode: Arc::new(last_episode),
        })
    }

    /// Store over a fresh in-memory database
    pub async fn in_memory(settings: Arc<dyn SettingsStore>) -> Result<Self> {
        let pool = create_test_pool().await?;
        Self::new(pool, settings).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn touch(&self, table: Table) {
        self.versions.send_modify(|v| v.bump(table));
        debug!(?table, "Table changed");
    }

    // =========================================================================
    // Podcasts
    // =========================================================================

    pub async fn podcast(&self, id: &str) -> Result<Option<Podcast>> {
        self.podcasts.find_by_id(id).await
    }

    pub async fn upsert_podcast(&self, podcast: &Podcast) -> Result<()> {
        self.podcasts.upsert(podcast).await?;
        self.touch(Table::Podcasts);
        Ok(())
    }

    pub async fn upsert_podcasts(&self, podcasts: &[Podcast]) -> Result<()> {
        if podcasts.is_empty() {
            return Ok(());
        }
        self.podcasts.upsert_many(podcasts).await?;
        self.touch(Table::Podcasts);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_subscription(&self, podcast_id: &str, subscribed: bool) -> Result<()> {
        self.podcasts
            .update_subscription(podcast_id, subscribed)
            .await?;
        self.touch(Table::Podcasts);
        Ok(())
    }

    #[instrument(skip(self, podcasts), fields(count = podcasts.len()))]
    pub async fn replace_best_podcasts(&self, genre_id: i64, podcasts: &[Podcast]) -> Result<()> {
        self.podcasts
            .replace_best_for_genre(genre_id, podcasts)
            .await?;
        self.touch(Table::Podcasts);
        Ok(())
    }

    pub async fn best_podcasts(&self, genre_id: i64) -> Result<Vec<Podcast>> {
        self.podcasts.list_best_for_genre(genre_id).await
    }

    pub async fn subscriptions(&self) -> Result<Vec<Podcast>> {
        self.podcasts.list_subscriptions().await
    }

    // =========================================================================
    // Episodes
    // =========================================================================

    pub async fn episode(&self, id: &str) -> Result<Option<Episode>> {
        self.episodes.find_by_id(id).await
    }

    pub async fn upsert_episodes(&self, episodes: &[Episode]) -> Result<()> {
        if episodes.is_empty() {
            return Ok(());
        }
        self.episodes.upsert_many(episodes).await?;
        self.touch(Table::Episodes);
        Ok(())
    }

    pub async fn episodes_for(&self, podcast_id: &str, sort: SortOrder) -> Result<Vec<Episode>> {
        self.episodes.find_by_podcast(podcast_id, sort).await
    }

    pub async fn episode_count(&self, podcast_id: &str) -> Result<i64> {
        self.episodes.count_by_podcast(podcast_id).await
    }

    pub async fn podcast_with_episodes(
        &self,
        podcast_id: &str,
        sort: SortOrder,
    ) -> Result<Option<PodcastWithEpisodes>> {
        let Some(podcast) = self.podcasts.find_by_id(podcast_id).await? else {
            return Ok(None);
        };
        let episodes = self.episodes.find_by_podcast(podcast_id, sort).await?;
        Ok(Some(PodcastWithEpisodes { podcast, episodes }))
    }

    // =========================================================================
    // Genres
    // =========================================================================

    pub async fn genres(&self) -> Result<Vec<Genre>> {
        self.genres.list_all().await
    }

    pub async fn replace_genres(&self, genres: &[Genre]) -> Result<()> {
        self.genres.replace_all(genres).await?;
        self.touch(Table::Genres);
        Ok(())
    }

    // =========================================================================
    // Progress
    // =========================================================================

    pub async fn progress(&self, episode_id: &str) -> Result<Option<EpisodeProgress>> {
        self.progress.find(episode_id).await
    }

    pub async fn save_progress(&self, progress: &EpisodeProgress) -> Result<()> {
        self.progress.save(progress).await?;
        self.touch(Table::Progress);
        Ok(())
    }

    pub async fn mark_completed(&self, episode_id: &str, updated_at: i64) -> Result<()> {
        self.progress.mark_completed(episode_id, updated_at).await?;
        self.touch(Table::Progress);
        Ok(())
    }

    // =========================================================================
    // Last played episode
    // =========================================================================

    pub async fn set_last_episode_id(&self, episode_id: &str) -> Result<()> {
        self.settings
            .set_string(LAST_EPISODE_ID_KEY, episode_id)
            .await?;
        let id = Some(episode_id.to_string()).filter(|id| !id.is_empty());
        self.last_episode.send_if_modified(|current| {
            if *current == id {
                false
            } else {
                *current = id;
                true
            }
        });
        Ok(())
    }

    pub async fn clear_last_episode_id(&self) -> Result<()> {
        self.settings.delete(LAST_EPISODE_ID_KEY).await?;
        self.last_episode.send_replace(None);
        Ok(())
    }

    pub fn last_episode_id(&self) -> Option<String> {
        self.last_episode.borrow().clone()
    }

    /// Current last episode id, then every change
    pub fn observe_last_episode_id(&self) -> BoxStream<'static, Option<String>> {
        let mut rx = self.last_episode.subscribe();
        rx.mark_changed();
        stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let value = rx.borrow_and_update().clone();
            Some((value, rx))
        })
        .boxed()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn observe_podcast(&self, id: &str) -> BoxStream<'static, Result<Option<Podcast>>> {
        let id = id.to_string();
        self.observe(&[Table::Podcasts], move |store| {
            let id = id.clone();
            async move { store.podcast(&id).await }
        })
    }

    pub fn observe_podcast_with_episodes(
        &self,
        id: &str,
        sort: SortOrder,
    ) -> BoxStream<'static, Result<Option<PodcastWithEpisodes>>> {
        let id = id.to_string();
        self.observe(&[Table::Podcasts, Table::Episodes], move |store| {
            let id = id.clone();
            async move { store.podcast_with_episodes(&id, sort).await }
        })
    }

    pub fn observe_best_podcasts(&self, genre_id: i64) -> BoxStream<'static, Result<Vec<Podcast>>> {
        self.observe(&[Table::Podcasts], move |store| async move {
            store.best_podcasts(genre_id).await
        })
    }

    pub fn observe_subscriptions(&self) -> BoxStream<'static, Result<Vec<Podcast>>> {
        self.observe(&[Table::Podcasts], |store| async move {
            store.subscriptions().await
        })
    }

    pub fn observe_genres(&self) -> BoxStream<'static, Result<Vec<Genre>>> {
        self.observe(&[Table::Genres], |store| async move { store.genres().await })
    }

    pub fn observe_progress(
        &self,
        episode_id: &str,
    ) -> BoxStream<'static, Result<Option<EpisodeProgress>>> {
        let id = episode_id.to_string();
        self.observe(&[Table::Progress], move |store| {
            let id = id.clone();
            async move { store.progress(&id).await }
        })
    }

    fn observe<T, F, Fut>(&self, tables: &[Table], query: F) -> BoxStream<'static, Result<T>>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(LibraryStore) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        struct Observer<T> {
            rx: watch::Receiver<Versions>,
            seen: Option<Vec<u64>>,
            last: Option<T>,
        }

        let tables: Arc<[Table]> = tables.into();
        let query = Arc::new(query);
        let store = self.clone();
        let initial = Observer {
            rx: self.versions.subscribe(),
            seen: None,
            last: None,
        };

        stream::unfold(initial, move |mut state| {
            let tables = Arc::clone(&tables);
            let query = Arc::clone(&query);
            let store = store.clone();
            async move {
                loop {
                    let stamp = state.rx.borrow_and_update().stamp(&tables);
                    if state.seen.as_ref() == Some(&stamp) {
                        state.rx.changed().await.ok()?;
                        continue;
                    }
                    state.seen = Some(stamp);

                    match (*query)(store.clone()).await {
                        Ok(value) if state.last.as_ref() == Some(&value) => continue,
                        Ok(value) => {
                            state.last = Some(value.clone());
                            return Some((Ok(value), state));
                        }
                        Err(e) => return Some((Err(e), state)),
                    }
                }
            }
        })
        .boxed()
    }
}
