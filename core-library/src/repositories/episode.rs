//! Episode repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Episode, SortOrder};
use async_trait::async_trait;
use sqlx::{query_as, Sqlite, SqlitePool};

#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Episode>>;

    /// Insert or replace an episode
    ///
    /// # Errors
    /// Fails on invalid data, or when the owning podcast is not stored.
    async fn upsert(&self, episode: &Episode) -> Result<()>;

    /// Upsert several episodes in one transaction
    async fn upsert_many(&self, episodes: &[Episode]) -> Result<()>;

    /// Episodes of one podcast, ordered by publication date
    async fn find_by_podcast(&self, podcast_id: &str, sort: SortOrder) -> Result<Vec<Episode>>;

    async fn count_by_podcast(&self, podcast_id: &str) -> Result<i64>;
}

pub struct SqliteEpisodeRepository {
    pool: SqlitePool,
}

impl SqliteEpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn upsert_with<'e, E>(executor: E, episode: &Episode) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO episodes (
            id, podcast_id, title, description, image,
            audio, audio_length, explicit_content, date
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            podcast_id = excluded.podcast_id,
            title = excluded.title,
            description = excluded.description,
            image = excluded.image,
            audio = excluded.audio,
            audio_length = excluded.audio_length,
            explicit_content = excluded.explicit_content,
            date = excluded.date
        "#,
    )
    .bind(&episode.id)
    .bind(&episode.podcast_id)
    .bind(&episode.title)
    .bind(&episode.description)
    .bind(&episode.image)
    .bind(&episode.audio)
    .bind(episode.audio_length)
    .bind(episode.explicit_content)
    .bind(episode.date)
    .execute(executor)
    .await?;

    Ok(())
}

fn validated(episode: &Episode) -> Result<()> {
    episode
        .validate()
        .map_err(|msg| LibraryError::invalid("episode", msg))
}

#[async_trait]
impl EpisodeRepository for SqliteEpisodeRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Episode>> {
        let episode = query_as::<_, Episode>("SELECT * FROM episodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(episode)
    }

    async fn upsert(&self, episode: &Episode) -> Result<()> {
        validated(episode)?;
        upsert_with(&self.pool, episode).await
    }

    async fn upsert_many(&self, episodes: &[Episode]) -> Result<()> {
        for episode in episodes {
            validated(episode)?;
        }

        let mut tx = self.pool.begin().await?;
        for episode in episodes {
            upsert_with(&mut *tx, episode).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_podcast(&self, podcast_id: &str, sort: SortOrder) -> Result<Vec<Episode>> {
        let sql = format!(
            "SELECT * FROM episodes WHERE podcast_id = ? ORDER BY date {}, id ASC",
            sort.sql_direction()
        );

        let episodes = query_as::<_, Episode>(&sql)
            .bind(podcast_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(episodes)
    }

    async fn count_by_podcast(&self, podcast_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM episodes WHERE podcast_id = ?")
            .bind(podcast_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Podcast;
    use crate::repositories::{PodcastRepository, SqlitePodcastRepository};

    async fn setup() -> (SqlitePool, SqliteEpisodeRepository) {
        let pool = create_test_pool().await.unwrap();
        SqlitePodcastRepository::new(pool.clone())
            .upsert(&Podcast::new("pod-1", "The Daily"))
            .await
            .unwrap();
        (pool.clone(), SqliteEpisodeRepository::new(pool))
    }

    fn episode(id: &str, date: i64) -> Episode {
        let mut episode = Episode::new(id, "pod-1", format!("Episode {}", id), "https://cdn/a.mp3");
        episode.date = date;
        episode.audio_length = 1800;
        episode
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let (_pool, repo) = setup().await;

        repo.upsert(&episode("ep-1", 100)).await.unwrap();
        let found = repo.find_by_id("ep-1").await.unwrap().unwrap();
        assert_eq!(found.audio_length, 1800);

        let mut changed = episode("ep-1", 100);
        changed.title = "Renamed".to_string();
        repo.upsert(&changed).await.unwrap();
        assert_eq!(repo.find_by_id("ep-1").await.unwrap().unwrap().title, "Renamed");
        assert_eq!(repo.count_by_podcast("pod-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_by_podcast_sorted() {
        let (_pool, repo) = setup().await;
        repo.upsert_many(&[episode("a", 300), episode("b", 100), episode("c", 200)])
            .await
            .unwrap();

        let recent: Vec<String> = repo
            .find_by_podcast("pod-1", SortOrder::RecentFirst)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(recent, vec!["a", "c", "b"]);

        let oldest: Vec<String> = repo
            .find_by_podcast("pod-1", SortOrder::OldestFirst)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(oldest, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_episode_requires_stored_podcast() {
        let (_pool, repo) = setup().await;
        let mut orphan = episode("ep-x", 1);
        orphan.podcast_id = "unknown".to_string();

        let result = repo.upsert(&orphan).await;
        assert!(matches!(result, Err(LibraryError::Database(_))));
    }

    #[tokio::test]
    async fn test_episodes_cascade_with_podcast() {
        let (pool, repo) = setup().await;
        repo.upsert(&episode("ep-1", 1)).await.unwrap();

        sqlx::query("DELETE FROM podcasts WHERE id = 'pod-1'")
            .execute(&pool)
            .await
            .unwrap();

        assert!(repo.find_by_id("ep-1").await.unwrap().is_none());
    }
}
