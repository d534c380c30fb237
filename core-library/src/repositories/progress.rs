//! Listening progress per episode

use crate::error::{LibraryError, Result};
use crate::models::EpisodeProgress;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn find(&self, episode_id: &str) -> Result<Option<EpisodeProgress>>;

    /// Insert or replace the progress row
    async fn save(&self, progress: &EpisodeProgress) -> Result<()>;

    /// Mark completed and reset the position to zero
    async fn mark_completed(&self, episode_id: &str, updated_at: i64) -> Result<()>;

    /// Returns `true` if a row was removed
    async fn delete(&self, episode_id: &str) -> Result<bool>;
}

pub struct SqliteProgressRepository {
    pool: SqlitePool,
}

impl SqliteProgressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressRepository for SqliteProgressRepository {
    async fn find(&self, episode_id: &str) -> Result<Option<EpisodeProgress>> {
        let progress =
            query_as::<_, EpisodeProgress>("SELECT * FROM episode_progress WHERE episode_id = ?")
                .bind(episode_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(progress)
    }

    async fn save(&self, progress: &EpisodeProgress) -> Result<()> {
        if progress.episode_id.trim().is_empty() {
            return Err(LibraryError::invalid("episode_id", "cannot be empty"));
        }
        if progress.position_ms < 0 {
            return Err(LibraryError::invalid("position_ms", "cannot be negative"));
        }

        sqlx::query(
            r#"
            INSERT INTO episode_progress (episode_id, position_ms, completed, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(episode_id) DO UPDATE SET
                position_ms = excluded.position_ms,
                completed = excluded.completed,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&progress.episode_id)
        .bind(progress.position_ms)
        .bind(progress.completed)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(&self, episode_id: &str, updated_at: i64) -> Result<()> {
        let progress = EpisodeProgress {
            episode_id: episode_id.to_string(),
            position_ms: 0,
            completed: true,
            updated_at,
        };
        self.save(&progress).await
    }

    async fn delete(&self, episode_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM episode_progress WHERE episode_id = ?")
            .bind(episode_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_save_and_overwrite() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProgressRepository::new(pool);

        repo.save(&EpisodeProgress::new("ep-1", 42_000)).await.unwrap();
        repo.save(&EpisodeProgress::new("ep-1", 84_000)).await.unwrap();

        let found = repo.find("ep-1").await.unwrap().unwrap();
        assert_eq!(found.position(), 84_000);
        assert!(!found.completed);
    }

    #[tokio::test]
    async fn test_mark_completed_without_episode_row() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProgressRepository::new(pool);

        repo.save(&EpisodeProgress::new("ep-2", 5_000)).await.unwrap();
        repo.mark_completed("ep-2", 1_700_000_000).await.unwrap();

        let found = repo.find("ep-2").await.unwrap().unwrap();
        assert!(found.completed);
        assert_eq!(found.position_ms, 0);
        assert_eq!(found.updated_at, 1_700_000_000);

        assert!(repo.delete("ep-2").await.unwrap());
        assert!(!repo.delete("ep-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rejects_negative_position() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteProgressRepository::new(pool);

        let mut progress = EpisodeProgress::new("ep-3", 0);
        progress.position_ms = -5;
        assert!(matches!(
            repo.save(&progress).await,
            Err(LibraryError::InvalidInput { .. })
        ));
    }
}
