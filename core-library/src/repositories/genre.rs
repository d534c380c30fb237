//! Genre repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Genre;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

#[async_trait]
pub trait GenreRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Genre>>;

    /// All genres ordered by name
    async fn list_all(&self) -> Result<Vec<Genre>>;

    /// Child genres of `parent_id`
    async fn list_children(&self, parent_id: i64) -> Result<Vec<Genre>>;

    /// Replace the stored genre list in one transaction
    async fn replace_all(&self, genres: &[Genre]) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqliteGenreRepository {
    pool: SqlitePool,
}

impl SqliteGenreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GenreRepository for SqliteGenreRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Genre>> {
        let genre = query_as::<_, Genre>("SELECT * FROM genres WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(genre)
    }

    async fn list_all(&self) -> Result<Vec<Genre>> {
        let genres = query_as::<_, Genre>("SELECT * FROM genres ORDER BY name COLLATE NOCASE ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(genres)
    }

    async fn list_children(&self, parent_id: i64) -> Result<Vec<Genre>> {
        let genres = query_as::<_, Genre>(
            "SELECT * FROM genres WHERE parent_id = ? ORDER BY name COLLATE NOCASE ASC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(genres)
    }

    async fn replace_all(&self, genres: &[Genre]) -> Result<()> {
        for genre in genres {
            genre
                .validate()
                .map_err(|msg| LibraryError::invalid("genre", msg))?;
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM genres").execute(&mut *tx).await?;
        for genre in genres {
            sqlx::query("INSERT OR REPLACE INTO genres (id, name, parent_id) VALUES (?, ?, ?)")
                .bind(genre.id)
                .bind(&genre.name)
                .bind(genre.parent_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM genres")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
