//! Podcast repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Podcast, NO_GENRE_ID};
use async_trait::async_trait;
use sqlx::{query_as, Sqlite, SqlitePool};

/// Podcast repository interface for data access operations
#[async_trait]
pub trait PodcastRepository: Send + Sync {
    /// Find a podcast by its ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Podcast>>;

    /// Insert a podcast, or refresh the catalog fields of an existing row
    ///
    /// The stored `subscribed` flag always survives. An incoming
    /// `best_for_genre` of [`NO_GENRE_ID`] keeps the stored value, so a plain
    /// catalog refresh never drops a podcast from a best-of list.
    async fn upsert(&self, podcast: &Podcast) -> Result<()>;

    /// Upsert several podcasts in one transaction
    async fn upsert_many(&self, podcasts: &[Podcast]) -> Result<()>;

    /// Set the subscription flag
    ///
    /// # Errors
    /// `NotFound` if no podcast has this ID.
    async fn update_subscription(&self, id: &str, subscribed: bool) -> Result<()>;

    /// Make `podcasts` the best-of list for `genre_id`
    ///
    /// Podcasts previously in the list but absent from `podcasts` stay stored
    /// with `best_for_genre` cleared.
    async fn replace_best_for_genre(&self, genre_id: i64, podcasts: &[Podcast]) -> Result<()>;

    /// Best-of list for a genre
    async fn list_best_for_genre(&self, genre_id: i64) -> Result<Vec<Podcast>>;

    /// Podcasts the user is subscribed to, ordered by title
    async fn list_subscriptions(&self) -> Result<Vec<Podcast>>;

    /// Count stored podcasts
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of PodcastRepository
pub struct SqlitePodcastRepository {
    pool: SqlitePool,
}

impl SqlitePodcastRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn validated(podcast: &Podcast) -> Result<()> {
    podcast
        .validate()
        .map_err(|msg| LibraryError::invalid("podcast", msg))
}

async fn upsert_with<'e, E>(executor: E, podcast: &Podcast) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO podcasts (
            id, title, description, image, publisher,
            explicit_content, episode_count, latest_pub_date,
            subscribed, best_for_genre, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            image = excluded.image,
            publisher = excluded.publisher,
            explicit_content = excluded.explicit_content,
            episode_count = excluded.episode_count,
            latest_pub_date = excluded.latest_pub_date,
            best_for_genre = CASE
                WHEN excluded.best_for_genre = -1 THEN podcasts.best_for_genre
                ELSE excluded.best_for_genre
            END,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&podcast.id)
    .bind(&podcast.title)
    .bind(&podcast.description)
    .bind(&podcast.image)
    .bind(&podcast.publisher)
    .bind(podcast.explicit_content)
    .bind(podcast.episode_count)
    .bind(podcast.latest_pub_date)
    .bind(podcast.subscribed)
    .bind(podcast.best_for_genre)
    .bind(podcast.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl PodcastRepository for SqlitePodcastRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Podcast>> {
        let podcast = query_as::<_, Podcast>("SELECT * FROM podcasts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(podcast)
    }

    async fn upsert(&self, podcast: &Podcast) -> Result<()> {
        validated(podcast)?;
        upsert_with(&self.pool, podcast).await
    }

    async fn upsert_many(&self, podcasts: &[Podcast]) -> Result<()> {
        for podcast in podcasts {
            validated(podcast)?;
        }

        let mut tx = self.pool.begin().await?;
        for podcast in podcasts {
            upsert_with(&mut *tx, podcast).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn update_subscription(&self, id: &str, subscribed: bool) -> Result<()> {
        let result = sqlx::query("UPDATE podcasts SET subscribed = ? WHERE id = ?")
            .bind(subscribed)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::not_found("Podcast", id));
        }

        Ok(())
    }

    async fn replace_best_for_genre(&self, genre_id: i64, podcasts: &[Podcast]) -> Result<()> {
        if genre_id == NO_GENRE_ID {
            return Err(LibraryError::invalid(
                "genre_id",
                "cannot build a best-of list without a genre",
            ));
        }
        for podcast in podcasts {
            validated(podcast)?;
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE podcasts SET best_for_genre = ? WHERE best_for_genre = ?")
            .bind(NO_GENRE_ID)
            .bind(genre_id)
            .execute(&mut *tx)
            .await?;

        for podcast in podcasts {
            let ranked = Podcast {
                best_for_genre: genre_id,
                ..podcast.clone()
            };
            upsert_with(&mut *tx, &ranked).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_best_for_genre(&self, genre_id: i64) -> Result<Vec<Podcast>> {
        if genre_id == NO_GENRE_ID {
            return Ok(Vec::new());
        }

        let podcasts = query_as::<_, Podcast>(
            "SELECT * FROM podcasts WHERE best_for_genre = ? ORDER BY episode_count DESC, title ASC",
        )
        .bind(genre_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(podcasts)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Podcast>> {
        let podcasts = query_as::<_, Podcast>(
            "SELECT * FROM podcasts WHERE subscribed = 1 ORDER BY title COLLATE NOCASE ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(podcasts)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM podcasts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
