//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations for the podcast cache.
//!
//! ## Architecture
//!
//! - Traits define the interface for each table
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `PodcastRepository` - Podcasts, subscriptions and best-of lists
//! - `EpisodeRepository` - Episodes by podcast
//! - `GenreRepository` - Catalog genres
//! - `ProgressRepository` - Saved listening positions

pub mod episode;
pub mod genre;
pub mod podcast;
pub mod progress;

pub use episode::{EpisodeRepository, SqliteEpisodeRepository};
pub use genre::{GenreRepository, SqliteGenreRepository};
pub use podcast::{PodcastRepository, SqlitePodcastRepository};
pub use progress::{ProgressRepository, SqliteProgressRepository};
