//! # Podcast Library
//!
//! Owns the local podcast cache and the listening progress database.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema and embedded migrations (`db`)
//! - Domain models for podcasts, episodes, genres and progress (`models`)
//! - Repository traits with SQLite implementations (`repositories`)
//! - [`LibraryStore`], which composes the repositories and exposes
//!   reactive `observe_*` streams over table changes

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::{LibraryError, Result};
pub use models::{
    Episode, EpisodeProgress, Genre, Podcast, PodcastWithEpisodes, SortOrder, NO_GENRE_ID,
    NO_PARENT_GENRE,
};
pub use store::{LibraryStore, Table, LAST_EPISODE_ID_KEY};
