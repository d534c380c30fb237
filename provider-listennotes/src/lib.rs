//! # ListenAPI Provider
//!
//! Implements [`CatalogClient`] for the ListenAPI v2 podcast catalog.
//!
//! ## Overview
//!
//! This module provides:
//! - Episode and podcast search with offset pagination
//! - Best podcasts per genre, page by page
//! - The genre list
//! - Podcast details with episode pagination by publication date
//!
//! Wire responses are converted into `core-library` models on the way in.
//! Requests go through the bridge `HttpClient` with its retry policy.

pub mod client;
pub mod error;
pub mod types;

pub use client::{
    BestPodcasts, CatalogClient, EpisodeHit, ListenNotesClient, PodcastPage, SearchHit,
    SearchKind, SearchResults,
};
pub use error::{ListenNotesError, Result};
