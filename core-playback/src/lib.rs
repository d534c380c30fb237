//! # Playback Session Module
//!
//! Runs the single playback session of the app and lets any number of
//! clients observe and control it.
//!
//! ## Overview
//!
//! This module provides:
//! - [`PlaybackSessionHost`]: an actor owning the platform media engine
//! - [`SessionHandle`]: a cloneable command handle to a running host
//! - [`PlaybackClient`]: a consumer-side adapter exposing current episode,
//!   playback state and position as `watch` streams
//!
//! ## Example
//!
//! ```ignore
//! let handle = PlaybackSessionHost::builder(engine)
//!     .event_bus(bus.clone())
//!     .start()?;
//!
//! let client = PlaybackClient::new("ui", PlaybackConfig::default())?;
//! client.init_connection(handle.clone()).await?;
//! client.play_episode(&episode, &podcast.publisher, 0).await?;
//! ```

pub mod client;
pub mod config;
pub mod episode;
pub mod error;
pub mod host;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use client::PlaybackClient;
pub use config::PlaybackConfig;
pub use episode::{media_item_for, CurrentEpisode};
pub use error::{ConnectionError, PlaybackError, Result};
pub use host::{
    AllowAll, ClientInfo, Connection, ConnectionPolicy, HostBuilder, PlaybackSessionHost,
    SessionHandle,
};
pub use state::{
    ConnectionState, HostEvent, PlaybackSnapshot, PlaybackState, PositionSample, UNKNOWN_DURATION,
};
