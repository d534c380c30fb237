//! Media engine bridge traits and supporting types.
//!
//! The core never decodes audio itself. Each host platform supplies a
//! [`MediaEngine`] (ExoPlayer, AVPlayer, a GStreamer pipeline, ...) and the
//! playback session host drives it through this trait. The engine is owned
//! exclusively by the host task, which is why every mutating call takes
//! `&mut self`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Descriptive metadata attached to a loaded media item.
///
/// Mirrors the fields a platform media session shows in its notification or
/// lock screen entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Identifier of the episode this item plays.
    pub media_id: String,
    pub title: String,
    pub publisher: String,
    pub image_url: String,
    /// Total length in milliseconds, when known up front.
    pub duration_ms: Option<u64>,
}

/// A playable item handed to [`MediaEngine::load`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Stream location (usually an HTTPS audio URL).
    pub uri: String,
    /// Custom metadata; bare URIs carry none.
    pub metadata: Option<MediaMetadata>,
    /// Position to resume from once prepared.
    pub start_position_ms: u64,
}

impl MediaItem {
    /// Create an item for a bare URI without metadata.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            metadata: None,
            start_position_ms: 0,
        }
    }

    /// Attach metadata to the item.
    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Resume playback from `position_ms` instead of the beginning.
    pub fn with_start_position(mut self, position_ms: u64) -> Self {
        self.start_position_ms = position_ms;
        self
    }

    /// Declared duration from metadata, if any.
    pub fn duration_ms(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.duration_ms)
    }
}

/// Asynchronous notifications raised by an engine outside of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The loaded item played to its end.
    Completed,
    /// The engine failed while playing (network drop, decoder failure, ...).
    Error { code: i32, message: String },
}

/// Receives [`EngineEvent`]s. Engines may call this from any thread.
pub trait EngineListener: Send + Sync {
    fn on_engine_event(&self, event: EngineEvent);
}

/// Platform media engine driven by the playback session host.
///
/// Implementations report failures as [`BridgeError::Engine`](crate::BridgeError::Engine)
/// with their native error code so callers can surface it unchanged.
#[async_trait]
pub trait MediaEngine: Send {
    /// Register the listener that receives asynchronous engine events.
    fn set_listener(&mut self, listener: Arc<dyn EngineListener>);

    /// Stop playback and release buffers of the current item, if any.
    async fn reset(&mut self) -> Result<()>;

    /// Load a new item. Resolves once the engine accepted or rejected it.
    async fn load(&mut self, item: &MediaItem) -> Result<()>;

    /// Prepare the loaded item for playback (open the stream, buffer).
    async fn prepare(&mut self) -> Result<()>;

    /// Start or resume playback.
    async fn play(&mut self) -> Result<()>;

    /// Pause playback, keeping the item loaded.
    async fn pause(&mut self) -> Result<()>;

    /// Seek to an absolute position.
    async fn seek(&mut self, position: Duration) -> Result<()>;

    /// Current playback position.
    fn position(&self) -> Duration;

    /// Duration of the loaded item, `None` while unknown.
    fn duration(&self) -> Option<Duration>;

    /// Release every native resource. The engine is not used afterwards.
    async fn release(&mut self) -> Result<()>;
}
