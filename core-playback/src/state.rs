//! Playback state shared by the host and its clients.

use bridge_traits::playback::MediaMetadata;
use serde::{Deserialize, Serialize};

/// Duration reported when the engine does not know the item length.
pub const UNKNOWN_DURATION: u64 = u64::MAX;

/// Transport state, owned by the host and mirrored by every client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Paused,
    Playing,
    Error,
    Completed,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Link state of a client adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// The host went away; a new handle is needed.
    Reconnecting,
}

/// Position sample taken by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSample {
    /// Never greater than `duration_ms`
    pub position_ms: u64,
    /// [`UNKNOWN_DURATION`] when unknown
    pub duration_ms: u64,
}

/// Host state handed to a client when it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// Metadata of the loaded item, if one is loaded and carries metadata
    pub metadata: Option<MediaMetadata>,
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// Broadcast from the host to all connected clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    StateChanged(PlaybackState),
    /// A new item was loaded, or the item was unloaded (`loaded == false`).
    ItemChanged {
        loaded: bool,
        metadata: Option<MediaMetadata>,
        position_ms: u64,
        duration_ms: u64,
    },
    /// The position jumped; clients must drop older samples.
    PositionDiscontinuity { position_ms: u64, duration_ms: u64 },
}

/// Clamp a requested position into `[0, duration_ms]`.
pub fn clamp_position(position_ms: i64, duration_ms: u64) -> u64 {
    if position_ms <= 0 {
        0
    } else {
        (position_ms as u64).min(duration_ms)
    }
}
