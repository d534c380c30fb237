//! # Playback Error Types
//!
//! Errors returned by the session host and the client adapter.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Code reported when an engine failure carries no native code.
pub const UNKNOWN_ENGINE_CODE: i32 = -1;

/// Failures of the link between a client and the session host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The host was shut down, or its handle is stale.
    #[error("Playback host is unavailable")]
    HostUnavailable,

    /// The host's connection policy refused the client.
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// The client has no live connection.
    #[error("Not connected to a playback host")]
    NotConnected,
}

/// Errors that can occur during playback operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    // ========================================================================
    // Command Errors
    // ========================================================================
    /// Command not valid in the current state (no media, empty URI,
    /// transport before connection).
    #[error("Invalid playback command: {0}")]
    InvalidCommand(String),

    /// Media could not be built from the given episode.
    #[error("Episode is not playable: {0}")]
    NotPlayable(String),

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// The platform media engine reported a failure.
    #[error("Media engine error {code}: {message}")]
    Engine { code: i32, message: String },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Invalid playback configuration.
    #[error("Invalid playback configuration: {0}")]
    Config(String),
}

impl PlaybackError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        PlaybackError::InvalidCommand(message.into())
    }

    /// Returns `true` if the host behind the handle is gone.
    pub fn is_host_unavailable(&self) -> bool {
        matches!(
            self,
            PlaybackError::Connection(ConnectionError::HostUnavailable)
        )
    }

    /// Native engine code, if this is an engine failure.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            PlaybackError::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<BridgeError> for PlaybackError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Engine { code, message } => PlaybackError::Engine { code, message },
            other => PlaybackError::Engine {
                code: UNKNOWN_ENGINE_CODE,
                message: other.to_string(),
            },
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
