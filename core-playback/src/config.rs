//! # Playback Configuration
//!
//! Tunables for the session host and client adapter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PlaybackError, Result};

/// Playback configuration.
///
/// Every field has a serde default, so a partial document such as
/// `{"skip_forward": {"secs": 15, "nanos": 0}}` deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How often a client samples the host position while playing.
    ///
    /// Default: 1 second.
    #[serde(default = "default_position_poll_interval")]
    pub position_poll_interval: Duration,

    /// Jump applied by `skip_forward`.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_skip_forward")]
    pub skip_forward: Duration,

    /// Jump applied by `skip_backward`.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_skip_backward")]
    pub skip_backward: Duration,

    /// Commands that may queue at the host before senders wait.
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,

    /// Host events buffered per client before a slow client lags.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            position_poll_interval: default_position_poll_interval(),
            skip_forward: default_skip_forward(),
            skip_backward: default_skip_backward(),
            command_channel_capacity: default_command_channel_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_position_poll_interval(mut self, interval: Duration) -> Self {
        self.position_poll_interval = interval;
        self
    }

    pub fn with_skip_forward(mut self, amount: Duration) -> Self {
        self.skip_forward = amount;
        self
    }

    pub fn with_skip_backward(mut self, amount: Duration) -> Self {
        self.skip_backward = amount;
        self
    }

    pub fn with_channel_capacities(mut self, commands: usize, events: usize) -> Self {
        self.command_channel_capacity = commands;
        self.event_channel_capacity = events;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.position_poll_interval.is_zero() {
            return Err(PlaybackError::Config(
                "position_poll_interval must be > 0".to_string(),
            ));
        }

        if self.command_channel_capacity == 0 {
            return Err(PlaybackError::Config(
                "command_channel_capacity must be > 0".to_string(),
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(PlaybackError::Config(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub(crate) fn skip_forward_ms(&self) -> i64 {
        i64::try_from(self.skip_forward.as_millis()).unwrap_or(i64::MAX)
    }

    pub(crate) fn skip_backward_ms(&self) -> i64 {
        i64::try_from(self.skip_backward.as_millis()).unwrap_or(i64::MAX)
    }
}

fn default_position_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_skip_forward() -> Duration {
    Duration::from_secs(30)
}

fn default_skip_backward() -> Duration {
    Duration::from_secs(10)
}

fn default_command_channel_capacity() -> usize {
    32
}

fn default_event_channel_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlaybackConfig::default();
        assert_eq!(config.position_poll_interval, Duration::from_secs(1));
        assert_eq!(config.skip_forward_ms(), 30_000);
        assert_eq!(config.skip_backward_ms(), 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: PlaybackConfig =
            serde_json::from_str(r#"{"skip_forward": {"secs": 15, "nanos": 0}}"#).unwrap();
        assert_eq!(config.skip_forward, Duration::from_secs(15));
        assert_eq!(config.skip_backward, Duration::from_secs(10));
        assert_eq!(config.event_channel_capacity, 64);
    }

    #[test]
    fn test_validation() {
        let config = PlaybackConfig::default().with_position_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = PlaybackConfig::default().with_channel_capacities(0, 8);
        assert!(config.validate().is_err());
    }
}
