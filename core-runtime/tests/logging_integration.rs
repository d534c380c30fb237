//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

// Global subscriber can only be installed once per process, so a single test
// covers initialization, forwarding and the double-init error.
#[test]
fn test_init_logging_forwards_to_sink() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::debug!(target: "core_playback", episode_id = "e1", "position sampled");
    tracing::debug!(target: "some_dependency", "filtered out");
    tracing::info!(target: "provider_listennotes", api_key = "k-123", "catalog request");

    let entries = sink.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "position sampled");
    assert_eq!(entries[0].fields.get("episode_id"), Some(&"e1".to_string()));
    assert_eq!(
        entries[1].fields.get("api_key"),
        Some(&"[REDACTED]".to_string())
    );

    assert!(init_logging(LoggingConfig::default()).is_err());
}

#[test]
fn test_redaction_of_catalog_credentials() {
    assert_eq!(redact_if_sensitive("X-ListenAPI-Key", "abc"), "abc");
    assert_eq!(redact_if_sensitive("listenapi_key", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("podcast_id", "p-1"), "p-1");
}
