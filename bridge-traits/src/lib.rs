//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the podcast core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per platform (desktop, Android, iOS).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and TLS
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Playback
//! - [`MediaEngine`](playback::MediaEngine) - Native audio engine owned by the session host
//! - [`EngineListener`](playback::EngineListener) - Receives asynchronous engine events
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | HTTP + settings |
//! | Android  | TBD                 | Planned |
//! | iOS      | TBD                 | Planned |
//!
//! The media engine has no desktop default: hosts always inject one.
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Media
//! engines report native failures through `BridgeError::Engine` so the engine
//! code reaches the caller of the failing command unchanged.
//!
//! ## Thread Safety
//!
//! Shared bridges (`HttpClient`, `SettingsStore`, `Clock`, `LoggerSink`) are
//! `Send + Sync`. `MediaEngine` is only `Send`: a single task owns it.

pub mod error;
pub mod http;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use playback::{EngineEvent, EngineListener, MediaEngine, MediaItem, MediaMetadata};
pub use storage::SettingsStore;
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
