//! Error types for the ListenAPI provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// ListenAPI provider errors
#[derive(Error, Debug)]
pub enum ListenNotesError {
    /// API key missing, wrong, or over its plan
    #[error("ListenAPI rejected the API key (status {status})")]
    Unauthorized { status: u16 },

    /// Too many requests
    #[error("ListenAPI rate limit exceeded")]
    RateLimited {
        /// Seconds from the `Retry-After` header, when present
        retry_after_seconds: Option<u64>,
    },

    /// Any other non-success status
    #[error("ListenAPI error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Failed to parse ListenAPI response: {0}")]
    Parse(String),

    /// Transport failure before a response arrived
    #[error("Network error: {0}")]
    Network(String),

    /// Request rejected locally before being sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for ListenAPI operations
pub type Result<T> = std::result::Result<T, ListenNotesError>;

impl ListenNotesError {
    /// Whether the remote fetch failed, as opposed to a local usage error
    pub fn is_fetch_failure(&self) -> bool {
        !matches!(self, ListenNotesError::InvalidRequest(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ListenNotesError::Unauthorized { status } | ListenNotesError::Api { status, .. } => {
                Some(*status)
            }
            ListenNotesError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl From<BridgeError> for ListenNotesError {
    fn from(error: BridgeError) -> Self {
        ListenNotesError::Network(error.to_string())
    }
}

impl From<ListenNotesError> for BridgeError {
    fn from(error: ListenNotesError) -> Self {
        match error {
            ListenNotesError::InvalidRequest(msg) => BridgeError::OperationFailed(msg),
            other => BridgeError::OperationFailed(format!("Catalog fetch failed: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ListenNotesError::Api {
            status: 404,
            message: "podcast not found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "ListenAPI error (status 404): podcast not found"
        );
        assert_eq!(error.status(), Some(404));
    }

    #[test]
    fn test_fetch_failure_classification() {
        assert!(ListenNotesError::Network("reset".into()).is_fetch_failure());
        assert!(ListenNotesError::Parse("eof".into()).is_fetch_failure());
        assert!(ListenNotesError::Unauthorized { status: 401 }.is_fetch_failure());
        assert!(ListenNotesError::RateLimited {
            retry_after_seconds: None
        }
        .is_fetch_failure());
        assert!(!ListenNotesError::InvalidRequest("empty query".into()).is_fetch_failure());
    }

    #[test]
    fn test_error_conversion() {
        let bridge_error: BridgeError = ListenNotesError::Unauthorized { status: 401 }.into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));

        let back: ListenNotesError = BridgeError::NotAvailable("offline".into()).into();
        assert!(matches!(back, ListenNotesError::Network(_)));
    }
}
