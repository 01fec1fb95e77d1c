//! Error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for registry and configuration operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors raised while resolving or building a transport.
///
/// These surface directly from [`Network::build`](crate::Network::build),
/// never through a promise.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// No base address could be resolved for an API.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The resolved base address is not a valid URL.
    #[error("Invalid base address {address:?}: {source}")]
    InvalidUrl {
        /// The offending address.
        address: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The underlying HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Transport-level failure of a single call.
///
/// Delivered through the failure branch of a [`Callback`](crate::Callback),
/// never as a panic.
#[derive(Debug, Error)]
pub enum CallError {
    /// The server could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The exchange did not finish in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be mapped to the declared shape.
    #[error("{0}")]
    Decode(String),

    /// The request body could not be encoded.
    #[error("Failed to encode request body: {0}")]
    Encode(String),

    /// The call was cancelled before it completed.
    #[error("Canceled")]
    Canceled,

    /// The call object was already enqueued or executed.
    #[error("Already executed")]
    AlreadyExecuted,

    /// No async runtime was available to drive the call.
    #[error("No async runtime available to execute the call")]
    NoRuntime,

    /// The request could not be assembled (bad path, header, or URL).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An exchange hook rejected the request or response.
    #[error("Exchange hook error: {0}")]
    Hook(String),

    /// Underlying HTTP client error.
    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

impl CallError {
    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_)) || matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_)) || matches!(self, Self::Http(e) if e.is_connect())
    }

    /// Check if the call was cancelled.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Check if the body failed to decode.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_)) || matches!(self, Self::Http(e) if e.is_decode())
    }

    /// Message handed to failure handlers; cancellation carries none.
    pub fn user_message(&self) -> Option<String> {
        if self.is_canceled() {
            None
        } else {
            Some(self.to_string())
        }
    }

    /// Classify a `reqwest` error into the most specific variant.
    pub(crate) fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else if error.is_connect() {
            Self::Connection(error.to_string())
        } else {
            Self::Http(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_has_no_user_message() {
        assert_eq!(CallError::Canceled.user_message(), None);
        assert!(CallError::Canceled.is_canceled());
    }

    #[test]
    fn test_decode_message_is_verbatim() {
        let err = CallError::Decode("invalid type: map, expected a sequence".to_string());
        assert!(err.is_decode());
        assert_eq!(
            err.user_message().as_deref(),
            Some("invalid type: map, expected a sequence")
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(CallError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(CallError::Connection("refused".into()).is_connection());
        assert!(!CallError::AlreadyExecuted.is_connection());
    }
}
