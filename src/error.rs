//! Error taxonomy for the fetch and aggregation pipeline.
//!
//! An empty but well-formed response is not an error; callers model it as
//! `Ok(None)`.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, TrafficError>;

/// Failures surfaced by the fetch client and the request validators.
///
/// The `Display` text of each variant is the notice shown to the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrafficError {
    /// Network error or timeout that persisted through every retry attempt.
    #[error("Could not reach the traffic API after {attempts} attempt(s): {message}")]
    TransportFailure { attempts: u32, message: String },

    /// The API answered but reported an error in its `errors` list.
    #[error("The traffic API rejected the query: {message}")]
    RemoteRejection { message: String },

    /// The API answered with a body that could not be interpreted.
    #[error("The traffic API returned an unreadable response: {message}")]
    MalformedResponse { message: String },

    /// Input rejected before any request was made.
    #[error("Invalid request: {message}")]
    OutOfRangeRequest { message: String },
}

impl TrafficError {
    pub fn transport(attempts: u32, source: impl std::fmt::Display) -> Self {
        Self::TransportFailure {
            attempts,
            message: source.to_string(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::RemoteRejection {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRangeRequest {
            message: message.into(),
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_are_distinct() {
        let notices = [
            TrafficError::transport(3, "connection refused").to_string(),
            TrafficError::rejected("bad id").to_string(),
            TrafficError::malformed("expected array").to_string(),
            TrafficError::out_of_range("year 2017").to_string(),
        ];

        for (i, a) in notices.iter().enumerate() {
            for b in notices.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert!(notices[0].contains("3 attempt(s)"));
        assert!(notices[0].contains("connection refused"));
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(TrafficError::transport(1, "timeout").is_retryable());
        assert!(!TrafficError::rejected("nope").is_retryable());
        assert!(!TrafficError::out_of_range("nope").is_retryable());
    }
}
