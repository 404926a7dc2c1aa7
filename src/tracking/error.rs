//! Tracking error types.
//!
//! None of these ever reach the timer: the sync engine absorbs every
//! failure and turns it into a queued entry or a log line.

use thiserror::Error;

/// Errors that can occur while delivering a tracking entry.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Project name, API key or workspace id is missing.
    #[error("tracking configuration is incomplete")]
    NotConfigured,

    /// The request never got a response (DNS, connect, timeout).
    #[error("tracking request failed: {0}")]
    Network(String),

    /// The API answered with a non-success status.
    #[error("tracking API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The API answered with a body we could not understand.
    #[error("unexpected tracking API response: {0}")]
    Decode(String),
}

impl TrackingError {
    /// Returns true if a later retry has a reasonable chance to succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured | Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for TrackingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackingError::Status {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("bad key"));

        let err = TrackingError::Network("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_is_transient() {
        assert!(TrackingError::Network("x".into()).is_transient());
        assert!(TrackingError::Status {
            status: 503,
            message: "x".into()
        }
        .is_transient());
        assert!(TrackingError::Status {
            status: 429,
            message: "x".into()
        }
        .is_transient());
        assert!(!TrackingError::Status {
            status: 400,
            message: "x".into()
        }
        .is_transient());
        assert!(!TrackingError::NotConfigured.is_transient());
        assert!(!TrackingError::Decode("x".into()).is_transient());
    }
}
