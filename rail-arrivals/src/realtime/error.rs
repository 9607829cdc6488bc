//! Realtime feed error types.

use std::fmt;

/// Errors from fetching or decoding the realtime trip-update feed.
///
/// Every variant is transient from the poll loop's point of view: the
/// cycle keeps the last good data and tries again on the next tick.
#[derive(Debug)]
pub enum FeedError {
    /// HTTP request failed (network error, connection reset, etc.)
    Http(reqwest::Error),

    /// The request did not complete within the fetch timeout
    Timeout,

    /// Feed returned an error status code
    Status { status: u16, message: String },

    /// Credential rejected by the feed
    Unauthorized,

    /// Payload exceeded the size cap
    TooLarge { bytes: usize },

    /// Protobuf payload could not be decoded
    Protobuf(prost::DecodeError),

    /// JSON payload could not be decoded
    Json {
        message: String,
        body: Option<String>,
    },
}

impl FeedError {
    /// Returns true for malformed-payload errors, as opposed to transport
    /// failures.
    pub fn is_decode(&self) -> bool {
        matches!(self, FeedError::Protobuf(_) | FeedError::Json { .. })
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Http(e) => write!(f, "HTTP error: {e}"),
            FeedError::Timeout => write!(f, "feed request timed out"),
            FeedError::Status { status, message } => {
                write!(f, "feed returned status {status}")?;
                if !message.is_empty() {
                    write!(f, ": {message}")?;
                }
                Ok(())
            }
            FeedError::Unauthorized => write!(f, "unauthorized (check feed credentials)"),
            FeedError::TooLarge { bytes } => write!(f, "feed payload too large: {bytes} bytes"),
            FeedError::Protobuf(e) => write!(f, "protobuf decode error: {e}"),
            FeedError::Json { message, body } => {
                write!(f, "JSON decode error: {message}")?;
                if let Some(body) = body {
                    write!(f, " (body: {body})")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeedError::Http(e) => Some(e),
            FeedError::Protobuf(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Http(err)
        }
    }
}

impl From<prost::DecodeError> for FeedError {
    fn from(err: prost::DecodeError) -> Self {
        FeedError::Protobuf(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FeedError::Status {
            status: 503,
            message: String::new(),
        };
        assert_eq!(err.to_string(), "feed returned status 503");

        let err = FeedError::Status {
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(err.to_string(), "feed returned status 500: Internal Server Error");

        let err = FeedError::Json {
            message: "expected value".into(),
            body: Some("<html>".into()),
        };
        assert!(err.to_string().contains("expected value"));
        assert!(err.to_string().contains("<html>"));
    }

    #[test]
    fn decode_classification() {
        assert!(!FeedError::Timeout.is_decode());
        assert!(!FeedError::Unauthorized.is_decode());
        assert!(
            FeedError::Json {
                message: "x".into(),
                body: None
            }
            .is_decode()
        );
    }
}
