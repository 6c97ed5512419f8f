// Per-item error taxonomy for the moderation pipeline.
//
// Every failure that can happen to a single content item is one of these
// variants. The split that matters is transient vs. permanent: transient
// errors are retried by the retry policy, permanent ones fail the item
// immediately. Either way the error ends up in that item's result and never
// aborts the rest of the batch.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModerationError {
    /// The submission itself is unusable (missing content id, nothing to moderate).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The model answered, but with something we can't interpret.
    #[error("Malformed moderation payload: {0}")]
    MalformedPayload(String),

    /// Connection refused, DNS failure, reset mid-request, etc.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Moderation call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Remote 5xx.
    #[error("Moderation service returned {status}: {message}")]
    Server { status: u16, message: String },

    /// Remote 429.
    #[error("Moderation service rate limited the request (429)")]
    RateLimited,

    /// Remote 4xx other than 429; the request was refused as invalid.
    #[error("Moderation service rejected the request with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The content/user store could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The concurrency limiter was closed while the item was waiting for a slot.
    #[error("Moderation engine is shutting down")]
    Shutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ModerationError {
    /// Whether the failure is expected to clear up on its own.
    ///
    /// This is the default `should_retry` classifier for the retry policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModerationError::Network(_)
                | ModerationError::Timeout(_)
                | ModerationError::Server { .. }
                | ModerationError::RateLimited
                | ModerationError::StoreUnavailable(_)
        )
    }

    /// Map an HTTP status code from the moderation service onto the taxonomy.
    /// Returns `None` for success codes.
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(ModerationError::RateLimited),
            500..=599 => Some(ModerationError::Server {
                status,
                message: message.into(),
            }),
            _ => Some(ModerationError::Rejected {
                status,
                message: message.into(),
            }),
        }
    }

    /// Short machine-friendly label, used in logs and terminal output.
    pub fn kind(&self) -> &'static str {
        match self {
            ModerationError::Validation(_) => "validation",
            ModerationError::MalformedPayload(_) => "malformed_payload",
            ModerationError::Network(_) => "network",
            ModerationError::Timeout(_) => "timeout",
            ModerationError::Server { .. } => "server",
            ModerationError::RateLimited => "rate_limited",
            ModerationError::Rejected { .. } => "rejected",
            ModerationError::StoreUnavailable(_) => "store_unavailable",
            ModerationError::Shutdown => "shutdown",
            ModerationError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        assert!(ModerationError::Network("connection refused".into()).is_transient());
        assert!(ModerationError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(ModerationError::RateLimited.is_transient());
        assert!(ModerationError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(ModerationError::StoreUnavailable("db down".into()).is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert!(!ModerationError::Validation("missing content id".into()).is_transient());
        assert!(!ModerationError::MalformedPayload("bad json".into()).is_transient());
        assert!(!ModerationError::Rejected {
            status: 422,
            message: "unprocessable".into()
        }
        .is_transient());
        assert!(!ModerationError::Shutdown.is_transient());
        assert!(!ModerationError::Internal("panic".into()).is_transient());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ModerationError::from_status(200, ""), None);
        assert_eq!(
            ModerationError::from_status(429, "slow down"),
            Some(ModerationError::RateLimited)
        );
        assert!(ModerationError::from_status(502, "bad gateway")
            .unwrap()
            .is_transient());
        assert!(!ModerationError::from_status(400, "bad request")
            .unwrap()
            .is_transient());
        // 428 and 430 are plain 4xx, not rate limits
        assert!(matches!(
            ModerationError::from_status(428, ""),
            Some(ModerationError::Rejected { status: 428, .. })
        ));
    }
}
