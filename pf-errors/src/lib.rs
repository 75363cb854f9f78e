//! Shared error taxonomy for the personal-finance backend.
//!
//! Every fallible operation across the workspace returns [`Error`]. The
//! variants mirror the kinds from the error-handling design: each carries
//! only what is safe to cross the trust boundary. The underlying cause of
//! an [`Error::Internal`] is never part of the value itself — it is logged
//! at the point of conversion via [`Error::internal`] and discarded.

use std::fmt;

/// The finite set of error kinds a caller-facing operation can surface.
///
/// Transport layers (out of scope here) map these to status codes; see
/// the design notes for the canonical mapping (`ValidationError`->400,
/// `Unauthenticated`->401, `Forbidden`->403, `NotFound`->404,
/// `Conflict`->409, `RateLimited`->429, everything else->500).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    UndoExpired,
    RateLimited,
    ExternalUnavailable,
    Internal,
}

/// A business error, tagged with its [`ErrorKind`] and a caller-safe
/// message. Construct via the associated functions rather than the
/// variants directly so call sites read as intent ("not found", "rate
/// limited") instead of string literals.
#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    retry_after_secs: Option<u64>,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_secs
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unauthenticated,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Forbidden,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn undo_expired() -> Self {
        Self {
            kind: ErrorKind::UndoExpired,
            message: "undo window has elapsed".to_string(),
            retry_after_secs: None,
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: "rate limit exceeded".to_string(),
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn external_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ExternalUnavailable,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Build an `Internal` error, logging `cause` server-side. `cause` is
    /// never reachable from the returned value — only a generic message
    /// crosses the trust boundary.
    #[track_caller]
    pub fn internal(cause: impl fmt::Display) -> Self {
        let location = std::panic::Location::caller();
        tracing::error!(target: "pf::errors", %cause, %location, "internal error");
        Self {
            kind: ErrorKind::Internal,
            message: "internal error".to_string(),
            retry_after_secs: None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_the_only_thing_displayed() {
        let err = Error::internal("postgres connection reset by peer");
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = Error::rate_limited(30);
        assert_eq!(err.retry_after_secs(), Some(30));
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }
}
