//! Error types for calendar backend operations.
//!
//! Every adapter reports failures as a [`BackendError`]. Callers never treat
//! one as fatal to a multi-account request: the aggregator turns it into an
//! `"{account}: {error}"` entry and carries on.

use std::fmt;
use thiserror::Error;

/// The category of a backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorCode {
    /// Credentials are missing, invalid or expired.
    AuthenticationFailed,
    /// The account lacks permission for the resource.
    AuthorizationFailed,
    /// Connection failure, DNS error or timeout.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// The server answered with a 5xx status.
    ServerError,
    /// The response could not be parsed.
    InvalidResponse,
    /// The event or calendar does not exist.
    NotFound,
    /// The request was rejected as malformed.
    BadRequest,
    /// The account configuration is missing or invalid.
    ConfigurationError,
    /// Calendar-level failure, e.g. the named collection is absent.
    CalendarError,
    /// The backend call exceeded its time budget.
    Timeout,
    /// Unexpected internal state.
    InternalError,
}

impl BackendErrorCode {
    /// Returns the snake_case identifier for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::CalendarError => "calendar_error",
            Self::Timeout => "timeout",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by a calendar backend.
#[derive(Debug, Error)]
pub struct BackendError {
    code: BackendErrorCode,
    message: String,
    /// The backend kind that raised it (`caldav`, `google`, `ews`).
    backend: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    pub fn new(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            backend: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::ConfigurationError, message)
    }

    pub fn calendar(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::CalendarError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::InternalError, message)
    }

    /// Tags the error with the backend kind that produced it.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> BackendErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.code == BackendErrorCode::NotFound
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref backend) = self.backend {
            write!(f, "[{}] ", backend)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_identifiers() {
        assert_eq!(
            BackendErrorCode::AuthenticationFailed.as_str(),
            "authentication_failed"
        );
        assert_eq!(BackendErrorCode::Timeout.to_string(), "timeout");
    }

    #[test]
    fn constructors_set_code_and_message() {
        let err = BackendError::not_found("Event not found: abc");
        assert_eq!(err.code(), BackendErrorCode::NotFound);
        assert_eq!(err.message(), "Event not found: abc");
        assert!(err.is_not_found());
        assert!(err.backend().is_none());
    }

    #[test]
    fn display_includes_backend_tag() {
        let err = BackendError::network("connection refused").with_backend("caldav");
        assert_eq!(err.to_string(), "[caldav] network_error: connection refused");

        let plain = BackendError::configuration("missing url");
        assert_eq!(plain.to_string(), "configuration_error: missing url");
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = BackendError::internal("cannot read token").with_source(io_err);
        assert!(err.source().is_some());
    }
}
