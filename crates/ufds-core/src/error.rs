//! Domain error taxonomy for directory operations.
//!
//! Every failure that crosses the facade boundary is one of the variants
//! defined here. Protocol-level failures from the directory backend are
//! translated into this taxonomy before a caller ever sees them; no raw
//! transport error type escapes the facade.

use serde::Serialize;
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested entry or attribute does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or conflicting input (bad syntax, duplicate unique
    /// attribute, schema violation)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A required attribute is absent (schema violation sub-case of an
    /// invalid argument)
    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    /// Authentication material did not match
    #[error("The credentials provided are invalid")]
    InvalidCredentials,

    /// The caller may not perform this operation on this entry
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The client was constructed without bind credentials and cannot
    /// perform authenticated operations
    #[error("Directory client is not ready: {0}")]
    NotReady(String),

    /// Unrecognized backend failure, carrying the original message for
    /// diagnostics
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
    /// Optional request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::MissingAttribute(_) => "MISSING_ATTRIBUTE",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::NotAuthorized(_) => "NOT_AUTHORIZED",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::NotReady(_) => "NOT_READY",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        self.into_error_response_with_id(None)
    }

    /// Converts the error into an `ErrorResponse` with a request ID.
    #[must_use]
    pub fn into_error_response_with_id(self, request_id: Option<String>) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: None,
            },
            request_id,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::ConfigError(_))
    }

    /// Returns true if this error is a caller mistake rather than a
    /// backend failure.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::InvalidArgument(_)
                | Self::MissingAttribute(_)
                | Self::InvalidCredentials
                | Self::NotAuthorized(_)
        )
    }
}

// Conversions from external error types
impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Self::InvalidArgument(format!("invalid UUID: {err}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            Error::InvalidArgument("test".to_string()).error_code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            Error::MissingAttribute("login".to_string()).error_code(),
            "MISSING_ATTRIBUTE"
        );
        assert_eq!(Error::InvalidCredentials.error_code(), "INVALID_CREDENTIALS");
        assert_eq!(
            Error::NotAuthorized("test".to_string()).error_code(),
            "NOT_AUTHORIZED"
        );
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(Error::NotReady("test".to_string()).error_code(), "NOT_READY");
        assert_eq!(
            Error::Internal("test".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("account `alice` does not exist".to_string());
        assert_eq!(err.to_string(), "Not found: account `alice` does not exist");

        let err = Error::MissingAttribute("uuid".to_string());
        assert_eq!(err.to_string(), "Missing required attribute: uuid");
    }

    #[test]
    fn test_into_error_response() {
        let err = Error::NotFound("key-123".to_string());
        let response = err.clone().into_error_response();

        assert_eq!(response.error.code, "NOT_FOUND");
        assert_eq!(response.error.message, "Not found: key-123");
        assert!(response.request_id.is_none());

        let response_with_id = err.into_error_response_with_id(Some("req-456".to_string()));
        assert_eq!(response_with_id.request_id, Some("req-456".to_string()));
    }

    #[test]
    fn test_should_log() {
        assert!(Error::Internal("test".to_string()).should_log());
        assert!(Error::ConfigError("test".to_string()).should_log());

        assert!(!Error::NotFound("test".to_string()).should_log());
        assert!(!Error::InvalidCredentials.should_log());
    }

    #[test]
    fn test_is_caller_error() {
        assert!(Error::NotFound("test".to_string()).is_caller_error());
        assert!(Error::InvalidCredentials.is_caller_error());
        assert!(Error::MissingAttribute("cn".to_string()).is_caller_error());

        assert!(!Error::Internal("test".to_string()).is_caller_error());
        assert!(!Error::NotReady("test".to_string()).is_caller_error());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let domain_err: Error = err.into();
        assert!(matches!(domain_err, Error::ConfigError(_)));
    }

    #[test]
    fn test_from_uuid_error() {
        let err = uuid::Uuid::parse_str("not-a-uuid").unwrap_err();
        let domain_err: Error = err.into();
        assert!(matches!(domain_err, Error::InvalidArgument(_)));
        assert_eq!(domain_err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: ErrorDetail {
                code: "NOT_FOUND".to_string(),
                message: "Not found: test".to_string(),
                details: None,
            },
            request_id: Some("req-123".to_string()),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("NOT_FOUND"));
        assert!(json.contains("req-123"));
    }

    #[test]
    fn test_error_response_serialization_no_request_id() {
        let response = Error::InvalidCredentials.into_error_response();
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("request_id"));
    }
}
