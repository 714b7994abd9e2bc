//! Error taxonomy module
//!
//! Every failure a request can hit is one `AppError` variant carrying a
//! structured payload. The terminal error handler classifies by variant,
//! never by inspecting message text.

use hyper::{Method, StatusCode};
use serde::Serialize;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AppError {
    /// Body claimed a content type it does not satisfy (bad JSON, bad multipart, bad base64)
    #[error("malformed request body: {reason}")]
    BadRequestBody { reason: String },

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("method {method} not allowed (allowed: {allowed})")]
    MethodNotAllowed {
        method: Method,
        allowed: &'static str,
    },

    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("unexpected file field '{field}'")]
    UnexpectedField { field: String },

    #[error("file '{filename}' is {size} bytes (limit {limit})")]
    FileTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    #[error("{count} files uploaded (limit {limit})")]
    TooManyFiles { count: usize, limit: usize },

    #[error("file '{filename}' has unsupported type {mime}")]
    UnsupportedFileType { filename: String, mime: String },

    #[error("no route for {path}")]
    NotFound { path: String },

    /// The processing collaborator failed; `details` is its public message only
    #[error("processing failed: {details}")]
    ProcessingFailure { details: String },

    #[error("{message}")]
    Unclassified { message: String },
}

/// JSON error envelope: `{error, details?}`
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::Unclassified {
            message: message.into(),
        }
    }

    pub fn bad_body(reason: impl Into<String>) -> Self {
        Self::BadRequestBody {
            reason: reason.into(),
        }
    }

    /// HTTP status this error maps to
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequestBody { .. }
            | Self::MissingField { .. }
            | Self::UnexpectedField { .. }
            | Self::FileTooLarge { .. }
            | Self::TooManyFiles { .. }
            | Self::UnsupportedFileType { .. } => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ProcessingFailure { .. } | Self::Unclassified { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing envelope. `Unclassified` never leaks its message.
    pub fn envelope(&self) -> ErrorEnvelope {
        let (error, details) = match self {
            Self::BadRequestBody { reason } => ("Invalid request body", Some(reason.clone())),
            Self::BodyTooLarge { limit } => (
                "Payload too large",
                Some(format!("Request body exceeds the {limit} byte limit")),
            ),
            Self::MethodNotAllowed { method, allowed } => (
                "Method not allowed",
                Some(format!("{method} is not supported; use {allowed}")),
            ),
            Self::MissingField { field } => (
                "No files uploaded",
                Some(format!("Expected at least one file in field '{field}'")),
            ),
            Self::UnexpectedField { field } => (
                "Unexpected field",
                Some(format!("Files are not accepted in field '{field}'")),
            ),
            Self::FileTooLarge {
                filename,
                size,
                limit,
            } => (
                "File too large",
                Some(format!(
                    "File '{filename}' is {size} bytes; the limit is {limit} bytes"
                )),
            ),
            Self::TooManyFiles { count, limit } => (
                "Too many files",
                Some(format!("Received {count} files; at most {limit} are allowed")),
            ),
            Self::UnsupportedFileType { filename, mime } => (
                "Unsupported file type",
                Some(format!(
                    "Invalid file type for '{filename}': {mime} is not an accepted type"
                )),
            ),
            Self::NotFound { path } => ("Not found", Some(format!("No resource at {path}"))),
            Self::ProcessingFailure { details } => ("Processing failed", Some(details.clone())),
            Self::Unclassified { .. } => ("Internal server error", None),
        };
        ErrorEnvelope {
            error: error.to_string(),
            details,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::unclassified(format!("I/O error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_errors_are_client_errors() {
        let errors = [
            AppError::FileTooLarge {
                filename: "a.jpg".to_string(),
                size: 11,
                limit: 10,
            },
            AppError::TooManyFiles {
                count: 11,
                limit: 10,
            },
            AppError::UnsupportedFileType {
                filename: "a.gif".to_string(),
                mime: "image/gif".to_string(),
            },
        ];
        for err in errors {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn test_method_not_allowed_is_405() {
        let err = AppError::MethodNotAllowed {
            method: Method::GET,
            allowed: "POST",
        };
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_unclassified_hides_message() {
        let err = AppError::unclassified("database password is hunter2");
        let envelope = err.envelope();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(envelope.error, "Internal server error");
        assert!(envelope.details.is_none());
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_unsupported_type_names_mime() {
        let err = AppError::UnsupportedFileType {
            filename: "cat.gif".to_string(),
            mime: "image/gif".to_string(),
        };
        let details = err.envelope().details.unwrap();
        assert_eq!(
            details,
            "Invalid file type for 'cat.gif': image/gif is not an accepted type"
        );
    }
}
