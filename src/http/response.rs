//! Response building outside the neutral pipeline
//!
//! Used where no `NeutralResponse` exists any more: the dispatch task
//! panicked, the application could not be built, or a handler finished
//! without committing anything.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, SERVER};
use hyper::{Response, StatusCode};

use crate::error::AppError;
use crate::logger;

const FALLBACK_BODY: &[u8] = br#"{"error":"Internal server error"}"#;

/// JSON error envelope bytes for `err`
pub fn error_body(err: &AppError) -> Bytes {
    serde_json::to_vec(&err.envelope()).map_or_else(
        |e| {
            logger::log_error(&format!("Failed to serialize error envelope: {e}"));
            Bytes::from_static(FALLBACK_BODY)
        },
        Bytes::from,
    )
}

/// Native JSON error response for `err`
pub fn build_error_response(err: &AppError, server_name: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(err.status())
        .header(CONTENT_TYPE, "application/json")
        .header(SERVER, server_name)
        .body(Full::new(error_body(err)))
        .unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to build error response: {e}"));
            let mut fallback = Response::new(Full::new(Bytes::from_static(FALLBACK_BODY)));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
