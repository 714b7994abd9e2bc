//! Platform-independent, write-once response
//!
//! Handlers set status and headers, then send exactly one body. The body is
//! committed to a platform sink supplied by the adapter.

use std::path::Path;

use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;

use super::cancel::CancellationFlag;
use crate::error::AppError;
use crate::logger;

/// Final response handed to a platform sink
#[derive(Debug, Clone)]
pub struct CommittedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Platform-native destination for a committed response
pub trait ResponseSink: Send {
    fn commit(&mut self, response: CommittedResponse) -> Result<(), AppError>;
}

pub struct NeutralResponse {
    status: StatusCode,
    headers: HeaderMap,
    sink: Box<dyn ResponseSink>,
    cancellation: CancellationFlag,
    sent: bool,
}

impl NeutralResponse {
    pub fn new(sink: Box<dyn ResponseSink>, cancellation: CancellationFlag) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            sink,
            cancellation,
            sent: false,
        }
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub const fn is_sent(&self) -> bool {
        self.sent
    }

    /// The caller is gone; sends will be dropped
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Ignored once a body has been sent
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        if self.sent {
            logger::log_warning(&format!("Status {status} set after response was sent"));
        } else {
            self.status = status;
        }
        self
    }

    /// Ignored once a body has been sent; invalid names or values are errors
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, AppError> {
        if self.sent {
            logger::log_warning(&format!("Header '{name}' set after response was sent"));
            return Ok(self);
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::unclassified(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::unclassified(format!("invalid value for '{name}': {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn send_json<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<(), AppError> {
        let json = serde_json::to_vec(body)
            .map_err(|e| AppError::unclassified(format!("failed to serialize response: {e}")))?;
        self.send_raw(Bytes::from(json), "application/json")
    }

    pub fn send_raw(&mut self, body: Bytes, content_type: &str) -> Result<(), AppError> {
        let content_type = HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        self.deliver(body, Some(content_type))
    }

    /// Send status and headers with no body and no Content-Type
    pub fn send_empty(&mut self) -> Result<(), AppError> {
        self.deliver(Bytes::new(), None)
    }

    fn deliver(&mut self, body: Bytes, content_type: Option<HeaderValue>) -> Result<(), AppError> {
        if self.sent {
            return Err(AppError::unclassified("response body already sent"));
        }
        self.sent = true;

        // Nobody is listening any more; the write is dropped, not an error
        if self.cancellation.is_cancelled() {
            logger::log_debug("Skipping response write for cancelled call");
            return Ok(());
        }

        if let Some(content_type) = content_type {
            self.headers.insert(CONTENT_TYPE, content_type);
        }

        self.sink.commit(CommittedResponse {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body,
        })
    }

    /// Send a file from disk as the body
    pub async fn stream_file(&mut self, path: &Path, content_type: &str) -> Result<(), AppError> {
        if self.sent {
            return Err(AppError::unclassified("response body already sent"));
        }
        let data = tokio::fs::read(path).await.map_err(|e| {
            AppError::unclassified(format!("failed to read '{}': {e}", path.display()))
        })?;
        self.send_raw(Bytes::from(data), content_type)
    }
}

impl std::fmt::Debug for NeutralResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeutralResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<CommittedResponse>>>);

    impl ResponseSink for RecordingSink {
        fn commit(&mut self, response: CommittedResponse) -> Result<(), AppError> {
            self.0.lock().unwrap().push(response);
            Ok(())
        }
    }

    fn response() -> (NeutralResponse, RecordingSink, CancellationFlag) {
        let sink = RecordingSink::default();
        let flag = CancellationFlag::new();
        (
            NeutralResponse::new(Box::new(sink.clone()), flag.clone()),
            sink,
            flag,
        )
    }

    #[test]
    fn test_send_json_commits_once() {
        let (mut res, sink, _) = response();
        res.set_status(StatusCode::CREATED);
        res.set_header("X-Trace", "abc").unwrap();
        res.send_json(&serde_json::json!({"ok": true})).unwrap();

        let committed = sink.0.lock().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].status, StatusCode::CREATED);
        assert_eq!(committed[0].headers["x-trace"], "abc");
        assert_eq!(committed[0].headers[CONTENT_TYPE], "application/json");
        assert_eq!(committed[0].body, Bytes::from_static(br#"{"ok":true}"#));
    }

    #[test]
    fn test_second_send_is_rejected() {
        let (mut res, sink, _) = response();
        res.send_raw(Bytes::from_static(b"one"), "text/plain").unwrap();
        assert!(res.send_raw(Bytes::from_static(b"two"), "text/plain").is_err());

        res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_send_after_cancel_is_noop() {
        let (mut res, sink, flag) = response();
        flag.cancel();
        res.send_json(&serde_json::json!({})).unwrap();
        assert!(res.is_sent());
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_empty_has_no_content_type() {
        let (mut res, sink, _) = response();
        res.set_status(StatusCode::NO_CONTENT);
        res.send_empty().unwrap();
        let committed = sink.0.lock().unwrap();
        assert_eq!(committed[0].status, StatusCode::NO_CONTENT);
        assert!(!committed[0].headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_invalid_header_value_is_error() {
        let (mut res, _, _) = response();
        assert!(res.set_header("x-bad", "line\nbreak").is_err());
    }

    #[tokio::test]
    async fn test_stream_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<html></html>").unwrap();

        let (mut res, sink, _) = response();
        res.stream_file(&path, "text/html; charset=utf-8")
            .await
            .unwrap();
        let committed = sink.0.lock().unwrap();
        assert_eq!(committed[0].body, Bytes::from_static(b"<html></html>"));
    }
}
