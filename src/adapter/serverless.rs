//! Serverless-function adapter: JSON invocation event in, JSON response document out
//!
//! The event follows the proxy-integration shape common to function platforms:
//! method, path, single-valued headers and query parameters, and a body that
//! may be base64 encoded.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hyper::body::Bytes;
use hyper::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::body;
use super::{PlatformAdapter, PlatformKind, UploadStorage};
use crate::error::AppError;
use crate::logger;
use crate::neutral::{
    CancellationFlag, CommittedResponse, NeutralRequest, NeutralResponse, RequestBody,
    RequestHead, ResponseSink,
};

#[derive(Debug)]
pub struct ServerlessAdapter {
    storage: UploadStorage,
}

impl ServerlessAdapter {
    /// Only `ephemeral_dir` is writable inside a function instance
    pub const fn new(ephemeral_dir: PathBuf) -> Self {
        Self {
            storage: UploadStorage::Disk(ephemeral_dir),
        }
    }
}

impl PlatformAdapter for ServerlessAdapter {
    fn kind(&self) -> PlatformKind {
        PlatformKind::ServerlessFunction
    }

    fn upload_storage(&self) -> &UploadStorage {
        &self.storage
    }
}

/// Inbound invocation event
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessEvent {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub request_context: Option<EventContext>,
}

/// Per-invocation platform metadata
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default)]
    pub request_id: Option<String>,
    /// Invocation deadline, milliseconds since the Unix epoch
    #[serde(default)]
    pub deadline_ms: Option<i64>,
    /// Set by the platform when the caller abandoned the invocation
    #[serde(default)]
    pub aborted: bool,
}

impl ServerlessEvent {
    pub fn request_id(&self) -> Option<&str> {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.request_id.as_deref())
    }

    /// Cancellation flag tied to the invocation deadline and abort marker
    pub fn cancellation(&self) -> CancellationFlag {
        let Some(ctx) = &self.request_context else {
            return CancellationFlag::new();
        };
        let flag = match ctx.deadline_ms {
            Some(deadline_ms) => {
                let remaining = deadline_ms - chrono::Utc::now().timestamp_millis();
                let remaining = Duration::from_millis(u64::try_from(remaining).unwrap_or(0));
                CancellationFlag::with_deadline(Instant::now() + remaining)
            }
            None => CancellationFlag::new(),
        };
        if ctx.aborted {
            flag.cancel();
        }
        flag
    }
}

/// Response document returned to the platform
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ServerlessResponse {
    /// Body bytes, undoing base64 when flagged
    pub fn body_bytes(&self) -> Vec<u8> {
        if self.is_base64_encoded {
            BASE64.decode(&self.body).unwrap_or_default()
        } else {
            self.body.clone().into_bytes()
        }
    }
}

impl From<CommittedResponse> for ServerlessResponse {
    fn from(response: CommittedResponse) -> Self {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &response.headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        let (body, is_base64_encoded) = match std::str::from_utf8(&response.body) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (BASE64.encode(&response.body), true),
        };

        Self {
            status_code: response.status.as_u16(),
            headers,
            body,
            is_base64_encoded,
        }
    }
}

/// Convert an invocation event into a `NeutralRequest`
///
/// Only an unusable method fails the conversion. Body problems travel with
/// the request as `RequestBody::Rejected`.
pub fn adapt_request(
    event: ServerlessEvent,
    max_body_size: u64,
    cancellation: CancellationFlag,
) -> Result<NeutralRequest, AppError> {
    let method = Method::from_bytes(event.http_method.to_ascii_uppercase().as_bytes())
        .map_err(|_| AppError::bad_body(format!("invalid HTTP method '{}'", event.http_method)))?;

    let headers = body::normalize_headers(
        event
            .headers
            .iter()
            .flatten()
            .map(|(name, value)| (name.as_str(), value.clone())),
    );

    let path = if event.path.is_empty() {
        "/".to_string()
    } else {
        event.path
    };
    let head = RequestHead {
        method,
        path,
        headers,
        query: event.query_string_parameters.unwrap_or_default(),
    };

    let raw = match event.body {
        None => Ok(Bytes::new()),
        Some(text) if event.is_base64_encoded => BASE64
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(|e| AppError::bad_body(format!("invalid base64 body: {e}"))),
        Some(text) => Ok(Bytes::from(text)),
    };
    let decoded = match raw {
        Err(e) => RequestBody::Rejected(e),
        Ok(raw) if raw.len() as u64 > max_body_size => RequestBody::Rejected(AppError::BodyTooLarge {
            limit: max_body_size,
        }),
        Ok(raw) => body::decode_body(head.headers.get("content-type").map(String::as_str), raw),
    };

    Ok(NeutralRequest::new(head, decoded, cancellation))
}

/// Sink handing the response document back to the invocation
pub struct FunctionSink {
    tx: Option<oneshot::Sender<ServerlessResponse>>,
}

impl ResponseSink for FunctionSink {
    fn commit(&mut self, response: CommittedResponse) -> Result<(), AppError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::unclassified("function sink committed twice"))?;
        if tx.send(response.into()).is_err() {
            logger::log_debug("Invocation finished before the response was written");
        }
        Ok(())
    }
}

pub fn wrap_response(
    tx: oneshot::Sender<ServerlessResponse>,
    cancellation: CancellationFlag,
) -> NeutralResponse {
    NeutralResponse::new(Box::new(FunctionSink { tx: Some(tx) }), cancellation)
}
