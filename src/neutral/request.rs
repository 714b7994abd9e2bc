//! Platform-independent inbound request

use std::collections::HashMap;

use hyper::body::Bytes;
use hyper::Method;
use serde_json::Value;

use super::cancel::CancellationFlag;
use crate::error::AppError;
use crate::uploads::ExtractedFile;

/// Decoded request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    /// Declared JSON and parsed, or multipart text fields collected into an object
    Json(Value),
    /// Anything else, untouched
    Raw(Bytes),
    /// The body could not be read or decoded. Only routes that consume the
    /// body report this; everything else ignores it.
    Rejected(AppError),
}

impl RequestBody {
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// JSON view of the body as handed to collaborators: `{}` when empty, `null` when raw
    pub fn to_json(&self) -> Value {
        match self {
            Self::Empty => Value::Object(serde_json::Map::new()),
            Self::Json(v) => v.clone(),
            Self::Raw(_) | Self::Rejected(_) => Value::Null,
        }
    }

    /// Fail with the adapter's error when the body was rejected
    pub fn check(&self) -> Result<(), AppError> {
        match self {
            Self::Rejected(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

/// Method, path, headers and query of a request, already normalized by an adapter
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    /// Lower-cased names
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

/// One inbound call. Never mutated after construction; upload extraction
/// consumes a request and returns a new one.
#[derive(Debug)]
pub struct NeutralRequest {
    head: RequestHead,
    body: RequestBody,
    files: Vec<ExtractedFile>,
    cancellation: CancellationFlag,
}

impl NeutralRequest {
    pub fn new(head: RequestHead, body: RequestBody, cancellation: CancellationFlag) -> Self {
        Self {
            head,
            body,
            files: Vec::new(),
            cancellation,
        }
    }

    pub const fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head
            .headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.head.headers
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.head.query.get(name).map(String::as_str)
    }

    pub const fn query_params(&self) -> &HashMap<String, String> {
        &self.head.query
    }

    /// Content type without parameters, lower-cased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type").map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub const fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn files(&self) -> &[ExtractedFile] {
        &self.files
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub const fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    /// Raw multipart bytes, if this request carries an undecoded body
    pub(crate) const fn raw_body(&self) -> Option<&Bytes> {
        match &self.body {
            RequestBody::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Rebuild the request around extracted uploads
    pub(crate) fn with_uploads(self, body: RequestBody, files: Vec<ExtractedFile>) -> Self {
        Self {
            head: self.head,
            body,
            files,
            cancellation: self.cancellation,
        }
    }
}
