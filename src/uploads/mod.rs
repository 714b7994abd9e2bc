//! Upload extraction
//!
//! Turns a request carrying a raw multipart body into a request carrying typed
//! `ExtractedFile`s, enforcing count, type, and size limits. Where the bytes
//! live (memory or a scratch directory) is decided by the platform adapter;
//! handlers only ever see an opaque payload.

pub mod multipart;

use std::io;

use hyper::body::Bytes;
use serde_json::{Map, Value};
use tempfile::TempPath;

use crate::adapter::UploadStorage;
use crate::config::UploadConfig;
use crate::error::AppError;
use crate::neutral::{NeutralRequest, RequestBody};

const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// Limits applied during extraction
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_file_size_bytes: u64,
    pub max_file_count: usize,
    /// Lower-cased MIME base types
    pub allowed_mime_types: Vec<String>,
    pub field_name: String,
}

impl From<&UploadConfig> for UploadLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes,
            max_file_count: config.max_file_count,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .collect(),
            field_name: config.field_name.clone(),
        }
    }
}

impl UploadLimits {
    fn allows(&self, mime: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime)
    }
}

#[derive(Debug)]
enum Stored {
    Memory(Bytes),
    /// Deleted from disk when dropped
    Spilled(TempPath),
}

/// Opaque byte source of one uploaded file
#[derive(Debug)]
pub struct Payload(Stored);

impl Payload {
    pub async fn bytes(&self) -> io::Result<Bytes> {
        match &self.0 {
            Stored::Memory(bytes) => Ok(bytes.clone()),
            Stored::Spilled(path) => tokio::fs::read(path).await.map(Bytes::from),
        }
    }

    pub const fn is_spilled(&self) -> bool {
        matches!(self.0, Stored::Spilled(_))
    }
}

/// One validated uploaded file. Only constructed by `extract`, so size, type
/// and count limits always hold.
#[derive(Debug)]
pub struct ExtractedFile {
    field_name: String,
    original_filename: String,
    mime_type: String,
    size: u64,
    payload: Payload,
}

impl ExtractedFile {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    pub const fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Whether the request declares a multipart form body
pub fn is_multipart(req: &NeutralRequest) -> bool {
    req.content_type().as_deref() == Some("multipart/form-data")
}

/// Extract uploads from a multipart request. Non-multipart requests pass
/// through untouched.
pub async fn extract(
    req: NeutralRequest,
    limits: &UploadLimits,
    storage: &UploadStorage,
) -> Result<NeutralRequest, AppError> {
    if !is_multipart(&req) {
        return Ok(req);
    }

    let content_type = req.header("content-type").unwrap_or_default();
    let boundary = multipart::boundary(content_type)
        .ok_or_else(|| AppError::bad_body("multipart request without a boundary"))?;
    let raw = req
        .raw_body()
        .ok_or_else(|| AppError::bad_body("multipart request with an empty body"))?;
    let parts = multipart::parse(raw, &boundary)?;

    // Count is checked before any single file is looked at
    let file_count = parts.iter().filter(|p| is_submitted_file(p)).count();
    if file_count > limits.max_file_count {
        return Err(AppError::TooManyFiles {
            count: file_count,
            limit: limits.max_file_count,
        });
    }

    if let Some(stray) = parts
        .iter()
        .find(|p| is_submitted_file(p) && p.name != limits.field_name)
    {
        return Err(AppError::UnexpectedField {
            field: stray.name.clone(),
        });
    }

    let mut fields = Map::new();
    let mut files = Vec::with_capacity(file_count);

    for part in parts {
        if !part.is_file() {
            fields.insert(
                part.name,
                Value::String(String::from_utf8_lossy(&part.data).into_owned()),
            );
            continue;
        }
        if !is_submitted_file(&part) {
            continue;
        }
        // Dropping `files` on any error below removes already spilled files
        files.push(store_file(part, limits, storage).await?);
    }

    let body = if fields.is_empty() {
        RequestBody::Empty
    } else {
        RequestBody::Json(Value::Object(fields))
    };
    Ok(req.with_uploads(body, files))
}

/// Browsers send an empty nameless file part when no file was chosen
fn is_submitted_file(part: &multipart::Part) -> bool {
    part.filename
        .as_deref()
        .is_some_and(|name| !name.is_empty() || !part.data.is_empty())
}

async fn store_file(
    part: multipart::Part,
    limits: &UploadLimits,
    storage: &UploadStorage,
) -> Result<ExtractedFile, AppError> {
    let filename = part.filename.unwrap_or_default();

    let mime_type = part
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string());
    if !limits.allows(&mime_type) {
        return Err(AppError::UnsupportedFileType {
            filename,
            mime: mime_type,
        });
    }

    let size = part.data.len() as u64;
    if size > limits.max_file_size_bytes {
        return Err(AppError::FileTooLarge {
            filename,
            size,
            limit: limits.max_file_size_bytes,
        });
    }

    let stored = match storage {
        UploadStorage::Memory => Stored::Memory(part.data),
        UploadStorage::Disk(dir) => {
            let path = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(dir)?
                .into_temp_path();
            tokio::fs::write(&path, &part.data).await?;
            Stored::Spilled(path)
        }
    };

    Ok(ExtractedFile {
        field_name: part.name,
        original_filename: filename,
        mime_type,
        size,
        payload: Payload(stored),
    })
}
