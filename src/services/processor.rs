//! Upload processing collaborator

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::neutral::RequestBody;
use crate::uploads::ExtractedFile;

/// Failure reported by a processor. Only `public_message` ever reaches a client.
#[derive(Debug, thiserror::Error)]
#[error("{public_message}")]
pub struct ProcessingError {
    public_message: String,
    internal: Option<String>,
}

impl ProcessingError {
    pub fn new(public_message: impl Into<String>) -> Self {
        Self {
            public_message: public_message.into(),
            internal: None,
        }
    }

    /// Attach detail for the error log
    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal = Some(internal.into());
        self
    }

    pub fn public_message(&self) -> &str {
        &self.public_message
    }

    pub fn internal(&self) -> Option<&str> {
        self.internal.as_deref()
    }
}

#[async_trait]
pub trait UnifiedProcessor: Send + Sync {
    /// Turn the decoded body and validated files into a JSON result
    async fn process(
        &self,
        body: &RequestBody,
        files: &[ExtractedFile],
    ) -> Result<Value, ProcessingError>;
}

/// Default processor: reads every upload back and reports what arrived
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryProcessor;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileSummary<'a> {
    field_name: &'a str,
    filename: &'a str,
    mime_type: &'a str,
    size: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    success: bool,
    processed_at: String,
    file_count: usize,
    total_bytes: u64,
    files: Vec<FileSummary<'a>>,
    fields: Value,
}

#[async_trait]
impl UnifiedProcessor for SummaryProcessor {
    async fn process(
        &self,
        body: &RequestBody,
        files: &[ExtractedFile],
    ) -> Result<Value, ProcessingError> {
        let mut total_bytes = 0;
        for file in files {
            let data = file.payload().bytes().await.map_err(|e| {
                ProcessingError::new("Uploaded file could not be read")
                    .with_internal(format!("{}: {e}", file.original_filename()))
            })?;
            total_bytes += data.len() as u64;
        }

        let summary = Summary {
            success: true,
            processed_at: crate::handlers::timestamp(),
            file_count: files.len(),
            total_bytes,
            files: files
                .iter()
                .map(|f| FileSummary {
                    field_name: f.field_name(),
                    filename: f.original_filename(),
                    mime_type: f.mime_type(),
                    size: f.size(),
                })
                .collect(),
            fields: body.to_json(),
        };
        serde_json::to_value(summary)
            .map_err(|e| ProcessingError::new("Result could not be encoded").with_internal(e.to_string()))
    }
}
