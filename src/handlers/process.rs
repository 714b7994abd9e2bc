//! `/api/process`

use hyper::header::ALLOW;
use hyper::Method;

use crate::error::AppError;
use crate::logger;
use crate::neutral::{NeutralRequest, NeutralResponse};
use crate::services::UnifiedProcessor;

/// Validate the call and hand body plus files to the processor.
///
/// Uploads are already extracted and validated when this runs; an empty
/// `files()` means nothing was sent under the upload field.
pub async fn handle_unified_processing(
    req: &NeutralRequest,
    res: &mut NeutralResponse,
    processor: &dyn UnifiedProcessor,
    field_name: &str,
) -> Result<(), AppError> {
    if req.method() != Method::POST {
        res.set_header(ALLOW.as_str(), "POST")?;
        return Err(AppError::MethodNotAllowed {
            method: req.method().clone(),
            allowed: "POST",
        });
    }
    req.body().check()?;

    if req.files().is_empty() {
        return Err(AppError::MissingField {
            field: field_name.to_string(),
        });
    }

    if req.is_cancelled() {
        logger::log_debug(&format!(
            "Caller went away before processing {} file(s); skipping",
            req.files().len()
        ));
        return Ok(());
    }

    match processor.process(req.body(), req.files()).await {
        Ok(result) => res.send_json(&result),
        Err(e) => {
            logger::log_error(&format!(
                "Processing failed: {} ({})",
                e.public_message(),
                e.internal().unwrap_or("no internal detail")
            ));
            Err(AppError::ProcessingFailure {
                details: e.public_message().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{request, request_with_body, response};
    use crate::neutral::RequestBody;
    use crate::services::ProcessingError;
    use crate::uploads::ExtractedFile;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProcessor(AtomicUsize);

    #[async_trait]
    impl UnifiedProcessor for CountingProcessor {
        async fn process(
            &self,
            _body: &RequestBody,
            _files: &[ExtractedFile],
        ) -> Result<Value, ProcessingError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_non_post_is_405_with_allow() {
        let processor = CountingProcessor::default();
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let (mut res, _) = response();
            let err = handle_unified_processing(
                &request(method.clone(), "/api/process"),
                &mut res,
                &processor,
                "files",
            )
            .await
            .unwrap_err();

            assert_eq!(err, AppError::MethodNotAllowed { method, allowed: "POST" });
            assert_eq!(res.headers()[ALLOW], "POST");
        }
        assert_eq!(processor.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_post_without_files_is_missing_field() {
        let processor = CountingProcessor::default();
        let (mut res, _) = response();
        let err = handle_unified_processing(
            &request(Method::POST, "/api/process"),
            &mut res,
            &processor,
            "files",
        )
        .await
        .unwrap_err();

        assert_eq!(err, AppError::MissingField { field: "files".to_string() });
        assert!(!res.is_sent());
        assert_eq!(processor.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_body_reported_only_for_post() {
        let processor = CountingProcessor::default();
        let bad_json = || RequestBody::Rejected(AppError::bad_body("Invalid JSON"));

        let (mut res, _) = response();
        let err = handle_unified_processing(
            &request_with_body(Method::PUT, "/api/process", bad_json()),
            &mut res,
            &processor,
            "files",
        )
        .await
        .unwrap_err();
        assert_eq!(err.status().as_u16(), 405);

        let (mut res, _) = response();
        let err = handle_unified_processing(
            &request_with_body(Method::POST, "/api/process", bad_json()),
            &mut res,
            &processor,
            "files",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequestBody { .. }));
        assert_eq!(processor.0.load(Ordering::SeqCst), 0);
    }
}
