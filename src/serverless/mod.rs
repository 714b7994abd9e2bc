//! Serverless-function entry point
//!
//! One `ExecutionContext` lives for the whole function instance. Each
//! invocation event is adapted, dispatched through the cached application,
//! and returned as a response document.

pub mod runtime;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::adapter::serverless::{self, ServerlessEvent, ServerlessResponse};
use crate::adapter::PlatformKind;
use crate::app::WiredApplication;
use crate::context::ExecutionContext;
use crate::error::AppError;
use crate::http;
use crate::logger::{self, AccessLogEntry};

/// Handle one invocation. Never fails: every outcome is a response document.
pub async fn invoke(context: &ExecutionContext, event: ServerlessEvent) -> ServerlessResponse {
    let started = Instant::now();
    let mut entry = AccessLogEntry::new(
        PlatformKind::ServerlessFunction.name(),
        event.http_method.to_ascii_uppercase(),
        event.path.clone(),
    );
    entry.request_id = event.request_id().map(ToString::to_string);
    entry.user_agent = event.headers.as_ref().and_then(|headers| {
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .map(|(_, value)| value.clone())
    });
    entry.query = event.query_string_parameters.as_ref().map(|params| {
        let mut pairs: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        pairs.join("&")
    });

    let (response, log_format) = match context.application().await {
        Ok(app) => {
            let format = app.access_log_format().map(ToString::to_string);
            (invoke_application(app, event).await, format)
        }
        Err(e) => (error_response(&e), Some("combined".to_string())),
    };

    if let Some(format) = log_format {
        entry.status = response.status_code;
        entry.body_bytes = response.body.len();
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &format);
    }
    response
}

async fn invoke_application(app: Arc<WiredApplication>, event: ServerlessEvent) -> ServerlessResponse {
    let cancellation = event.cancellation();
    let (tx, rx) = oneshot::channel();
    let res = serverless::wrap_response(tx, cancellation.clone());

    let task = tokio::spawn(async move {
        let adapted = serverless::adapt_request(event, app.max_body_size(), cancellation);
        app.dispatch(adapted, res).await;
    });

    if let Ok(response) = rx.await {
        return response;
    }
    let reason = match task.await {
        Err(e) if e.is_panic() => "invocation handler panicked",
        // Deadline passed or the platform aborted; nobody reads this
        _ => "invocation produced no response",
    };
    logger::log_error(reason);
    error_response(&AppError::unclassified(reason))
}

/// Response document carrying the JSON envelope for `err`
pub fn error_response(err: &AppError) -> ServerlessResponse {
    ServerlessResponse {
        status_code: err.status().as_u16(),
        headers: [("content-type".to_string(), "application/json".to_string())].into(),
        body: String::from_utf8_lossy(&http::error_body(err)).into_owned(),
        is_base64_encoded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::serverless::EventContext;
    use crate::app::create_application;
    use crate::config::Config;
    use crate::services::Collaborators;
    use crate::uploads::multipart::build_body;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BOUNDARY: &str = "----fn";
    const MIB: usize = 1024 * 1024;

    struct Fixture {
        scratch: tempfile::TempDir,
        _frontend: tempfile::TempDir,
        context: ExecutionContext,
        builds: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let scratch = tempfile::tempdir().unwrap();
        let frontend = tempfile::tempdir().unwrap();
        std::fs::write(frontend.path().join("index.html"), "<html>spa</html>").unwrap();

        let mut config = Config::defaults().unwrap();
        config.platform.kind = PlatformKind::ServerlessFunction;
        config.platform.ephemeral_dir = scratch.path().to_string_lossy().into_owned();
        config.static_files.dir = frontend.path().to_string_lossy().into_owned();

        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let context = ExecutionContext::new(
            PlatformKind::ServerlessFunction,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                create_application(&config, Collaborators::from_config(&config))
            }),
        );
        Fixture {
            scratch,
            _frontend: frontend,
            context,
            builds,
        }
    }

    fn get(path: &str) -> ServerlessEvent {
        ServerlessEvent {
            http_method: "GET".to_string(),
            path: path.to_string(),
            ..ServerlessEvent::default()
        }
    }

    fn upload(files: &[(&str, &str, Vec<u8>)]) -> ServerlessEvent {
        let parts: Vec<(&str, Option<&str>, &str, &[u8])> = files
            .iter()
            .map(|(name, mime, data)| ("files", Some(*name), *mime, data.as_slice()))
            .collect();
        ServerlessEvent {
            http_method: "POST".to_string(),
            path: "/api/process".to_string(),
            headers: Some(HashMap::from([(
                "Content-Type".to_string(),
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )])),
            body: Some(BASE64.encode(build_body(BOUNDARY, &parts))),
            is_base64_encoded: true,
            ..ServerlessEvent::default()
        }
    }

    fn json(response: &ServerlessResponse) -> serde_json::Value {
        serde_json::from_slice(&response.body_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_jpeg_upload_spills_and_cleans_up() {
        let fx = fixture();
        let response = invoke(&fx.context, upload(&[("photo.jpg", "image/jpeg", vec![7; 2 * MIB])])).await;

        assert_eq!(response.status_code, 200);
        let body = json(&response);
        assert_eq!(body["fileCount"], 1);
        assert_eq!(body["totalBytes"], 2 * MIB);
        assert_eq!(response.headers["access-control-allow-origin"], "http://localhost:3000");
        assert_eq!(std::fs::read_dir(fx.scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_then_compliant_retry() {
        let fx = fixture();
        let rejected = invoke(&fx.context, upload(&[("big.jpg", "image/jpeg", vec![0; 10 * MIB + 1])])).await;
        assert_eq!(rejected.status_code, 400);
        assert_eq!(json(&rejected)["error"], "File too large");

        let accepted = invoke(&fx.context, upload(&[("small.jpg", "image/jpeg", vec![0; 1024])])).await;
        assert_eq!(accepted.status_code, 200);
        assert_eq!(std::fs::read_dir(fx.scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_warm_invocations_reuse_application() {
        let fx = fixture();
        for _ in 0..3 {
            let response = invoke(&fx.context, get("/api/hello")).await;
            assert_eq!(response.status_code, 200);
            assert!(json(&response)["timestamp"].is_string());
        }
        assert_eq!(fx.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spa_fallback_and_method_check() {
        let fx = fixture();
        let spa = invoke(&fx.context, get("/unknown/path")).await;
        assert_eq!(spa.status_code, 200);
        assert_eq!(spa.body, "<html>spa</html>");

        let wrong_method = invoke(&fx.context, get("/api/process")).await;
        assert_eq!(wrong_method.status_code, 405);
        assert_eq!(wrong_method.headers["allow"], "POST");
    }

    #[tokio::test]
    async fn test_bad_json_on_non_post_keeps_405() {
        let fx = fixture();
        let mut event = get("/api/process");
        event.http_method = "PUT".to_string();
        event.headers = Some(HashMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]));
        event.body = Some("{oops".to_string());
        assert_eq!(invoke(&fx.context, event.clone()).await.status_code, 405);

        event.http_method = "GET".to_string();
        event.path = "/api/hello".to_string();
        assert_eq!(invoke(&fx.context, event).await.status_code, 200);
    }

    #[tokio::test]
    async fn test_head_document_has_no_body() {
        let fx = fixture();
        let mut event = get("/health");
        event.http_method = "HEAD".to_string();
        let response = invoke(&fx.context, event).await;
        assert_eq!(response.status_code, 200);
        assert!(response.body.is_empty());
        assert_eq!(response.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_expired_deadline_does_no_work() {
        let fx = fixture();
        let mut event = upload(&[("photo.jpg", "image/jpeg", vec![1; 64])]);
        event.request_context = Some(EventContext {
            request_id: Some("req-1".to_string()),
            deadline_ms: Some(chrono::Utc::now().timestamp_millis() - 1),
            aborted: false,
        });

        let response = invoke(&fx.context, event).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(std::fs::read_dir(fx.scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_factory_failure_is_500_and_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let config = Config::defaults().unwrap();
        let context = ExecutionContext::new(
            PlatformKind::ServerlessFunction,
            Box::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(AppError::unclassified("scratch directory not writable"));
                }
                create_application(&config, Collaborators::from_config(&config))
            }),
        );

        let failed = invoke(&context, get("/api/hello")).await;
        assert_eq!(failed.status_code, 500);
        assert_eq!(json(&failed)["error"], "Internal server error");

        let recovered = invoke(&context, get("/api/hello")).await;
        assert_eq!(recovered.status_code, 200);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
