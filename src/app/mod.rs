//! Application factory and request pipeline
//!
//! `create_application` wires configuration and collaborators into a
//! `WiredApplication` once per execution context. Every call then runs the
//! same fixed pipeline regardless of hosting model:
//!
//! 1. CORS headers (and `OPTIONS` preflight)
//! 2. route matching
//! 3. upload extraction for the processing route
//! 4. the handler
//! 5. the terminal error handler, which observes every outcome

mod cors;
mod routes;

use std::sync::Arc;

use hyper::Method;

pub use cors::CorsPolicy;
pub use routes::{match_route, Endpoint};

use crate::adapter::{self, PlatformAdapter, PlatformKind};
use crate::config::Config;
use crate::error::AppError;
use crate::handlers;
use crate::logger;
use crate::neutral::{NeutralRequest, NeutralResponse};
use crate::services::Collaborators;
use crate::uploads::{self, UploadLimits};

/// A fully configured application, shared read-only by every call
pub struct WiredApplication {
    adapter: Arc<dyn PlatformAdapter>,
    cors: CorsPolicy,
    upload_limits: UploadLimits,
    max_body_size: u64,
    server_name: String,
    access_log_format: Option<String>,
    collaborators: Collaborators,
}

/// Build the application for the configured hosting model
///
/// Fails when the CORS origin is not a valid header value or the upload
/// scratch directory cannot be prepared.
pub fn create_application(
    config: &Config,
    collaborators: Collaborators,
) -> Result<WiredApplication, AppError> {
    let adapter = adapter::resolve(config)?;
    let cors = CorsPolicy::new(&config.cors)?;

    Ok(WiredApplication {
        adapter,
        cors,
        upload_limits: UploadLimits::from(&config.uploads),
        max_body_size: config.http.max_body_size,
        server_name: config.http.server_name.clone(),
        access_log_format: config
            .logging
            .access_log
            .then(|| config.logging.access_log_format.clone()),
        collaborators,
    })
}

impl WiredApplication {
    pub fn platform(&self) -> PlatformKind {
        self.adapter.kind()
    }

    pub fn adapter(&self) -> &dyn PlatformAdapter {
        self.adapter.as_ref()
    }

    /// Limit the adapters apply while reading a body
    pub const fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Access log format, `None` when access logging is off
    pub fn access_log_format(&self) -> Option<&str> {
        self.access_log_format.as_deref()
    }

    /// Run one call through the pipeline
    ///
    /// `adapted` is the adapter's translation of the native request; a
    /// translation failure still gets CORS headers and a classified error
    /// response. Body problems arrive inside the request and only surface on
    /// routes that read the body.
    pub async fn dispatch(
        &self,
        adapted: Result<NeutralRequest, AppError>,
        mut res: NeutralResponse,
    ) {
        let outcome = match self.cors.apply(&mut res) {
            Err(e) => Err(e),
            Ok(()) => match adapted {
                Ok(req) => self.route(req, &mut res).await,
                Err(e) => Err(e),
            },
        };
        // Uploads (and any spilled temp files) were dropped with the request
        self.finish(outcome, &mut res);
    }

    async fn route(&self, req: NeutralRequest, res: &mut NeutralResponse) -> Result<(), AppError> {
        if req.method() == Method::OPTIONS {
            return self.cors.preflight(&req, res);
        }

        let Some(endpoint) = match_route(req.method(), req.path()) else {
            return Err(AppError::NotFound {
                path: req.path().to_string(),
            });
        };

        match endpoint {
            Endpoint::Greeting => handlers::handle_greeting(&req, res).await,
            Endpoint::Health => handlers::handle_health(&req, res, self.platform()).await,
            Endpoint::Process => {
                // Nothing is decoded or spilled for a caller that is already gone
                if req.is_cancelled() {
                    return Ok(());
                }
                // Method is checked before the body, so a bad body on a
                // non-POST call still gets 405 from the handler
                let req = if req.method() == Method::POST {
                    req.body().check()?;
                    uploads::extract(req, &self.upload_limits, self.adapter.upload_storage())
                        .await?
                } else {
                    req
                };
                handlers::handle_unified_processing(
                    &req,
                    res,
                    self.collaborators.processor.as_ref(),
                    &self.upload_limits.field_name,
                )
                .await
            }
            Endpoint::SpaFallback => {
                handlers::handle_spa_fallback(&req, res, self.collaborators.assets.as_ref()).await
            }
        }
    }

    /// Terminal error handler
    fn finish(&self, outcome: Result<(), AppError>, res: &mut NeutralResponse) {
        let err = match outcome {
            Ok(()) if res.is_sent() => return,
            Ok(()) if res.is_cancelled() => {
                logger::log_debug("Call cancelled before a response was produced");
                return;
            }
            Ok(()) => AppError::unclassified("handler finished without sending a response"),
            Err(e) if res.is_sent() => {
                logger::log_error(&format!("Error after response was sent: {e}"));
                return;
            }
            Err(e) => e,
        };

        match &err {
            AppError::Unclassified { message } => {
                logger::log_error(&format!("[{}] {message}", self.platform()));
            }
            other => logger::log_debug(&format!("[{}] Request failed: {other}", self.platform())),
        }

        res.set_status(err.status());
        if let Err(e) = res.send_json(&err.envelope()) {
            logger::log_error(&format!("Failed to send error response: {e}"));
        }
    }
}

impl std::fmt::Debug for WiredApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WiredApplication")
            .field("platform", &self.platform())
            .field("cors", &self.cors)
            .field("upload_limits", &self.upload_limits)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::services::{StaticDirResolver, SummaryProcessor};

    /// Native (in-memory uploads) application over a temp frontend build
    pub fn application() -> (tempfile::TempDir, WiredApplication) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>spa</html>").unwrap();

        let config = Config::defaults().unwrap();
        let collaborators = Collaborators {
            processor: Arc::new(SummaryProcessor),
            assets: Arc::new(StaticDirResolver::new(dir.path(), "index.html")),
        };
        (dir, create_application(&config, collaborators).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::application;
    use super::*;
    use crate::handlers::testing::{request, request_with_body, response, Captured};
    use crate::neutral::{CancellationFlag, RequestBody, RequestHead};
    use crate::uploads::multipart::build_body;
    use hyper::body::Bytes;
    use hyper::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW};
    use std::collections::HashMap;

    const BOUNDARY: &str = "----portable";
    const MIB: usize = 1024 * 1024;

    fn upload(files: &[(&str, &str, Vec<u8>)]) -> NeutralRequest {
        let parts: Vec<(&str, Option<&str>, &str, &[u8])> = files
            .iter()
            .map(|(name, mime, data)| ("files", Some(*name), *mime, data.as_slice()))
            .collect();
        let head = RequestHead {
            method: Method::POST,
            path: "/api/process".to_string(),
            headers: HashMap::from([(
                "content-type".to_string(),
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )]),
            query: HashMap::new(),
        };
        NeutralRequest::new(
            head,
            RequestBody::Raw(Bytes::from(build_body(BOUNDARY, &parts))),
            CancellationFlag::new(),
        )
    }

    async fn run(app: &WiredApplication, req: Result<NeutralRequest, AppError>) -> Captured {
        let (res, captured) = response();
        app.dispatch(req, res).await;
        captured
    }

    #[tokio::test]
    async fn test_jpeg_upload_is_processed() {
        let (_dir, app) = application();
        let captured = run(&app, Ok(upload(&[("photo.jpg", "image/jpeg", vec![0xAB; 2 * MIB])]))).await;

        let (status, body) = captured.json();
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["fileCount"], 1);
        assert_eq!(body["totalBytes"], 2 * MIB);
        assert_eq!(body["files"][0]["filename"], "photo.jpg");
        assert_eq!(body["files"][0]["mimeType"], "image/jpeg");
    }

    #[tokio::test]
    async fn test_oversized_file_then_retry() {
        let (_dir, app) = application();

        let captured = run(&app, Ok(upload(&[("big.png", "image/png", vec![0; 10 * MIB + 1])]))).await;
        let (status, body) = captured.json();
        assert_eq!(status, 400);
        assert_eq!(body["error"], "File too large");

        let captured = run(&app, Ok(upload(&[("ok.png", "image/png", vec![0; MIB])]))).await;
        assert_eq!(captured.json().0, 200);
    }

    #[tokio::test]
    async fn test_eleven_files_rejected() {
        let (_dir, app) = application();
        let files: Vec<_> = (0..11)
            .map(|i| (format!("{i}.jpg"), "image/jpeg", vec![1_u8; 16]))
            .collect();
        let files: Vec<(&str, &str, Vec<u8>)> = files
            .iter()
            .map(|(n, m, d)| (n.as_str(), *m, d.clone()))
            .collect();

        let (status, body) = run(&app, Ok(upload(&files))).await.json();
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Too many files");
    }

    #[tokio::test]
    async fn test_gif_rejected_naming_type() {
        let (_dir, app) = application();
        let (status, body) = run(&app, Ok(upload(&[("anim.gif", "image/gif", vec![1; 8])])))
            .await
            .json();
        assert_eq!(status, 400);
        assert!(body["details"].as_str().unwrap().contains("image/gif"));
    }

    #[tokio::test]
    async fn test_process_requires_post() {
        let (_dir, app) = application();
        let captured = run(&app, Ok(request(Method::GET, "/api/process"))).await;
        let committed = captured.take();
        assert_eq!(committed.status.as_u16(), 405);
        assert_eq!(committed.headers[ALLOW], "POST");
        assert_eq!(committed.headers[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_post_without_files() {
        let (_dir, app) = application();
        let (status, body) = run(&app, Ok(request(Method::POST, "/api/process"))).await.json();
        assert_eq!(status, 400);
        assert_eq!(body["error"], "No files uploaded");
    }

    #[tokio::test]
    async fn test_greeting_and_spa_fallback() {
        let (_dir, app) = application();
        let (status, body) = run(&app, Ok(request(Method::GET, "/api/hello"))).await.json();
        assert_eq!(status, 200);
        assert!(body["timestamp"].is_string());

        let committed = run(&app, Ok(request(Method::GET, "/unknown/path"))).await.take();
        assert_eq!(committed.status.as_u16(), 200);
        assert_eq!(committed.body, Bytes::from_static(b"<html>spa</html>"));
    }

    #[tokio::test]
    async fn test_unmatched_non_get_is_404_json() {
        let (_dir, app) = application();
        let (status, body) = run(&app, Ok(request(Method::DELETE, "/api/hello"))).await.json();
        assert_eq!(status, 404);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn test_adapter_failure_is_classified() {
        let (_dir, app) = application();
        let (status, body) = run(&app, Err(AppError::BodyTooLarge { limit: 10 })).await.json();
        assert_eq!(status, 413);
        assert_eq!(body["error"], "Payload too large");
    }

    #[tokio::test]
    async fn test_rejected_body_ignored_until_read() {
        let (_dir, app) = application();
        let bad_json = || RequestBody::Rejected(AppError::bad_body("Invalid JSON"));
        let too_large = || RequestBody::Rejected(AppError::BodyTooLarge { limit: 10 });

        let put = request_with_body(Method::PUT, "/api/process", bad_json());
        let committed = run(&app, Ok(put)).await.take();
        assert_eq!(committed.status.as_u16(), 405);
        assert_eq!(committed.headers[ALLOW], "POST");

        let get = request_with_body(Method::GET, "/api/process", too_large());
        assert_eq!(run(&app, Ok(get)).await.json().0, 405);

        let hello = request_with_body(Method::GET, "/api/hello", bad_json());
        assert_eq!(run(&app, Ok(hello)).await.json().0, 200);

        let post = request_with_body(Method::POST, "/api/process", bad_json());
        let (status, body) = run(&app, Ok(post)).await.json();
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Invalid request body");

        let post = request_with_body(Method::POST, "/api/process", too_large());
        assert_eq!(run(&app, Ok(post)).await.json().0, 413);
    }

    #[tokio::test]
    async fn test_preflight_answered_before_routing() {
        let (_dir, app) = application();
        let committed = run(&app, Ok(request(Method::OPTIONS, "/api/process"))).await.take();
        assert_eq!(committed.status.as_u16(), 204);
    }

    #[test]
    fn test_invalid_origin_fails_construction() {
        let mut config = Config::defaults().unwrap();
        config.cors.frontend_url = "http://bad\norigin".to_string();
        let collaborators = Collaborators::from_config(&config);
        assert!(create_application(&config, collaborators).is_err());
    }
}
