//! CORS policy, computed once per application

use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, VARY,
};
use hyper::StatusCode;

use crate::config::CorsConfig;
use crate::error::AppError;
use crate::neutral::{NeutralRequest, NeutralResponse};

const ALLOWED_METHODS: &str = "GET, HEAD, POST, OPTIONS";
const DEFAULT_ALLOWED_HEADERS: &str = "Content-Type, Authorization";

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origin: String,
    max_age: String,
}

impl CorsPolicy {
    /// Fails when the configured origin cannot be sent as a header value
    pub fn new(config: &CorsConfig) -> Result<Self, AppError> {
        let origin = config.frontend_url.trim().trim_end_matches('/');
        if origin.is_empty() {
            return Err(AppError::unclassified("CORS origin is empty"));
        }
        HeaderValue::from_str(origin).map_err(|e| {
            AppError::unclassified(format!("invalid CORS origin '{origin}': {e}"))
        })?;
        Ok(Self {
            origin: origin.to_string(),
            max_age: config.max_age.to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Headers carried by every response, errors included
    pub fn apply(&self, res: &mut NeutralResponse) -> Result<(), AppError> {
        res.set_header(ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), &self.origin)?
            .set_header(ACCESS_CONTROL_ALLOW_CREDENTIALS.as_str(), "true")?
            .set_header(VARY.as_str(), "Origin")?;
        Ok(())
    }

    /// Answer an `OPTIONS` preflight with 204
    pub fn preflight(&self, req: &NeutralRequest, res: &mut NeutralResponse) -> Result<(), AppError> {
        let requested = req
            .header("access-control-request-headers")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(DEFAULT_ALLOWED_HEADERS);

        res.set_header(ACCESS_CONTROL_ALLOW_METHODS.as_str(), ALLOWED_METHODS)?
            .set_header(ACCESS_CONTROL_ALLOW_HEADERS.as_str(), requested)?
            .set_header(ACCESS_CONTROL_MAX_AGE.as_str(), &self.max_age)?
            .set_status(StatusCode::NO_CONTENT);
        res.send_empty()
    }
}
