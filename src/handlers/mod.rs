//! Request handlers
//!
//! Handlers see only `NeutralRequest` and `NeutralResponse`; they never know
//! which hosting model delivered the call. Each either sends exactly one
//! response or returns an `AppError` for the terminal error handler.

mod process;
mod spa;

pub use process::handle_unified_processing;
pub use spa::handle_spa_fallback;

use chrono::{SecondsFormat, Utc};
use hyper::body::Bytes;
use hyper::Method;
use serde_json::{json, Value};

use crate::adapter::PlatformKind;
use crate::error::AppError;
use crate::neutral::{NeutralRequest, NeutralResponse};

/// Current UTC time as RFC 3339 with millisecond precision
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /api/hello`
pub async fn handle_greeting(
    req: &NeutralRequest,
    res: &mut NeutralResponse,
) -> Result<(), AppError> {
    send_document(
        req,
        res,
        &json!({
            "message": "Hello from the portable API",
            "timestamp": timestamp(),
        }),
    )
}

/// `GET /health`
pub async fn handle_health(
    req: &NeutralRequest,
    res: &mut NeutralResponse,
    platform: PlatformKind,
) -> Result<(), AppError> {
    send_document(
        req,
        res,
        &json!({
            "status": "healthy",
            "timestamp": timestamp(),
            "platform": platform.name(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// JSON body for GET; HEAD gets the same headers and no body
fn send_document(
    req: &NeutralRequest,
    res: &mut NeutralResponse,
    document: &Value,
) -> Result<(), AppError> {
    if req.method() == Method::HEAD {
        return res.send_raw(Bytes::new(), "application/json");
    }
    res.send_json(document)
}
