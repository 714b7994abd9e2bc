//! Framework-native adapter: hyper `Request` in, hyper `Response` out

use std::error::Error;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_LENGTH, SERVER};
use hyper::{Request, Response};
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
pub struct NativeAdapter {
    storage: UploadStorage,
}

impl NativeAdapter {
    pub const fn new(storage: UploadStorage) -> Self {
        Self { storage }
    }
}

impl PlatformAdapter for NativeAdapter {
    fn kind(&self) -> PlatformKind {
        PlatformKind::FrameworkNative
    }

    fn upload_storage(&self) -> &UploadStorage {
        &self.storage
    }
}

/// Convert a hyper request into a `NeutralRequest`, reading at most
/// `max_body_size` bytes of body
///
/// An oversized or malformed body does not fail the conversion; it is carried
/// as `RequestBody::Rejected` so routes that ignore the body still answer.
/// Only a body that stops arriving is an error here.
pub async fn adapt_request<B>(
    req: Request<B>,
    max_body_size: u64,
    cancellation: CancellationFlag,
) -> Result<NeutralRequest, AppError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let (parts, incoming) = req.into_parts();

    let headers = body::normalize_headers(
        parts
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned())),
    );
    let query = parts.uri.query().map(body::parse_query).unwrap_or_default();
    let head = RequestHead {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers,
        query,
    };

    let too_large = RequestBody::Rejected(AppError::BodyTooLarge {
        limit: max_body_size,
    });
    let declared_over = body::declared_length_exceeds(
        parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok()),
        max_body_size,
    );

    let decoded = if declared_over {
        too_large
    } else {
        let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
        match Limited::new(incoming, limit).collect().await {
            Ok(collected) => body::decode_body(
                head.headers.get("content-type").map(String::as_str),
                collected.to_bytes(),
            ),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => too_large,
            Err(e) => {
                // A body that stops arriving means the client went away
                cancellation.cancel();
                return Err(AppError::bad_body(format!("failed to read request body: {e}")));
            }
        }
    };

    Ok(NeutralRequest::new(head, decoded, cancellation))
}

/// Sink delivering the committed response to the connection task
pub struct HyperSink {
    tx: Option<oneshot::Sender<Response<Full<Bytes>>>>,
    server_name: HeaderValue,
}

impl ResponseSink for HyperSink {
    fn commit(&mut self, response: CommittedResponse) -> Result<(), AppError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::unclassified("hyper sink committed twice"))?;

        let mut native = into_hyper(response);
        native
            .headers_mut()
            .entry(SERVER)
            .or_insert_with(|| self.server_name.clone());

        if tx.send(native).is_err() {
            logger::log_debug("Client disconnected before the response was written");
        }
        Ok(())
    }
}

/// Wrap the connection task's response slot behind the neutral contract
pub fn wrap_response(
    tx: oneshot::Sender<Response<Full<Bytes>>>,
    cancellation: CancellationFlag,
    server_name: &str,
) -> NeutralResponse {
    let sink = HyperSink {
        tx: Some(tx),
        server_name: HeaderValue::from_str(server_name)
            .unwrap_or_else(|_| HeaderValue::from_static("portable-api")),
    };
    NeutralResponse::new(Box::new(sink), cancellation)
}

pub fn into_hyper(response: CommittedResponse) -> Response<Full<Bytes>> {
    let mut native = Response::new(Full::new(response.body));
    *native.status_mut() = response.status;
    *native.headers_mut() = response.headers;
    native
}
