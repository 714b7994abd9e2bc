// Connection handling module
// Serves one TCP connection and bridges each hyper request into the pipeline

use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::USER_AGENT;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::sync::oneshot;

use super::server_loop::ServerLoopConfig;
use crate::adapter::{native, PlatformKind};
use crate::app::WiredApplication;
use crate::context::ExecutionContext;
use crate::error::AppError;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use crate::neutral::CancellationFlag;

/// Server header used before an application exists
const FALLBACK_SERVER_NAME: &str = "portable-api";

/// Accept a connection unless the connection limit is reached
pub fn accept_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    context: &Arc<ExecutionContext>,
    conn_counter: &Arc<AtomicUsize>,
    config: &ServerLoopConfig,
) {
    // Increment first, then check, so concurrent accepts cannot both slip in
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);
    if let Some(max_conn) = config.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            return;
        }
    }

    if let Err(e) = stream.set_nodelay(true) {
        logger::log_debug(&format!("Failed to set TCP_NODELAY for {peer_addr}: {e}"));
    }
    logger::log_connection_accepted(&peer_addr);

    handle_connection(
        stream,
        peer_addr,
        Arc::clone(context),
        Arc::clone(conn_counter),
        config.clone(),
    );
}

fn handle_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    context: Arc<ExecutionContext>,
    conn_counter: Arc<AtomicUsize>,
    config: ServerLoopConfig,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder.keep_alive(config.keep_alive);

        let conn = builder.serve_connection(
            io,
            service_fn(move |req| serve_request(req, Arc::clone(&context), peer_addr)),
        );

        match tokio::time::timeout(config.connection_timeout, conn).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger::log_connection_error(&err),
            Err(_) => logger::log_warning(&format!(
                "Connection from {peer_addr} timed out after {} seconds",
                config.connection_timeout.as_secs()
            )),
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

async fn serve_request(
    req: Request<Incoming>,
    context: Arc<ExecutionContext>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let mut entry = AccessLogEntry::new(
        PlatformKind::FrameworkNative.name(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.remote_addr = peer_addr.ip().to_string();
    entry.query = req.uri().query().map(ToString::to_string);
    entry.user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let (response, log_format) = match context.application().await {
        Ok(app) => {
            let format = app.access_log_format().map(ToString::to_string);
            (invoke_native(app, req).await, format)
        }
        Err(e) => (
            http::build_error_response(&e, FALLBACK_SERVER_NAME),
            Some("combined".to_string()),
        ),
    };

    if let Some(format) = log_format {
        entry.status = response.status().as_u16();
        entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
            .unwrap_or(usize::MAX);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &format);
    }
    Ok(response)
}

/// Run one hyper request through the application
///
/// If this future is dropped (client gone) the call is cancelled and any
/// later send is discarded.
pub async fn invoke_native<B>(app: Arc<WiredApplication>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let cancellation = CancellationFlag::new();
    let guard = cancellation.disconnect_guard();
    let server_name = app.server_name().to_string();
    let (rx, task) = spawn_pipeline(app, req, cancellation);

    let response = if let Ok(response) = rx.await {
        response
    } else {
        // The sink was dropped without a commit
        let reason = match task.await {
            Err(e) if e.is_panic() => "request handler panicked",
            _ => "request finished without a response",
        };
        logger::log_error(reason);
        http::build_error_response(&AppError::unclassified(reason), &server_name)
    };

    guard.disarm();
    response
}

/// Start the pipeline on its own task so a panicking handler becomes a 500.
/// The receiver yields the response once the handler commits it.
fn spawn_pipeline<B>(
    app: Arc<WiredApplication>,
    req: Request<B>,
    cancellation: CancellationFlag,
) -> (
    oneshot::Receiver<Response<Full<Bytes>>>,
    tokio::task::JoinHandle<()>,
)
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let (tx, rx) = oneshot::channel();
    let res = native::wrap_response(tx, cancellation.clone(), app.server_name());

    let task = tokio::spawn(async move {
        let adapted = native::adapt_request(req, app.max_body_size(), cancellation).await;
        app.dispatch(adapted, res).await;
    });
    (rx, task)
}
