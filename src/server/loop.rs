// Server loop module
// Accepts connections until Ctrl-C, then waits briefly for in-flight ones

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::PerformanceConfig;
use crate::context::ExecutionContext;
use crate::logger;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Per-connection behaviour derived from `performance` settings
#[derive(Debug, Clone)]
pub struct ServerLoopConfig {
    pub keep_alive: bool,
    pub connection_timeout: Duration,
    pub max_connections: Option<u64>,
}

impl From<&PerformanceConfig> for ServerLoopConfig {
    fn from(perf: &PerformanceConfig) -> Self {
        Self {
            keep_alive: perf.keep_alive_timeout > 0,
            connection_timeout: Duration::from_secs(std::cmp::max(
                perf.read_timeout,
                perf.write_timeout,
            )),
            max_connections: perf.max_connections,
        }
    }
}

pub async fn start_server_loop(
    listener: TcpListener,
    context: Arc<ExecutionContext>,
    config: ServerLoopConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let active_connections = Arc::new(AtomicUsize::new(0));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(
                        stream,
                        peer_addr,
                        &context,
                        &active_connections,
                        &config,
                    ),
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            result = &mut shutdown => {
                if let Err(e) = result {
                    logger::log_error(&format!("Failed to listen for shutdown signal: {e}"));
                }
                break;
            }
        }
    }

    drop(listener);
    logger::log_warning("Shutdown requested, no longer accepting connections");

    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while active_connections.load(Ordering::SeqCst) > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
    let remaining = active_connections.load(Ordering::SeqCst);
    if remaining > 0 {
        logger::log_warning(&format!("Exiting with {remaining} connection(s) still open"));
    }
    Ok(())
}
