// Framework-native entry point
// Long-lived HTTP server: one execution context, one task per connection

pub mod connection;
pub mod listener;

// `loop` is a keyword, so the module is exposed as `server_loop`
#[path = "loop.rs"]
pub mod server_loop;

use std::sync::Arc;

use crate::config::Config;
use crate::context::ExecutionContext;
use crate::logger;

pub use connection::invoke_native;
pub use listener::create_reusable_listener;
pub use server_loop::{start_server_loop, ServerLoopConfig};

/// Bind, log, and serve until Ctrl-C
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.get_socket_addr()?;
    let listener = create_reusable_listener(addr)?;
    logger::log_server_start(&addr, &config);

    let loop_config = ServerLoopConfig::from(&config.performance);
    let context = Arc::new(ExecutionContext::from_config(config));

    // Build eagerly so a broken configuration shows up at startup; a failure
    // is retried by the first request
    if let Err(e) = context.application().await {
        logger::log_warning(&format!("Application not ready at startup: {e}"));
    }

    start_server_loop(listener, context, loop_config).await
}
