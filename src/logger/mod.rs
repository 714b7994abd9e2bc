//! Logger module
//!
//! Provides logging utilities for both hosting models including:
//! - Execution context lifecycle logging (start, cold start, factory failure)
//! - Access logging with multiple formats
//! - Error and warning logging
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::{Console, LogLevel};

use crate::config::Config;
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config, console: Console) -> std::io::Result<()> {
    writer::init(
        LogLevel::parse(&config.logging.level),
        console,
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

/// Write to info/access log
fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_info(message),
        None => eprintln!("{message}"),
    }
}

/// Write to error log
fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    write_info("======================================");
    write_info("Framework-native server started");
    write_info(&format!("Listening on: http://{addr}"));
    write_info(&format!("Log level: {}", config.logging.level));
    write_info(&format!("CORS origin: {}", config.cors.frontend_url));
    if let Some(workers) = config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
    write_info("======================================\n");
}

pub fn log_serverless_start(config: &Config) {
    write_info(&format!(
        "[Runtime] Serverless runtime waiting for events (ephemeral dir: {})",
        config.platform.ephemeral_dir
    ));
}

pub fn log_cold_start(platform: &str) {
    write_info(&format!("[Context] Cold start: building application for {platform}"));
}

pub fn log_application_ready(platform: &str, elapsed_us: u128) {
    write_info(&format!(
        "[Context] Application ready for {platform} in {elapsed_us}us"
    ));
}

pub fn log_factory_failed(err: &impl std::fmt::Display) {
    write_error(&format!(
        "[ERROR] Application construction failed, context stays uninitialized: {err}"
    ));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(&format!("[ERROR] Failed to serve connection: {err:?}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    if writer::get().is_none_or(|w| w.enabled(LogLevel::Warn)) {
        write_error(&format!("[WARN] {message}"));
    }
}

pub fn log_debug(message: &str) {
    write_debug(&format!("[DEBUG] {message}"));
}

fn write_debug(message: &str) {
    if let Some(w) = writer::get() {
        if w.enabled(LogLevel::Debug) {
            w.write_access(message);
        }
    }
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    if let Some(w) = writer::get() {
        w.write_access(&entry.format(format));
    }
}
