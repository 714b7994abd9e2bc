//! One set of HTTP handlers, two hosting models
//!
//! The same application runs as a long-lived server (`server`) or behind a
//! serverless function runtime (`serverless`). Platform adapters translate
//! native requests into a neutral model, a cached `WiredApplication` runs the
//! pipeline, and the adapter's sink commits the response back natively.

pub mod adapter;
pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logger;
pub mod neutral;
pub mod server;
pub mod serverless;
pub mod services;
pub mod uploads;

pub use app::{create_application, WiredApplication};
pub use context::ExecutionContext;
pub use error::AppError;
