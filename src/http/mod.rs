//! HTTP protocol helpers shared by the handlers and the native server

pub mod cache;
pub mod mime;
pub mod response;

pub use response::{build_error_response, error_body};
