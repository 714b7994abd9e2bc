//! Neutral request/response model
//!
//! Handlers are written against these types only. Platform adapters build a
//! `NeutralRequest` from a native request and wrap a native response sink
//! behind `NeutralResponse`.

mod cancel;
mod request;
mod response;

pub use cancel::{CancellationFlag, DisconnectGuard};
pub use request::{NeutralRequest, RequestBody, RequestHead};
pub use response::{CommittedResponse, NeutralResponse, ResponseSink};
