//! Cancellation flag shared between an adapter and the handlers of one call
//!
//! Platforms signal abandonment differently: a native connection closes, a
//! serverless invocation runs out of time. Both collapse into one flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    aborted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag that also trips once `deadline` has passed
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.aborted.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Guard that cancels the flag when dropped while still armed
    pub fn disconnect_guard(&self) -> DisconnectGuard {
        DisconnectGuard {
            flag: self.clone(),
            armed: true,
        }
    }
}

/// Held by the future that waits on the client. If that future is dropped
/// (hyper drops it when the connection goes away) the call is cancelled.
#[derive(Debug)]
pub struct DisconnectGuard {
    flag: CancellationFlag,
    armed: bool,
}

impl DisconnectGuard {
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.cancel();
        }
    }
}
