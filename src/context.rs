//! Execution context: builds the application once and reuses it
//!
//! A framework-native process and a warm serverless instance both hold one
//! `ExecutionContext`. The first call runs the factory; later calls get the
//! cached application. A failed build leaves the context uninitialized so the
//! next call retries.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::adapter::PlatformKind;
use crate::app::{create_application, WiredApplication};
use crate::config::Config;
use crate::error::AppError;
use crate::logger;
use crate::services::Collaborators;

pub type AppFactory = Box<dyn Fn() -> Result<WiredApplication, AppError> + Send + Sync>;

enum ContextState {
    Uninitialized,
    Initializing,
    Ready(Arc<WiredApplication>),
}

/// Observable lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPhase {
    Uninitialized,
    Initializing,
    Ready,
}

pub struct ExecutionContext {
    platform: PlatformKind,
    state: Mutex<ContextState>,
    /// Serializes construction; never held while serving
    build_lock: tokio::sync::Mutex<()>,
    factory: AppFactory,
}

impl ExecutionContext {
    pub fn new(platform: PlatformKind, factory: AppFactory) -> Self {
        Self {
            platform,
            state: Mutex::new(ContextState::Uninitialized),
            build_lock: tokio::sync::Mutex::new(()),
            factory,
        }
    }

    /// Context whose factory wires `config` with the default collaborators
    pub fn from_config(config: Config) -> Self {
        let platform = config.platform.kind;
        Self::new(
            platform,
            Box::new(move || create_application(&config, Collaborators::from_config(&config))),
        )
    }

    pub fn phase(&self) -> ContextPhase {
        match *self.lock_state() {
            ContextState::Uninitialized => ContextPhase::Uninitialized,
            ContextState::Initializing => ContextPhase::Initializing,
            ContextState::Ready(_) => ContextPhase::Ready,
        }
    }

    /// The cached application, building it on first use
    pub async fn application(&self) -> Result<Arc<WiredApplication>, AppError> {
        if let Some(app) = self.ready() {
            return Ok(app);
        }

        let _build = self.build_lock.lock().await;
        // Another caller may have finished building while we waited
        if let Some(app) = self.ready() {
            return Ok(app);
        }

        *self.lock_state() = ContextState::Initializing;
        logger::log_cold_start(self.platform.name());
        let started = Instant::now();

        match (self.factory)() {
            Ok(app) => {
                let app = Arc::new(app);
                *self.lock_state() = ContextState::Ready(Arc::clone(&app));
                logger::log_application_ready(self.platform.name(), started.elapsed().as_micros());
                Ok(app)
            }
            Err(e) => {
                *self.lock_state() = ContextState::Uninitialized;
                logger::log_factory_failed(&e);
                Err(e)
            }
        }
    }

    fn ready(&self) -> Option<Arc<WiredApplication>> {
        match &*self.lock_state() {
            ContextState::Ready(app) => Some(Arc::clone(app)),
            _ => None,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("platform", &self.platform)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
