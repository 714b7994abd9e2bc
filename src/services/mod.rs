//! Collaborators the handlers delegate to
//!
//! The handlers never know how uploads are processed or where the frontend
//! build lives; both are injected into the application factory.

pub mod assets;
pub mod processor;

use std::sync::Arc;

pub use assets::{Asset, AssetResolver, StaticDirResolver};
pub use processor::{ProcessingError, SummaryProcessor, UnifiedProcessor};

use crate::config::Config;

/// Everything the factory wires into the handlers besides configuration
#[derive(Clone)]
pub struct Collaborators {
    pub processor: Arc<dyn UnifiedProcessor>,
    pub assets: Arc<dyn AssetResolver>,
}

impl Collaborators {
    /// Default processor and a resolver over `static_files.dir`
    pub fn from_config(config: &Config) -> Self {
        Self {
            processor: Arc::new(SummaryProcessor),
            assets: Arc::new(StaticDirResolver::new(
                &config.static_files.dir,
                &config.static_files.index_file,
            )),
        }
    }
}
