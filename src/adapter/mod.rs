//! Platform adapters
//!
//! Each hosting model gets a translator from its native request into a
//! `NeutralRequest` and a sink that commits a `NeutralResponse` back in its
//! native shape. What differs between the models beyond the wire shapes is
//! captured once by a `PlatformAdapter` chosen when the application is built.

pub mod body;
pub mod native;
pub mod serverless;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AppError;

pub use native::NativeAdapter;
pub use serverless::ServerlessAdapter;

/// Hosting model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    FrameworkNative,
    ServerlessFunction,
}

impl PlatformKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::FrameworkNative => "framework-native",
            Self::ServerlessFunction => "serverless-function",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where upload bytes live between extraction and the end of the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStorage {
    Memory,
    /// Spill each file to a temp file inside this directory
    Disk(PathBuf),
}

/// Capabilities that vary by hosting model
pub trait PlatformAdapter: Send + Sync + fmt::Debug {
    fn kind(&self) -> PlatformKind;

    fn upload_storage(&self) -> &UploadStorage;
}

/// Pick the adapter for the configured platform and prepare its scratch space
pub fn resolve(config: &Config) -> Result<Arc<dyn PlatformAdapter>, AppError> {
    let adapter: Arc<dyn PlatformAdapter> = match config.platform.kind {
        PlatformKind::FrameworkNative => {
            let storage = match (&config.platform.scratch_dir, config.uploads.spill_to_disk) {
                (Some(dir), true) => UploadStorage::Disk(PathBuf::from(dir)),
                (None, true) => UploadStorage::Disk(std::env::temp_dir()),
                (_, false) => UploadStorage::Memory,
            };
            Arc::new(NativeAdapter::new(storage))
        }
        PlatformKind::ServerlessFunction => Arc::new(ServerlessAdapter::new(PathBuf::from(
            &config.platform.ephemeral_dir,
        ))),
    };

    if let UploadStorage::Disk(dir) = adapter.upload_storage() {
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::unclassified(format!(
                "scratch directory '{}' is not usable: {e}",
                dir.display()
            ))
        })?;
    }

    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_defaults_to_memory() {
        let cfg = Config::defaults().unwrap();
        let adapter = resolve(&cfg).unwrap();
        assert_eq!(adapter.kind(), PlatformKind::FrameworkNative);
        assert_eq!(adapter.upload_storage(), &UploadStorage::Memory);
    }

    #[test]
    fn test_native_spill_uses_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("uploads");
        let mut cfg = Config::defaults().unwrap();
        cfg.uploads.spill_to_disk = true;
        cfg.platform.scratch_dir = Some(scratch.to_string_lossy().into_owned());

        let adapter = resolve(&cfg).unwrap();
        assert_eq!(adapter.upload_storage(), &UploadStorage::Disk(scratch.clone()));
        assert!(scratch.is_dir());
    }

    #[test]
    fn test_serverless_always_spills_to_ephemeral_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::defaults().unwrap();
        cfg.platform.kind = PlatformKind::ServerlessFunction;
        cfg.platform.ephemeral_dir = dir.path().to_string_lossy().into_owned();

        let adapter = resolve(&cfg).unwrap();
        assert_eq!(adapter.kind(), PlatformKind::ServerlessFunction);
        assert_eq!(
            adapter.upload_storage(),
            &UploadStorage::Disk(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_unusable_scratch_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let mut cfg = Config::defaults().unwrap();
        cfg.platform.kind = PlatformKind::ServerlessFunction;
        cfg.platform.ephemeral_dir = file.join("sub").to_string_lossy().into_owned();
        assert!(resolve(&cfg).is_err());
    }
}
