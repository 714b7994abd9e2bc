// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

use crate::adapter::PlatformKind;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    pub cors: CorsConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub static_files: StaticFilesConfig,
}

/// Server configuration (framework-native hosting only)
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Hosting model selection
#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    pub kind: PlatformKind,
    /// Spill directory for native uploads when `uploads.spill_to_disk` is set
    pub scratch_dir: Option<String>,
    /// The one writable directory of a serverless execution context
    pub ephemeral_dir: String,
}

/// CORS configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CorsConfig {
    /// Allowed origin, normally supplied through `FRONTEND_URL`
    pub frontend_url: String,
    /// Preflight cache lifetime in seconds
    pub max_age: u64,
}

/// Upload extraction limits
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_max_file_count")]
    pub max_file_count: usize,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Native hosting only; serverless always spills to `platform.ephemeral_dir`
    #[serde(default)]
    pub spill_to_disk: bool,
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_file_count() -> usize {
    10
}

fn default_allowed_mime_types() -> Vec<String> {
    vec!["image/jpeg".to_string(), "image/png".to_string()]
}

fn default_field_name() -> String {
    "files".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            max_file_count: default_max_file_count(),
            allowed_mime_types: default_allowed_mime_types(),
            field_name: default_field_name(),
            spill_to_disk: false,
        }
    }
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub max_body_size: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// SPA build output served by the fallback route
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StaticFilesConfig {
    pub dir: String,
    pub index_file: String,
}
