// Configuration module entry point
// Loads layered configuration: defaults, optional file, environment overrides

mod types;

use std::net::SocketAddr;

use config::builder::DefaultState;
use config::ConfigBuilder;

// Re-export public types
pub use types::{
    Config, CorsConfig, HttpConfig, LoggingConfig, PerformanceConfig, PlatformConfig,
    ServerConfig, StaticFilesConfig, UploadConfig,
};

/// Environment variable that sets the allowed CORS origin
pub const FRONTEND_URL_ENV: &str = "FRONTEND_URL";

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = with_defaults()?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .set_override_option("cors.frontend_url", std::env::var(FRONTEND_URL_ENV).ok())?
            .build()?;

        settings.try_deserialize()
    }

    /// Built-in defaults only, ignoring files and the environment
    pub fn defaults() -> Result<Self, config::ConfigError> {
        with_defaults()?.build()?.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    config::Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 3001)?
        .set_default("platform.kind", "framework_native")?
        .set_default("platform.ephemeral_dir", "/tmp")?
        .set_default("cors.frontend_url", "http://localhost:3000")?
        .set_default("cors.max_age", 86_400)?
        .set_default("http.server_name", "portable-api")?
        .set_default("http.max_body_size", 134_217_728)? // 128MB, room for 10 x 10MB uploads
        .set_default("logging.level", "info")?
        .set_default("logging.access_log", true)?
        .set_default("performance.keep_alive_timeout", 75)?
        .set_default("performance.read_timeout", 30)?
        .set_default("performance.write_timeout", 30)?
        .set_default("static_files.dir", "frontend/dist")?
        .set_default("static_files.index_file", "index.html")
}
