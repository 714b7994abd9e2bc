use portable_api::adapter::PlatformKind;
use portable_api::config::Config;
use portable_api::logger::{self, Console};
use portable_api::{server, serverless};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // First argument is the config file path without extension
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;

    // stdout carries response documents in serverless mode
    let console = match cfg.platform.kind {
        PlatformKind::FrameworkNative => Console::Split,
        PlatformKind::ServerlessFunction => Console::StderrOnly,
    };
    logger::init(&cfg, console)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    match cfg.platform.kind {
        PlatformKind::FrameworkNative => runtime.block_on(server::run(cfg)),
        PlatformKind::ServerlessFunction => runtime.block_on(serverless::runtime::run(cfg)),
    }
}
