//! sketchport -- stdio JSON-RPC gateway for arduino-cli and serial ports.
//!
//! Configuration via environment: `SKETCH_ROOT`, `SKETCH_ROOT_UNRESTRICTED`,
//! `RUST_LOG` (or `LOG_LEVEL`).

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays a pure protocol channel.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
        tracing_subscriber::EnvFilter::new(level)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = sketchport::GatewayConfig::from_env()?;
    sketchport::run_gateway(config)
}
