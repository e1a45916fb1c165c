//! EscrowLens server CLI
//!
//! Run with: `cargo run -p escrowlens-server -- --help`

use clap::{CommandFactory, FromArgMatches};
use escrowlens_server::{
    config_file::load_and_merge_config,
    telemetry::{init_logging, TelemetryConfig},
    EscrowLensServer, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Parse CLI + env via clap (get both typed config and raw matches)
    let matches = ServerConfig::command().get_matches();
    let mut config = ServerConfig::from_arg_matches(&matches)?;

    // 2. Load config file and merge (file values apply only where CLI/env didn't set a value)
    if let Err(e) = load_and_merge_config(&mut config, &matches) {
        eprintln!("Warning: {e}");
    }

    let telemetry_config = TelemetryConfig::with_server_config(&config);
    init_logging(&telemetry_config);

    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        cors = config.cors_enabled,
        fetch_timeout_ms = config.fetch_timeout_ms,
        event_limit = config.event_limit,
        log_format = ?telemetry_config.log_format,
        "Starting EscrowLens server"
    );

    let server = EscrowLensServer::new(config)?;
    server.run().await.map_err(Into::into)
}
