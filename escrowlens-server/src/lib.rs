//! EscrowLens HTTP Server
//!
//! Read-only JSON API over the escrow marketplace contract. Every endpoint
//! reconciles ledger snapshots with event history through `escrowlens-core`
//! and caches the derived view with a per-scope TTL.
//!
//! # Example
//!
//! ```ignore
//! use escrowlens_server::{EscrowLensServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         contract_address: "0xc0de".into(),
//!         ..Default::default()
//!     };
//!     let server = EscrowLensServer::new(config).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod config;
pub mod config_file;
pub mod error;
pub mod query;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{QueryError, Result, ServerError};
pub use state::AppState;
pub use telemetry::{init_logging, TelemetryConfig};

use axum::Router;
use escrowlens_ledger::LedgerError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// EscrowLens HTTP Server
pub struct EscrowLensServer {
    /// Application state
    state: Arc<AppState>,
    /// Configured router
    router: Router,
}

impl EscrowLensServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> std::result::Result<Self, LedgerError> {
        let telemetry_config = TelemetryConfig::with_server_config(&config);
        let state = Arc::new(AppState::new(config, telemetry_config)?);
        Ok(Self::from_state(state))
    }

    /// Wrap prepared state (tests inject a mock ledger and clock)
    pub fn from_state(state: Arc<AppState>) -> Self {
        let router = routes::build_router(state.clone());
        Self { state, router }
    }

    /// Get a reference to the application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the router for testing
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            ledger_url = %self.state.config.ledger_url,
            contract = %self.state.contract.address(),
            quorum = %self.state.quorum,
            "EscrowLens server starting"
        );

        axum::serve(listener, self.router).await
    }
}
