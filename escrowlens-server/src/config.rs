//! Server configuration

use clap::Parser;
use escrowlens_core::{QuorumPolicy, TtlPolicy};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// EscrowLens HTTP server configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "escrowlens-server")]
#[command(about = "Read-only reconciliation API over the escrow marketplace contract")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "ESCROWLENS_LISTEN_ADDR", default_value = "0.0.0.0:8095")]
    pub listen_addr: SocketAddr,

    /// Ledger node base URL (REST API root, with or without `/v1`)
    #[arg(
        long,
        env = "ESCROWLENS_LEDGER_URL",
        default_value = "https://fullnode.testnet.aptoslabs.com"
    )]
    pub ledger_url: String,

    /// Account address the marketplace contract is deployed under
    #[arg(long, env = "ESCROWLENS_CONTRACT_ADDRESS", default_value = "")]
    pub contract_address: String,

    /// API key sent to the ledger node (x-api-key and Bearer)
    #[arg(long, env = "ESCROWLENS_LEDGER_API_KEY")]
    pub ledger_api_key: Option<String>,

    /// Per-request timeout for ledger reads, in milliseconds
    #[arg(long, env = "ESCROWLENS_FETCH_TIMEOUT_MS", default_value = "10000")]
    pub fetch_timeout_ms: u64,

    /// Maximum records read from one event stream
    #[arg(long, env = "ESCROWLENS_EVENT_LIMIT", default_value = "200")]
    pub event_limit: usize,

    /// Maximum job details derived concurrently when listing jobs
    #[arg(long, env = "ESCROWLENS_LIST_CONCURRENCY", default_value = "8")]
    pub list_concurrency: usize,

    /// Role view TTL, in seconds
    #[arg(long, env = "ESCROWLENS_ROLE_TTL_SECS", default_value = "60")]
    pub role_ttl_secs: u64,

    /// Job detail TTL, in seconds
    #[arg(long, env = "ESCROWLENS_JOB_TTL_SECS", default_value = "15")]
    pub job_ttl_secs: u64,

    /// Dispute detail TTL, in seconds
    #[arg(long, env = "ESCROWLENS_DISPUTE_TTL_SECS", default_value = "15")]
    pub dispute_ttl_secs: u64,

    /// Reputation TTL, in seconds
    #[arg(long, env = "ESCROWLENS_REPUTATION_TTL_SECS", default_value = "30")]
    pub reputation_ttl_secs: u64,

    /// Event stream TTL, in seconds
    #[arg(long, env = "ESCROWLENS_EVENTS_TTL_SECS", default_value = "10")]
    pub events_ttl_secs: u64,

    /// Contract resource (table handle) TTL, in seconds
    #[arg(long, env = "ESCROWLENS_RESOURCE_TTL_SECS", default_value = "600")]
    pub resource_ttl_secs: u64,

    /// Dispute quorum policy: all-selected, majority, or fixed
    #[arg(long, env = "ESCROWLENS_QUORUM_POLICY", default_value = "all-selected")]
    pub quorum_policy: String,

    /// Vote count for the fixed quorum policy
    #[arg(long, env = "ESCROWLENS_QUORUM_SIZE", default_value = "0")]
    pub quorum_size: usize,

    /// Enable CORS (Cross-Origin Resource Sharing)
    #[arg(long, env = "ESCROWLENS_CORS_ENABLED", default_value = "true")]
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ESCROWLENS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// TOML config file with a `[server]` table
    #[arg(long, env = "ESCROWLENS_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8095)),
            ledger_url: "https://fullnode.testnet.aptoslabs.com".to_string(),
            contract_address: String::new(),
            ledger_api_key: None,
            fetch_timeout_ms: 10_000,
            event_limit: 200,
            list_concurrency: 8,
            role_ttl_secs: 60,
            job_ttl_secs: 15,
            dispute_ttl_secs: 15,
            reputation_ttl_secs: 30,
            events_ttl_secs: 10,
            resource_ttl_secs: 600,
            quorum_policy: "all-selected".to_string(),
            quorum_size: 0,
            cors_enabled: true,
            log_level: "info".to_string(),
            config_file: None,
        }
    }
}

impl ServerConfig {
    /// Create config from CLI args
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Per-scope cache lifetimes
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            role: Duration::from_secs(self.role_ttl_secs),
            job: Duration::from_secs(self.job_ttl_secs),
            dispute: Duration::from_secs(self.dispute_ttl_secs),
            reputation: Duration::from_secs(self.reputation_ttl_secs),
            events: Duration::from_secs(self.events_ttl_secs),
            resource: Duration::from_secs(self.resource_ttl_secs),
        }
    }

    pub fn quorum(&self) -> Result<QuorumPolicy, String> {
        QuorumPolicy::from_name(&self.quorum_policy, self.quorum_size)
    }

    /// Validate all configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.contract_address.trim().is_empty() {
            return Err("contract_address is required (--contract-address)".to_string());
        }
        escrowlens_core::Address::parse(&self.contract_address)
            .map_err(|e| format!("contract_address: {e}"))?;

        if !self.ledger_url.starts_with("http://") && !self.ledger_url.starts_with("https://") {
            return Err(format!(
                "ledger_url must be an http(s) URL, got {}",
                self.ledger_url
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err("fetch_timeout_ms must be > 0".to_string());
        }
        if self.event_limit == 0 {
            return Err("event_limit must be > 0".to_string());
        }
        if self.list_concurrency == 0 {
            return Err("list_concurrency must be > 0".to_string());
        }

        self.quorum()?;
        Ok(())
    }
}
