//! Configuration file support.
//!
//! Loads server configuration from `escrowlens.toml` and merges it with CLI
//! args and environment variables. Settings live under the `[server]` table.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Config file (`[server]`)
//! 4. Hardcoded defaults

use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

/// File looked up in the working directory when `--config-file` is not given
pub const DEFAULT_CONFIG_FILE: &str = "escrowlens.toml";

// ---------------------------------------------------------------------------
// File config serde types (all Option; absence means "not set in file")
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EscrowLensFileConfig {
    /// Server configuration section `[server]`
    #[serde(default)]
    pub server: Option<ServerFileConfig>,
}

/// The `[server]` section. Every field is `Option` so the file only needs to
/// contain values the user wants to set.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ServerFileConfig {
    pub listen_addr: Option<String>,
    pub ledger_url: Option<String>,
    pub contract_address: Option<String>,
    pub ledger_api_key: Option<String>,
    pub fetch_timeout_ms: Option<u64>,
    pub event_limit: Option<usize>,
    pub list_concurrency: Option<usize>,
    pub log_level: Option<String>,
    pub cors_enabled: Option<bool>,

    /// `[server.cache]`
    #[serde(default)]
    pub cache: Option<CacheFileConfig>,

    /// `[server.quorum]`
    #[serde(default)]
    pub quorum: Option<QuorumFileConfig>,
}

/// TTLs in seconds
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct CacheFileConfig {
    pub role_ttl_secs: Option<u64>,
    pub job_ttl_secs: Option<u64>,
    pub dispute_ttl_secs: Option<u64>,
    pub reputation_ttl_secs: Option<u64>,
    pub events_ttl_secs: Option<u64>,
    pub resource_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct QuorumFileConfig {
    pub policy: Option<String>,
    pub size: Option<usize>,
}

/// Errors from config file loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {detail}")]
    Parse { path: PathBuf, detail: String },
}

// ---------------------------------------------------------------------------
// Config file loading
// ---------------------------------------------------------------------------

pub fn load_config(path: &Path) -> Result<EscrowLensFileConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if content.trim().is_empty() {
        return Ok(EscrowLensFileConfig::default());
    }

    toml::from_str(&content).map_err(|e| ConfigFileError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Resolve the config file path.
///
/// An explicit `--config-file` that does not exist is logged and ignored;
/// otherwise `escrowlens.toml` in the working directory is used if present.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        if p.is_file() {
            return Some(p.to_path_buf());
        }
        warn!(path = %p.display(), "Config file not found at specified path");
        return None;
    }

    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
    default.is_file().then_some(default)
}

/// Arg IDs the file can override. Checked against the clap definition in tests.
pub const CONFIG_FILE_ARG_IDS: &[&str] = &[
    "listen_addr",
    "ledger_url",
    "contract_address",
    "ledger_api_key",
    "fetch_timeout_ms",
    "event_limit",
    "list_concurrency",
    "log_level",
    "cors_enabled",
    "role_ttl_secs",
    "job_ttl_secs",
    "dispute_ttl_secs",
    "reputation_ttl_secs",
    "events_ttl_secs",
    "resource_ttl_secs",
    "quorum_policy",
    "quorum_size",
];

/// Apply config file values to a `ServerConfig`, but only for fields where
/// the user did NOT provide a CLI argument or environment variable.
pub fn apply_to_server_config(
    file: &ServerFileConfig,
    config: &mut ServerConfig,
    matches: &ArgMatches,
) {
    use clap::parser::ValueSource;

    // Option fields without defaults report `None`.
    let is_default = |arg_name: &str| -> bool {
        matches!(
            matches.value_source(arg_name),
            None | Some(ValueSource::DefaultValue)
        )
    };

    macro_rules! apply {
        ($id:literal, $src:expr, $dst:expr) => {
            if is_default($id) {
                if let Some(ref v) = $src {
                    $dst = v.clone();
                }
            }
        };
    }

    // NOTE: clap derive uses the field name (underscores) as the arg ID,
    // not the kebab-case long flag.
    if is_default("listen_addr") {
        if let Some(ref addr_str) = file.listen_addr {
            if let Ok(addr) = addr_str.parse::<SocketAddr>() {
                config.listen_addr = addr;
            } else {
                warn!(
                    value = addr_str,
                    "Invalid listen_addr in config file, ignoring"
                );
            }
        }
    }
    apply!("ledger_url", file.ledger_url, config.ledger_url);
    apply!(
        "contract_address",
        file.contract_address,
        config.contract_address
    );
    if is_default("ledger_api_key") && file.ledger_api_key.is_some() {
        config.ledger_api_key = file.ledger_api_key.clone();
    }
    apply!(
        "fetch_timeout_ms",
        file.fetch_timeout_ms,
        config.fetch_timeout_ms
    );
    apply!("event_limit", file.event_limit, config.event_limit);
    apply!(
        "list_concurrency",
        file.list_concurrency,
        config.list_concurrency
    );
    apply!("log_level", file.log_level, config.log_level);
    apply!("cors_enabled", file.cors_enabled, config.cors_enabled);

    if let Some(ref cache) = file.cache {
        apply!("role_ttl_secs", cache.role_ttl_secs, config.role_ttl_secs);
        apply!("job_ttl_secs", cache.job_ttl_secs, config.job_ttl_secs);
        apply!(
            "dispute_ttl_secs",
            cache.dispute_ttl_secs,
            config.dispute_ttl_secs
        );
        apply!(
            "reputation_ttl_secs",
            cache.reputation_ttl_secs,
            config.reputation_ttl_secs
        );
        apply!(
            "events_ttl_secs",
            cache.events_ttl_secs,
            config.events_ttl_secs
        );
        apply!(
            "resource_ttl_secs",
            cache.resource_ttl_secs,
            config.resource_ttl_secs
        );
    }

    if let Some(ref quorum) = file.quorum {
        apply!("quorum_policy", quorum.policy, config.quorum_policy);
        apply!("quorum_size", quorum.size, config.quorum_size);
    }
}

/// Load the config file (if found) and merge its values into `config`,
/// respecting the precedence: CLI > env > file > defaults.
pub fn load_and_merge_config(
    config: &mut ServerConfig,
    matches: &ArgMatches,
) -> Result<(), ConfigFileError> {
    let Some(path) = resolve_config_path(config.config_file.as_deref()) else {
        debug!("No config file found, using CLI args and defaults only");
        return Ok(());
    };

    info!(path = %path.display(), "Loading configuration file");
    let file_config = load_config(&path)?;
    let server_section = file_config.server.unwrap_or_default();
    apply_to_server_config(&server_section, config, matches);
    Ok(())
}
