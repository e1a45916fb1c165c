//! Application state management
//!
//! One `AppState` is shared by every handler behind an `Arc`. The caches are
//! process-wide and concurrent (`DashMap` inside `TtlCache`), so handlers
//! never take a lock of their own.

use crate::config::ServerConfig;
use crate::error::QueryError;
use crate::query::{ReputationView, RoleSummary, StoreHandles};
use crate::telemetry::TelemetryConfig;
use escrowlens_core::{
    CacheKey, CacheScope, CacheStats, Clock, DisputeView, EventStream, JobView, LedgerEvent,
    QuorumPolicy, SystemClock, TtlCache, TtlPolicy,
};
use escrowlens_ledger::{ContractPaths, HttpLedgerClient, LedgerError, LedgerReader};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// One TTL cache per cached value type. Several caches may hold entries of
/// the same scope; clearing a scope clears it everywhere.
#[derive(Debug)]
pub struct Caches {
    pub jobs: TtlCache<JobView, QueryError>,
    pub disputes: TtlCache<DisputeView, QueryError>,
    /// Reviewer load counters, under the dispute scope
    pub reviewer_loads: TtlCache<u64, QueryError>,
    pub roles: TtlCache<RoleSummary, QueryError>,
    pub reputation: TtlCache<ReputationView, QueryError>,
    pub events: TtlCache<Arc<Vec<LedgerEvent>>, QueryError>,
    pub stores: TtlCache<StoreHandles, QueryError>,
}

/// Entry counts and counters reported by `/v1/stats`
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub entries_by_scope: BTreeMap<CacheScope, usize>,
    pub caches: BTreeMap<&'static str, CacheStats>,
}

impl Caches {
    pub fn new(policy: TtlPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: TtlCache::new(policy, clock.clone()),
            disputes: TtlCache::new(policy, clock.clone()),
            reviewer_loads: TtlCache::new(policy, clock.clone()),
            roles: TtlCache::new(policy, clock.clone()),
            reputation: TtlCache::new(policy, clock.clone()),
            events: TtlCache::new(policy, clock.clone()),
            stores: TtlCache::new(policy, clock),
        }
    }

    /// Clear `scope` everywhere, along with the event streams its entities
    /// derive from, so the next read sees fresh history.
    pub fn clear(&self, scope: CacheScope) {
        for stream in EventStream::feeding(scope) {
            self.events
                .invalidate(&CacheKey::new(CacheScope::Events, stream.field_name()));
        }
        self.jobs.clear(scope);
        self.disputes.clear(scope);
        self.reviewer_loads.clear(scope);
        self.roles.clear(scope);
        self.reputation.clear(scope);
        self.events.clear(scope);
        self.stores.clear(scope);
        tracing::info!(%scope, "cache scope cleared");
    }

    pub fn clear_all(&self) {
        self.jobs.clear_all();
        self.disputes.clear_all();
        self.reviewer_loads.clear_all();
        self.roles.clear_all();
        self.reputation.clear_all();
        self.events.clear_all();
        self.stores.clear_all();
        tracing::info!("all cache scopes cleared");
    }

    pub fn len_scope(&self, scope: CacheScope) -> usize {
        self.jobs.len_scope(scope)
            + self.disputes.len_scope(scope)
            + self.reviewer_loads.len_scope(scope)
            + self.roles.len_scope(scope)
            + self.reputation.len_scope(scope)
            + self.events.len_scope(scope)
            + self.stores.len_scope(scope)
    }

    pub fn report(&self) -> CacheReport {
        let entries_by_scope = CacheScope::ALL
            .iter()
            .map(|&scope| (scope, self.len_scope(scope)))
            .collect();
        let caches = BTreeMap::from([
            ("jobs", self.jobs.stats()),
            ("disputes", self.disputes.stats()),
            ("reviewer_loads", self.reviewer_loads.stats()),
            ("roles", self.roles.stats()),
            ("reputation", self.reputation.stats()),
            ("events", self.events.stats()),
            ("stores", self.stores.stats()),
        ]);
        CacheReport {
            entries_by_scope,
            caches,
        }
    }
}

/// Application state shared across all request handlers
#[derive(Debug)]
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Telemetry configuration
    pub telemetry_config: TelemetryConfig,

    /// Ledger node reader
    pub ledger: Arc<dyn LedgerReader>,

    /// Qualified names under the configured contract address
    pub contract: ContractPaths,

    pub quorum: QuorumPolicy,

    /// Wall clock for deadlines and cache freshness
    pub clock: Arc<dyn Clock>,

    pub caches: Caches,

    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create state with an HTTP ledger client and the system clock
    pub fn new(config: ServerConfig, telemetry_config: TelemetryConfig) -> Result<Self, LedgerError> {
        let ledger = HttpLedgerClient::new(
            config.ledger_url.clone(),
            config.ledger_api_key.clone(),
            config.fetch_timeout(),
        )?;
        Ok(Self::with_ledger(
            config,
            telemetry_config,
            Arc::new(ledger),
            Arc::new(SystemClock),
        ))
    }

    /// Create state around an existing reader and clock (tests inject both)
    pub fn with_ledger(
        config: ServerConfig,
        telemetry_config: TelemetryConfig,
        ledger: Arc<dyn LedgerReader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quorum = config.quorum().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid quorum policy, using all-selected");
            QuorumPolicy::default()
        });
        let contract_address = escrowlens_core::Address::parse(&config.contract_address)
            .map(|a| a.to_string())
            .unwrap_or_else(|_| config.contract_address.clone());

        Self {
            contract: ContractPaths::new(contract_address),
            caches: Caches::new(config.ttl_policy(), clock.clone()),
            quorum,
            clock,
            ledger,
            telemetry_config,
            config,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
