use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Live,
    Demo,
    Inactive,
    Fallback,
    ConfigError,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Live => "live",
            SourceStatus::Demo => "demo",
            SourceStatus::Inactive => "inactive",
            SourceStatus::Fallback => "fallback",
            SourceStatus::ConfigError => "config_error",
        }
    }

    /// Statuses that are allowed to carry an error string.
    pub fn is_failure(&self) -> bool {
        matches!(self, SourceStatus::Fallback | SourceStatus::ConfigError)
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wallet's mining activity at the time of a fetch.
///
/// When `source_status` is `Demo`, `Fallback` or `ConfigError` the numbers come
/// from the demo generator and must never be recorded as real balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinerSnapshot {
    pub hash_rate: f64,
    pub last_activity_epoch_seconds: i64,
    pub total_hashes_lifetime: u64,
    pub valid_share_count: u64,
    pub invalid_share_count: u64,
    pub amount_due_atomic_units: u64,
    pub amount_paid_atomic_units: u64,
    pub payment_count: u64,
    pub source_status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_note: Option<String>,
}

impl MinerSnapshot {
    pub fn has_activity(&self) -> bool {
        self.hash_rate > 0.0 || self.total_hashes_lifetime > 0 || self.valid_share_count > 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.demo_note.is_some()
            || matches!(
                self.source_status,
                SourceStatus::Demo | SourceStatus::Fallback | SourceStatus::ConfigError
            )
    }

    /// Same numbers, different tag. Used when generator output stands in for
    /// a failed or misconfigured cycle.
    pub fn retagged(self, source_status: SourceStatus) -> Self {
        Self {
            source_status,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub pool_hash_rate: f64,
    pub connected_miner_count: u64,
    pub network_difficulty: f64,
    pub block_height: u64,
    pub last_block_found: u64,
    pub total_blocks_found: u64,
    pub fee_percent: f64,
    pub min_payout_atomic_units: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSnapshot {
    pub name: String,
    pub hash_rate: f64,
    pub last_share_epoch_seconds: i64,
    pub total_hashes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashrateHistory {
    pub data_points: usize,
    pub average_hash_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub epoch_seconds: i64,
    pub amount_atomic_units: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub total_payments: usize,
    pub recent: Vec<PaymentRecord>,
}

/// Optional pieces of a cycle. Each is `None` when its sub-fetch failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub pool: Option<PoolSnapshot>,
    pub workers: Option<Vec<WorkerSnapshot>>,
    pub history: Option<HashrateHistory>,
    pub payments: Option<PaymentSummary>,
}

/// What one aggregator cycle produced; the unit the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub miner: MinerSnapshot,
    pub pool: Option<PoolSnapshot>,
    pub workers: Option<Vec<WorkerSnapshot>>,
    pub history: Option<HashrateHistory>,
    pub payments: Option<PaymentSummary>,
    pub wallet_address: String,
    pub fetched_at_epoch_millis: i64,
    pub error: Option<String>,
}

impl RetrievalResult {
    /// A result without an error. `Fallback`/`ConfigError` snapshots must go
    /// through [`RetrievalResult::failed`] instead.
    pub fn succeeded(
        miner: MinerSnapshot,
        enrichment: Enrichment,
        wallet_address: String,
        fetched_at_epoch_millis: i64,
    ) -> Self {
        debug_assert!(!miner.source_status.is_failure());
        Self {
            miner,
            pool: enrichment.pool,
            workers: enrichment.workers,
            history: enrichment.history,
            payments: enrichment.payments,
            wallet_address,
            fetched_at_epoch_millis,
            error: None,
        }
    }

    /// A degraded result. Statuses other than `Fallback`/`ConfigError` are
    /// coerced to `Fallback` so an error never rides on a live-looking snapshot.
    pub fn failed(
        miner: MinerSnapshot,
        enrichment: Enrichment,
        wallet_address: String,
        fetched_at_epoch_millis: i64,
        error: impl Into<String>,
    ) -> Self {
        let miner = if miner.source_status.is_failure() {
            miner
        } else {
            miner.retagged(SourceStatus::Fallback)
        };
        Self {
            miner,
            pool: enrichment.pool,
            workers: enrichment.workers,
            history: enrichment.history,
            payments: enrichment.payments,
            wallet_address,
            fetched_at_epoch_millis,
            error: Some(error.into()),
        }
    }

    pub fn status(&self) -> SourceStatus {
        self.miner.source_status
    }
}
