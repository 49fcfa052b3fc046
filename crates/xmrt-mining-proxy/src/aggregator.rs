use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::activity::ActivityLog;
use crate::config::{ProxyConfig, ZeroActivityPolicy};
use crate::demo::generate_demo_snapshot;
use crate::error::{ProxyError, Result};
use crate::fetch::{JsonTransport, StatsFetcher};
use crate::format::mask_wallet_address;
use crate::metrics::{CYCLE_DURATION, FETCH_CYCLES, MINER_HASHRATE};
use crate::snapshot::{
    history_from_value, payments_from_value, pool_snapshot_from_value, workers_from_value,
    Enrichment, MinerPayload, MinerSnapshot, RetrievalResult, SourceStatus,
};

pub const CONFIG_ERROR_MESSAGE: &str = "Invalid wallet address configuration";
pub const UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable";

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
    Succeeded,
    Failed,
}

/// Standard (`4…`, 95 chars), integrated (`4…`, 106 chars) or subaddress
/// (`8…`, 95 chars) in the base58 alphabet. No checksum verification.
pub fn validate_wallet_address(address: &str) -> Result<()> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ProxyError::InvalidAddress("wallet address is empty".into()));
    }
    if !(address.starts_with('4') || address.starts_with('8')) {
        return Err(ProxyError::InvalidAddress(format!(
            "{} does not start with 4 or 8",
            mask_wallet_address(address)
        )));
    }
    if address.len() != 95 && address.len() != 106 {
        return Err(ProxyError::InvalidAddress(format!(
            "{} has length {}, expected 95 or 106",
            mask_wallet_address(address),
            address.len()
        )));
    }
    if let Some(bad) = address.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(ProxyError::InvalidAddress(format!(
            "{} contains non-base58 character {:?}",
            mask_wallet_address(address),
            bad
        )));
    }
    Ok(())
}

/// Runs fetch cycles against the pool for the one configured wallet.
///
/// [`MiningAggregator::run`] is the error boundary of the pipeline: whatever
/// happens upstream, including a panic inside a transport, it resolves to a
/// [`RetrievalResult`].
pub struct MiningAggregator {
    fetcher: StatsFetcher,
    wallet_address: String,
    zero_activity: ZeroActivityPolicy,
    demo_rng: Mutex<StdRng>,
    activity: Arc<ActivityLog>,
    state: watch::Sender<CycleState>,
}

impl MiningAggregator {
    pub fn new(config: &ProxyConfig, transport: Arc<dyn JsonTransport>) -> Self {
        let (state, _) = watch::channel(CycleState::Idle);
        Self {
            fetcher: StatsFetcher::new(config, transport),
            wallet_address: config.wallet_address.trim().to_string(),
            zero_activity: config.zero_activity,
            demo_rng: Mutex::new(StdRng::from_entropy()),
            activity: Arc::new(ActivityLog::default()),
            state,
        }
    }

    pub fn with_activity_log(mut self, activity: Arc<ActivityLog>) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_demo_seed(self, seed: u64) -> Self {
        *self.demo_rng.lock().unwrap_or_else(|e| e.into_inner()) = StdRng::seed_from_u64(seed);
        self
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    pub fn activity_log(&self) -> Arc<ActivityLog> {
        self.activity.clone()
    }

    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    pub async fn run(&self) -> RetrievalResult {
        self.state.send_replace(CycleState::Fetching);
        let guard = CycleGuard {
            state: &self.state,
            armed: true,
        };
        let timer = CYCLE_DURATION.start_timer();

        let result = match AssertUnwindSafe(self.cycle()).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!("Mining cycle panicked, serving fallback data");
                RetrievalResult::failed(
                    self.demo_snapshot(SourceStatus::Fallback),
                    Enrichment::default(),
                    mask_wallet_address(&self.wallet_address),
                    Utc::now().timestamp_millis(),
                    UNAVAILABLE_MESSAGE,
                )
            }
        };

        timer.observe_duration();
        guard.disarm();
        self.finish(&result);
        result
    }

    async fn cycle(&self) -> RetrievalResult {
        let fetched_at = Utc::now().timestamp_millis();
        let masked = mask_wallet_address(&self.wallet_address);

        if let Err(e) = validate_wallet_address(&self.wallet_address) {
            warn!("Refusing to query the pool: {}", e);
            return RetrievalResult::failed(
                self.demo_snapshot(SourceStatus::ConfigError),
                Enrichment::default(),
                masked,
                fetched_at,
                CONFIG_ERROR_MESSAGE,
            );
        }

        info!("Fetching mining stats for {}", masked);
        let address = self.wallet_address.as_str();
        let (miner, pool, workers, history, payments) = tokio::join!(
            self.fetcher.fetch_miner_stats(address),
            self.fetcher.fetch_pool_stats(),
            self.fetcher.fetch_workers(address),
            self.fetcher.fetch_hashrate_history(address),
            self.fetcher.fetch_payments(address),
        );

        let enrichment = Enrichment {
            pool: enrichment("pool stats", pool.and_then(pool_snapshot_from_value)),
            workers: enrichment("worker stats", workers.and_then(workers_from_value)),
            history: enrichment("hashrate history", history.and_then(history_from_value)),
            payments: enrichment("payments", payments.and_then(payments_from_value)),
        };

        match miner.and_then(MinerPayload::from_value) {
            Err(e) => {
                warn!("Mining API failed, serving demo numbers: {}", e);
                RetrievalResult::failed(
                    self.demo_snapshot(SourceStatus::Fallback),
                    enrichment,
                    masked,
                    fetched_at,
                    format!("Mining API unavailable: {e}"),
                )
            }
            Ok(payload) => {
                let snapshot = payload.into_snapshot(SourceStatus::Live);
                let miner = if snapshot.has_activity() {
                    snapshot
                } else {
                    match self.zero_activity {
                        ZeroActivityPolicy::Inactive => {
                            info!("Miner {} reports no activity", masked);
                            snapshot.retagged(SourceStatus::Inactive)
                        }
                        ZeroActivityPolicy::Demo => {
                            info!("Miner {} reports no activity, substituting demo numbers", masked);
                            self.demo_snapshot(SourceStatus::Demo)
                        }
                    }
                };
                RetrievalResult::succeeded(miner, enrichment, masked, fetched_at)
            }
        }
    }

    fn demo_snapshot(&self, status: SourceStatus) -> MinerSnapshot {
        let mut rng = self.demo_rng.lock().unwrap_or_else(|e| e.into_inner());
        generate_demo_snapshot(&mut *rng, Utc::now().timestamp()).retagged(status)
    }

    fn finish(&self, result: &RetrievalResult) {
        let status = result.status();
        FETCH_CYCLES.with_label_values(&[status.as_str()]).inc();
        if status == SourceStatus::Live {
            MINER_HASHRATE.set(result.miner.hash_rate);
        }

        match &result.error {
            Some(e) => {
                self.state.send_replace(CycleState::Failed);
                self.activity.record("mining", status.as_str(), e.clone());
            }
            None => {
                self.state.send_replace(CycleState::Succeeded);
                self.activity.record(
                    "mining",
                    status.as_str(),
                    format!("hash rate {} H/s", result.miner.hash_rate),
                );
            }
        }
        info!("Mining cycle finished with status {}", status);
    }
}

/// Puts the state back to `Idle` when a caller drops a cycle mid-flight.
struct CycleGuard<'a> {
    state: &'a watch::Sender<CycleState>,
    armed: bool,
}

impl CycleGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(CycleState::Idle);
        }
    }
}

fn enrichment<T>(what: &str, fetched: Result<T>) -> Option<T> {
    match fetched {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("{} unavailable: {}", what, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WALLET_ADDRESS;
    use crate::fetch::testing::{Reply, ScriptedTransport};
    use serde_json::json;

    fn config() -> ProxyConfig {
        ProxyConfig {
            pool_api_url: "https://pool.test/api".into(),
            ..ProxyConfig::default()
        }
    }

    fn healthy_pool(url: &str) -> Reply {
        if url.ends_with("/stats/allWorkers") {
            Reply::Json(json!({ "global": { "hash": 3100 }, "pixel-7": { "hash": 3100, "lts": 1, "totalHash": 5 } }))
        } else if url.ends_with("/chart/hashrate") {
            Reply::Json(json!([{ "ts": 1, "hs": 3000 }, { "ts": 2, "hs": 3200 }]))
        } else if url.ends_with("/payments") {
            Reply::Json(json!([{ "ts": 1_700_000_000, "amount": 100_000_000_000u64, "txnHash": "ab" }]))
        } else if url.ends_with("/pool/stats") {
            Reply::Json(json!({
                "pool_statistics": { "hashRate": 2.1e7, "miners": 4200 },
                "network": { "difficulty": 3.5e11, "height": 3_500_000 },
                "config": { "fee": 0.6, "minPaymentThreshold": 100_000_000_000u64 }
            }))
        } else {
            Reply::Json(json!({
                "hash": 3100, "lastHash": 1_760_000_000, "totalHashes": 9_000_000,
                "validShares": 420, "invalidShares": 1, "amtDue": 4_218_000_000u64,
                "amtPaid": 100_000_000_000u64, "txnCount": 1
            }))
        }
    }

    #[tokio::test]
    async fn live_cycle_merges_every_source() {
        let transport = ScriptedTransport::new(healthy_pool);
        let aggregator = MiningAggregator::new(&config(), transport.clone());

        let result = aggregator.run().await;

        assert_eq!(result.status(), SourceStatus::Live);
        assert!(result.error.is_none());
        assert_eq!(result.miner.valid_share_count, 420);
        assert!(!result.miner.is_synthetic());
        assert_eq!(result.pool.as_ref().unwrap().connected_miner_count, 4200);
        assert_eq!(result.workers.as_ref().unwrap().len(), 1);
        assert_eq!(result.history.as_ref().unwrap().average_hash_rate, 3100.0);
        assert_eq!(result.payments.as_ref().unwrap().total_payments, 1);
        assert_eq!(result.wallet_address, "46UxNFuG...qCCgC5mg");
        assert_eq!(transport.call_count(), 5);
        assert_eq!(aggregator.state(), CycleState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn total_outage_still_yields_a_result() {
        let transport = ScriptedTransport::new(|_| Reply::Status(500));
        let aggregator = MiningAggregator::new(&config(), transport);

        let result = aggregator.run().await;

        assert_eq!(result.status(), SourceStatus::Fallback);
        assert!(result.error.as_deref().unwrap().starts_with("Mining API unavailable"));
        assert!(result.miner.demo_note.is_some());
        assert!(result.pool.is_none() && result.workers.is_none());
        assert!(result.history.is_none() && result.payments.is_none());
        assert_eq!(aggregator.state(), CycleState::Failed);
    }

    #[tokio::test]
    async fn malformed_address_never_touches_the_network() {
        let transport = ScriptedTransport::new(healthy_pool);
        let aggregator = MiningAggregator::new(
            &ProxyConfig {
                wallet_address: "4notarealwallet".into(),
                ..config()
            },
            transport.clone(),
        );

        let result = aggregator.run().await;

        assert_eq!(result.status(), SourceStatus::ConfigError);
        assert_eq!(result.error.as_deref(), Some(CONFIG_ERROR_MESSAGE));
        assert!(result.miner.demo_note.is_some());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(aggregator.state(), CycleState::Failed);
    }

    #[tokio::test]
    async fn zero_activity_reports_inactive_by_default() {
        let transport = ScriptedTransport::new(|url| {
            if url.ends_with("/stats") && url.contains("/miner/") {
                Reply::Json(json!({ "hash": 0, "totalHashes": 0, "validShares": 0, "amtPaid": 5 }))
            } else {
                healthy_pool(url)
            }
        });
        let aggregator = MiningAggregator::new(&config(), transport);

        let result = aggregator.run().await;

        assert_eq!(result.status(), SourceStatus::Inactive);
        assert!(result.error.is_none());
        assert_eq!(result.miner.hash_rate, 0.0);
        assert_eq!(result.miner.amount_paid_atomic_units, 5);
        assert!(!result.miner.is_synthetic());
    }

    #[tokio::test]
    async fn zero_activity_can_be_filled_with_tagged_demo_numbers() {
        let transport = ScriptedTransport::new(|url| {
            if url.ends_with("/stats") && url.contains("/miner/") {
                Reply::Json(json!({ "hash": 0 }))
            } else {
                healthy_pool(url)
            }
        });
        let aggregator = MiningAggregator::new(
            &ProxyConfig {
                zero_activity: ZeroActivityPolicy::Demo,
                ..config()
            },
            transport,
        )
        .with_demo_seed(3);

        let result = aggregator.run().await;

        assert_eq!(result.status(), SourceStatus::Demo);
        assert!(result.error.is_none());
        assert!(result.miner.is_synthetic());
        assert!(result.miner.hash_rate >= 2500.0);
    }

    #[tokio::test]
    async fn enrichment_failures_do_not_degrade_live_data() {
        let transport = ScriptedTransport::new(|url| {
            if url.ends_with("/stats") && url.contains("/miner/") {
                healthy_pool(url)
            } else {
                Reply::Json(json!("<html>maintenance</html>"))
            }
        });
        let aggregator = MiningAggregator::new(&config(), transport);

        let result = aggregator.run().await;

        assert_eq!(result.status(), SourceStatus::Live);
        assert!(result.pool.is_none());
        assert!(result.workers.is_none());
        assert!(result.history.is_none());
        assert!(result.payments.is_none());
    }

    #[tokio::test]
    async fn panicking_transport_is_contained() {
        let transport = ScriptedTransport::new(|_| Reply::Panic);
        let aggregator = MiningAggregator::new(&config(), transport);

        let result = aggregator.run().await;

        assert_eq!(result.status(), SourceStatus::Fallback);
        assert_eq!(result.error.as_deref(), Some(UNAVAILABLE_MESSAGE));
        assert_eq!(aggregator.state(), CycleState::Failed);
    }

    #[tokio::test]
    async fn each_cycle_is_logged() {
        let log = Arc::new(ActivityLog::default());
        let transport = ScriptedTransport::new(healthy_pool);
        let aggregator = MiningAggregator::new(&config(), transport).with_activity_log(log.clone());

        aggregator.run().await;
        aggregator.run().await;

        let entries = log.recent(10, Some("mining"));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, "live");
    }

    #[test]
    fn address_validation() {
        assert!(validate_wallet_address(DEFAULT_WALLET_ADDRESS).is_ok());
        assert!(validate_wallet_address("").is_err());
        assert!(validate_wallet_address(&DEFAULT_WALLET_ADDRESS.replacen('4', "5", 1)).is_err());
        assert!(validate_wallet_address(&DEFAULT_WALLET_ADDRESS[..90]).is_err());
        let with_zero = format!("{}0", &DEFAULT_WALLET_ADDRESS[..94]);
        assert!(validate_wallet_address(&with_zero).is_err());
    }
}
