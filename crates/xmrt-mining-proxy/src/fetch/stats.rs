use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::relay::RelayResolver;
use super::transport::JsonTransport;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::metrics::{UPSTREAM_FAILURES, UPSTREAM_REQUESTS};

/// How requests reach the pool API.
#[derive(Clone)]
pub enum Route {
    Direct,
    Relayed(RelayResolver),
}

/// Raw pool API reads with a per-request timeout and linear-backoff retries.
/// It never interprets the payload; that is the aggregator's job.
#[derive(Clone)]
pub struct StatsFetcher {
    pool_api: String,
    transport: Arc<dyn JsonTransport>,
    route: Route,
    request_timeout: Duration,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl StatsFetcher {
    pub fn new(config: &ProxyConfig, transport: Arc<dyn JsonTransport>) -> Self {
        let route = if config.use_relays {
            Route::Relayed(
                RelayResolver::new(config.relays.clone(), transport.clone())
                    .with_attempt_timeout(config.request_timeout),
            )
        } else {
            Route::Direct
        };

        Self {
            pool_api: config.pool_api_base().to_string(),
            transport,
            route,
            request_timeout: config.request_timeout,
            retry_attempts: config.retry_attempts.max(1),
            retry_base_delay: config.retry_base_delay,
        }
    }

    pub async fn fetch_miner_stats(&self, address: &str) -> Result<Value> {
        self.get_with_retry(&format!("{}/miner/{}/stats", self.pool_api, address))
            .await
    }

    pub async fn fetch_pool_stats(&self) -> Result<Value> {
        self.get_with_retry(&format!("{}/pool/stats", self.pool_api)).await
    }

    // Enrichment reads are single-shot: a slow history endpoint should not hold
    // the whole cycle through three rounds of backoff.

    pub async fn fetch_workers(&self, address: &str) -> Result<Value> {
        self.get_once(&format!("{}/miner/{}/stats/allWorkers", self.pool_api, address))
            .await
    }

    pub async fn fetch_hashrate_history(&self, address: &str) -> Result<Value> {
        self.get_once(&format!("{}/miner/{}/chart/hashrate", self.pool_api, address))
            .await
    }

    pub async fn fetch_payments(&self, address: &str) -> Result<Value> {
        self.get_once(&format!("{}/miner/{}/payments", self.pool_api, address))
            .await
    }

    async fn get_with_retry(&self, url: &str) -> Result<Value> {
        let mut attempt = 1;
        loop {
            match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry_attempts && e.is_retryable() => {
                    let delay = self.retry_base_delay * attempt;
                    warn!(
                        "Request attempt {}/{} for {} failed: {}, retrying in {:?}",
                        attempt, self.retry_attempts, url, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Request for {} failed after {} attempt(s): {}", url, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<Value> {
        UPSTREAM_REQUESTS.inc();
        let result = match &self.route {
            Route::Direct => timeout(self.request_timeout, self.transport.get_json(url))
                .await
                .unwrap_or(Err(ProxyError::Timeout(self.request_timeout))),
            Route::Relayed(resolver) => resolver.resolve(url).await,
        };

        match &result {
            Ok(_) => debug!("Fetched {}", url),
            Err(_) => UPSTREAM_FAILURES.inc(),
        }
        result
    }
}
