use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, Opts, TextEncoder};

use crate::error::{ProxyError, Result};

lazy_static! {
    pub static ref FETCH_CYCLES: IntCounterVec = IntCounterVec::new(
        Opts::new("xmrt_fetch_cycles_total", "Aggregator cycles by resulting source status"),
        &["status"]
    ).expect("static metric definition");

    pub static ref UPSTREAM_REQUESTS: Counter = Counter::new(
        "xmrt_upstream_requests_total",
        "Total number of pool API request attempts"
    ).expect("static metric definition");

    pub static ref UPSTREAM_FAILURES: Counter = Counter::new(
        "xmrt_upstream_failures_total",
        "Total number of failed pool API request attempts"
    ).expect("static metric definition");

    pub static ref RELAY_FALLBACKS: Counter = Counter::new(
        "xmrt_relay_fallbacks_total",
        "Requests answered by a relay other than the first one"
    ).expect("static metric definition");

    pub static ref CACHE_HITS: Counter = Counter::new(
        "xmrt_cache_hits_total",
        "Snapshot cache reads served from the slot"
    ).expect("static metric definition");

    pub static ref CACHE_MISSES: Counter = Counter::new(
        "xmrt_cache_misses_total",
        "Snapshot cache reads that found the slot empty or stale"
    ).expect("static metric definition");

    pub static ref MINER_HASHRATE: Gauge = Gauge::new(
        "xmrt_miner_hashrate_hps",
        "Hash rate of the monitored wallet from the last live cycle"
    ).expect("static metric definition");

    pub static ref CYCLE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("xmrt_cycle_duration_seconds", "Wall time of one aggregator cycle")
    ).expect("static metric definition");
}

pub fn register_metrics() -> Result<()> {
    prometheus::register(Box::new(FETCH_CYCLES.clone()))?;
    prometheus::register(Box::new(UPSTREAM_REQUESTS.clone()))?;
    prometheus::register(Box::new(UPSTREAM_FAILURES.clone()))?;
    prometheus::register(Box::new(RELAY_FALLBACKS.clone()))?;
    prometheus::register(Box::new(CACHE_HITS.clone()))?;
    prometheus::register(Box::new(CACHE_MISSES.clone()))?;
    prometheus::register(Box::new(MINER_HASHRATE.clone()))?;
    prometheus::register(Box::new(CYCLE_DURATION.clone()))?;
    Ok(())
}

pub fn metrics_handler() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ProxyError::Other(format!("metrics are not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_are_rendered() {
        register_metrics().unwrap();
        CACHE_HITS.inc();

        let text = metrics_handler().unwrap();
        assert!(text.contains("xmrt_cache_hits_total"));
        assert!(text.contains("xmrt_cycle_duration_seconds_bucket"));

        // A second registration is refused rather than silently duplicated.
        assert!(matches!(register_metrics(), Err(ProxyError::Metrics(_))));
    }
}
