//! Adapters from the pool API's JSON shapes into the canonical snapshot types.
//!
//! The pool has served at least two miner-stats layouts over time (the
//! nodejs-pool `hash`/`amtDue` form and an older `hashrate`/`balance` form), and
//! numeric fields sometimes arrive as strings. Everything is parsed leniently:
//! a missing or non-numeric field is zero.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::schema::*;
use crate::error::{ProxyError, Result};
use crate::format::coerce_number;

const RECENT_PAYMENTS: usize = 5;

pub(crate) fn value_as_f64(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => coerce_number(s),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

pub(crate) fn value_as_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) if n.is_u64() => n.as_u64().unwrap_or(0),
        other => value_as_f64(other).floor().min(u64::MAX as f64) as u64,
    }
}

pub(crate) fn value_as_i64(value: &Value) -> i64 {
    value_as_u64(value).min(i64::MAX as u64) as i64
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    Ok(value_as_f64(&Value::deserialize(d)?))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    Ok(value_as_u64(&Value::deserialize(d)?))
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    Ok(value_as_i64(&Value::deserialize(d)?))
}

/// `GET /miner/{address}/stats` as served by nodejs-pool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodejsPoolMinerStats {
    #[serde(deserialize_with = "lenient_f64")]
    pub hash: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub last_hash: i64,
    #[serde(deserialize_with = "lenient_u64")]
    pub total_hashes: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub valid_shares: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub invalid_shares: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub amt_due: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub amt_paid: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub txn_count: u64,
}

/// The older summary layout some pool frontends still answer with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyMinerStats {
    #[serde(deserialize_with = "lenient_f64")]
    pub hashrate: f64,
    #[serde(deserialize_with = "lenient_i64")]
    pub last_share: i64,
    #[serde(deserialize_with = "lenient_u64")]
    pub balance: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub paid: u64,
}

#[derive(Debug, Clone)]
pub enum MinerPayload {
    NodejsPool(NodejsPoolMinerStats),
    Legacy(LegacyMinerStats),
}

impl MinerPayload {
    pub fn from_value(value: Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ProxyError::Envelope("miner stats payload is not an object".into()))?;

        if let Some(message) = object.get("error").and_then(Value::as_str) {
            return Err(ProxyError::Envelope(format!("pool reported: {message}")));
        }

        let is_legacy = ["hashrate", "balance", "paid", "lastShare"]
            .iter()
            .any(|k| object.contains_key(*k))
            && !["hash", "amtDue", "totalHashes", "validShares"]
                .iter()
                .any(|k| object.contains_key(*k));

        if is_legacy {
            Ok(MinerPayload::Legacy(serde_json::from_value(value)?))
        } else {
            Ok(MinerPayload::NodejsPool(serde_json::from_value(value)?))
        }
    }

    pub fn into_snapshot(self, source_status: SourceStatus) -> MinerSnapshot {
        match self {
            MinerPayload::NodejsPool(raw) => MinerSnapshot {
                hash_rate: raw.hash,
                last_activity_epoch_seconds: raw.last_hash,
                total_hashes_lifetime: raw.total_hashes,
                valid_share_count: raw.valid_shares,
                invalid_share_count: raw.invalid_shares,
                amount_due_atomic_units: raw.amt_due,
                amount_paid_atomic_units: raw.amt_paid,
                payment_count: raw.txn_count,
                source_status,
                demo_note: None,
            },
            MinerPayload::Legacy(raw) => MinerSnapshot {
                hash_rate: raw.hashrate,
                last_activity_epoch_seconds: raw.last_share,
                total_hashes_lifetime: 0,
                valid_share_count: 0,
                invalid_share_count: 0,
                amount_due_atomic_units: raw.balance,
                amount_paid_atomic_units: raw.paid,
                payment_count: 0,
                source_status,
                demo_note: None,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPoolStatistics {
    #[serde(deserialize_with = "lenient_f64")]
    hash_rate: f64,
    #[serde(deserialize_with = "lenient_u64")]
    miners: u64,
    #[serde(deserialize_with = "lenient_u64")]
    last_block_found: u64,
    #[serde(deserialize_with = "lenient_u64")]
    total_blocks_found: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawNetwork {
    #[serde(deserialize_with = "lenient_f64")]
    difficulty: f64,
    #[serde(deserialize_with = "lenient_u64")]
    height: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPoolConfig {
    #[serde(deserialize_with = "lenient_f64")]
    fee: f64,
    #[serde(deserialize_with = "lenient_u64")]
    min_payment_threshold: u64,
}

/// `GET /pool/stats`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawPoolStats {
    pool_statistics: RawPoolStatistics,
    network: RawNetwork,
    config: RawPoolConfig,
}

pub fn pool_snapshot_from_value(value: Value) -> Result<PoolSnapshot> {
    if !value.is_object() {
        return Err(ProxyError::Envelope("pool stats payload is not an object".into()));
    }
    let raw: RawPoolStats = serde_json::from_value(value)?;
    Ok(PoolSnapshot {
        pool_hash_rate: raw.pool_statistics.hash_rate,
        connected_miner_count: raw.pool_statistics.miners,
        network_difficulty: raw.network.difficulty,
        block_height: raw.network.height,
        last_block_found: raw.pool_statistics.last_block_found,
        total_blocks_found: raw.pool_statistics.total_blocks_found,
        fee_percent: raw.config.fee.clamp(0.0, 100.0),
        min_payout_atomic_units: raw.config.min_payment_threshold,
    })
}

/// `GET /miner/{address}/stats/allWorkers`: an object keyed by worker name.
/// The pool's aggregate `global` entry is not a worker.
pub fn workers_from_value(value: Value) -> Result<Vec<WorkerSnapshot>> {
    let object = value
        .as_object()
        .ok_or_else(|| ProxyError::Envelope("workers payload is not an object".into()))?;

    let mut workers: Vec<WorkerSnapshot> = object
        .iter()
        .filter(|(name, _)| name.as_str() != "global")
        .map(|(name, stats)| WorkerSnapshot {
            name: name.clone(),
            hash_rate: value_as_f64(&stats["hash"]),
            last_share_epoch_seconds: value_as_i64(&stats["lts"]),
            total_hashes: value_as_u64(&stats["totalHash"]),
        })
        .collect();
    workers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(workers)
}

/// `GET /miner/{address}/chart/hashrate`: points are either `[ts, hs]` pairs
/// or `{ts, hs}` objects.
pub fn history_from_value(value: Value) -> Result<HashrateHistory> {
    let points = value
        .as_array()
        .ok_or_else(|| ProxyError::Envelope("hashrate chart payload is not an array".into()))?;

    let total: f64 = points
        .iter()
        .map(|point| match point {
            Value::Array(pair) => pair.get(1).map(value_as_f64).unwrap_or(0.0),
            Value::Object(obj) => obj
                .get("hs")
                .or_else(|| obj.get("hashrate"))
                .or_else(|| obj.get("hash"))
                .map(value_as_f64)
                .unwrap_or(0.0),
            other => value_as_f64(other),
        })
        .sum();

    let data_points = points.len();
    Ok(HashrateHistory {
        data_points,
        average_hash_rate: if data_points == 0 { 0.0 } else { total / data_points as f64 },
    })
}

/// `GET /miner/{address}/payments`, newest first.
pub fn payments_from_value(value: Value) -> Result<PaymentSummary> {
    let entries = value
        .as_array()
        .ok_or_else(|| ProxyError::Envelope("payments payload is not an array".into()))?;

    let recent = entries
        .iter()
        .take(RECENT_PAYMENTS)
        .map(|entry| PaymentRecord {
            epoch_seconds: value_as_i64(entry.get("ts").or_else(|| entry.get("time")).unwrap_or(&Value::Null)),
            amount_atomic_units: value_as_u64(&entry["amount"]),
            txn_hash: entry
                .get("txnHash")
                .or_else(|| entry.get("hash"))
                .and_then(Value::as_str)
                .map(String::from),
        })
        .collect();

    Ok(PaymentSummary {
        total_payments: entries.len(),
        recent,
    })
}
