#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const WALLET: &str = xmrt_mining_proxy::config::DEFAULT_WALLET_ADDRESS;

/// Binds `app` on an ephemeral localhost port and serves it in the background.
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn miner_stats() -> Value {
    json!({
        "hash": 3100, "identifier": "global", "lastHash": 1_760_000_000,
        "totalHashes": 9_000_000, "validShares": 420, "invalidShares": 1,
        "amtDue": 4_218_000_000u64, "amtPaid": 100_000_000_000u64, "txnCount": 1
    })
}

/// Canned SupportXMR answer for a pool API path, or `None` for unknown paths.
pub fn pool_answer(path: &str) -> Option<Value> {
    let miner_prefix = format!("/api/miner/{WALLET}");
    let body = match path.strip_prefix(&miner_prefix) {
        Some("/stats") => miner_stats(),
        Some("/stats/allWorkers") => json!({
            "global": { "hash": 3100 },
            "pixel-7": { "hash": 1600, "lts": 1_760_000_000, "totalHash": 4_000_000 },
            "galaxy-s21": { "hash": 1500, "lts": 1_759_999_990, "totalHash": 5_000_000 }
        }),
        Some("/chart/hashrate") => json!([{ "ts": 1, "hs": 3000 }, { "ts": 2, "hs": 3200 }]),
        Some("/payments") => json!([
            { "ts": 1_759_000_000, "amount": 100_000_000_000u64, "txnHash": "ab12" }
        ]),
        _ if path == "/api/pool/stats" => json!({
            "pool_statistics": { "hashRate": 2.1e7, "miners": 4200, "totalBlocksFound": 9000 },
            "network": { "difficulty": 3.5e11, "height": 3_500_000 },
            "config": { "fee": 0.6, "minPaymentThreshold": 100_000_000_000u64 }
        }),
        _ => return None,
    };
    Some(body)
}

#[derive(Clone, Default)]
pub struct FakePool {
    pub hits: Arc<AtomicUsize>,
    /// Answer every request with this status instead of data.
    pub fail_with: Option<StatusCode>,
}

impl FakePool {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// A SupportXMR lookalike serving `/api/...`.
pub async fn spawn_pool(pool: FakePool) -> SocketAddr {
    let app = Router::new()
        .fallback(|State(pool): State<FakePool>, uri: axum::http::Uri| async move {
            pool.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = pool.fail_with {
                return status.into_response();
            }
            match pool_answer(uri.path()) {
                Some(body) => Json(body).into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        })
        .with_state(pool);
    spawn(app).await
}

/// An allorigins-style `/get?url=` relay that answers from the canned pool
/// without making a network call, plus `/down?url=` which always fails.
pub async fn spawn_relay() -> SocketAddr {
    async fn wrapped(Query(params): Query<HashMap<String, String>>) -> Response {
        let Some(target) = params.get("url") else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        let path = url_path(target);
        match pool_answer(&path) {
            Some(body) => Json(json!({
                "contents": body.to_string(),
                "status": { "url": target, "http_code": 200 }
            }))
            .into_response(),
            None => Json(json!({
                "contents": null,
                "status": { "url": target, "http_code": 404 }
            }))
            .into_response(),
        }
    }

    let app = Router::new()
        .route("/get", get(wrapped))
        .route("/down", get(|| async { StatusCode::BAD_GATEWAY }));
    spawn(app).await
}

fn url_path(target: &str) -> String {
    let without_scheme = target.split_once("://").map_or(target, |(_, rest)| rest);
    match without_scheme.find('/') {
        Some(i) => without_scheme[i..].split('?').next().unwrap_or("/").to_string(),
        None => "/".to_string(),
    }
}
