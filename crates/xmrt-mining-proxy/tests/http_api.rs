mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{spawn, spawn_pool, FakePool};
use serde_json::{json, Value};
use xmrt_mining_proxy::chat::{ChatService, HttpChatGateway, InMemoryTaskStore, ToolDispatcher};
use xmrt_mining_proxy::config::{GatewayConfig, ProxyConfig};
use xmrt_mining_proxy::fetch::HttpTransport;
use xmrt_mining_proxy::server::{router, AppState};
use xmrt_mining_proxy::{DashboardPoller, MiningAggregator, SnapshotCache};

/// Serves the full API over a fake pool. Returns once the dashboard poller
/// has published its first cycle.
async fn spawn_api(pool: FakePool, wallet_address: &str) -> String {
    let pool_addr = spawn_pool(pool).await;
    let config = ProxyConfig {
        wallet_address: wallet_address.to_string(),
        pool_api_url: format!("http://{pool_addr}/api"),
        retry_base_delay: Duration::from_millis(10),
        ..ProxyConfig::default()
    };

    let transport = Arc::new(HttpTransport::new().unwrap());
    let aggregator = Arc::new(MiningAggregator::new(&config, transport));
    let cache = Arc::new(SnapshotCache::default());
    let gateway = Arc::new(HttpChatGateway::new(&GatewayConfig::default()).unwrap());
    let tools = ToolDispatcher::new(Arc::new(InMemoryTaskStore::new()), cache.clone(), aggregator.clone());
    let chat = Arc::new(ChatService::new(
        gateway,
        tools,
        cache.clone(),
        aggregator.activity_log(),
        GatewayConfig::default(),
    ));

    let poller = DashboardPoller::spawn(aggregator.clone(), cache.clone(), Duration::from_secs(3_600));
    let dashboard = poller.handle();
    dashboard.subscribe().wait_for(|v| v.result.is_some()).await.unwrap();

    let addr = spawn(router(AppState {
        aggregator,
        cache,
        chat,
        dashboard,
    }))
    .await;
    format!("http://{addr}")
}

#[tokio::test]
async fn mining_proxy_serves_live_json() {
    let pool = FakePool::default();
    let base = spawn_api(pool.clone(), common::WALLET).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/mining-proxy")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["miner"]["sourceStatus"], "live");
    assert_eq!(body["miner"]["hashRate"], 3100.0);
    assert_eq!(body["walletAddress"], "46UxNFuG...qCCgC5mg");
    assert!(body["fetchedAtEpochMillis"].as_i64().unwrap() > 0);
    assert!(body.get("error").is_some_and(Value::is_null));

    let cache: Value = client
        .get(format!("{base}/mining-proxy/cache"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cache["cached"], true);
    assert_eq!(pool.hits(), 5);

    let refreshed: Value = client
        .post(format!("{base}/mining-proxy/refresh"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["miner"]["sourceStatus"], "live");
    assert_eq!(pool.hits(), 10);

    let dashboard: Value = client
        .get(format!("{base}/dashboard"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dashboard["result"]["fetchedAtEpochMillis"], refreshed["fetchedAtEpochMillis"]);
    assert_eq!(dashboard["cards"]["hashRate"], "3.10 KH/s");
    assert_eq!(dashboard["cards"]["wallet"], "46UxNFuG...qCCgC5mg");
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let base = spawn_api(FakePool::default(), common::WALLET).await;
    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/ai-chat"))
        .header("origin", "https://xmrt.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn bad_wallet_is_reported_without_calling_the_pool() {
    let pool = FakePool::default();
    let base = spawn_api(pool.clone(), "not-a-wallet").await;

    let body: Value = reqwest::get(format!("{base}/mining-proxy"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["miner"]["sourceStatus"], "config_error");
    assert_eq!(body["error"], "Invalid wallet address configuration");
    assert!(body["miner"]["demoNote"].is_string());
    assert_eq!(pool.hits(), 0);

    let dashboard: Value = reqwest::get(format!("{base}/dashboard"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(dashboard["cards"]["statusLabel"], "Configuration Error");
    assert_eq!(dashboard["cards"]["banner"]["retryable"], false);
}

#[tokio::test]
async fn chat_without_a_key_returns_a_fallback_body() {
    let base = spawn_api(FakePool::default(), common::WALLET).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/ai-chat"))
        .json(&json!({ "messages": [{ "role": "user", "content": "hello" }] }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["fallback"], true);
    assert_eq!(
        body["error"],
        "Configuration error: LLM gateway API key is not configured"
    );
}
