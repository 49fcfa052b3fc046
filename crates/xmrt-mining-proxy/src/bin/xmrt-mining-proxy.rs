use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xmrt_mining_proxy::{
    chat::{ChatService, HttpChatGateway, InMemoryTaskStore, ToolDispatcher},
    config::{
        GatewayConfig, ProxyConfig, ZeroActivityPolicy, DEFAULT_GATEWAY_MODEL, DEFAULT_GATEWAY_URL,
        DEFAULT_POOL_API_URL, DEFAULT_WALLET_ADDRESS,
    },
    fetch::{HttpTransport, RelayEndpoint},
    format::mask_wallet_address,
    metrics::register_metrics,
    server::{router, AppState},
    DashboardPoller, MiningAggregator, SnapshotCache,
};

#[derive(Parser, Debug)]
#[clap(name = "xmrt-mining-proxy")]
#[clap(about = "XMRT DAO mining statistics proxy and chat pass-through", long_about = None)]
struct Args {
    /// Monero wallet whose pool statistics are served
    #[clap(long, env = "MINER_WALLET_ADDRESS", default_value = DEFAULT_WALLET_ADDRESS)]
    wallet_address: String,

    /// SupportXMR-compatible pool API base URL
    #[clap(long, env = "POOL_API_URL", default_value = DEFAULT_POOL_API_URL)]
    pool_api_url: String,

    /// Comma-separated relay prefixes, tried in order
    #[clap(
        long,
        env = "CORS_RELAY_URLS",
        value_delimiter = ',',
        default_value = "https://api.allorigins.win/get?url=,https://corsproxy.io/?,https://api.codetabs.com/v1/proxy?quest="
    )]
    relay_urls: Vec<String>,

    /// Route pool requests through the relays instead of calling the pool directly
    #[clap(long, env = "USE_CORS_RELAYS")]
    use_relays: bool,

    #[clap(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    request_timeout_secs: u64,

    #[clap(long, env = "RETRY_ATTEMPTS", default_value = "3")]
    retry_attempts: u32,

    #[clap(long, env = "RETRY_BASE_DELAY_MS", default_value = "1000")]
    retry_base_delay_ms: u64,

    #[clap(long, env = "CACHE_TTL_SECS", default_value = "30")]
    cache_ttl_secs: u64,

    #[clap(long, env = "POLL_INTERVAL_SECS", default_value = "30")]
    poll_interval_secs: u64,

    /// What to serve when the wallet has no activity: inactive or demo
    #[clap(long = "zero-activity", env = "ZERO_ACTIVITY_POLICY", default_value = "inactive")]
    zero_activity: ZeroActivityPolicy,

    #[clap(long, env = "LLM_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway_url: String,

    #[clap(long, env = "LLM_GATEWAY_API_KEY", hide_env_values = true)]
    gateway_api_key: Option<String>,

    #[clap(long, env = "LLM_GATEWAY_MODEL", default_value = DEFAULT_GATEWAY_MODEL)]
    gateway_model: String,

    /// HTTP API bind address
    #[clap(long, env = "HTTP_BIND", default_value = "0.0.0.0:8080")]
    http_bind: SocketAddr,

    /// Verbose logging when RUST_LOG is unset
    #[clap(long, env = "XMRT_DEBUG")]
    debug: bool,
}

impl Args {
    fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            wallet_address: self.wallet_address.clone(),
            pool_api_url: self.pool_api_url.clone(),
            relays: self
                .relay_urls
                .iter()
                .filter(|r| !r.trim().is_empty())
                .map(|r| RelayEndpoint::from_prefix(r))
                .collect(),
            use_relays: self.use_relays,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry_attempts: self.retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            zero_activity: self.zero_activity,
            gateway: GatewayConfig {
                url: self.gateway_url.clone(),
                api_key: self.gateway_api_key.clone(),
                model: self.gateway_model.clone(),
                ..GatewayConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.proxy_config();
    info!("Starting XMRT mining proxy for {}", mask_wallet_address(&config.wallet_address));
    info!("Pool API: {}", config.pool_api_base());
    if config.use_relays {
        info!("Routing through {} relays", config.relays.len());
    }
    if config.gateway.api_key.is_none() {
        warn!("LLM_GATEWAY_API_KEY is not set, /ai-chat will answer with a configuration error");
    }

    register_metrics().context("failed to register metrics")?;

    let transport = Arc::new(HttpTransport::new().context("failed to build HTTP client")?);
    let aggregator = Arc::new(MiningAggregator::new(&config, transport));
    let cache = Arc::new(SnapshotCache::new(config.cache_ttl));

    let gateway = Arc::new(HttpChatGateway::new(&config.gateway).context("failed to build gateway client")?);
    let tools = ToolDispatcher::new(Arc::new(InMemoryTaskStore::new()), cache.clone(), aggregator.clone());
    let chat = Arc::new(ChatService::new(
        gateway,
        tools,
        cache.clone(),
        aggregator.activity_log(),
        config.gateway.clone(),
    ));

    let poller = DashboardPoller::spawn(aggregator.clone(), cache.clone(), config.poll_interval);

    let app = router(AppState {
        aggregator,
        cache: cache.clone(),
        chat,
        dashboard: poller.handle(),
    });
    let listener = tokio::net::TcpListener::bind(args.http_bind)
        .await
        .with_context(|| format!("failed to bind {}", args.http_bind))?;
    info!("HTTP API listening on {}", args.http_bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal");
        })
        .await
        .context("HTTP server error")?;

    poller.shutdown().await;
    cache.clear();
    info!("Mining proxy shut down");
    Ok(())
}
