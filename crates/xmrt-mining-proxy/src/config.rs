use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fetch::RelayEndpoint;

pub const DEFAULT_WALLET_ADDRESS: &str =
    "46UxNFuGM2E3UwmZWWJicaRPoRwqwW4byQkaTHkX8yPcVihp91qAVtSFipWUGJJUyTXgzSqxzDQtNLf2bsp2DX2qCCgC5mg";
pub const DEFAULT_POOL_API_URL: &str = "https://www.supportxmr.com/api";
pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1";
pub const DEFAULT_GATEWAY_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_RELAYS: &[&str] = &[
    "https://api.allorigins.win/get?url=",
    "https://corsproxy.io/?",
    "https://api.codetabs.com/v1/proxy?quest=",
];

/// What to report when the pool answers but the wallet shows no activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroActivityPolicy {
    /// Report the real zeros with status `inactive`.
    #[default]
    Inactive,
    /// Substitute generated numbers tagged `demo`.
    Demo,
}

impl FromStr for ZeroActivityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inactive" => Ok(ZeroActivityPolicy::Inactive),
            "demo" => Ok(ZeroActivityPolicy::Demo),
            other => Err(format!("unknown zero-activity policy '{other}', expected 'inactive' or 'demo'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub wallet_address: String,
    pub pool_api_url: String,
    pub relays: Vec<RelayEndpoint>,
    pub use_relays: bool,
    pub request_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub zero_activity: ZeroActivityPolicy,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            model: DEFAULT_GATEWAY_MODEL.to_string(),
            temperature: 0.8,
            max_tokens: 1000,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            wallet_address: DEFAULT_WALLET_ADDRESS.to_string(),
            pool_api_url: DEFAULT_POOL_API_URL.to_string(),
            relays: DEFAULT_RELAYS.iter().map(|r| RelayEndpoint::from_prefix(r)).collect(),
            use_relays: false,
            request_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            cache_ttl: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            zero_activity: ZeroActivityPolicy::Inactive,
            gateway: GatewayConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Pool API base without a trailing slash.
    pub fn pool_api_base(&self) -> &str {
        self.pool_api_url.trim_end_matches('/')
    }
}
