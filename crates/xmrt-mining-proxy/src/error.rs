use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("Relay returned status {0}")]
    RelayStatus(u16),

    #[error("All {attempts} relays exhausted, last error: {last_error}")]
    AllRelaysExhausted { attempts: usize, last_error: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unexpected envelope: {0}")]
    Envelope(String),

    #[error("Rate limit exceeded. Please try again in a moment.")]
    RateLimited,

    #[error("AI credits depleted. Please add credits to the gateway workspace.")]
    CreditsDepleted,

    #[error("AI gateway error: {status} - {body}")]
    Gateway { status: u16, body: String },

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Coarse classes used for retry and escalation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    TransientNetwork,
    Parse,
    Gateway,
    Internal,
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Configuration(_)
            | ProxyError::InvalidAddress(_)
            | ProxyError::InvalidRequest(_) => ErrorKind::Config,
            ProxyError::Http(e) if e.is_decode() => ErrorKind::Parse,
            ProxyError::Http(_)
            | ProxyError::UpstreamStatus(_)
            | ProxyError::RelayStatus(_)
            | ProxyError::AllRelaysExhausted { .. }
            | ProxyError::Timeout(_) => ErrorKind::TransientNetwork,
            ProxyError::Parse(_) | ProxyError::Envelope(_) => ErrorKind::Parse,
            ProxyError::RateLimited
            | ProxyError::CreditsDepleted
            | ProxyError::Gateway { .. } => ErrorKind::Gateway,
            ProxyError::Tool(_) | ProxyError::Metrics(_) | ProxyError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Config errors are never worth another request.
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::Config
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
