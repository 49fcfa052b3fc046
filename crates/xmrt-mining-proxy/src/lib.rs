pub mod activity;
pub mod aggregator;
pub mod cache;
pub mod chat;
pub mod config;
pub mod demo;
pub mod error;
pub mod fetch;
pub mod format;
pub mod metrics;
pub mod presenter;
pub mod server;
pub mod snapshot;

pub use aggregator::MiningAggregator;
pub use cache::SnapshotCache;
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use presenter::{DashboardHandle, DashboardPoller};
pub use snapshot::{RetrievalResult, SourceStatus};
