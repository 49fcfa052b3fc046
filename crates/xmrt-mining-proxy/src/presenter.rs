use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::MiningAggregator;
use crate::cache::SnapshotCache;
use crate::format::{
    format_compact_number, format_hash_rate, format_relative_time_at, format_xmr,
};
use crate::snapshot::{RetrievalResult, SourceStatus};

/// A miner counts as online if it submitted work in the last five minutes.
pub const ONLINE_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub result: Option<Arc<RetrievalResult>>,
    pub loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A forced refresh, optionally with someone waiting for its result.
type RefreshRequest = Option<oneshot::Sender<Arc<RetrievalResult>>>;

/// Cheap, cloneable view of a running [`DashboardPoller`].
#[derive(Clone)]
pub struct DashboardHandle {
    view: watch::Receiver<DashboardView>,
    refresh_tx: mpsc::Sender<RefreshRequest>,
}

impl DashboardHandle {
    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.view.clone()
    }

    pub fn latest(&self) -> DashboardView {
        self.view.borrow().clone()
    }

    /// Asks for a cycle that ignores the cache TTL. Requests made while one
    /// is already queued collapse into it.
    pub fn request_refresh(&self) {
        match self.refresh_tx.try_send(None) {
            Ok(()) => debug!("Manual refresh queued"),
            Err(mpsc::error::TrySendError::Full(_)) => debug!("Manual refresh already pending"),
            Err(mpsc::error::TrySendError::Closed(_)) => warn!("Refresh requested after poller stopped"),
        }
    }

    /// Forces a cycle through the poller and waits for the result it
    /// publishes. `None` if the poller stopped first.
    pub async fn refresh(&self) -> Option<Arc<RetrievalResult>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.refresh_tx.send(Some(reply_tx)).await.is_err() {
            warn!("Refresh requested after poller stopped");
            return None;
        }
        reply_rx.await.ok()
    }
}

/// Keeps a [`DashboardView`] current by polling the cache on a fixed interval.
pub struct DashboardPoller {
    shared: DashboardHandle,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DashboardPoller {
    pub fn spawn(
        aggregator: Arc<MiningAggregator>,
        cache: Arc<SnapshotCache>,
        interval: Duration,
    ) -> Self {
        let (view_tx, view) = watch::channel(DashboardView::default());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(poll_loop(
            aggregator,
            cache,
            interval,
            refresh_rx,
            view_tx,
            cancel.clone(),
        ));

        Self {
            shared: DashboardHandle { view, refresh_tx },
            cancel,
            handle,
        }
    }

    pub fn handle(&self) -> DashboardHandle {
        self.shared.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.shared.subscribe()
    }

    pub fn latest(&self) -> DashboardView {
        self.shared.latest()
    }

    pub fn request_refresh(&self) {
        self.shared.request_refresh()
    }

    /// Stops polling. A cycle still in flight is abandoned and its result is
    /// never published.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("Dashboard poller task ended abnormally: {}", e);
        }
        info!("Dashboard poller stopped");
    }
}

async fn poll_loop(
    aggregator: Arc<MiningAggregator>,
    cache: Arc<SnapshotCache>,
    interval: Duration,
    mut refresh_rx: mpsc::Receiver<RefreshRequest>,
    view_tx: watch::Sender<DashboardView>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let (forced, reply) = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => (false, None),
            request = refresh_rx.recv() => match request {
                Some(reply) => (true, reply),
                None => break,
            },
        };

        view_tx.send_modify(|view| view.loading = true);
        let cycle = async {
            if forced {
                cache.refresh(&aggregator).await
            } else {
                cache.get_or_refresh(&aggregator).await
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Poller cancelled mid-cycle, dropping its result");
                break;
            }
            result = cycle => {
                view_tx.send_replace(DashboardView {
                    result: Some(result.clone()),
                    loading: false,
                    last_updated: Some(Utc::now()),
                });
                if let Some(reply) = reply {
                    // The waiter may have given up; the view is already published.
                    let _ = reply.send(result);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Banner {
    pub status: SourceStatus,
    pub message: String,
    /// A manual refresh may help; false for configuration errors.
    pub retryable: bool,
}

/// Display strings for the stats cards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCards {
    pub hash_rate: String,
    pub total_hashes: String,
    pub valid_shares: String,
    pub invalid_shares: String,
    pub amount_due: String,
    pub amount_paid: String,
    pub last_activity: String,
    pub status_label: String,
    pub is_online: bool,
    pub worker_count: usize,
    pub pool_hash_rate: Option<String>,
    pub pool_miners: Option<String>,
    pub wallet: String,
    pub demo_note: Option<String>,
    pub banner: Option<Banner>,
}

impl DashboardCards {
    pub fn from_result(result: &RetrievalResult, now_epoch_seconds: i64) -> Self {
        let miner = &result.miner;
        let is_online = miner.last_activity_epoch_seconds > 0
            && now_epoch_seconds - miner.last_activity_epoch_seconds < ONLINE_WINDOW_SECS;

        let status_label = match miner.source_status {
            SourceStatus::Demo => "Demo Data",
            SourceStatus::Inactive => "Inactive",
            SourceStatus::Fallback => "Fallback Data",
            SourceStatus::ConfigError => "Configuration Error",
            SourceStatus::Live if is_online => "Mining (Online)",
            SourceStatus::Live => "Idle (Offline)",
        };

        let banner = result.error.as_ref().map(|message| Banner {
            status: miner.source_status,
            message: message.clone(),
            retryable: miner.source_status != SourceStatus::ConfigError,
        });

        Self {
            hash_rate: format_hash_rate(miner.hash_rate),
            total_hashes: format_compact_number(miner.total_hashes_lifetime as f64),
            valid_shares: format_compact_number(miner.valid_share_count as f64),
            invalid_shares: format_compact_number(miner.invalid_share_count as f64),
            amount_due: format_xmr(miner.amount_due_atomic_units),
            amount_paid: format_xmr(miner.amount_paid_atomic_units),
            last_activity: format_relative_time_at(miner.last_activity_epoch_seconds, now_epoch_seconds),
            status_label: status_label.to_string(),
            is_online,
            worker_count: result.workers.as_ref().map_or(0, Vec::len),
            pool_hash_rate: result.pool.as_ref().map(|p| format_hash_rate(p.pool_hash_rate)),
            pool_miners: result
                .pool
                .as_ref()
                .map(|p| format_compact_number(p.connected_miner_count as f64)),
            wallet: result.wallet_address.clone(),
            demo_note: miner.demo_note.clone(),
            banner,
        }
    }
}

/// Markdown block used as chat context and by the `get_mining_stats` tool.
pub fn summary_markdown(result: Option<&RetrievalResult>, now_epoch_seconds: i64) -> String {
    let Some(result) = result else {
        return "Mining statistics are currently unavailable.".to_string();
    };
    let cards = DashboardCards::from_result(result, now_epoch_seconds);

    let mut lines = vec![
        "**Live Mining Statistics (SupportXMR Pool):**".to_string(),
        format!("- **Hash Rate**: {}", cards.hash_rate),
        format!("- **Status**: {}", cards.status_label),
        format!("- **Valid Shares**: {}", cards.valid_shares),
        format!("- **Total Hashes**: {}", cards.total_hashes),
        format!("- **Amount Due**: {}", cards.amount_due),
        format!("- **Amount Paid**: {}", cards.amount_paid),
        format!("- **Last Activity**: {}", cards.last_activity),
    ];
    if let Some(pool) = &cards.pool_hash_rate {
        lines.push(format!("- **Pool Hash Rate**: {pool}"));
    }
    if !cards.wallet.is_empty() {
        lines.push(format!("- **Wallet**: {}", cards.wallet));
    }
    if let Some(note) = &cards.demo_note {
        lines.push(format!("- **Note**: {note}"));
    }
    if let Some(banner) = &cards.banner {
        lines.push(format!("- **Error**: {}", banner.message));
    }
    lines.join("\n")
}
