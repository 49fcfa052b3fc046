//! Synthetic miner numbers for when the pool cannot be read.
//!
//! Output is always tagged [`SourceStatus::Demo`] and carries a note; the
//! aggregator re-tags it `fallback`/`config_error` when it stands in for a
//! failed cycle. Nothing here touches the network.

use chrono::Utc;
use rand::Rng;

use crate::snapshot::{MinerSnapshot, SourceStatus};

pub const DEMO_NOTE: &str = "Demo data - Connect your miner to see live stats";

/// Mobile-miner band, H/s.
pub const DEMO_HASH_RATE_MIN: f64 = 2500.0;
pub const DEMO_HASH_RATE_MAX: f64 = 4000.0;

pub fn generate_demo_snapshot<R: Rng + ?Sized>(rng: &mut R, now_epoch_seconds: i64) -> MinerSnapshot {
    MinerSnapshot {
        hash_rate: rng.gen_range(DEMO_HASH_RATE_MIN..DEMO_HASH_RATE_MAX).floor(),
        last_activity_epoch_seconds: now_epoch_seconds - rng.gen_range(0..60),
        total_hashes_lifetime: rng.gen_range(500_000..1_500_000),
        valid_share_count: rng.gen_range(100..1_100),
        invalid_share_count: rng.gen_range(0..10),
        // Under 0.01 XMR due and 0.1 XMR paid.
        amount_due_atomic_units: rng.gen_range(0..10_000_000_000),
        amount_paid_atomic_units: rng.gen_range(0..100_000_000_000),
        payment_count: rng.gen_range(5..25),
        source_status: SourceStatus::Demo,
        demo_note: Some(DEMO_NOTE.to_string()),
    }
}

pub fn generate_demo_snapshot_now() -> MinerSnapshot {
    generate_demo_snapshot(&mut rand::thread_rng(), Utc::now().timestamp())
}
