//! Human-readable rendering of pool numbers.
//!
//! Every function here is total: NaN, infinities and negative magnitudes are
//! rendered as if they were zero, and [`coerce_number`] turns non-numeric text
//! into zero, so a malformed upstream field never blanks a dashboard card.

use chrono::Utc;

pub const ATOMIC_UNITS_PER_XMR: u64 = 1_000_000_000_000;

const HASH_RATE_UNITS: [&str; 5] = ["H/s", "KH/s", "MH/s", "GH/s", "TH/s"];

/// Lenient numeric parse; anything unparseable is zero.
pub fn coerce_number(raw: &str) -> f64 {
    sanitize(raw.trim().parse::<f64>().unwrap_or(0.0))
}

fn sanitize(n: f64) -> f64 {
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

pub fn format_hash_rate(hash_rate: f64) -> String {
    let mut value = sanitize(hash_rate);
    let mut unit = 0;
    while value >= 1000.0 && unit < HASH_RATE_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{value:.0} {}", HASH_RATE_UNITS[unit])
    } else {
        format!("{value:.2} {}", HASH_RATE_UNITS[unit])
    }
}

/// Atomic units to display units with six decimals, rounded half-up in
/// integer arithmetic so large balances keep every digit.
pub fn format_currency(atomic_units: u64) -> String {
    let mut whole = atomic_units / ATOMIC_UNITS_PER_XMR;
    let remainder = atomic_units % ATOMIC_UNITS_PER_XMR;
    let mut micro = (remainder + 500_000) / 1_000_000;
    if micro == 1_000_000 {
        whole += 1;
        micro = 0;
    }
    format!("{whole}.{micro:06}")
}

pub fn format_xmr(atomic_units: u64) -> String {
    format!("{} XMR", format_currency(atomic_units))
}

pub fn format_relative_time(epoch_seconds: i64) -> String {
    format_relative_time_at(epoch_seconds, Utc::now().timestamp())
}

pub fn format_relative_time_at(epoch_seconds: i64, now_epoch_seconds: i64) -> String {
    if epoch_seconds <= 0 {
        return "Never".to_string();
    }

    let elapsed = now_epoch_seconds - epoch_seconds;
    match elapsed {
        e if e <= 0 => "Just now".to_string(),
        e if e < 60 => format!("{e}s ago"),
        e if e < 3_600 => format!("{}m ago", e / 60),
        e if e < 86_400 => format!("{}h ago", e / 3_600),
        e => format!("{}d ago", e / 86_400),
    }
}

pub fn format_compact_number(n: f64) -> String {
    let n = sanitize(n);
    if n >= 1e9 {
        format!("{:.2}B", n / 1e9)
    } else if n >= 1e6 {
        format!("{:.2}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.1}K", n / 1e3)
    } else if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        let rendered = format!("{n:.2}");
        rendered.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// `46UxNFuG...qCCgC5mg` style partial address for display and logs.
pub fn mask_wallet_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 16 {
        return address.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{head}...{tail}")
}
