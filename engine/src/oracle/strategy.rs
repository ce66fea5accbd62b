//! Pure price-validation rules.
//!
//! Nothing in here touches feed state; the validator feeds the current
//! readings and history in and decides what to commit from the answers.
//!
//! ## Divergence bands
//!
//! With `d = |p1 - p2| / min(p1, p2)`:
//!
//! ```text
//!   0 ────────── t1 ══════════════ t2 ──────────►
//!      Normal       Warning (closed)    Critical
//! ```
//!
//! Both boundaries belong to the Warning band: a tie at `t1` takes the more
//! restrictive class, a tie at `t2` is still accepted. Warning escalates to
//! Major once it has persisted longer than the feed's allowed duration.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::math::{cmp_relative_diff, relative_diff_bps};

/// Severity of disagreement between the two providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Warning,
    Major,
    Critical,
}

impl Severity {
    /// Whether a price classified at this severity may be committed.
    pub fn accepts(&self) -> bool {
        matches!(self, Severity::Normal | Severity::Warning)
    }
}

/// Classifies two fresh prices into Normal, Warning or Critical.
pub fn classify_divergence(
    primary: u128,
    secondary: u128,
    threshold1_bps: u64,
    threshold2_bps: u64,
) -> Severity {
    if cmp_relative_diff(primary, secondary, threshold1_bps) == Ordering::Less {
        return Severity::Normal;
    }
    if cmp_relative_diff(primary, secondary, threshold2_bps) == Ordering::Greater {
        return Severity::Critical;
    }
    Severity::Warning
}

/// Divergence in whole bps, for error reporting.
pub fn divergence_bps(primary: u128, secondary: u128) -> u128 {
    relative_diff_bps(primary, secondary)
}

/// Escalates a Warning to Major once the warning timer has run longer than
/// `max_duration_ms`. `warning_since` is the start of the current streak,
/// or `None` if this observation starts it.
pub fn escalate_warning(warning_since: Option<u64>, now: u64, max_duration_ms: u64) -> Severity {
    match warning_since {
        Some(since) if now.saturating_sub(since) > max_duration_ms => Severity::Major,
        _ => Severity::Warning,
    }
}

/// Range check. Either bound set to zero disables only that side.
pub fn within_bounds(price: u128, min_price: u128, max_price: u128) -> bool {
    if min_price > 0 && price < min_price {
        return false;
    }
    if max_price > 0 && price > max_price {
        return false;
    }
    true
}

/// History span check. Returns `Err(span_bps)` when `price` moved further
/// than `max_span_bps` from `previous` within `ttl_ms` of the previous
/// acceptance. A zero TTL or an empty history disables the check.
pub fn check_span(
    previous: Option<(u128, u64)>,
    price: u128,
    now: u64,
    ttl_ms: u64,
    max_span_bps: u64,
) -> Result<(), u128> {
    let Some((previous_price, updated_at)) = previous else {
        return Ok(());
    };
    if ttl_ms == 0 || previous_price == 0 || now.saturating_sub(updated_at) >= ttl_ms {
        return Ok(());
    }
    if cmp_relative_diff_from(previous_price, price, max_span_bps) == Ordering::Greater {
        return Err(price.abs_diff(previous_price).saturating_mul(10_000) / previous_price);
    }
    Ok(())
}

/// Span is measured against the historical price, not the smaller price.
fn cmp_relative_diff_from(base: u128, price: u128, threshold_bps: u64) -> Ordering {
    let lhs = price.abs_diff(base).saturating_mul(10_000);
    let rhs = base.saturating_mul(threshold_bps as u128);
    lhs.cmp(&rhs)
}
