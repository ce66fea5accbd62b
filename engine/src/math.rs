//! Fixed-point arithmetic helpers.
//!
//! All money math in the engine is unsigned integer math on `u128`. USD
//! values, shares and share ratios use the 9-decimal [`DECIMALS`] base; raw
//! oracle prices use the 18-decimal [`ORACLE_DECIMALS`] base. Every helper
//! returns `None` on overflow or division by zero so callers can surface a
//! typed error instead of wrapping silently.

use crate::config::{BPS_BASE, DECIMALS, DECIMALS_EXP, ORACLE_DECIMALS};

/// `a * b / DECIMALS`
pub fn mul_d(a: u128, b: u128) -> Option<u128> {
    a.checked_mul(b)?.checked_div(DECIMALS)
}

/// `a * DECIMALS / b`
pub fn div_d(a: u128, b: u128) -> Option<u128> {
    a.checked_mul(DECIMALS)?.checked_div(b)
}

/// Coin amount (smallest units) × normalized price → USD value.
pub fn mul_with_oracle_price(amount: u128, normalized_price: u128) -> Option<u128> {
    amount.checked_mul(normalized_price)?.checked_div(ORACLE_DECIMALS)
}

/// USD value ÷ normalized price → coin amount (smallest units).
pub fn div_with_oracle_price(usd_value: u128, normalized_price: u128) -> Option<u128> {
    usd_value.checked_mul(ORACLE_DECIMALS)?.checked_div(normalized_price)
}

/// `amount * bps / 10_000`
pub fn apply_bps(amount: u128, bps: u64) -> Option<u128> {
    amount.checked_mul(bps as u128)?.checked_div(BPS_BASE)
}

/// Scales a raw 18-decimal price for a coin with `coin_decimals` so that
/// [`mul_with_oracle_price`] on the coin's smallest units yields a USD value
/// in the 9-decimal base.
pub fn normalize_price(price: u128, coin_decimals: u8) -> Option<u128> {
    if coin_decimals <= DECIMALS_EXP {
        let factor = 10u128.checked_pow((DECIMALS_EXP - coin_decimals) as u32)?;
        price.checked_mul(factor)
    } else {
        let factor = 10u128.checked_pow((coin_decimals - DECIMALS_EXP) as u32)?;
        price.checked_div(factor)
    }
}

/// Relative difference between `a` and `b` measured against the smaller of
/// the two, compared exactly against `threshold_bps` without rounding.
///
/// Returns the ordering of `|a - b| / min(a, b)` relative to
/// `threshold_bps / 10_000`.
pub fn cmp_relative_diff(a: u128, b: u128, threshold_bps: u64) -> std::cmp::Ordering {
    let diff = a.abs_diff(b);
    let base = a.min(b);
    // diff / base  <=>  threshold / BPS_BASE
    let lhs = diff.saturating_mul(BPS_BASE);
    let rhs = base.saturating_mul(threshold_bps as u128);
    lhs.cmp(&rhs)
}

/// Relative difference in whole basis points (floor). Used for reporting;
/// classification goes through [`cmp_relative_diff`].
pub fn relative_diff_bps(a: u128, b: u128) -> u128 {
    let base = a.min(b);
    if base == 0 {
        return u128::MAX;
    }
    a.abs_diff(b).saturating_mul(BPS_BASE) / base
}
