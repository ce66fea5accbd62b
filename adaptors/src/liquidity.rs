//! # Liquidity Adaptor
//!
//! Values a two-sided liquidity position: one supplied amount of each pool
//! coin. The amounts are whatever the pool would hand back on withdrawal
//! right now; tick math is the pool's business, not ours.
//!
//! ## Pool Price Check
//!
//! A pool can be pushed away from the market inside a single transaction,
//! which inflates one side of every position in it. Before valuing, the
//! adaptor compares the last observed pool price (coin B per coin A, in
//! smallest units, 18 decimals) with the price implied by the oracle and
//! refuses the position if they differ by more than `max_slippage_bps`.

use dashmap::DashMap;
use tracing::{debug, warn};

use strata_engine::adaptor::{Adaptor, AdaptorError, Holding, HoldingSide, Position};
use strata_engine::config::ORACLE_DECIMALS;
use strata_engine::math::{cmp_relative_diff, relative_diff_bps};
use strata_engine::oracle::PriceOracle;
use strata_engine::AssetType;

/// Protocol tag for [`LiquidityAdaptor`] positions.
pub const PROTOCOL: &str = "liquidity";

/// Default tolerated pool/oracle deviation.
pub const DEFAULT_MAX_SLIPPAGE_BPS: u64 = 100;

#[derive(Debug)]
pub struct LiquidityAdaptor {
    max_slippage_bps: u64,
    /// Last observed pool price per position, coin B per coin A, 18 decimals.
    pool_prices: DashMap<AssetType, u128>,
}

impl Default for LiquidityAdaptor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SLIPPAGE_BPS)
    }
}

impl LiquidityAdaptor {
    pub fn new(max_slippage_bps: u64) -> Self {
        Self {
            max_slippage_bps,
            pool_prices: DashMap::new(),
        }
    }

    /// A position holding `amount_a` of `coin_a` and `amount_b` of `coin_b`.
    pub fn position(asset_type: &str, coin_a: &str, amount_a: u128, coin_b: &str, amount_b: u128) -> Position {
        Position::new(asset_type, PROTOCOL)
            .with_holding(Holding::supply(coin_a, amount_a))
            .with_holding(Holding::supply(coin_b, amount_b))
    }

    /// Records the pool price backing `asset_type`. Positions without an
    /// observation are valued without the pool check.
    pub fn observe_pool_price(&self, asset_type: AssetType, price: u128) {
        self.pool_prices.insert(asset_type, price);
    }

    /// Oracle-implied price of coin A in units of coin B, 18 decimals.
    pub fn oracle_relative_price(
        oracle: &PriceOracle,
        coin_a: &AssetType,
        coin_b: &AssetType,
        now: u64,
    ) -> Result<u128, AdaptorError> {
        let price_a = oracle.normalized_price(coin_a, now)?;
        let price_b = oracle.normalized_price(coin_b, now)?;
        price_a
            .checked_mul(ORACLE_DECIMALS)
            .and_then(|v| v.checked_div(price_b))
            .ok_or(AdaptorError::Overflow)
    }

    fn legs(position: &Position) -> Result<(&Holding, &Holding), AdaptorError> {
        match position.holdings.as_slice() {
            [a, b] if a.side == HoldingSide::Supply && b.side == HoldingSide::Supply && a.coin != b.coin => Ok((a, b)),
            _ => Err(AdaptorError::InvalidPosition(format!(
                "liquidity position {} must supply exactly two distinct coins",
                position.asset_type
            ))),
        }
    }

    fn check_pool_price(
        &self,
        position: &Position,
        a: &Holding,
        b: &Holding,
        oracle: &PriceOracle,
        now: u64,
    ) -> Result<(), AdaptorError> {
        let pool_price = match self.pool_prices.get(&position.asset_type) {
            Some(entry) => *entry.value(),
            None => return Ok(()),
        };
        let oracle_price = Self::oracle_relative_price(oracle, &a.coin, &b.coin, now)?;
        if pool_price == 0 || cmp_relative_diff(pool_price, oracle_price, self.max_slippage_bps).is_gt() {
            let deviation_bps = relative_diff_bps(pool_price, oracle_price);
            warn!(
                position = %position.asset_type,
                pool_price,
                oracle_price,
                deviation_bps,
                "pool price deviates from oracle"
            );
            return Err(AdaptorError::InvalidPosition(format!(
                "pool price for {} deviates {deviation_bps} bps from oracle (max {} bps)",
                position.asset_type, self.max_slippage_bps
            )));
        }
        Ok(())
    }
}

impl Adaptor for LiquidityAdaptor {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    fn valuation(&self, position: &Position, oracle: &PriceOracle, now: u64) -> Result<u128, AdaptorError> {
        self.ensure_protocol(position)?;
        let (a, b) = Self::legs(position)?;
        self.check_pool_price(position, a, b, oracle, now)?;

        let value_a = oracle.usd_value(&a.coin, a.amount, now)?;
        let value_b = oracle.usd_value(&b.coin, b.amount, now)?;
        let total = value_a.checked_add(value_b).ok_or(AdaptorError::Overflow)?;
        debug!(position = %position.asset_type, value_a, value_b, "liquidity position valued");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sided_position_rejected() {
        let position = Position::new("lp:sui-usdc", PROTOCOL).with_holding(Holding::supply("SUI", 1));
        let result = LiquidityAdaptor::default().valuation(&position, &PriceOracle::default(), 0);
        assert!(matches!(result, Err(AdaptorError::InvalidPosition(_))));
    }

    #[test]
    fn test_same_coin_twice_rejected() {
        let position = LiquidityAdaptor::position("lp:sui-sui", "SUI", 1, "SUI", 1);
        let result = LiquidityAdaptor::default().valuation(&position, &PriceOracle::default(), 0);
        assert!(matches!(result, Err(AdaptorError::InvalidPosition(_))));
    }
}
