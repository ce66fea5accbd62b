//! # Coin Adaptor
//!
//! Values a position holding a single coin balance on the supply side.

use strata_engine::adaptor::{Adaptor, AdaptorError, HoldingSide, Position};
use strata_engine::oracle::PriceOracle;

/// Protocol tag for [`CoinAdaptor`] positions.
pub const PROTOCOL: &str = "coin";

#[derive(Debug, Default, Clone, Copy)]
pub struct CoinAdaptor;

impl CoinAdaptor {
    /// A coin position wrapping `amount` of `coin`.
    pub fn position(asset_type: &str, coin: &str, amount: u128) -> Position {
        Position::new(asset_type, PROTOCOL).with_holding(strata_engine::Holding::supply(coin, amount))
    }
}

impl Adaptor for CoinAdaptor {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    fn valuation(&self, position: &Position, oracle: &PriceOracle, now: u64) -> Result<u128, AdaptorError> {
        self.ensure_protocol(position)?;
        let holding = match position.holdings.as_slice() {
            [holding] if holding.side == HoldingSide::Supply => holding,
            _ => {
                return Err(AdaptorError::InvalidPosition(format!(
                    "coin position {} must hold exactly one supplied coin",
                    position.asset_type
                )))
            }
        };
        Ok(oracle.usd_value(&holding.coin, holding.amount, now)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::Holding;

    #[test]
    fn test_rejects_multi_coin_position() {
        let position = CoinAdaptor::position("coin:sui", "SUI", 1).with_holding(Holding::supply("USDC", 1));
        let result = CoinAdaptor.valuation(&position, &PriceOracle::default(), 0);
        assert!(matches!(result, Err(AdaptorError::InvalidPosition(_))));
    }

    #[test]
    fn test_rejects_debt_holding() {
        let position = Position::new("coin:sui", PROTOCOL).with_holding(Holding::debt("SUI", 1));
        let result = CoinAdaptor.valuation(&position, &PriceOracle::default(), 0);
        assert!(matches!(result, Err(AdaptorError::InvalidPosition(_))));
    }
}
