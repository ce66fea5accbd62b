//! # Protocol Adaptors
//!
//! The engine does not know how a lending obligation or a liquidity
//! position is priced. It holds [`Position`]s in custody and asks an
//! [`Adaptor`] for a USD value when one needs refreshing. That value is the
//! only thing an adaptor contributes: `asset_type → USD`, freshly stamped by
//! the vault at the time it is written.
//!
//! Positions are modelled generically as a list of [`Holding`]s, each a
//! coin amount on the supply or debt side. Adaptors interpret the holdings
//! according to their protocol; [`net_holdings_value`] is the common case
//! of "supply minus debt at oracle prices".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::oracle::{OracleError, PriceOracle};
use crate::vault::AssetType;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AdaptorError {
    /// A price needed for the valuation was unavailable.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// The position belongs to another protocol.
    #[error("adaptor {adaptor} cannot value a {found} position")]
    ProtocolMismatch { adaptor: String, found: String },

    /// The position's holdings are not valid for this protocol.
    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("arithmetic overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Position model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldingSide {
    Supply,
    Debt,
}

/// A coin amount held inside a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// Asset type of the coin; must have an oracle feed to be valued.
    pub coin: AssetType,
    /// Amount in the coin's smallest units.
    pub amount: u128,
    pub side: HoldingSide,
}

impl Holding {
    pub fn supply(coin: impl Into<AssetType>, amount: u128) -> Self {
        Self {
            coin: coin.into(),
            amount,
            side: HoldingSide::Supply,
        }
    }

    pub fn debt(coin: impl Into<AssetType>, amount: u128) -> Self {
        Self {
            coin: coin.into(),
            amount,
            side: HoldingSide::Debt,
        }
    }
}

/// Something the vault holds in custody and lends to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub asset_type: AssetType,
    /// Protocol tag matched against [`Adaptor::protocol`].
    pub protocol: String,
    pub holdings: Vec<Holding>,
}

impl Position {
    pub fn new(asset_type: impl Into<AssetType>, protocol: &str) -> Self {
        Self {
            asset_type: asset_type.into(),
            protocol: protocol.to_string(),
            holdings: Vec::new(),
        }
    }

    pub fn with_holding(mut self, holding: Holding) -> Self {
        self.holdings.push(holding);
        self
    }
}

// ---------------------------------------------------------------------------
// Adaptor trait
// ---------------------------------------------------------------------------

/// Values positions of one protocol.
pub trait Adaptor: Send + Sync {
    /// Protocol tag this adaptor understands.
    fn protocol(&self) -> &str;

    /// USD value (9 decimals) of `position` at oracle prices as of `now`.
    fn valuation(&self, position: &Position, oracle: &PriceOracle, now: u64) -> Result<u128, AdaptorError>;

    /// Rejects positions tagged for another protocol.
    fn ensure_protocol(&self, position: &Position) -> Result<(), AdaptorError> {
        if position.protocol != self.protocol() {
            return Err(AdaptorError::ProtocolMismatch {
                adaptor: self.protocol().to_string(),
                found: position.protocol.clone(),
            });
        }
        Ok(())
    }
}

/// Supply value minus debt value. An underwater position is worth zero to
/// the vault rather than a negative amount.
pub fn net_holdings_value(position: &Position, oracle: &PriceOracle, now: u64) -> Result<u128, AdaptorError> {
    let (mut supply, mut debt) = (0u128, 0u128);
    for holding in &position.holdings {
        let value = oracle.usd_value(&holding.coin, holding.amount, now)?;
        let side = match holding.side {
            HoldingSide::Supply => &mut supply,
            HoldingSide::Debt => &mut debt,
        };
        *side = side.checked_add(value).ok_or(AdaptorError::Overflow)?;
    }
    Ok(supply.saturating_sub(debt))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Values every position at a fixed amount, for engine tests that don't
    /// care about prices.
    pub(crate) struct FixedAdaptor(pub u128);

    impl Adaptor for FixedAdaptor {
        fn protocol(&self) -> &str {
            "fixed"
        }

        fn valuation(&self, position: &Position, _oracle: &PriceOracle, _now: u64) -> Result<u128, AdaptorError> {
            self.ensure_protocol(position)?;
            Ok(self.0)
        }
    }

    #[test]
    fn test_protocol_mismatch_rejected() {
        let position = Position::new("lending:x", "lending");
        let result = FixedAdaptor(1).valuation(&position, &PriceOracle::default(), 0);
        assert!(matches!(result, Err(AdaptorError::ProtocolMismatch { .. })));
    }

    #[test]
    fn test_empty_position_is_worth_nothing() {
        let position = Position::new("fixed:x", "fixed");
        assert_eq!(net_holdings_value(&position, &PriceOracle::default(), 0).unwrap(), 0);
    }

    #[test]
    fn test_missing_feed_surfaces_oracle_error() {
        let position = Position::new("fixed:x", "fixed").with_holding(Holding::supply("SUI", 1));
        let result = net_holdings_value(&position, &PriceOracle::default(), 0);
        assert!(matches!(result, Err(AdaptorError::Oracle(OracleError::FeedNotFound(_)))));
    }
}
