//! # Lending Adaptor
//!
//! A lending-market obligation holds collateral on the supply side and
//! borrowed coins on the debt side. Its value to the vault is the net of
//! the two at oracle prices.
//!
//! Interest accrual belongs to the lending market; the holdings passed in
//! are expected to already include it.
//!
//! ## Health Floor
//!
//! With a floor configured, obligations whose health factor
//! (`supply_value / debt_value`, in bps) sits below it are refused. A vault
//! that keeps an obligation near liquidation should notice before it books
//! the value as safe.

use serde::{Deserialize, Serialize};
use tracing::warn;

use strata_engine::adaptor::{Adaptor, AdaptorError, HoldingSide, Position};
use strata_engine::config::BPS_BASE;
use strata_engine::oracle::PriceOracle;

/// Protocol tag for [`LendingAdaptor`] positions.
pub const PROTOCOL: &str = "lending";

/// Supply and debt legs of an obligation, in USD (9 decimals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationValue {
    pub supply: u128,
    pub debt: u128,
}

impl ObligationValue {
    /// Health factor in bps. `None` for a debt-free obligation.
    pub fn health_factor_bps(&self) -> Option<u128> {
        if self.debt == 0 {
            return None;
        }
        Some(self.supply.saturating_mul(BPS_BASE) / self.debt)
    }

    pub fn net(&self) -> u128 {
        self.supply.saturating_sub(self.debt)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LendingAdaptor {
    /// Minimum health factor in bps (10_000 = 1.0). Zero disables the check.
    min_health_factor_bps: u64,
}

impl LendingAdaptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_health_factor(min_health_factor_bps: u64) -> Self {
        Self { min_health_factor_bps }
    }

    /// Values both legs without applying the health floor.
    pub fn obligation_value(
        &self,
        position: &Position,
        oracle: &PriceOracle,
        now: u64,
    ) -> Result<ObligationValue, AdaptorError> {
        self.ensure_protocol(position)?;
        let mut value = ObligationValue { supply: 0, debt: 0 };
        for holding in &position.holdings {
            let usd = oracle.usd_value(&holding.coin, holding.amount, now)?;
            let leg = match holding.side {
                HoldingSide::Supply => &mut value.supply,
                HoldingSide::Debt => &mut value.debt,
            };
            *leg = leg.checked_add(usd).ok_or(AdaptorError::Overflow)?;
        }
        Ok(value)
    }
}

impl Adaptor for LendingAdaptor {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    fn valuation(&self, position: &Position, oracle: &PriceOracle, now: u64) -> Result<u128, AdaptorError> {
        let value = self.obligation_value(position, oracle, now)?;
        if self.min_health_factor_bps > 0 {
            if let Some(health) = value.health_factor_bps() {
                if health < u128::from(self.min_health_factor_bps) {
                    warn!(
                        position = %position.asset_type,
                        health_bps = health,
                        min_bps = self.min_health_factor_bps,
                        "obligation below health floor"
                    );
                    return Err(AdaptorError::InvalidPosition(format!(
                        "obligation {} health factor {health} bps below floor {} bps",
                        position.asset_type, self.min_health_factor_bps
                    )));
                }
            }
        }
        Ok(value.net())
    }
}
