//! # Valuation Pipeline
//!
//! Three ways to refresh a cached asset value, one way to read them back:
//!
//! - [`Vault::update_asset_value`] - an operator reports a value directly.
//! - [`Vault::update_position_value`] - an [`Adaptor`] values a position
//!   held in custody. Permissionless, since the value is derived.
//! - [`Vault::update_free_principal_value`] - idle principal at the oracle
//!   price. Also permissionless.
//!
//! All three stamp the value with `now` and, while an operation is in
//! flight, gate borrowed assets on the operation having ended. They stay
//! open while the vault is `Disabled` so positions can still be written
//! down and deregistered. The read
//! side, [`Vault::total_usd_value`], refuses to sum anything older than
//! `max_update_interval_ms`.

use tracing::debug;

use crate::adaptor::Adaptor;
use crate::config::DECIMALS;
use crate::error::{OrOverflow, VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::math::div_d;
use crate::oracle::PriceOracle;
use crate::vault::{AssetType, OperatorCap, Vault};

impl Vault {
    /// Records an operator-reported USD value for `asset_type`.
    pub fn update_asset_value(
        &mut self,
        cap: &OperatorCap,
        asset_type: &AssetType,
        usd_value: u128,
        now: u64,
    ) -> VaultResult<()> {
        self.check_version()?;
        self.assert_operator(cap)?;
        self.finish_update_asset_value(asset_type, usd_value, now)
    }

    /// Values a position in custody through its adaptor and records it.
    pub fn update_position_value(
        &mut self,
        asset_type: &AssetType,
        adaptor: &dyn Adaptor,
        oracle: &PriceOracle,
        now: u64,
    ) -> VaultResult<u128> {
        self.check_version()?;
        let position = match self.positions.get(asset_type) {
            Some(position) => position,
            None if self.contains_asset(asset_type) => {
                return Err(VaultError::PositionNotInCustody(asset_type.clone()))
            }
            None => return Err(VaultError::AssetNotFound(asset_type.clone())),
        };
        let value = adaptor
            .valuation(position, oracle, now)
            .map_err(|e| VaultError::AdaptorFailed {
                asset_type: asset_type.clone(),
                reason: e.to_string(),
            })?;
        self.finish_update_asset_value(asset_type, value, now)?;
        Ok(value)
    }

    /// Values the idle principal balance at the oracle price.
    pub fn update_free_principal_value(&mut self, oracle: &PriceOracle, now: u64) -> VaultResult<u128> {
        self.check_version()?;
        let value = oracle.usd_value(&self.principal_coin, self.free_principal, now)?;
        let principal = self.principal_coin.clone();
        self.finish_update_asset_value(&principal, value, now)?;
        Ok(value)
    }

    /// Shared tail of every value update.
    pub(crate) fn finish_update_asset_value(
        &mut self,
        asset_type: &AssetType,
        usd_value: u128,
        now: u64,
    ) -> VaultResult<()> {
        if !self.contains_asset(asset_type) {
            return Err(VaultError::AssetNotFound(asset_type.clone()));
        }
        if let Some(record) = self.operation.as_mut() {
            if record.borrowed.contains(asset_type) {
                if !record.value_update_enabled {
                    return Err(VaultError::ValueUpdateNotAllowed(asset_type.clone()));
                }
                record.updated.insert(asset_type.clone(), true);
            }
        }

        self.assets_value.insert(asset_type.clone(), usd_value);
        self.assets_value_updated.insert(asset_type.clone(), now);
        self.events.push(
            now,
            VaultEvent::AssetValueUpdated {
                asset_type: asset_type.clone(),
                value: usd_value,
            },
        );
        debug!(vault = %self.id, asset = %asset_type, value = usd_value, "asset value updated");
        Ok(())
    }

    /// Sum of every cached value. Fails if any of them is older than
    /// `max_update_interval_ms`.
    pub fn total_usd_value(&self, now: u64) -> VaultResult<u128> {
        self.total_usd_value_with(now, None)
    }

    /// Like [`Self::total_usd_value`], but with `fresh` standing in for the
    /// cached value of one asset. Lets request execution price against a
    /// just-computed principal value without writing it first.
    pub(crate) fn total_usd_value_with(
        &self,
        now: u64,
        fresh: Option<(&AssetType, u128)>,
    ) -> VaultResult<u128> {
        self.check_version()?;
        let max_age = self.config.max_update_interval_ms;
        let mut total = 0u128;
        for asset_type in &self.asset_types {
            if let Some((fresh_type, value)) = fresh {
                if fresh_type == asset_type {
                    total = total.checked_add(value).or_overflow()?;
                    continue;
                }
            }
            let updated_at = self.assets_value_updated.get(asset_type).copied().unwrap_or_default();
            if now.saturating_sub(updated_at) > max_age {
                return Err(VaultError::StaleValue {
                    asset_type: asset_type.clone(),
                    updated_at,
                    now,
                });
            }
            let value = self.assets_value.get(asset_type).copied().unwrap_or_default();
            total = total.checked_add(value).or_overflow()?;
        }
        Ok(total)
    }

    /// Sum of cached values regardless of age. For reporting only.
    pub fn cached_total_usd_value(&self) -> u128 {
        self.assets_value.values().fold(0u128, |acc, v| acc.saturating_add(*v))
    }

    /// USD value of one share, 9 decimals. Exactly 1.0 at zero supply.
    pub fn share_ratio(&self, now: u64) -> VaultResult<u128> {
        let total = self.total_usd_value(now)?;
        if self.total_shares == 0 {
            return Ok(DECIMALS);
        }
        div_d(total, self.total_shares).or_overflow()
    }
}
