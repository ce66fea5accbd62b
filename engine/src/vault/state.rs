//! Vault state, guards and admin surface.
//!
//! ## Status State Machine
//!
//! ```text
//!              start_operation
//!   ┌────────┐ ───────────────► ┌──────┐
//!   │ Normal │                  │ Busy │
//!   └──┬──▲──┘ ◄─────────────── └──────┘
//!      │  │     finalize / admin force-clear
//!      │  │
//!  set_enabled(false / true)
//!      │  │
//!   ┌──▼──┴────┐
//!   │ Disabled │
//!   └──────────┘
//! ```
//!
//! `Busy` holds exactly when an [`OperationRecord`] exists. Both change
//! together in [`crate::operation`], never anywhere else.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AdminCap, AssetType, OperatorCap, Receipt, RequestBuffer};
use crate::adaptor::{Adaptor, Position};
use crate::config::{self, VaultConfig, VERSION};
use crate::error::{OrOverflow, VaultError, VaultResult};
use crate::events::{EventLog, EventRecord, VaultEvent};
use crate::operation::OperationRecord;
use crate::oracle::PriceOracle;

// ---------------------------------------------------------------------------
// VaultStatus
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VaultStatus {
    /// Accepting requests and operations.
    Normal,
    /// An operation is in flight. User flows and admin tuning are closed.
    Busy,
    /// Paused by the admin.
    Disabled,
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultStatus::Normal => write!(f, "Normal"),
            VaultStatus::Busy => write!(f, "Busy"),
            VaultStatus::Disabled => write!(f, "Disabled"),
        }
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// The vault ledger.
///
/// Every asset type in `asset_types` has exactly one cached value and one
/// update timestamp; the three are written and removed together. The
/// principal coin is registered at creation and valued from
/// `free_principal`; every other asset type is backed by a [`Position`]
/// that is in custody unless an operation has borrowed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub(crate) id: Uuid,
    pub(crate) version: u64,
    pub(crate) status: VaultStatus,
    pub(crate) config: VaultConfig,

    pub(crate) admin_cap_id: Uuid,
    /// Issued operator caps and their frozen flag.
    pub(crate) operators: BTreeMap<Uuid, bool>,

    pub(crate) principal_coin: AssetType,
    /// Idle principal, smallest units.
    pub(crate) free_principal: u128,
    /// Withdrawn principal owed to receipts. Not part of the vault's value.
    pub(crate) claimable_principal: u128,
    pub(crate) collected_fees: u128,

    pub(crate) asset_types: Vec<AssetType>,
    pub(crate) assets_value: BTreeMap<AssetType, u128>,
    pub(crate) assets_value_updated: BTreeMap<AssetType, u64>,
    pub(crate) positions: BTreeMap<AssetType, Position>,

    pub(crate) total_shares: u128,
    /// Shares minted against value found at zero supply.
    pub(crate) treasury_shares: u128,

    /// `None` until the first epoch roll.
    pub(crate) cur_epoch: Option<u64>,
    pub(crate) cur_epoch_loss_base: u128,
    pub(crate) cur_epoch_loss: u128,

    pub(crate) operation: Option<OperationRecord>,

    pub(crate) receipts: BTreeMap<Uuid, Receipt>,
    pub(crate) request_buffer: RequestBuffer,

    #[serde(skip)]
    pub(crate) events: EventLog,
}

impl Vault {
    /// Creates a vault holding `principal_coin` and returns it together
    /// with its only [`AdminCap`].
    pub fn new(config: VaultConfig, principal_coin: AssetType, now: u64) -> VaultResult<(Self, AdminCap)> {
        config.validate()?;
        let id = Uuid::new_v4();
        let admin = AdminCap::issue(id);

        let mut vault = Self {
            id,
            version: VERSION,
            status: VaultStatus::Normal,
            config,
            admin_cap_id: admin.id(),
            operators: BTreeMap::new(),
            principal_coin: principal_coin.clone(),
            free_principal: 0,
            claimable_principal: 0,
            collected_fees: 0,
            asset_types: Vec::new(),
            assets_value: BTreeMap::new(),
            assets_value_updated: BTreeMap::new(),
            positions: BTreeMap::new(),
            total_shares: 0,
            treasury_shares: 0,
            cur_epoch: None,
            cur_epoch_loss_base: 0,
            cur_epoch_loss: 0,
            operation: None,
            receipts: BTreeMap::new(),
            request_buffer: RequestBuffer::default(),
            events: EventLog::default(),
        };
        // An empty principal balance is worth exactly zero right now.
        vault.insert_asset(principal_coin, now);
        vault.assets_value_updated.insert(vault.principal_coin.clone(), now);
        vault.events.push(now, VaultEvent::VaultCreated { vault_id: id });
        info!(vault = %id, principal = %vault.principal_coin, "vault created");
        Ok((vault, admin))
    }

    // -- Accessors ----------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> VaultStatus {
        self.status
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn principal_coin(&self) -> &AssetType {
        &self.principal_coin
    }

    pub fn free_principal(&self) -> u128 {
        self.free_principal
    }

    pub fn claimable_principal(&self) -> u128 {
        self.claimable_principal
    }

    pub fn collected_fees(&self) -> u128 {
        self.collected_fees
    }

    pub fn asset_types(&self) -> &[AssetType] {
        &self.asset_types
    }

    pub fn contains_asset(&self, asset_type: &AssetType) -> bool {
        self.assets_value.contains_key(asset_type)
    }

    pub fn asset_value(&self, asset_type: &AssetType) -> Option<u128> {
        self.assets_value.get(asset_type).copied()
    }

    pub fn asset_value_updated_at(&self, asset_type: &AssetType) -> Option<u64> {
        self.assets_value_updated.get(asset_type).copied()
    }

    /// A position currently in custody.
    pub fn position(&self, asset_type: &AssetType) -> Option<&Position> {
        self.positions.get(asset_type)
    }

    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    pub fn treasury_shares(&self) -> u128 {
        self.treasury_shares
    }

    pub fn cur_epoch(&self) -> Option<u64> {
        self.cur_epoch
    }

    pub fn cur_epoch_loss(&self) -> u128 {
        self.cur_epoch_loss
    }

    pub fn cur_epoch_loss_base(&self) -> u128 {
        self.cur_epoch_loss_base
    }

    pub fn operation(&self) -> Option<&OperationRecord> {
        self.operation.as_ref()
    }

    pub fn receipt(&self, receipt_id: &Uuid) -> Option<&Receipt> {
        self.receipts.get(receipt_id)
    }

    pub fn request_buffer(&self) -> &RequestBuffer {
        &self.request_buffer
    }

    pub fn is_operator_frozen(&self, operator_id: &Uuid) -> Option<bool> {
        self.operators.get(operator_id).copied()
    }

    /// Drains events produced since the last call.
    pub fn take_events(&mut self) -> Vec<EventRecord> {
        self.events.drain()
    }

    /// Structural invariants: `Busy` iff an operation record exists, and
    /// the registry, value and timestamp maps agree.
    pub fn check_invariants(&self) -> bool {
        let busy_matches = (self.status == VaultStatus::Busy) == self.operation.is_some();
        let maps_agree = self.asset_types.len() == self.assets_value.len()
            && self.asset_types.len() == self.assets_value_updated.len()
            && self
                .asset_types
                .iter()
                .all(|a| self.assets_value.contains_key(a) && self.assets_value_updated.contains_key(a));
        let positions_registered = self.positions.keys().all(|a| self.assets_value.contains_key(a));
        busy_matches && maps_agree && positions_registered
    }

    // -- Guards -------------------------------------------------------------

    /// Rejects every read and write while the vault or its request buffer
    /// lags the engine version.
    pub fn check_version(&self) -> VaultResult<()> {
        if self.version != VERSION {
            return Err(VaultError::VersionMismatch {
                object: "vault",
                expected: VERSION,
                found: self.version,
            });
        }
        if self.request_buffer.version != self.version {
            return Err(VaultError::VersionMismatch {
                object: "request_buffer",
                expected: self.version,
                found: self.request_buffer.version,
            });
        }
        Ok(())
    }

    pub(crate) fn assert_normal(&self) -> VaultResult<()> {
        if self.status != VaultStatus::Normal {
            return Err(VaultError::InvalidStatus {
                current: self.status,
                expected: "Normal",
            });
        }
        Ok(())
    }

    pub(crate) fn assert_busy(&self) -> VaultResult<()> {
        if self.status != VaultStatus::Busy {
            return Err(VaultError::InvalidStatus {
                current: self.status,
                expected: "Busy",
            });
        }
        Ok(())
    }

    pub(crate) fn assert_not_busy(&self) -> VaultResult<()> {
        if self.status == VaultStatus::Busy {
            return Err(VaultError::InvalidStatus {
                current: self.status,
                expected: "Normal or Disabled",
            });
        }
        Ok(())
    }

    pub(crate) fn assert_admin(&self, cap: &AdminCap) -> VaultResult<()> {
        if cap.vault_id() != self.id || cap.id() != self.admin_cap_id {
            return Err(VaultError::Unauthorized("admin cap does not belong to this vault".into()));
        }
        Ok(())
    }

    pub(crate) fn assert_operator(&self, cap: &OperatorCap) -> VaultResult<()> {
        if cap.vault_id() != self.id {
            return Err(VaultError::Unauthorized("operator cap does not belong to this vault".into()));
        }
        match self.operators.get(&cap.id()) {
            None => Err(VaultError::Unauthorized(format!("unknown operator {}", cap.id()))),
            Some(true) => Err(VaultError::OperatorFrozen(cap.id())),
            Some(false) => Ok(()),
        }
    }

    /// Version, admin cap, and no operation in flight.
    pub(crate) fn admin_guard(&self, cap: &AdminCap) -> VaultResult<()> {
        self.check_version()?;
        self.assert_admin(cap)?;
        self.assert_not_busy()
    }

    pub(crate) fn set_status(&mut self, to: VaultStatus, now: u64) {
        let from = self.status;
        self.status = to;
        self.events.push(now, VaultEvent::StatusChanged { from, to });
    }

    fn insert_asset(&mut self, asset_type: AssetType, now: u64) {
        self.asset_types.push(asset_type.clone());
        self.assets_value.insert(asset_type.clone(), 0);
        self.assets_value_updated.insert(asset_type.clone(), 0);
        self.events.push(now, VaultEvent::AssetRegistered { asset_type });
    }

    fn parameter_changed(&mut self, name: &str, value: u128, now: u64) {
        info!(vault = %self.id, parameter = name, value, "vault parameter changed");
        self.events.push(
            now,
            VaultEvent::ParameterChanged {
                name: name.to_string(),
                value,
            },
        );
    }

    // -- Admin: status & versioning -----------------------------------------

    /// Toggles between `Normal` and `Disabled`. Never touches `Busy`.
    pub fn set_enabled(&mut self, cap: &AdminCap, enabled: bool, now: u64) -> VaultResult<()> {
        self.check_version()?;
        self.assert_admin(cap)?;
        let (required, target) = if enabled {
            (VaultStatus::Disabled, VaultStatus::Normal)
        } else {
            (VaultStatus::Normal, VaultStatus::Disabled)
        };
        if self.status != required {
            return Err(VaultError::InvalidStatus {
                current: self.status,
                expected: if enabled { "Disabled" } else { "Normal" },
            });
        }
        self.set_status(target, now);
        info!(vault = %self.id, status = %target, "vault status toggled");
        Ok(())
    }

    /// Migrates the vault and its request buffer to the engine version in
    /// one step.
    pub fn upgrade(&mut self, cap: &AdminCap, now: u64) -> VaultResult<()> {
        self.assert_admin(cap)?;
        if self.version > VERSION || self.request_buffer.version > VERSION {
            return Err(VaultError::VersionMismatch {
                object: "vault",
                expected: VERSION,
                found: self.version.max(self.request_buffer.version),
            });
        }
        let from = self.version;
        self.version = VERSION;
        self.request_buffer.version = VERSION;
        if from != VERSION {
            self.events.push(now, VaultEvent::VaultUpgraded { from, to: VERSION });
            info!(vault = %self.id, from, to = VERSION, "vault upgraded");
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_versions(&mut self, vault: u64, buffer: u64) {
        self.version = vault;
        self.request_buffer.version = buffer;
    }

    // -- Admin: parameters --------------------------------------------------

    pub fn set_deposit_fee(&mut self, cap: &AdminCap, fee_bps: u64, now: u64) -> VaultResult<()> {
        self.admin_guard(cap)?;
        config::check_fee_bps(fee_bps).map_err(VaultError::ConfigInvariant)?;
        self.config.deposit_fee_bps = fee_bps;
        self.parameter_changed("deposit_fee_bps", fee_bps as u128, now);
        Ok(())
    }

    pub fn set_withdraw_fee(&mut self, cap: &AdminCap, fee_bps: u64, now: u64) -> VaultResult<()> {
        self.admin_guard(cap)?;
        config::check_fee_bps(fee_bps).map_err(VaultError::ConfigInvariant)?;
        self.config.withdraw_fee_bps = fee_bps;
        self.parameter_changed("withdraw_fee_bps", fee_bps as u128, now);
        Ok(())
    }

    pub fn set_loss_tolerance(&mut self, cap: &AdminCap, tolerance_bps: u64, now: u64) -> VaultResult<()> {
        self.admin_guard(cap)?;
        config::check_loss_tolerance_bps(tolerance_bps).map_err(VaultError::ConfigInvariant)?;
        self.config.loss_tolerance_bps = tolerance_bps;
        self.parameter_changed("loss_tolerance_bps", tolerance_bps as u128, now);
        Ok(())
    }

    pub fn set_locking_time_for_withdraw(&mut self, cap: &AdminCap, ms: u64, now: u64) -> VaultResult<()> {
        self.admin_guard(cap)?;
        config::check_locking_time(ms).map_err(VaultError::ConfigInvariant)?;
        self.config.locking_time_for_withdraw_ms = ms;
        self.parameter_changed("locking_time_for_withdraw_ms", ms as u128, now);
        Ok(())
    }

    pub fn set_locking_time_for_cancel_request(&mut self, cap: &AdminCap, ms: u64, now: u64) -> VaultResult<()> {
        self.admin_guard(cap)?;
        config::check_locking_time(ms).map_err(VaultError::ConfigInvariant)?;
        self.config.locking_time_for_cancel_request_ms = ms;
        self.parameter_changed("locking_time_for_cancel_request_ms", ms as u128, now);
        Ok(())
    }

    // -- Admin: operators ---------------------------------------------------

    pub fn create_operator(&mut self, cap: &AdminCap, now: u64) -> VaultResult<OperatorCap> {
        self.check_version()?;
        self.assert_admin(cap)?;
        let operator = OperatorCap::issue(self.id);
        self.operators.insert(operator.id(), false);
        self.events.push(now, VaultEvent::OperatorCreated { operator: operator.id() });
        info!(vault = %self.id, operator = %operator.id(), "operator created");
        Ok(operator)
    }

    /// Freezing does not affect accounting and is allowed at any status,
    /// which lets the admin stop a misbehaving operator mid-operation.
    pub fn set_operator_frozen(&mut self, cap: &AdminCap, operator_id: Uuid, frozen: bool, now: u64) -> VaultResult<()> {
        self.check_version()?;
        self.assert_admin(cap)?;
        let flag = self
            .operators
            .get_mut(&operator_id)
            .ok_or_else(|| VaultError::Unauthorized(format!("unknown operator {operator_id}")))?;
        *flag = frozen;
        self.events.push(
            now,
            VaultEvent::OperatorFreezeSet {
                operator: operator_id,
                frozen,
            },
        );
        warn!(vault = %self.id, operator = %operator_id, frozen, "operator freeze flag set");
        Ok(())
    }

    // -- Admin: fees --------------------------------------------------------

    /// Withdraws collected deposit and withdraw fees.
    pub fn retrieve_fees(&mut self, cap: &AdminCap, amount: u128, now: u64) -> VaultResult<u128> {
        self.admin_guard(cap)?;
        if amount > self.collected_fees {
            return Err(VaultError::InsufficientFunds {
                required: amount,
                available: self.collected_fees,
            });
        }
        self.collected_fees -= amount;
        self.events.push(now, VaultEvent::FeesRetrieved { amount });
        Ok(amount)
    }

    // -- Admin: asset registry ----------------------------------------------

    /// Takes `position` into custody and registers its asset type with a
    /// zero, never-updated value. The adaptor must be able to value the
    /// position right now; the result of that probe is not stored, so the
    /// asset still has to be revalued before it counts.
    pub fn add_position(
        &mut self,
        cap: &AdminCap,
        position: Position,
        adaptor: &dyn Adaptor,
        oracle: &PriceOracle,
        now: u64,
    ) -> VaultResult<()> {
        self.admin_guard(cap)?;
        let asset_type = position.asset_type.clone();
        if self.contains_asset(&asset_type) {
            return Err(VaultError::AssetAlreadyExists(asset_type));
        }
        adaptor
            .valuation(&position, oracle, now)
            .map_err(|e| VaultError::AdaptorFailed {
                asset_type: asset_type.clone(),
                reason: e.to_string(),
            })?;

        self.insert_asset(asset_type.clone(), now);
        self.positions.insert(asset_type.clone(), position);
        info!(vault = %self.id, asset = %asset_type, "position registered");
        Ok(())
    }

    /// Deregisters an asset type whose cached value is zero and releases its
    /// position from custody (if it is still there).
    pub fn remove_position(&mut self, cap: &AdminCap, asset_type: &AssetType, now: u64) -> VaultResult<Option<Position>> {
        self.admin_guard(cap)?;
        if asset_type == &self.principal_coin {
            return Err(VaultError::ConfigInvariant(
                "the principal coin cannot be deregistered".into(),
            ));
        }
        let value = self
            .asset_value(asset_type)
            .ok_or_else(|| VaultError::AssetNotFound(asset_type.clone()))?;
        if value != 0 {
            return Err(VaultError::NonZeroValue {
                asset_type: asset_type.clone(),
                value,
            });
        }

        self.asset_types.retain(|a| a != asset_type);
        self.assets_value.remove(asset_type);
        self.assets_value_updated.remove(asset_type);
        let position = self.positions.remove(asset_type);
        self.events.push(
            now,
            VaultEvent::AssetRemoved {
                asset_type: asset_type.clone(),
            },
        );
        info!(vault = %self.id, asset = %asset_type, "position deregistered");
        Ok(position)
    }

    // -- Internal bookkeeping helpers ---------------------------------------

    pub(crate) fn receipt_mut(&mut self, receipt_id: &Uuid) -> VaultResult<&mut Receipt> {
        self.receipts
            .get_mut(receipt_id)
            .ok_or(VaultError::ReceiptNotFound(*receipt_id))
    }

    pub(crate) fn add_shares(&mut self, shares: u128) -> VaultResult<()> {
        self.total_shares = self.total_shares.checked_add(shares).or_overflow()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adaptor::tests::FixedAdaptor;

    pub(crate) const T0: u64 = 1_700_000_000_000;

    pub(crate) fn new_vault() -> (Vault, AdminCap) {
        Vault::new(VaultConfig::default(), AssetType::new("USDC"), T0).unwrap()
    }

    pub(crate) fn fixed_position(name: &str) -> Position {
        Position::new(name, "fixed")
    }

    #[test]
    fn test_new_vault_registers_principal() {
        let (vault, _) = new_vault();
        assert_eq!(vault.status(), VaultStatus::Normal);
        assert_eq!(vault.asset_types(), &[AssetType::new("USDC")]);
        assert_eq!(vault.asset_value(&AssetType::new("USDC")), Some(0));
        assert_eq!(vault.asset_value_updated_at(&AssetType::new("USDC")), Some(T0));
        assert!(vault.check_invariants());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = VaultConfig {
            epoch_duration_ms: 0,
            ..VaultConfig::default()
        };
        assert!(matches!(
            Vault::new(config, AssetType::new("USDC"), T0),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_add_and_remove_zero_value_position() {
        let (mut vault, admin) = new_vault();
        let oracle = PriceOracle::default();
        let a = AssetType::new("fixed:a");
        vault
            .add_position(&admin, fixed_position("fixed:a"), &FixedAdaptor(0), &oracle, T0)
            .unwrap();
        assert_eq!(vault.asset_value(&a), Some(0));
        assert_eq!(vault.asset_value_updated_at(&a), Some(0));
        assert!(vault.check_invariants());

        let position = vault.remove_position(&admin, &a, T0).unwrap();
        assert!(position.is_some());
        assert!(!vault.contains_asset(&a));
        assert!(vault.check_invariants());
    }

    #[test]
    fn test_remove_rejects_non_zero_value() {
        let (mut vault, admin) = new_vault();
        let a = AssetType::new("fixed:a");
        vault
            .add_position(&admin, fixed_position("fixed:a"), &FixedAdaptor(0), &PriceOracle::default(), T0)
            .unwrap();
        vault.assets_value.insert(a.clone(), 10);
        assert!(matches!(
            vault.remove_position(&admin, &a, T0),
            Err(VaultError::NonZeroValue { value: 10, .. })
        ));
        assert!(vault.contains_asset(&a));
    }

    #[test]
    fn test_principal_cannot_be_removed() {
        let (mut vault, admin) = new_vault();
        let principal = vault.principal_coin().clone();
        assert!(matches!(
            vault.remove_position(&admin, &principal, T0),
            Err(VaultError::ConfigInvariant(_))
        ));
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let (mut vault, admin) = new_vault();
        let oracle = PriceOracle::default();
        vault
            .add_position(&admin, fixed_position("fixed:a"), &FixedAdaptor(0), &oracle, T0)
            .unwrap();
        assert!(matches!(
            vault.add_position(&admin, fixed_position("fixed:a"), &FixedAdaptor(0), &oracle, T0),
            Err(VaultError::AssetAlreadyExists(_))
        ));
    }

    #[test]
    fn test_adaptor_self_test_gates_registration() {
        let (mut vault, admin) = new_vault();
        let wrong_protocol = Position::new("lending:a", "lending");
        let result = vault.add_position(&admin, wrong_protocol, &FixedAdaptor(0), &PriceOracle::default(), T0);
        assert!(matches!(result, Err(VaultError::AdaptorFailed { .. })));
        assert_eq!(vault.asset_types().len(), 1);
    }

    #[test]
    fn test_toggle_enabled_only_from_normal() {
        let (mut vault, admin) = new_vault();
        assert!(vault.set_enabled(&admin, true, T0).is_err());
        vault.set_enabled(&admin, false, T0).unwrap();
        assert_eq!(vault.status(), VaultStatus::Disabled);
        vault.set_enabled(&admin, true, T0).unwrap();
        assert_eq!(vault.status(), VaultStatus::Normal);
    }

    #[test]
    fn test_foreign_admin_cap_rejected() {
        let (mut vault, _) = new_vault();
        let (_, other_admin) = new_vault();
        assert!(matches!(
            vault.set_deposit_fee(&other_admin, 5, T0),
            Err(VaultError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_restored_snapshot_honors_only_issued_caps() {
        let (mut vault, admin) = new_vault();
        let operator = vault.create_operator(&admin, T0).unwrap();
        let json = serde_json::to_value(&vault).unwrap();
        assert!(json.get("admin_cap_id").is_some());

        let mut restored: Vault = serde_json::from_value(json).unwrap();
        let (mut other, other_admin) = new_vault();
        let other_operator = other.create_operator(&other_admin, T0).unwrap();
        assert!(matches!(
            restored.set_loss_tolerance(&other_admin, 10_000, T0),
            Err(VaultError::Unauthorized(_))
        ));
        assert!(matches!(
            restored.start_operation(&other_operator, &[], 0, T0),
            Err(VaultError::Unauthorized(_))
        ));
        assert_eq!(restored.config().loss_tolerance_bps, vault.config().loss_tolerance_bps);

        restored.set_loss_tolerance(&admin, 20, T0).unwrap();
        assert_eq!(restored.assert_operator(&operator).ok(), Some(()));
    }

    #[test]
    fn test_fee_setter_enforces_ceiling() {
        let (mut vault, admin) = new_vault();
        assert!(matches!(
            vault.set_withdraw_fee(&admin, config::MAX_FEE_BPS + 1, T0),
            Err(VaultError::ConfigInvariant(_))
        ));
        vault.set_withdraw_fee(&admin, 20, T0).unwrap();
        assert_eq!(vault.config().withdraw_fee_bps, 20);
    }

    #[test]
    fn test_frozen_operator_rejected() {
        let (mut vault, admin) = new_vault();
        let operator = vault.create_operator(&admin, T0).unwrap();
        vault.assert_operator(&operator).unwrap();
        vault.set_operator_frozen(&admin, operator.id(), true, T0).unwrap();
        assert!(matches!(
            vault.assert_operator(&operator),
            Err(VaultError::OperatorFrozen(_))
        ));
    }

    #[test]
    fn test_version_lag_on_buffer_blocks_access() {
        let (mut vault, admin) = new_vault();
        vault.force_versions(VERSION, 0);
        assert!(matches!(
            vault.check_version(),
            Err(VaultError::VersionMismatch {
                object: "request_buffer",
                ..
            })
        ));
        vault.upgrade(&admin, T0).unwrap();
        vault.check_version().unwrap();
    }

    #[test]
    fn test_retrieve_fees_bounded_by_collected() {
        let (mut vault, admin) = new_vault();
        vault.collected_fees = 100;
        assert!(vault.retrieve_fees(&admin, 101, T0).is_err());
        assert_eq!(vault.retrieve_fees(&admin, 60, T0).unwrap(), 60);
        assert_eq!(vault.collected_fees(), 40);
    }
}
