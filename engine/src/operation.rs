//! # Operation Controller
//!
//! An operation lends positions (and optionally principal) to an operator
//! and will not let the vault return to service until every borrowed asset
//! has been handed back and freshly revalued, and the value lost is within
//! the epoch's tolerance.
//!
//! ## Three-Phase Protocol
//!
//! ```text
//!  start_operation ──► OperationTicket
//!        │   status Normal → Busy, positions leave custody
//!        ▼
//!  end_operation(ticket, positions, principal) ──► ValueUpdateTicket
//!        │   every borrowed position back, value updates enabled
//!        ▼
//!  update_*_value for each borrowed asset
//!        │
//!        ▼
//!  finalize_operation(ticket)
//!            all borrowed assets revalued, loss within tolerance,
//!            share supply unchanged; status Busy → Normal
//! ```
//!
//! Tickets carry the operation id, so a ticket from an earlier operation
//! cannot close a later one. Each phase validates everything before it
//! writes, so a rejected call leaves the record and the vault untouched.
//!
//! ## Admin Recovery
//!
//! If an operator disappears mid-operation the vault would stay `Busy`
//! forever. [`Vault::force_clear_operation`] lets the admin close the
//! operation once `operation_recovery_timeout_ms` has passed: positions
//! never handed back are written off at zero, and the full drop from the
//! pre-operation value (write-offs and any revaluations made after the
//! operation ended) is booked to the epoch without the tolerance check.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adaptor::Position;
use crate::error::{OrOverflow, VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::math::apply_bps;
use crate::vault::{AdminCap, AssetType, OperatorCap, Vault, VaultStatus};

// ---------------------------------------------------------------------------
// Records & tickets
// ---------------------------------------------------------------------------

/// Bookkeeping for the operation in flight. Exists exactly while the vault
/// is `Busy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: Uuid,
    pub operator: Uuid,
    pub started_at: u64,
    pub borrowed: BTreeSet<AssetType>,
    pub updated: BTreeMap<AssetType, bool>,
    pub value_update_enabled: bool,
    pub total_usd_value_before: u128,
    pub total_shares_before: u128,
    /// Tolerance in force when the operation started.
    pub loss_tolerance_bps: u64,
    pub free_principal_before: u128,
    pub principal_borrowed: u128,
    pub principal_returned: Option<u128>,
}

impl OperationRecord {
    /// Borrowed assets that have not been revalued since the operation
    /// ended.
    pub fn pending_updates(&self) -> Vec<AssetType> {
        self.borrowed
            .iter()
            .filter(|a| !self.updated.get(*a).copied().unwrap_or(false))
            .cloned()
            .collect()
    }
}

/// Proof of an open operation. Consumed by [`Vault::end_operation`].
#[derive(Debug, PartialEq, Eq)]
pub struct OperationTicket {
    operation_id: Uuid,
    vault_id: Uuid,
    borrowed: Vec<AssetType>,
    principal: u128,
}

impl OperationTicket {
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn borrowed(&self) -> &[AssetType] {
        &self.borrowed
    }

    pub fn principal(&self) -> u128 {
        self.principal
    }
}

/// Proof that an operation has ended. Consumed by
/// [`Vault::finalize_operation`].
#[derive(Debug, PartialEq, Eq)]
pub struct ValueUpdateTicket {
    operation_id: Uuid,
    vault_id: Uuid,
}

impl ValueUpdateTicket {
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }
}

/// What [`Vault::start_operation`] hands to the operator.
#[derive(Debug)]
pub struct Borrowed {
    pub positions: Vec<Position>,
    pub principal: u128,
    pub ticket: OperationTicket,
}

/// Outcome of a finalized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSummary {
    pub total_usd_value_before: u128,
    pub total_usd_value_after: u128,
    pub loss: u128,
    /// Epoch loss after this operation was booked.
    pub epoch_loss: u128,
}

/// Outcome of an admin force-clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub operation_id: Uuid,
    pub lost: Vec<AssetType>,
    pub loss: u128,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

impl Vault {
    /// Phase 1: lends `asset_types` and `principal` to the operator.
    pub fn start_operation(
        &mut self,
        cap: &OperatorCap,
        asset_types: &[AssetType],
        principal: u128,
        now: u64,
    ) -> VaultResult<Borrowed> {
        self.check_version()?;
        self.assert_operator(cap)?;
        self.assert_normal()?;

        let mut borrowed = BTreeSet::new();
        for asset_type in asset_types {
            if asset_type == &self.principal_coin {
                return Err(VaultError::ConfigInvariant(
                    "principal is borrowed by amount, not by asset type".into(),
                ));
            }
            if !self.positions.contains_key(asset_type) {
                return Err(if self.contains_asset(asset_type) {
                    VaultError::PositionNotInCustody(asset_type.clone())
                } else {
                    VaultError::AssetNotFound(asset_type.clone())
                });
            }
            if !borrowed.insert(asset_type.clone()) {
                return Err(VaultError::ConfigInvariant(format!(
                    "asset type {asset_type} borrowed twice"
                )));
            }
        }
        if principal > self.free_principal {
            return Err(VaultError::InsufficientFunds {
                required: principal,
                available: self.free_principal,
            });
        }
        if principal > 0 {
            borrowed.insert(self.principal_coin.clone());
        }

        let total_usd_value_before = self.total_usd_value(now)?;

        // All checks passed.
        self.roll_epoch(total_usd_value_before, now);

        let positions = asset_types
            .iter()
            .filter_map(|a| self.positions.remove(a))
            .collect();
        let free_principal_before = self.free_principal;
        self.free_principal -= principal;

        let record = OperationRecord {
            id: Uuid::new_v4(),
            operator: cap.id(),
            started_at: now,
            updated: borrowed.iter().map(|a| (a.clone(), false)).collect(),
            borrowed,
            value_update_enabled: false,
            total_usd_value_before,
            total_shares_before: self.total_shares,
            loss_tolerance_bps: self.config.loss_tolerance_bps,
            free_principal_before,
            principal_borrowed: principal,
            principal_returned: None,
        };
        let ticket = OperationTicket {
            operation_id: record.id,
            vault_id: self.id,
            borrowed: asset_types.to_vec(),
            principal,
        };
        self.events.push(
            now,
            VaultEvent::OperationStarted {
                operator: cap.id(),
                borrowed: record.borrowed.iter().cloned().collect(),
                principal,
                total_usd_value_before,
            },
        );
        info!(
            vault = %self.id,
            operation = %record.id,
            borrowed = record.borrowed.len(),
            principal,
            total_usd_value_before,
            "operation started"
        );
        self.operation = Some(record);
        self.set_status(VaultStatus::Busy, now);

        Ok(Borrowed {
            positions,
            principal,
            ticket,
        })
    }

    /// Phase 2: takes the borrowed positions and the principal back and
    /// opens value updates for them.
    pub fn end_operation(
        &mut self,
        cap: &OperatorCap,
        ticket: OperationTicket,
        positions: Vec<Position>,
        principal: u128,
        now: u64,
    ) -> VaultResult<ValueUpdateTicket> {
        self.check_version()?;
        self.assert_operator(cap)?;
        self.assert_busy()?;
        let record = self.operation.as_ref().ok_or(VaultError::TicketMismatch)?;
        if ticket.operation_id != record.id || ticket.vault_id != self.id || record.value_update_enabled {
            return Err(VaultError::TicketMismatch);
        }

        let expected: BTreeSet<&AssetType> = record
            .borrowed
            .iter()
            .filter(|a| *a != &self.principal_coin)
            .collect();
        let mut returned = BTreeSet::new();
        let mut unexpected = Vec::new();
        for position in &positions {
            let asset_type = &position.asset_type;
            if !expected.contains(asset_type) || !returned.insert(asset_type) {
                unexpected.push(asset_type.clone());
            }
        }
        let missing: Vec<AssetType> = expected
            .iter()
            .filter(|a| !returned.contains(**a))
            .map(|a| (*a).clone())
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(VaultError::ReturnMismatch { missing, unexpected });
        }
        let free_principal = self.free_principal.checked_add(principal).or_overflow()?;

        // All checks passed.
        let returned: Vec<AssetType> = positions.iter().map(|p| p.asset_type.clone()).collect();
        for position in positions {
            self.positions.insert(position.asset_type.clone(), position);
        }
        self.free_principal = free_principal;

        let principal_coin = self.principal_coin.clone();
        let record = self.operation.as_mut().ok_or(VaultError::TicketMismatch)?;
        // Principal handed in without having been lent still changes the
        // principal value, so it has to be revalued too.
        if principal > 0 && record.borrowed.insert(principal_coin.clone()) {
            record.updated.insert(principal_coin, false);
        }
        record.principal_returned = Some(principal);
        record.value_update_enabled = true;
        let operation_id = record.id;

        self.events.push(
            now,
            VaultEvent::OperationEnded {
                operator: cap.id(),
                returned,
                principal_returned: principal,
            },
        );
        info!(vault = %self.id, operation = %operation_id, principal, "operation ended");

        Ok(ValueUpdateTicket {
            operation_id,
            vault_id: self.id,
        })
    }

    /// Phase 3: checks completeness, loss and share supply, then returns
    /// the vault to `Normal`.
    pub fn finalize_operation(
        &mut self,
        cap: &OperatorCap,
        ticket: ValueUpdateTicket,
        now: u64,
    ) -> VaultResult<OperationSummary> {
        self.check_version()?;
        self.assert_operator(cap)?;
        self.assert_busy()?;
        let record = self.operation.as_ref().ok_or(VaultError::TicketMismatch)?;
        if ticket.operation_id != record.id || ticket.vault_id != self.id || !record.value_update_enabled {
            return Err(VaultError::TicketMismatch);
        }

        let pending = record.pending_updates();
        if !pending.is_empty() {
            return Err(VaultError::IncompleteOperation { pending });
        }

        let total_usd_value_before = record.total_usd_value_before;
        let total_usd_value_after = self.total_usd_value(now)?;
        let loss = total_usd_value_before.saturating_sub(total_usd_value_after);
        let epoch_loss = self.cur_epoch_loss.checked_add(loss).or_overflow()?;
        if loss > 0 {
            let limit = apply_bps(self.cur_epoch_loss_base, record.loss_tolerance_bps).or_overflow()?;
            if epoch_loss > limit {
                warn!(vault = %self.id, loss, epoch_loss, limit, "operation loss exceeds tolerance");
                return Err(VaultError::LossLimitExceeded {
                    loss: epoch_loss,
                    limit,
                });
            }
        }
        if self.total_shares != record.total_shares_before {
            return Err(VaultError::SharesChanged {
                before: record.total_shares_before,
                after: self.total_shares,
            });
        }

        // All checks passed.
        let operator = record.operator;
        let operation_id = record.id;
        self.cur_epoch_loss = epoch_loss;
        self.operation = None;
        self.set_status(VaultStatus::Normal, now);
        self.events.push(
            now,
            VaultEvent::OperationFinalized {
                operator,
                total_usd_value_before,
                total_usd_value_after,
                loss,
            },
        );
        info!(
            vault = %self.id,
            operation = %operation_id,
            total_usd_value_before,
            total_usd_value_after,
            loss,
            "operation finalized"
        );

        Ok(OperationSummary {
            total_usd_value_before,
            total_usd_value_after,
            loss,
            epoch_loss,
        })
    }

    // -- Loss epochs --------------------------------------------------------

    /// Starts a new loss epoch if `now` has moved past the current one.
    fn roll_epoch(&mut self, total_usd_value: u128, now: u64) {
        let epoch = now / self.config.epoch_duration_ms;
        if self.cur_epoch.map_or(true, |current| epoch > current) {
            self.start_epoch(epoch, total_usd_value, now);
        }
    }

    fn start_epoch(&mut self, epoch: u64, base: u128, now: u64) {
        self.cur_epoch = Some(epoch);
        self.cur_epoch_loss_base = base;
        self.cur_epoch_loss = 0;
        self.events.push(now, VaultEvent::LossToleranceReset { epoch, base });
        info!(vault = %self.id, epoch, base, "loss epoch started");
    }

    /// Admin: restarts the current epoch with a fresh baseline and zero
    /// accumulated loss.
    pub fn reset_loss_tolerance(&mut self, cap: &AdminCap, now: u64) -> VaultResult<()> {
        self.admin_guard(cap)?;
        let base = self.total_usd_value(now)?;
        let epoch = now / self.config.epoch_duration_ms;
        self.start_epoch(epoch, base, now);
        Ok(())
    }

    // -- Admin recovery -----------------------------------------------------

    /// Admin: closes an operation that has been stuck in `Busy` for longer
    /// than the recovery timeout.
    pub fn force_clear_operation(&mut self, cap: &AdminCap, now: u64) -> VaultResult<RecoveryReport> {
        self.check_version()?;
        self.assert_admin(cap)?;
        self.assert_busy()?;
        let record = self.operation.as_ref().ok_or(VaultError::TicketMismatch)?;
        let available_at = record
            .started_at
            .saturating_add(self.config.operation_recovery_timeout_ms);
        if now < available_at {
            return Err(VaultError::RecoveryNotYetAllowed {
                started_at: record.started_at,
                available_at,
            });
        }

        let record = self.operation.take().ok_or(VaultError::TicketMismatch)?;
        let mut lost = Vec::new();

        for asset_type in &record.borrowed {
            if asset_type == &self.principal_coin || self.positions.contains_key(asset_type) {
                continue;
            }
            self.assets_value.insert(asset_type.clone(), 0);
            self.assets_value_updated.insert(asset_type.clone(), now);
            lost.push(asset_type.clone());
        }

        let principal = self.principal_coin.clone();
        let principal_pending =
            record.borrowed.contains(&principal) && !record.updated.get(&principal).copied().unwrap_or(false);
        if principal_pending {
            // The cached principal value still reflects the pre-operation
            // balance; scale it to what is actually idle now.
            let cached = self.assets_value.get(&principal).copied().unwrap_or_default();
            let kept = if record.free_principal_before == 0 {
                0
            } else {
                cached
                    .checked_mul(self.free_principal)
                    .map(|v| v / record.free_principal_before)
                    .unwrap_or(0)
            };
            self.assets_value.insert(principal.clone(), kept);
            if record.principal_returned.is_none() {
                lost.push(principal);
            }
        }

        // Everything revalued during the operation counts, not only what
        // was written off above.
        let total_usd_value_after = self
            .asset_types
            .iter()
            .filter_map(|a| self.assets_value.get(a))
            .fold(0u128, |acc, v| acc.saturating_add(*v));
        let loss = record.total_usd_value_before.saturating_sub(total_usd_value_after);

        self.cur_epoch_loss = self.cur_epoch_loss.saturating_add(loss);
        self.set_status(VaultStatus::Normal, now);
        self.events.push(
            now,
            VaultEvent::OperationForceCleared {
                operator: record.operator,
                lost: lost.clone(),
                loss,
            },
        );
        warn!(
            vault = %self.id,
            operation = %record.id,
            lost = lost.len(),
            loss,
            "operation force-cleared by admin"
        );

        Ok(RecoveryReport {
            operation_id: record.id,
            lost,
            loss,
        })
    }
}
