//! # Request Settlement
//!
//! Deposit and withdraw requests are queued by users and executed by
//! operators at the share ratio of the moment.
//!
//! ```text
//!   request_deposit ──► Pending ──► execute_deposit ──► Executed (shares)
//!                          │
//!                          └──► cancel_deposit (after lock) ──► Cancelled
//!
//!   request_withdraw ─► Pending ──► execute_withdraw ─► Executed (claimable)
//!                          │
//!                          └──► cancel_withdraw (after lock) ─► Cancelled
//! ```
//!
//! Execution prices against a freshly computed principal value and the
//! cached values of everything else, so it fails like any other total-value
//! read when a position hasn't been revalued recently.
//!
//! ## Zero supply
//!
//! If every share has been withdrawn but value remains (an operation gain
//! landed after the last withdrawal), the next deposit would otherwise
//! capture that value. Instead the residual is first minted to the treasury
//! at a ratio of 1.0, and the deposit is priced after that. The admin moves
//! treasury shares onto a receipt with [`Vault::claim_treasury_shares`],
//! after which they redeem through the ordinary withdraw flow.
//!
//! The reverse case, shares outstanding against a vault worth nothing, has
//! no share price at all. Deposits and withdrawals are refused with
//! [`VaultError::NoValueBackingShares`] until value is restored.

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DECIMALS;
use crate::error::{OrOverflow, VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::math::{apply_bps, div_d, div_with_oracle_price, mul_d};
use crate::oracle::PriceOracle;
use crate::vault::{AdminCap, OperatorCap, Receipt, RequestStatus, Vault};

/// Outcome of an executed deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositExecution {
    pub request_id: u64,
    pub receipt_id: Uuid,
    pub shares: u128,
    pub fee: u128,
}

/// Outcome of an executed withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawExecution {
    pub request_id: u64,
    pub receipt_id: Uuid,
    /// Principal credited to the receipt's claimable balance, after fees.
    pub amount: u128,
    pub fee: u128,
}

impl Vault {
    // -- Receipt helpers ----------------------------------------------------

    fn owned_receipt(&mut self, receipt_id: &Uuid, owner: &str) -> VaultResult<&mut Receipt> {
        let receipt = self.receipt_mut(receipt_id)?;
        if receipt.owner != owner {
            return Err(VaultError::Unauthorized(format!(
                "receipt {receipt_id} does not belong to {owner}"
            )));
        }
        Ok(receipt)
    }

    fn check_cancel_lock(&self, request_time: u64, now: u64) -> VaultResult<()> {
        let available_at = request_time.saturating_add(self.config.locking_time_for_cancel_request_ms);
        if now < available_at {
            return Err(VaultError::LockNotExpired { available_at, now });
        }
        Ok(())
    }

    /// Total value with the principal priced fresh from the oracle.
    fn total_with_fresh_principal(&self, oracle: &PriceOracle, now: u64) -> VaultResult<u128> {
        let principal_value = oracle.usd_value(&self.principal_coin, self.free_principal, now)?;
        self.total_usd_value_with(now, Some((&self.principal_coin, principal_value)))
    }

    /// Writes the principal value implied by the current free balance.
    fn refresh_principal_value(&mut self, oracle: &PriceOracle, now: u64) -> VaultResult<()> {
        let value = oracle.usd_value(&self.principal_coin, self.free_principal, now)?;
        let principal = self.principal_coin.clone();
        self.finish_update_asset_value(&principal, value, now)
    }

    // -- Deposits -----------------------------------------------------------

    /// Queues `amount` of principal for conversion into shares. Creates a
    /// receipt for `owner` unless an existing one is named.
    pub fn request_deposit(
        &mut self,
        owner: &str,
        receipt_id: Option<Uuid>,
        amount: u128,
        expected_shares: u128,
        now: u64,
    ) -> VaultResult<(u64, Uuid)> {
        self.check_version()?;
        self.assert_normal()?;
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let receipt_id = match receipt_id {
            Some(id) => {
                self.owned_receipt(&id, owner)?;
                id
            }
            None => {
                let receipt = Receipt::new(owner);
                let id = receipt.id;
                self.receipts.insert(id, receipt);
                id
            }
        };
        let request_id = self
            .request_buffer
            .push_deposit(receipt_id, owner, amount, expected_shares, now)
            .or_overflow()?;
        let receipt = self.receipt_mut(&receipt_id)?;
        receipt.pending_deposit_balance = receipt.pending_deposit_balance.saturating_add(amount);

        self.events.push(
            now,
            VaultEvent::DepositRequested {
                request_id,
                receipt_id,
                amount,
                expected_shares,
            },
        );
        debug!(vault = %self.id, request_id, %receipt_id, amount, "deposit requested");
        Ok((request_id, receipt_id))
    }

    /// Cancels a pending deposit and returns the refunded amount.
    pub fn cancel_deposit(&mut self, owner: &str, receipt_id: Uuid, request_id: u64, now: u64) -> VaultResult<u128> {
        self.check_version()?;
        self.assert_normal()?;
        let request = self
            .request_buffer
            .deposit(request_id)
            .ok_or(VaultError::RequestNotFound(request_id))?;
        if request.receipt_id != receipt_id {
            return Err(VaultError::Unauthorized(format!(
                "request {request_id} does not belong to receipt {receipt_id}"
            )));
        }
        let request_time = request.request_time;
        self.owned_receipt(&receipt_id, owner)?;
        self.check_cancel_lock(request_time, now)?;

        let request = self
            .request_buffer
            .close_deposit(request_id, RequestStatus::Cancelled)
            .ok_or(VaultError::RequestNotFound(request_id))?;
        let receipt = self.receipt_mut(&receipt_id)?;
        receipt.pending_deposit_balance = receipt.pending_deposit_balance.saturating_sub(request.amount);
        self.events.push(
            now,
            VaultEvent::DepositCancelled {
                request_id,
                receipt_id,
                amount: request.amount,
            },
        );
        Ok(request.amount)
    }

    /// Converts a pending deposit into shares. `max_shares_received` is the
    /// operator's upper slippage bound; the depositor's `expected_shares`
    /// is the lower one.
    pub fn execute_deposit(
        &mut self,
        cap: &OperatorCap,
        request_id: u64,
        max_shares_received: u128,
        oracle: &PriceOracle,
        now: u64,
    ) -> VaultResult<DepositExecution> {
        self.check_version()?;
        self.assert_operator(cap)?;
        self.assert_normal()?;
        let request = self
            .request_buffer
            .deposit(request_id)
            .cloned()
            .ok_or(VaultError::RequestNotFound(request_id))?;

        let total_before = self.total_with_fresh_principal(oracle, now)?;
        let residual_shares = if self.total_shares == 0 && total_before > 0 {
            // Ratio 1.0: one share per USD unit.
            total_before
        } else {
            0
        };
        let supply = self.total_shares.checked_add(residual_shares).or_overflow()?;
        let ratio = if supply == 0 {
            DECIMALS
        } else {
            div_d(total_before, supply).or_overflow()?
        };
        if ratio == 0 {
            return Err(VaultError::NoValueBackingShares { shares: supply });
        }

        let fee = apply_bps(request.amount, self.config.deposit_fee_bps).or_overflow()?;
        let net = request.amount - fee;
        let new_value = oracle.usd_value(&self.principal_coin, net, now)?;
        let shares = div_d(new_value, ratio).or_overflow()?;
        if shares == 0 || shares < request.expected_shares || shares > max_shares_received {
            return Err(VaultError::SlippageExceeded {
                actual: shares,
                min: request.expected_shares,
                max: max_shares_received,
            });
        }
        let free_principal = self.free_principal.checked_add(net).or_overflow()?;
        let collected_fees = self.collected_fees.checked_add(fee).or_overflow()?;
        supply.checked_add(shares).or_overflow()?;

        // All checks passed.
        if residual_shares > 0 {
            self.treasury_shares = self.treasury_shares.saturating_add(residual_shares);
            self.add_shares(residual_shares)?;
            self.events.push(
                now,
                VaultEvent::ResidualSharesMinted {
                    shares: residual_shares,
                    value: total_before,
                },
            );
            info!(vault = %self.id, shares = residual_shares, "residual value minted to treasury");
        }
        self.free_principal = free_principal;
        self.collected_fees = collected_fees;
        self.refresh_principal_value(oracle, now)?;
        self.add_shares(shares)?;
        self.request_buffer
            .close_deposit(request_id, RequestStatus::Executed)
            .ok_or(VaultError::RequestNotFound(request_id))?;
        let receipt = self.receipt_mut(&request.receipt_id)?;
        receipt.shares = receipt.shares.saturating_add(shares);
        receipt.pending_deposit_balance = receipt.pending_deposit_balance.saturating_sub(request.amount);
        receipt.last_deposit_time = now;

        self.events.push(
            now,
            VaultEvent::DepositExecuted {
                request_id,
                receipt_id: request.receipt_id,
                amount: request.amount,
                fee,
                shares,
            },
        );
        info!(vault = %self.id, request_id, shares, fee, "deposit executed");
        Ok(DepositExecution {
            request_id,
            receipt_id: request.receipt_id,
            shares,
            fee,
        })
    }

    /// Admin: moves every treasury share onto a fresh receipt for `owner`.
    /// Returns the receipt id and the number of shares moved.
    pub fn claim_treasury_shares(&mut self, cap: &AdminCap, owner: &str, now: u64) -> VaultResult<(Uuid, u128)> {
        self.admin_guard(cap)?;
        let shares = self.treasury_shares;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }

        let mut receipt = Receipt::new(owner);
        receipt.shares = shares;
        receipt.last_deposit_time = now;
        let receipt_id = receipt.id;
        self.receipts.insert(receipt_id, receipt);
        self.treasury_shares = 0;

        self.events.push(
            now,
            VaultEvent::TreasurySharesClaimed {
                receipt_id,
                owner: owner.to_string(),
                shares,
            },
        );
        info!(vault = %self.id, %receipt_id, shares, "treasury shares claimed");
        Ok((receipt_id, shares))
    }

    /// Executes several deposits; either all of them land or none do.
    pub fn batch_execute_deposit(
        &mut self,
        cap: &OperatorCap,
        requests: &[(u64, u128)],
        oracle: &PriceOracle,
        now: u64,
    ) -> VaultResult<Vec<DepositExecution>> {
        let mut working = self.clone();
        let executed = requests
            .iter()
            .map(|(request_id, max_shares)| working.execute_deposit(cap, *request_id, *max_shares, oracle, now))
            .collect::<VaultResult<Vec<_>>>()?;
        *self = working;
        Ok(executed)
    }

    // -- Withdrawals --------------------------------------------------------

    /// Locks `shares` of the receipt in a withdraw request.
    pub fn request_withdraw(
        &mut self,
        owner: &str,
        receipt_id: Uuid,
        shares: u128,
        expected_amount: u128,
        now: u64,
    ) -> VaultResult<u64> {
        self.check_version()?;
        self.assert_normal()?;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let lock = self.config.locking_time_for_withdraw_ms;
        let receipt = self.owned_receipt(&receipt_id, owner)?;
        let available_at = receipt.last_deposit_time.saturating_add(lock);
        if now < available_at {
            return Err(VaultError::LockNotExpired { available_at, now });
        }
        if shares > receipt.available_shares() {
            return Err(VaultError::InsufficientFunds {
                required: shares,
                available: receipt.available_shares(),
            });
        }
        receipt.pending_withdraw_shares += shares;

        let request_id = self
            .request_buffer
            .push_withdraw(receipt_id, owner, shares, expected_amount, now);
        self.events.push(
            now,
            VaultEvent::WithdrawRequested {
                request_id,
                receipt_id,
                shares,
                expected_amount,
            },
        );
        debug!(vault = %self.id, request_id, %receipt_id, shares, "withdraw requested");
        Ok(request_id)
    }

    /// Cancels a pending withdrawal and unlocks its shares.
    pub fn cancel_withdraw(&mut self, owner: &str, receipt_id: Uuid, request_id: u64, now: u64) -> VaultResult<u128> {
        self.check_version()?;
        self.assert_normal()?;
        let request = self
            .request_buffer
            .withdraw(request_id)
            .ok_or(VaultError::RequestNotFound(request_id))?;
        if request.receipt_id != receipt_id {
            return Err(VaultError::Unauthorized(format!(
                "request {request_id} does not belong to receipt {receipt_id}"
            )));
        }
        let request_time = request.request_time;
        self.owned_receipt(&receipt_id, owner)?;
        self.check_cancel_lock(request_time, now)?;

        let request = self
            .request_buffer
            .close_withdraw(request_id, RequestStatus::Cancelled)
            .ok_or(VaultError::RequestNotFound(request_id))?;
        let receipt = self.receipt_mut(&receipt_id)?;
        receipt.pending_withdraw_shares = receipt.pending_withdraw_shares.saturating_sub(request.shares);
        self.events.push(
            now,
            VaultEvent::WithdrawCancelled {
                request_id,
                receipt_id,
                shares: request.shares,
            },
        );
        Ok(request.shares)
    }

    /// Burns the request's shares and credits the principal they are worth,
    /// minus the withdraw fee, to the receipt's claimable balance.
    pub fn execute_withdraw(
        &mut self,
        cap: &OperatorCap,
        request_id: u64,
        max_amount_received: u128,
        oracle: &PriceOracle,
        now: u64,
    ) -> VaultResult<WithdrawExecution> {
        self.check_version()?;
        self.assert_operator(cap)?;
        self.assert_normal()?;
        let request = self
            .request_buffer
            .withdraw(request_id)
            .cloned()
            .ok_or(VaultError::RequestNotFound(request_id))?;

        let total = self.total_with_fresh_principal(oracle, now)?;
        if self.total_shares == 0 {
            return Err(VaultError::InsufficientFunds {
                required: request.shares,
                available: 0,
            });
        }
        let ratio = div_d(total, self.total_shares).or_overflow()?;
        if ratio == 0 {
            return Err(VaultError::NoValueBackingShares {
                shares: self.total_shares,
            });
        }
        let usd_value = mul_d(request.shares, ratio).or_overflow()?;
        let price = oracle.normalized_price(&self.principal_coin, now)?;
        let amount = div_with_oracle_price(usd_value, price).or_overflow()?;
        if amount > self.free_principal {
            return Err(VaultError::InsufficientFunds {
                required: amount,
                available: self.free_principal,
            });
        }
        let fee = apply_bps(amount, self.config.withdraw_fee_bps).or_overflow()?;
        let net = amount - fee;
        if net < request.expected_amount || net > max_amount_received {
            return Err(VaultError::SlippageExceeded {
                actual: net,
                min: request.expected_amount,
                max: max_amount_received,
            });
        }
        let receipt = self
            .receipts
            .get(&request.receipt_id)
            .ok_or(VaultError::ReceiptNotFound(request.receipt_id))?;
        if receipt.shares < request.shares || self.total_shares < request.shares {
            return Err(VaultError::InsufficientFunds {
                required: request.shares,
                available: receipt.shares,
            });
        }
        let collected_fees = self.collected_fees.checked_add(fee).or_overflow()?;
        let claimable = self.claimable_principal.checked_add(net).or_overflow()?;

        // All checks passed.
        self.free_principal -= amount;
        self.collected_fees = collected_fees;
        self.claimable_principal = claimable;
        self.total_shares -= request.shares;
        self.refresh_principal_value(oracle, now)?;
        self.request_buffer
            .close_withdraw(request_id, RequestStatus::Executed)
            .ok_or(VaultError::RequestNotFound(request_id))?;
        let receipt = self.receipt_mut(&request.receipt_id)?;
        receipt.shares -= request.shares;
        receipt.pending_withdraw_shares = receipt.pending_withdraw_shares.saturating_sub(request.shares);
        receipt.claimable_principal = receipt.claimable_principal.saturating_add(net);

        self.events.push(
            now,
            VaultEvent::WithdrawExecuted {
                request_id,
                receipt_id: request.receipt_id,
                shares: request.shares,
                amount: net,
                fee,
            },
        );
        info!(vault = %self.id, request_id, amount = net, fee, "withdraw executed");
        Ok(WithdrawExecution {
            request_id,
            receipt_id: request.receipt_id,
            amount: net,
            fee,
        })
    }

    /// Executes several withdrawals; either all of them land or none do.
    pub fn batch_execute_withdraw(
        &mut self,
        cap: &OperatorCap,
        requests: &[(u64, u128)],
        oracle: &PriceOracle,
        now: u64,
    ) -> VaultResult<Vec<WithdrawExecution>> {
        let mut working = self.clone();
        let executed = requests
            .iter()
            .map(|(request_id, max_amount)| working.execute_withdraw(cap, *request_id, *max_amount, oracle, now))
            .collect::<VaultResult<Vec<_>>>()?;
        *self = working;
        Ok(executed)
    }

    /// Pays out withdrawn principal held for the receipt.
    pub fn claim_claimable_principal(
        &mut self,
        owner: &str,
        receipt_id: Uuid,
        amount: u128,
        now: u64,
    ) -> VaultResult<u128> {
        self.check_version()?;
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let receipt = self.owned_receipt(&receipt_id, owner)?;
        if amount > receipt.claimable_principal {
            return Err(VaultError::InsufficientFunds {
                required: amount,
                available: receipt.claimable_principal,
            });
        }
        receipt.claimable_principal -= amount;
        self.claimable_principal = self.claimable_principal.saturating_sub(amount);
        self.events.push(now, VaultEvent::PrincipalClaimed { receipt_id, amount });
        Ok(amount)
    }
}
