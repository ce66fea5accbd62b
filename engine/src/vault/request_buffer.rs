//! Queued deposit and withdraw requests.
//!
//! Users never touch shares directly: they queue a request, and an operator
//! executes it later at the share ratio of the moment, bounded by the
//! slippage limits both sides supplied. The buffer is a child object of the
//! vault with its own schema version, kept in lockstep with the parent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::VERSION;

/// Lifecycle of a queued request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Executed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub request_id: u64,
    pub receipt_id: Uuid,
    pub recipient: String,
    /// Principal amount in smallest units, fee included.
    pub amount: u128,
    /// Lower slippage bound set by the depositor.
    pub expected_shares: u128,
    pub request_time: u64,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub request_id: u64,
    pub receipt_id: Uuid,
    pub recipient: String,
    pub shares: u128,
    /// Lower slippage bound on the principal received, after fees.
    pub expected_amount: u128,
    pub request_time: u64,
    pub status: RequestStatus,
}

/// Pending requests, keyed by monotonically increasing ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBuffer {
    pub(crate) version: u64,
    next_deposit_id: u64,
    next_withdraw_id: u64,
    deposits: BTreeMap<u64, DepositRequest>,
    withdraws: BTreeMap<u64, WithdrawRequest>,
    /// Sum of pending deposit amounts held outside the free principal.
    deposit_balance: u128,
}

impl Default for RequestBuffer {
    fn default() -> Self {
        Self {
            version: VERSION,
            next_deposit_id: 0,
            next_withdraw_id: 0,
            deposits: BTreeMap::new(),
            withdraws: BTreeMap::new(),
            deposit_balance: 0,
        }
    }
}

impl RequestBuffer {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn deposit_balance(&self) -> u128 {
        self.deposit_balance
    }

    pub fn deposit(&self, request_id: u64) -> Option<&DepositRequest> {
        self.deposits.get(&request_id)
    }

    pub fn withdraw(&self, request_id: u64) -> Option<&WithdrawRequest> {
        self.withdraws.get(&request_id)
    }

    pub fn pending_deposits(&self) -> impl Iterator<Item = &DepositRequest> {
        self.deposits.values()
    }

    pub fn pending_withdraws(&self) -> impl Iterator<Item = &WithdrawRequest> {
        self.withdraws.values()
    }

    pub(crate) fn push_deposit(
        &mut self,
        receipt_id: Uuid,
        recipient: &str,
        amount: u128,
        expected_shares: u128,
        now: u64,
    ) -> Option<u64> {
        let request_id = self.next_deposit_id;
        self.deposit_balance = self.deposit_balance.checked_add(amount)?;
        self.next_deposit_id += 1;
        self.deposits.insert(
            request_id,
            DepositRequest {
                request_id,
                receipt_id,
                recipient: recipient.to_string(),
                amount,
                expected_shares,
                request_time: now,
                status: RequestStatus::Pending,
            },
        );
        Some(request_id)
    }

    pub(crate) fn push_withdraw(
        &mut self,
        receipt_id: Uuid,
        recipient: &str,
        shares: u128,
        expected_amount: u128,
        now: u64,
    ) -> u64 {
        let request_id = self.next_withdraw_id;
        self.next_withdraw_id += 1;
        self.withdraws.insert(
            request_id,
            WithdrawRequest {
                request_id,
                receipt_id,
                recipient: recipient.to_string(),
                shares,
                expected_amount,
                request_time: now,
                status: RequestStatus::Pending,
            },
        );
        request_id
    }

    /// Removes a deposit request and stamps it with its final status.
    pub(crate) fn close_deposit(&mut self, request_id: u64, status: RequestStatus) -> Option<DepositRequest> {
        let mut request = self.deposits.remove(&request_id)?;
        self.deposit_balance = self.deposit_balance.saturating_sub(request.amount);
        request.status = status;
        Some(request)
    }

    pub(crate) fn close_withdraw(&mut self, request_id: u64, status: RequestStatus) -> Option<WithdrawRequest> {
        let mut request = self.withdraws.remove(&request_id)?;
        request.status = status;
        Some(request)
    }
}
