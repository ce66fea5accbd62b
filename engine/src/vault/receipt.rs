//! Depositor receipts.
//!
//! A [`Receipt`] is the depositor's ledger entry in the vault. Shares are
//! credited on executed deposits and debited on executed withdrawals;
//! pending amounts track requests that have not been executed yet so a
//! receipt can never over-commit its shares.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-depositor share ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    /// Recipient identity. Requests against the receipt must name it.
    pub owner: String,
    pub shares: u128,
    /// Principal sitting in pending deposit requests.
    pub pending_deposit_balance: u128,
    /// Shares locked in pending withdraw requests.
    pub pending_withdraw_shares: u128,
    /// Withdrawn principal waiting to be claimed.
    pub claimable_principal: u128,
    pub last_deposit_time: u64,
}

impl Receipt {
    pub(crate) fn new(owner: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            shares: 0,
            pending_deposit_balance: 0,
            pending_withdraw_shares: 0,
            claimable_principal: 0,
            last_deposit_time: 0,
        }
    }

    /// Shares not yet committed to a withdraw request.
    pub fn available_shares(&self) -> u128 {
        self.shares.saturating_sub(self.pending_withdraw_shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_shares_excludes_pending() {
        let mut receipt = Receipt::new("alice");
        receipt.shares = 100;
        receipt.pending_withdraw_shares = 30;
        assert_eq!(receipt.available_shares(), 70);
    }
}
