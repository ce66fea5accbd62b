//! Vault events.
//!
//! State transitions push a [`VaultEvent`] into the owning object's
//! [`EventLog`]. Logs are in-memory only (never persisted) and are drained
//! by whoever drives the engine, typically [`crate::service::VaultService`],
//! which forwards them to subscribers and metrics.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::oracle::Severity;
use crate::vault::{AssetType, VaultStatus};

/// Something observable happened to a vault or its oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VaultEvent {
    VaultCreated {
        vault_id: Uuid,
    },
    StatusChanged {
        from: VaultStatus,
        to: VaultStatus,
    },
    OperationStarted {
        operator: Uuid,
        borrowed: Vec<AssetType>,
        principal: u128,
        total_usd_value_before: u128,
    },
    OperationEnded {
        operator: Uuid,
        returned: Vec<AssetType>,
        principal_returned: u128,
    },
    OperationFinalized {
        operator: Uuid,
        total_usd_value_before: u128,
        total_usd_value_after: u128,
        loss: u128,
    },
    /// Admin recovery cleared a stuck operation.
    OperationForceCleared {
        operator: Uuid,
        lost: Vec<AssetType>,
        loss: u128,
    },
    AssetRegistered {
        asset_type: AssetType,
    },
    AssetRemoved {
        asset_type: AssetType,
    },
    AssetValueUpdated {
        asset_type: AssetType,
        value: u128,
    },
    LossToleranceReset {
        epoch: u64,
        base: u128,
    },
    DepositRequested {
        request_id: u64,
        receipt_id: Uuid,
        amount: u128,
        expected_shares: u128,
    },
    DepositCancelled {
        request_id: u64,
        receipt_id: Uuid,
        amount: u128,
    },
    DepositExecuted {
        request_id: u64,
        receipt_id: Uuid,
        amount: u128,
        fee: u128,
        shares: u128,
    },
    WithdrawRequested {
        request_id: u64,
        receipt_id: Uuid,
        shares: u128,
        expected_amount: u128,
    },
    WithdrawCancelled {
        request_id: u64,
        receipt_id: Uuid,
        shares: u128,
    },
    WithdrawExecuted {
        request_id: u64,
        receipt_id: Uuid,
        shares: u128,
        amount: u128,
        fee: u128,
    },
    PrincipalClaimed {
        receipt_id: Uuid,
        amount: u128,
    },
    /// Shares minted to the treasury against value left over at zero supply.
    ResidualSharesMinted {
        shares: u128,
        value: u128,
    },
    TreasurySharesClaimed {
        receipt_id: Uuid,
        owner: String,
        shares: u128,
    },
    ParameterChanged {
        name: String,
        value: u128,
    },
    OperatorCreated {
        operator: Uuid,
    },
    OperatorFreezeSet {
        operator: Uuid,
        frozen: bool,
    },
    FeesRetrieved {
        amount: u128,
    },
    VaultUpgraded {
        from: u64,
        to: u64,
    },
    OracleDegraded {
        asset_type: AssetType,
        price: u128,
    },
    PriceUpdated {
        asset_type: AssetType,
        price: u128,
        severity: Severity,
    },
}

/// An event with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp_ms: u64,
    pub at: DateTime<Utc>,
    pub event: VaultEvent,
}

/// Append-only buffer of events awaiting collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn push(&mut self, timestamp_ms: u64, event: VaultEvent) {
        let at = Utc
            .timestamp_millis_opt(timestamp_ms as i64)
            .single()
            .unwrap_or_default();
        self.records.push(EventRecord {
            timestamp_ms,
            at,
            event,
        });
    }

    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_stamps_wall_clock() {
        let mut log = EventLog::default();
        log.push(
            1_700_000_000_000,
            VaultEvent::FeesRetrieved { amount: 5 },
        );
        let records = log.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].at.timestamp_millis(), 1_700_000_000_000);
        assert!(log.is_empty());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = VaultEvent::StatusChanged {
            from: VaultStatus::Normal,
            to: VaultStatus::Busy,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        let back: VaultEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
