//! Capability tokens.
//!
//! Authority over a vault is carried by value, not by identity: whoever
//! holds the [`AdminCap`] may reconfigure the vault, and whoever holds an
//! unfrozen [`OperatorCap`] may run operations and execute requests. The
//! vault only stores the ids it issued and checks presented caps against
//! them.
//!
//! Those ids are part of every vault snapshot, so a cap must never be
//! buildable from them. Caps have private fields, no `Clone` and no serde
//! impls; the only way to get one is from the vault that issued it.
//!
//! ```compile_fail
//! # use strata_engine::AdminCap;
//! let json = serde_json::json!({ "id": uuid::Uuid::nil(), "vault_id": uuid::Uuid::nil() });
//! let _cap: AdminCap = serde_json::from_value(json).unwrap();
//! ```
//!
//! ```compile_fail
//! # use strata_engine::OperatorCap;
//! let _cap: OperatorCap = serde_json::from_str("{}").unwrap();
//! ```

use uuid::Uuid;

/// Admin authority over exactly one vault. Issued once, at creation.
#[derive(Debug, PartialEq, Eq)]
pub struct AdminCap {
    id: Uuid,
    vault_id: Uuid,
}

impl AdminCap {
    pub(crate) fn issue(vault_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            vault_id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn vault_id(&self) -> Uuid {
        self.vault_id
    }
}

/// Operator authority. The vault tracks a frozen flag per issued id.
#[derive(Debug, PartialEq, Eq)]
pub struct OperatorCap {
    id: Uuid,
    vault_id: Uuid,
}

impl OperatorCap {
    pub(crate) fn issue(vault_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            vault_id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn vault_id(&self) -> Uuid {
        self.vault_id
    }
}
