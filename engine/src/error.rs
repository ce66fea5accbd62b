//! Error taxonomy for the vault engine.
//!
//! Every fallible engine call returns a [`VaultError`]. No error leaves the
//! vault in a partially mutated state: mutators validate before they write,
//! and [`crate::service::VaultService`] additionally runs each call against a
//! working copy that is discarded on failure.

use thiserror::Error;

use crate::config::ConfigError;
use crate::oracle::OracleError;
use crate::storage::DbError;
use crate::vault::{AssetType, VaultStatus};

/// Errors produced by vault, operation, valuation and request flows.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The vault is not in a status that allows this call.
    #[error("invalid vault status: vault is {current}, call requires {expected}")]
    InvalidStatus {
        current: VaultStatus,
        expected: &'static str,
    },

    /// Oracle data was rejected or unavailable.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// A configuration mutation would break a relational constraint.
    #[error("config invariant violated: {0}")]
    ConfigInvariant(String),

    /// A balance or treasury check failed.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u128, available: u128 },

    /// Shares are outstanding but nothing backs them, so no share price
    /// exists.
    #[error("vault holds no value behind {shares} outstanding shares")]
    NoValueBackingShares { shares: u128 },

    /// Finalize was attempted before every borrowed asset was revalued.
    #[error("operation incomplete: {} borrowed asset(s) not yet revalued: {pending:?}", pending.len())]
    IncompleteOperation { pending: Vec<AssetType> },

    /// The operation lost more value than the epoch tolerance allows.
    #[error("loss limit exceeded: epoch loss {loss} > limit {limit}")]
    LossLimitExceeded { loss: u128, limit: u128 },

    /// An object's schema version lags the engine (or its parent).
    #[error("version mismatch on {object}: expected {expected}, found {found}")]
    VersionMismatch {
        object: &'static str,
        expected: u64,
        found: u64,
    },

    /// The operation changed the share supply.
    #[error("total shares changed during operation: before {before}, after {after}")]
    SharesChanged { before: u128, after: u128 },

    /// A cached value is too old to be summed.
    #[error("stale value for {asset_type}: updated at {updated_at}, now {now}")]
    StaleValue {
        asset_type: AssetType,
        updated_at: u64,
        now: u64,
    },

    #[error("asset type {0} is not registered")]
    AssetNotFound(AssetType),

    #[error("asset type {0} is already registered")]
    AssetAlreadyExists(AssetType),

    /// Deregistration requires a zero cached value.
    #[error("asset type {asset_type} still holds value {value}")]
    NonZeroValue { asset_type: AssetType, value: u128 },

    /// The asset is registered but its position is not in vault custody.
    #[error("position {0} is not in vault custody")]
    PositionNotInCustody(AssetType),

    /// Positions handed back at the end of an operation don't match the
    /// borrowed set.
    #[error("operation returned assets mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    ReturnMismatch {
        missing: Vec<AssetType>,
        unexpected: Vec<AssetType>,
    },

    /// The ticket presented does not belong to the active operation.
    #[error("operation ticket does not match the active operation")]
    TicketMismatch,

    /// Value updates are closed for this asset at this point of the operation.
    #[error("value updates for {0} are not allowed right now")]
    ValueUpdateNotAllowed(AssetType),

    #[error("admin recovery not yet allowed: operation started at {started_at}, available at {available_at}")]
    RecoveryNotYetAllowed { started_at: u64, available_at: u64 },

    #[error("operator {0} is frozen")]
    OperatorFrozen(uuid::Uuid),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("receipt {0} not found")]
    ReceiptNotFound(uuid::Uuid),

    #[error("request {0} not found")]
    RequestNotFound(u64),

    #[error("slippage exceeded: got {actual}, allowed range [{min}, {max}]")]
    SlippageExceeded { actual: u128, min: u128, max: u128 },

    #[error("lock not expired: available at {available_at}, now {now}")]
    LockNotExpired { available_at: u64, now: u64 },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("adaptor failed for {asset_type}: {reason}")]
    AdaptorFailed { asset_type: AssetType, reason: String },

    #[error("arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] DbError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl VaultError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::InvalidStatus { .. } => "invalid_status",
            VaultError::Oracle(e) => e.kind(),
            VaultError::ConfigInvariant(_) | VaultError::Config(_) => "config",
            VaultError::InsufficientFunds { .. } => "insufficient_funds",
            VaultError::NoValueBackingShares { .. } => "no_value",
            VaultError::IncompleteOperation { .. } => "incomplete_operation",
            VaultError::LossLimitExceeded { .. } => "loss_limit",
            VaultError::VersionMismatch { .. } => "version",
            VaultError::SharesChanged { .. } => "shares_changed",
            VaultError::StaleValue { .. } => "stale_value",
            VaultError::AssetNotFound(_)
            | VaultError::AssetAlreadyExists(_)
            | VaultError::NonZeroValue { .. }
            | VaultError::PositionNotInCustody(_) => "asset_registry",
            VaultError::ReturnMismatch { .. } | VaultError::TicketMismatch => "operation_mismatch",
            VaultError::ValueUpdateNotAllowed(_) => "value_update_closed",
            VaultError::RecoveryNotYetAllowed { .. } => "recovery_early",
            VaultError::OperatorFrozen(_) | VaultError::Unauthorized(_) => "unauthorized",
            VaultError::ReceiptNotFound(_) | VaultError::RequestNotFound(_) => "not_found",
            VaultError::SlippageExceeded { .. } => "slippage",
            VaultError::LockNotExpired { .. } => "locked",
            VaultError::ZeroAmount => "zero_amount",
            VaultError::AdaptorFailed { .. } => "adaptor",
            VaultError::Overflow => "overflow",
            VaultError::Storage(_) => "storage",
            VaultError::Metrics(_) => "metrics",
        }
    }
}

/// Convenience alias used throughout the engine.
pub type VaultResult<T> = Result<T, VaultError>;

/// Lifts a checked-arithmetic `Option` into a [`VaultResult`].
pub(crate) trait OrOverflow<T> {
    fn or_overflow(self) -> VaultResult<T>;
}

impl<T> OrOverflow<T> for Option<T> {
    fn or_overflow(self) -> VaultResult<T> {
        self.ok_or(VaultError::Overflow)
    }
}
