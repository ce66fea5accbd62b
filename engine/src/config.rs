//! # Engine Configuration & Constants
//!
//! Every magic number in the vault engine lives here: fixed-point bases,
//! fee ceilings, default lock times and staleness windows. Runtime tunables
//! are grouped into [`VaultConfig`], which can be loaded from JSON and is
//! validated before a vault is created from it.
//!
//! Timestamps throughout the engine are unix milliseconds (`u64`). Callers
//! pass `now` explicitly so every transition is reproducible in tests.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Schema version of every persisted engine object. Objects whose version
/// lags this constant must be upgraded before they can be read or written.
pub const VERSION: u64 = 1;

// ---------------------------------------------------------------------------
// Fixed-Point Bases
// ---------------------------------------------------------------------------

/// Base for USD values, shares and share ratios: 9 decimals.
/// `1_000_000_000` USD units == $1.00, and a share ratio of `DECIMALS`
/// means one share is worth exactly $1.
pub const DECIMALS: u128 = 1_000_000_000;

/// Number of decimals in [`DECIMALS`]. Coin amounts are normalized to this.
pub const DECIMALS_EXP: u8 = 9;

/// Base for raw oracle prices: USD per whole coin with 18 decimals.
pub const ORACLE_DECIMALS: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator. 10_000 bps == 100%.
pub const BPS_BASE: u128 = 10_000;

// ---------------------------------------------------------------------------
// Fees & Tolerances
// ---------------------------------------------------------------------------

/// Default deposit fee: 10 bps.
pub const DEFAULT_DEPOSIT_FEE_BPS: u64 = 10;

/// Default withdraw fee: 10 bps.
pub const DEFAULT_WITHDRAW_FEE_BPS: u64 = 10;

/// Hard ceiling for either fee rate: 5%.
pub const MAX_FEE_BPS: u64 = 500;

/// Default loss tolerance per epoch: 10 bps of the epoch baseline.
pub const DEFAULT_LOSS_TOLERANCE_BPS: u64 = 10;

/// Loss tolerance can never exceed 100%.
pub const MAX_LOSS_TOLERANCE_BPS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Timing Defaults (milliseconds)
// ---------------------------------------------------------------------------

/// Minimum time between a deposit and a withdraw request on the same receipt.
pub const DEFAULT_LOCKING_TIME_FOR_WITHDRAW_MS: u64 = 12 * 60 * 60 * 1_000;

/// Minimum age of a pending request before its owner can cancel it.
pub const DEFAULT_LOCKING_TIME_FOR_CANCEL_REQUEST_MS: u64 = 5 * 60 * 1_000;

/// Upper bound accepted for either lock time: one week.
pub const MAX_LOCKING_TIME_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// Cached asset values older than this cannot enter a total-value sum.
pub const DEFAULT_MAX_UPDATE_INTERVAL_MS: u64 = 60 * 1_000;

/// Length of a loss-accounting epoch.
pub const DEFAULT_EPOCH_DURATION_MS: u64 = 24 * 60 * 60 * 1_000;

/// How long an operation must be stuck in `Busy` before the admin may
/// force-clear it.
pub const DEFAULT_OPERATION_RECOVERY_TIMEOUT_MS: u64 = 6 * 60 * 60 * 1_000;

/// Oracle prices older than this are refused by the price accessors.
pub const DEFAULT_ORACLE_UPDATE_INTERVAL_MS: u64 = 60 * 1_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`VaultConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field violates its allowed range or a relational constraint.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Tunable parameters a vault is created with.
///
/// Fee rates, lock times and loss tolerance remain admin-mutable afterwards
/// (outside of operations). The intervals are fixed for the vault lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub deposit_fee_bps: u64,
    pub withdraw_fee_bps: u64,
    pub loss_tolerance_bps: u64,
    pub locking_time_for_withdraw_ms: u64,
    pub locking_time_for_cancel_request_ms: u64,
    /// Freshness window applied by `total_usd_value`.
    pub max_update_interval_ms: u64,
    pub epoch_duration_ms: u64,
    pub operation_recovery_timeout_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            deposit_fee_bps: DEFAULT_DEPOSIT_FEE_BPS,
            withdraw_fee_bps: DEFAULT_WITHDRAW_FEE_BPS,
            loss_tolerance_bps: DEFAULT_LOSS_TOLERANCE_BPS,
            locking_time_for_withdraw_ms: DEFAULT_LOCKING_TIME_FOR_WITHDRAW_MS,
            locking_time_for_cancel_request_ms: DEFAULT_LOCKING_TIME_FOR_CANCEL_REQUEST_MS,
            max_update_interval_ms: DEFAULT_MAX_UPDATE_INTERVAL_MS,
            epoch_duration_ms: DEFAULT_EPOCH_DURATION_MS,
            operation_recovery_timeout_ms: DEFAULT_OPERATION_RECOVERY_TIMEOUT_MS,
        }
    }
}

impl VaultConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fee_bps(self.deposit_fee_bps).map_err(ConfigError::Invalid)?;
        check_fee_bps(self.withdraw_fee_bps).map_err(ConfigError::Invalid)?;
        check_loss_tolerance_bps(self.loss_tolerance_bps).map_err(ConfigError::Invalid)?;
        check_locking_time(self.locking_time_for_withdraw_ms).map_err(ConfigError::Invalid)?;
        check_locking_time(self.locking_time_for_cancel_request_ms)
            .map_err(ConfigError::Invalid)?;
        if self.max_update_interval_ms == 0 {
            return Err(ConfigError::Invalid("max update interval must be non-zero".into()));
        }
        if self.epoch_duration_ms == 0 {
            return Err(ConfigError::Invalid("epoch duration must be non-zero".into()));
        }
        if self.operation_recovery_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "operation recovery timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared range checks
// ---------------------------------------------------------------------------
//
// Used by both `VaultConfig::validate` and the vault's admin setters so the
// creation path and the mutation path can never disagree.

pub(crate) fn check_fee_bps(fee_bps: u64) -> Result<(), String> {
    if fee_bps > MAX_FEE_BPS {
        return Err(format!("fee {fee_bps} bps exceeds maximum {MAX_FEE_BPS} bps"));
    }
    Ok(())
}

pub(crate) fn check_loss_tolerance_bps(tolerance_bps: u64) -> Result<(), String> {
    if tolerance_bps > MAX_LOSS_TOLERANCE_BPS {
        return Err(format!(
            "loss tolerance {tolerance_bps} bps exceeds maximum {MAX_LOSS_TOLERANCE_BPS} bps"
        ));
    }
    Ok(())
}

pub(crate) fn check_locking_time(ms: u64) -> Result<(), String> {
    if ms > MAX_LOCKING_TIME_MS {
        return Err(format!("locking time {ms}ms exceeds maximum {MAX_LOCKING_TIME_MS}ms"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_bases() {
        assert_eq!(DECIMALS, 10u128.pow(DECIMALS_EXP as u32));
        assert_eq!(ORACLE_DECIMALS, DECIMALS * DECIMALS);
    }

    #[test]
    fn test_default_config_is_valid() {
        VaultConfig::default().validate().unwrap();
    }

    #[test]
    fn test_fee_ceiling_enforced() {
        let config = VaultConfig {
            deposit_fee_bps: MAX_FEE_BPS + 1,
            ..VaultConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = VaultConfig::from_json(r#"{ "loss_tolerance_bps": 25 }"#).unwrap();
        assert_eq!(config.loss_tolerance_bps, 25);
        assert_eq!(config.deposit_fee_bps, DEFAULT_DEPOSIT_FEE_BPS);
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        let result = VaultConfig::from_json(r#"{ "epoch_duration_ms": 0 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_update_interval_rejected() {
        let config = VaultConfig {
            max_update_interval_ms: 0,
            ..VaultConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("update interval")));
        assert!(VaultConfig::from_json(r#"{ "max_update_interval_ms": 0 }"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, r#"{ "withdraw_fee_bps": 30 }"#).unwrap();
        let config = VaultConfig::load(&path).unwrap();
        assert_eq!(config.withdraw_fee_bps, 30);
    }

    #[test]
    fn test_load_missing_file() {
        let err = VaultConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
