//! # Oracle Module: Dual-Source Price Validation
//!
//! Every USD number in the vault starts life as an oracle price. This module
//! turns two independent, possibly failing price providers into one price
//! the valuation pipeline can trust, or refuses to produce one at all.
//!
//! ## Architecture
//!
//! ```text
//! provider.rs  - OracleProvider trait, ProviderSet registry, ManualProvider
//! feed.rs      - PriceFeed: per-asset sources, thresholds, bounds, history
//! strategy.rs  - pure classification: divergence, range, history span
//! validator.rs - PriceOracle: feed registry, update flow, normalized reads
//! ```
//!
//! ## Update Flow
//!
//! ```text
//!   primary ──┐                      ┌─► range check ─► span check ─► commit
//!             ├─► freshness ─► classify                                  │
//! secondary ──┘                      └─► reject (stale / critical / major)│
//!                                                                         ▼
//!                                               history := (price, now)
//! ```
//!
//! Nothing is written unless every check passes.

pub mod feed;
pub mod provider;
pub mod strategy;
pub mod validator;

pub use feed::{FeedParams, PriceFeed, PriceHistory, ProviderSource, SourceMode};
pub use provider::{ManualProvider, OracleProvider, ProviderReading, ProviderSet};
pub use strategy::Severity;
pub use validator::{PriceOracle, PriceUpdate};

use thiserror::Error;

use crate::vault::AssetType;

/// Errors produced by price feeds and the oracle validator.
///
/// `InvalidFeedConfig` is the configuration-invariant class: it is returned
/// by every feed mutator whose result would break a relational constraint,
/// and the mutation is discarded.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Neither provider produced a fresh, non-zero price.
    #[error("stale price for {0}: no fresh provider reading")]
    StalePrice(AssetType),

    /// Both providers are fresh but disagree beyond tolerance.
    #[error("price divergence for {asset_type}: {severity:?} ({divergence_bps} bps)")]
    PriceDivergence {
        asset_type: AssetType,
        severity: Severity,
        divergence_bps: u128,
    },

    #[error("price {price} for {asset_type} outside bounds [min {min}, max {max}]")]
    PriceOutOfRange {
        asset_type: AssetType,
        price: u128,
        min: u128,
        max: u128,
    },

    #[error("price for {asset_type} moved {span_bps} bps from {previous} within history window (max {max_span_bps} bps)")]
    PriceSpanExceeded {
        asset_type: AssetType,
        previous: u128,
        span_bps: u128,
        max_span_bps: u64,
    },

    /// The stored price is older than the oracle update interval.
    #[error("price for {asset_type} not updated since {last_updated} (now {now})")]
    PriceNotUpdated {
        asset_type: AssetType,
        last_updated: u64,
        now: u64,
    },

    #[error("invalid feed config: {0}")]
    InvalidFeedConfig(String),

    #[error("no price feed for {0}")]
    FeedNotFound(AssetType),

    #[error("price feed for {0} already exists")]
    FeedAlreadyExists(AssetType),

    #[error("price feed for {0} is disabled")]
    FeedDisabled(AssetType),

    #[error("oracle provider {0} is not registered")]
    ProviderNotFound(String),

    #[error("oracle provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("oracle version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },

    #[error("oracle arithmetic overflow")]
    Overflow,
}

impl OracleError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OracleError::StalePrice(_) => "stale",
            OracleError::PriceDivergence { .. } => "divergence",
            OracleError::PriceOutOfRange { .. } => "out_of_range",
            OracleError::PriceSpanExceeded { .. } => "span",
            OracleError::PriceNotUpdated { .. } => "not_updated",
            OracleError::InvalidFeedConfig(_) => "invalid_config",
            OracleError::FeedNotFound(_) | OracleError::FeedAlreadyExists(_) => "feed_registry",
            OracleError::FeedDisabled(_) => "feed_disabled",
            OracleError::ProviderNotFound(_) | OracleError::ProviderUnavailable { .. } => "provider",
            OracleError::VersionMismatch { .. } => "version",
            OracleError::Overflow => "overflow",
        }
    }
}
