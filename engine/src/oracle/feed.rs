//! Price feed definition and its relational invariants.
//!
//! A [`PriceFeed`] binds an asset type to two provider sources plus the
//! policy used to judge them. The policy lives in [`FeedParams`], and
//! [`FeedParams::validate`] is the single check every mutation goes
//! through, creation included: a setter builds a candidate copy, validates
//! it, and only then replaces the live parameters.

use serde::{Deserialize, Serialize};

use super::OracleError;
use crate::vault::AssetType;

/// Largest coin decimal count the normalizer accepts.
pub const MAX_COIN_DECIMALS: u8 = 30;

/// Where a feed reads one of its prices from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSource {
    /// Name of a provider registered in the [`super::ProviderSet`].
    pub provider: String,
    /// Provider-specific feed identifier (e.g. a price id).
    pub source_id: String,
    /// Readings older than this are treated as stale.
    pub max_staleness_ms: u64,
}

impl ProviderSource {
    pub fn new(provider: &str, source_id: &str, max_staleness_ms: u64) -> Self {
        Self {
            provider: provider.to_string(),
            source_id: source_id.to_string(),
            max_staleness_ms,
        }
    }
}

/// Validation policy of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedParams {
    pub primary: ProviderSource,
    pub secondary: ProviderSource,
    /// Decimals of the priced coin, used by the normalized accessor.
    pub coin_decimals: u8,
    /// Start of the Warning band, in bps of divergence.
    pub threshold1_bps: u64,
    /// End of the Warning band, in bps of divergence.
    pub threshold2_bps: u64,
    /// How long a Warning streak may last before it becomes Major.
    pub max_duration_within_thresholds_ms: u64,
    /// Lower price bound; 0 disables this side.
    pub min_price: u128,
    /// Upper price bound; 0 disables this side.
    pub max_price: u128,
    /// Window after an accepted update during which the span check applies;
    /// 0 disables the history check.
    pub history_ttl_ms: u64,
    pub max_allowed_span_bps: u64,
}

impl FeedParams {
    /// Checks every relational constraint on the parameters.
    pub fn validate(&self) -> Result<(), OracleError> {
        let invalid = |msg: String| Err(OracleError::InvalidFeedConfig(msg));

        if self.threshold1_bps == 0 {
            return invalid("threshold1 must be non-zero".into());
        }
        if self.threshold1_bps > self.threshold2_bps {
            return invalid(format!(
                "threshold1 ({}) must not exceed threshold2 ({})",
                self.threshold1_bps, self.threshold2_bps
            ));
        }
        if self.min_price > 0 && self.max_price > 0 && self.min_price > self.max_price {
            return invalid(format!(
                "min_price ({}) must not exceed max_price ({})",
                self.min_price, self.max_price
            ));
        }
        if self.max_duration_within_thresholds_ms == 0 {
            return invalid("max duration within thresholds must be non-zero".into());
        }
        if self.history_ttl_ms > 0 && self.max_allowed_span_bps == 0 {
            return invalid("history check enabled with a zero allowed span".into());
        }
        if self.coin_decimals > MAX_COIN_DECIMALS {
            return invalid(format!(
                "coin decimals {} exceed maximum {MAX_COIN_DECIMALS}",
                self.coin_decimals
            ));
        }
        for (label, source) in [("primary", &self.primary), ("secondary", &self.secondary)] {
            if source.provider.is_empty() || source.source_id.is_empty() {
                return invalid(format!("{label} source must name a provider and a source id"));
            }
            if source.max_staleness_ms == 0 {
                return invalid(format!("{label} max staleness must be non-zero"));
            }
        }
        if self.primary.provider == self.secondary.provider
            && self.primary.source_id == self.secondary.source_id
        {
            return invalid("primary and secondary must be independent sources".into());
        }
        Ok(())
    }
}

/// Whether the last accepted price came from one or both providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMode {
    Single,
    Dual,
}

/// Last accepted price and when it was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub price: u128,
    pub updated_at: u64,
}

/// Per-asset price feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeed {
    asset_type: AssetType,
    params: FeedParams,
    enabled: bool,
    /// Last accepted price, 18 decimals.
    price: u128,
    last_updated: u64,
    history: Option<PriceHistory>,
    /// Start of the current Warning streak.
    warning_since: Option<u64>,
    last_source_mode: Option<SourceMode>,
}

impl PriceFeed {
    /// Creates a feed after validating its parameters. The feed holds no
    /// price until its first accepted update.
    pub fn new(asset_type: AssetType, params: FeedParams) -> Result<Self, OracleError> {
        params.validate()?;
        Ok(Self {
            asset_type,
            params,
            enabled: true,
            price: 0,
            last_updated: 0,
            history: None,
            warning_since: None,
            last_source_mode: None,
        })
    }

    pub fn asset_type(&self) -> &AssetType {
        &self.asset_type
    }

    pub fn params(&self) -> &FeedParams {
        &self.params
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn last_updated(&self) -> u64 {
        self.last_updated
    }

    pub fn history(&self) -> Option<PriceHistory> {
        self.history
    }

    pub fn warning_since(&self) -> Option<u64> {
        self.warning_since
    }

    pub fn last_source_mode(&self) -> Option<SourceMode> {
        self.last_source_mode
    }

    /// Raw 18-decimal price. Crate-internal: consumers go through
    /// [`super::PriceOracle::normalized_price`].
    pub(crate) fn raw_price(&self) -> u128 {
        self.price
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Applies `change` to a copy of the parameters and commits it only if
    /// the result validates.
    pub fn update_params<F>(&mut self, change: F) -> Result<(), OracleError>
    where
        F: FnOnce(&mut FeedParams),
    {
        let mut candidate = self.params.clone();
        change(&mut candidate);
        candidate.validate()?;
        self.params = candidate;
        Ok(())
    }

    pub fn set_thresholds(&mut self, threshold1_bps: u64, threshold2_bps: u64) -> Result<(), OracleError> {
        self.update_params(|p| {
            p.threshold1_bps = threshold1_bps;
            p.threshold2_bps = threshold2_bps;
        })
    }

    pub fn set_threshold1(&mut self, threshold1_bps: u64) -> Result<(), OracleError> {
        self.update_params(|p| p.threshold1_bps = threshold1_bps)
    }

    pub fn set_threshold2(&mut self, threshold2_bps: u64) -> Result<(), OracleError> {
        self.update_params(|p| p.threshold2_bps = threshold2_bps)
    }

    pub fn set_min_price(&mut self, min_price: u128) -> Result<(), OracleError> {
        self.update_params(|p| p.min_price = min_price)
    }

    pub fn set_max_price(&mut self, max_price: u128) -> Result<(), OracleError> {
        self.update_params(|p| p.max_price = max_price)
    }

    pub fn set_max_duration_within_thresholds(&mut self, ms: u64) -> Result<(), OracleError> {
        self.update_params(|p| p.max_duration_within_thresholds_ms = ms)
    }

    pub fn set_history_policy(&mut self, ttl_ms: u64, max_span_bps: u64) -> Result<(), OracleError> {
        self.update_params(|p| {
            p.history_ttl_ms = ttl_ms;
            p.max_allowed_span_bps = max_span_bps;
        })
    }

    pub fn set_primary(&mut self, source: ProviderSource) -> Result<(), OracleError> {
        self.update_params(|p| p.primary = source)
    }

    pub fn set_secondary(&mut self, source: ProviderSource) -> Result<(), OracleError> {
        self.update_params(|p| p.secondary = source)
    }

    /// Commits an accepted price.
    pub(crate) fn commit(
        &mut self,
        price: u128,
        now: u64,
        mode: SourceMode,
        warning_since: Option<u64>,
    ) {
        self.price = price;
        self.last_updated = now;
        self.history = Some(PriceHistory {
            price,
            updated_at: now,
        });
        self.warning_since = warning_since;
        self.last_source_mode = Some(mode);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_params() -> FeedParams {
        FeedParams {
            primary: ProviderSource::new("pyth", "SUI/USD", 60_000),
            secondary: ProviderSource::new("supra", "sui_usdt", 60_000),
            coin_decimals: 9,
            threshold1_bps: 1000,
            threshold2_bps: 2000,
            max_duration_within_thresholds_ms: 10 * 60_000,
            min_price: 0,
            max_price: 0,
            history_ttl_ms: 0,
            max_allowed_span_bps: 0,
        }
    }

    fn feed() -> PriceFeed {
        PriceFeed::new(AssetType::new("SUI"), sample_params()).unwrap()
    }

    #[test]
    fn creation_rejects_inverted_thresholds() {
        let mut params = sample_params();
        params.threshold1_bps = 3000;
        assert!(matches!(
            PriceFeed::new(AssetType::new("SUI"), params),
            Err(OracleError::InvalidFeedConfig(_))
        ));
    }

    #[test]
    fn setter_rejects_threshold1_above_threshold2() {
        let mut feed = feed();
        assert!(feed.set_threshold1(2500).is_err());
        // Nothing landed.
        assert_eq!(feed.params().threshold1_bps, 1000);
        assert_eq!(feed.params().threshold2_bps, 2000);
    }

    #[test]
    fn setter_rejects_threshold2_below_threshold1() {
        let mut feed = feed();
        assert!(feed.set_threshold2(500).is_err());
        assert_eq!(feed.params().threshold2_bps, 2000);
        feed.set_thresholds(400, 500).unwrap();
        assert_eq!(feed.params().threshold1_bps, 400);
    }

    #[test]
    fn price_bounds_checked_on_every_setter() {
        let mut feed = feed();
        feed.set_max_price(100).unwrap();
        assert!(feed.set_min_price(101).is_err());
        feed.set_min_price(50).unwrap();
        assert!(feed.set_max_price(49).is_err());
        // Disabling the upper side is always allowed.
        feed.set_max_price(0).unwrap();
        feed.set_min_price(1_000).unwrap();
    }

    #[test]
    fn sources_must_be_independent() {
        let mut feed = feed();
        let dup = feed.params().primary.clone();
        assert!(feed.set_secondary(dup).is_err());
    }

    #[test]
    fn history_policy_requires_span() {
        let mut feed = feed();
        assert!(feed.set_history_policy(60_000, 0).is_err());
        feed.set_history_policy(60_000, 500).unwrap();
        assert_eq!(feed.params().history_ttl_ms, 60_000);
    }

    #[test]
    fn commit_records_history() {
        let mut feed = feed();
        feed.commit(5, 1_000, SourceMode::Dual, None);
        assert_eq!(feed.raw_price(), 5);
        assert_eq!(
            feed.history(),
            Some(PriceHistory {
                price: 5,
                updated_at: 1_000
            })
        );
        assert_eq!(feed.last_source_mode(), Some(SourceMode::Dual));
    }
}
