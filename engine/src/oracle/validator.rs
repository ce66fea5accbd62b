//! The price oracle: feed registry plus the dual-source update flow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::feed::{FeedParams, PriceFeed, SourceMode};
use super::provider::{ProviderReading, ProviderSet};
use super::strategy::{self, Severity};
use super::OracleError;
use crate::config::{DEFAULT_ORACLE_UPDATE_INTERVAL_MS, VERSION};
use crate::events::{EventLog, VaultEvent};
use crate::math::normalize_price;
use crate::vault::AssetType;

/// Result of an accepted price update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceUpdate {
    /// The committed price, 18 decimals.
    pub price: u128,
    pub severity: Severity,
    pub mode: SourceMode,
}

impl PriceUpdate {
    /// True when only one provider was usable.
    pub fn degraded(&self) -> bool {
        self.mode == SourceMode::Single
    }
}

/// A price that passed classification but has not been committed yet.
struct Candidate {
    price: u128,
    severity: Severity,
    mode: SourceMode,
    warning_since: Option<u64>,
}

/// Registry of price feeds with validated update and read paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceOracle {
    version: u64,
    /// Prices older than this are refused by the accessors.
    update_interval_ms: u64,
    feeds: BTreeMap<AssetType, PriceFeed>,
    #[serde(skip)]
    events: EventLog,
}

impl Default for PriceOracle {
    fn default() -> Self {
        Self::new(DEFAULT_ORACLE_UPDATE_INTERVAL_MS)
    }
}

impl PriceOracle {
    pub fn new(update_interval_ms: u64) -> Self {
        Self {
            version: VERSION,
            update_interval_ms,
            feeds: BTreeMap::new(),
            events: EventLog::default(),
        }
    }

    // -- Versioning ---------------------------------------------------------

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Rejects any access while the persisted schema lags the engine.
    pub fn check_version(&self) -> Result<(), OracleError> {
        if self.version != VERSION {
            return Err(OracleError::VersionMismatch {
                expected: VERSION,
                found: self.version,
            });
        }
        Ok(())
    }

    /// Migrates the oracle to the current schema version.
    pub fn upgrade(&mut self) -> Result<(), OracleError> {
        if self.version > VERSION {
            return Err(OracleError::VersionMismatch {
                expected: VERSION,
                found: self.version,
            });
        }
        if self.version < VERSION {
            info!(from = self.version, to = VERSION, "oracle upgraded");
            self.version = VERSION;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_version(&mut self, version: u64) {
        self.version = version;
    }

    // -- Feed registry ------------------------------------------------------

    pub fn update_interval_ms(&self) -> u64 {
        self.update_interval_ms
    }

    pub fn set_update_interval(&mut self, update_interval_ms: u64) -> Result<(), OracleError> {
        self.check_version()?;
        if update_interval_ms == 0 {
            return Err(OracleError::InvalidFeedConfig(
                "update interval must be non-zero".into(),
            ));
        }
        self.update_interval_ms = update_interval_ms;
        Ok(())
    }

    pub fn feed(&self, asset_type: &AssetType) -> Option<&PriceFeed> {
        self.feeds.get(asset_type)
    }

    pub fn feeds(&self) -> impl Iterator<Item = &PriceFeed> {
        self.feeds.values()
    }

    pub fn has_feed(&self, asset_type: &AssetType) -> bool {
        self.feeds.contains_key(asset_type)
    }

    /// Registers a feed. Both providers must be resolvable, and the feed
    /// must produce an acceptable price right now: a feed that cannot pass
    /// its own checks at registration would only fail later, mid-operation.
    /// The probe's price becomes the feed's first accepted price.
    pub fn add_feed(
        &mut self,
        asset_type: AssetType,
        params: FeedParams,
        providers: &ProviderSet,
        now: u64,
    ) -> Result<PriceUpdate, OracleError> {
        self.check_version()?;
        if self.feeds.contains_key(&asset_type) {
            return Err(OracleError::FeedAlreadyExists(asset_type));
        }
        providers.get(&params.primary.provider)?;
        providers.get(&params.secondary.provider)?;

        let mut feed = PriceFeed::new(asset_type.clone(), params)?;
        let candidate = Self::evaluate(&feed, providers, now)?;
        let update = Self::commit(&mut feed, candidate, now);
        info!(asset = %asset_type, price = update.price, "price feed registered");
        self.feeds.insert(asset_type, feed);
        Ok(update)
    }

    pub fn remove_feed(&mut self, asset_type: &AssetType) -> Result<PriceFeed, OracleError> {
        self.check_version()?;
        self.feeds
            .remove(asset_type)
            .ok_or_else(|| OracleError::FeedNotFound(asset_type.clone()))
    }

    pub fn set_feed_enabled(&mut self, asset_type: &AssetType, enabled: bool) -> Result<(), OracleError> {
        self.feed_mut(asset_type)?.set_enabled(enabled);
        Ok(())
    }

    /// Mutates a feed's parameters through its validating setters.
    pub fn configure_feed<F>(&mut self, asset_type: &AssetType, change: F) -> Result<(), OracleError>
    where
        F: FnOnce(&mut PriceFeed) -> Result<(), OracleError>,
    {
        let feed = self.feed_mut(asset_type)?;
        let mut candidate = feed.clone();
        change(&mut candidate)?;
        candidate.params().validate()?;
        *feed = candidate;
        Ok(())
    }

    fn feed_mut(&mut self, asset_type: &AssetType) -> Result<&mut PriceFeed, OracleError> {
        self.check_version()?;
        self.feeds
            .get_mut(asset_type)
            .ok_or_else(|| OracleError::FeedNotFound(asset_type.clone()))
    }

    // -- Update flow --------------------------------------------------------

    /// Reads both providers, classifies, validates and commits a new price.
    /// On any rejection the feed is left exactly as it was.
    pub fn update_price(
        &mut self,
        asset_type: &AssetType,
        providers: &ProviderSet,
        now: u64,
    ) -> Result<PriceUpdate, OracleError> {
        let feed = self.feed_mut(asset_type)?;
        if !feed.is_enabled() {
            return Err(OracleError::FeedDisabled(asset_type.clone()));
        }

        let candidate = match Self::evaluate(feed, providers, now) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(asset = %asset_type, error = %e, "price update rejected");
                return Err(e);
            }
        };
        let update = Self::commit(feed, candidate, now);

        if update.degraded() {
            warn!(asset = %asset_type, price = update.price, "oracle degraded: single source accepted");
            self.events.push(
                now,
                VaultEvent::OracleDegraded {
                    asset_type: asset_type.clone(),
                    price: update.price,
                },
            );
        } else {
            debug!(asset = %asset_type, price = update.price, severity = ?update.severity, "price updated");
        }
        self.events.push(
            now,
            VaultEvent::PriceUpdated {
                asset_type: asset_type.clone(),
                price: update.price,
                severity: update.severity,
            },
        );
        Ok(update)
    }

    fn evaluate(feed: &PriceFeed, providers: &ProviderSet, now: u64) -> Result<Candidate, OracleError> {
        let params = feed.params();
        let asset_type = feed.asset_type();

        let primary = fresh_reading(providers, &params.primary, now);
        let secondary = fresh_reading(providers, &params.secondary, now);

        let candidate = match (primary, secondary) {
            (None, None) => return Err(OracleError::StalePrice(asset_type.clone())),
            (Some(only), None) | (None, Some(only)) => Candidate {
                price: only.price,
                severity: Severity::Normal,
                mode: SourceMode::Single,
                warning_since: feed.warning_since(),
            },
            (Some(p), Some(s)) => {
                let severity = strategy::classify_divergence(
                    p.price,
                    s.price,
                    params.threshold1_bps,
                    params.threshold2_bps,
                );
                match severity {
                    Severity::Normal => Candidate {
                        price: p.price,
                        severity,
                        mode: SourceMode::Dual,
                        warning_since: None,
                    },
                    Severity::Warning => {
                        let escalated = strategy::escalate_warning(
                            feed.warning_since(),
                            now,
                            params.max_duration_within_thresholds_ms,
                        );
                        if !escalated.accepts() {
                            return Err(OracleError::PriceDivergence {
                                asset_type: asset_type.clone(),
                                severity: escalated,
                                divergence_bps: strategy::divergence_bps(p.price, s.price),
                            });
                        }
                        Candidate {
                            price: p.price,
                            severity,
                            mode: SourceMode::Dual,
                            warning_since: Some(feed.warning_since().unwrap_or(now)),
                        }
                    }
                    Severity::Major | Severity::Critical => {
                        return Err(OracleError::PriceDivergence {
                            asset_type: asset_type.clone(),
                            severity,
                            divergence_bps: strategy::divergence_bps(p.price, s.price),
                        })
                    }
                }
            }
        };

        if !strategy::within_bounds(candidate.price, params.min_price, params.max_price) {
            return Err(OracleError::PriceOutOfRange {
                asset_type: asset_type.clone(),
                price: candidate.price,
                min: params.min_price,
                max: params.max_price,
            });
        }

        // A dual-source reading right after a single-source one is allowed
        // to jump back: the single-source price is the suspect one.
        let recovering =
            feed.last_source_mode() == Some(SourceMode::Single) && candidate.mode == SourceMode::Dual;
        if !recovering {
            let previous = feed.history().map(|h| (h.price, h.updated_at));
            if let Err(span_bps) = strategy::check_span(
                previous,
                candidate.price,
                now,
                params.history_ttl_ms,
                params.max_allowed_span_bps,
            ) {
                return Err(OracleError::PriceSpanExceeded {
                    asset_type: asset_type.clone(),
                    previous: previous.map(|(p, _)| p).unwrap_or_default(),
                    span_bps,
                    max_span_bps: params.max_allowed_span_bps,
                });
            }
        }

        Ok(candidate)
    }

    fn commit(feed: &mut PriceFeed, candidate: Candidate, now: u64) -> PriceUpdate {
        feed.commit(candidate.price, now, candidate.mode, candidate.warning_since);
        PriceUpdate {
            price: candidate.price,
            severity: candidate.severity,
            mode: candidate.mode,
        }
    }

    // -- Read paths ---------------------------------------------------------

    /// Raw 18-decimal price. Kept crate-private so that value math always
    /// goes through [`Self::normalized_price`].
    pub(crate) fn raw_price(&self, asset_type: &AssetType, now: u64) -> Result<u128, OracleError> {
        self.check_version()?;
        let feed = self
            .feeds
            .get(asset_type)
            .ok_or_else(|| OracleError::FeedNotFound(asset_type.clone()))?;
        if !feed.is_enabled() {
            return Err(OracleError::FeedDisabled(asset_type.clone()));
        }
        let price = feed.raw_price();
        if price == 0 || now.saturating_sub(feed.last_updated()) > self.update_interval_ms {
            return Err(OracleError::PriceNotUpdated {
                asset_type: asset_type.clone(),
                last_updated: feed.last_updated(),
                now,
            });
        }
        Ok(price)
    }

    /// Price scaled by the coin's decimals so that
    /// `amount_in_smallest_units * normalized / 1e18` is a 9-decimal USD value.
    pub fn normalized_price(&self, asset_type: &AssetType, now: u64) -> Result<u128, OracleError> {
        let price = self.raw_price(asset_type, now)?;
        let decimals = self.feeds[asset_type].params().coin_decimals;
        normalize_price(price, decimals).ok_or(OracleError::Overflow)
    }

    /// USD value (9 decimals) of `amount` smallest units of `asset_type`.
    pub fn usd_value(&self, asset_type: &AssetType, amount: u128, now: u64) -> Result<u128, OracleError> {
        let price = self.normalized_price(asset_type, now)?;
        crate::math::mul_with_oracle_price(amount, price).ok_or(OracleError::Overflow)
    }

    /// Drains oracle notices (price updates, degraded warnings).
    pub fn take_events(&mut self) -> Vec<crate::events::EventRecord> {
        self.events.drain()
    }
}

/// Reads a source and returns the reading only if it is usable: the call
/// succeeded, the price is non-zero and it is within the source's
/// staleness window.
fn fresh_reading(
    providers: &ProviderSet,
    source: &super::feed::ProviderSource,
    now: u64,
) -> Option<ProviderReading> {
    let provider = match providers.get(&source.provider) {
        Ok(p) => p,
        Err(e) => {
            warn!(provider = %source.provider, error = %e, "oracle provider missing");
            return None;
        }
    };
    match provider.read(&source.source_id) {
        Ok(reading) if reading.price > 0 && reading.age_ms(now) <= source.max_staleness_ms => {
            Some(reading)
        }
        Ok(reading) => {
            debug!(
                provider = %source.provider,
                source = %source.source_id,
                price = reading.price,
                age_ms = reading.age_ms(now),
                "oracle reading unusable"
            );
            None
        }
        Err(e) => {
            debug!(provider = %source.provider, error = %e, "oracle read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ORACLE_DECIMALS;
    use crate::oracle::feed::tests::sample_params;
    use crate::oracle::ManualProvider;
    use std::sync::Arc;

    const DOLLAR: u128 = ORACLE_DECIMALS;

    struct Harness {
        oracle: PriceOracle,
        providers: ProviderSet,
        pyth: Arc<ManualProvider>,
        supra: Arc<ManualProvider>,
        sui: AssetType,
    }

    impl Harness {
        fn new() -> Self {
            let pyth = Arc::new(ManualProvider::new("pyth"));
            let supra = Arc::new(ManualProvider::new("supra"));
            let providers = ProviderSet::new();
            providers.register(pyth.clone());
            providers.register(supra.clone());
            let mut h = Self {
                oracle: PriceOracle::new(60_000),
                providers,
                pyth,
                supra,
                sui: AssetType::new("SUI"),
            };
            h.push(100, 100, 0);
            h.oracle
                .add_feed(h.sui.clone(), sample_params(), &h.providers, 0)
                .unwrap();
            h
        }

        fn push(&mut self, primary: u128, secondary: u128, ts: u64) {
            self.pyth.push("SUI/USD", primary * DOLLAR, ts);
            self.supra.push("sui_usdt", secondary * DOLLAR, ts);
        }

        fn update(&mut self, now: u64) -> Result<PriceUpdate, OracleError> {
            let sui = self.sui.clone();
            self.oracle.update_price(&sui, &self.providers, now)
        }
    }

    #[test]
    fn registration_probes_providers() {
        let mut oracle = PriceOracle::new(60_000);
        let providers = ProviderSet::new();
        providers.register(Arc::new(ManualProvider::new("pyth")));
        // supra missing entirely.
        let result = oracle.add_feed(AssetType::new("SUI"), sample_params(), &providers, 0);
        assert!(matches!(result, Err(OracleError::ProviderNotFound(_))));

        providers.register(Arc::new(ManualProvider::new("supra")));
        // Registered but no readings: the feed could never update.
        let result = oracle.add_feed(AssetType::new("SUI"), sample_params(), &providers, 0);
        assert!(matches!(result, Err(OracleError::StalePrice(_))));
        assert!(!oracle.has_feed(&AssetType::new("SUI")));
    }

    #[test]
    fn registration_rejects_unreachable_min_price() {
        let mut h = Harness::new();
        let mut params = sample_params();
        params.min_price = 1_000 * DOLLAR;
        let result = h
            .oracle
            .add_feed(AssetType::new("WAL"), params, &h.providers, 0);
        // Same sources as SUI, priced at $100: below the floor.
        assert!(matches!(result, Err(OracleError::PriceOutOfRange { .. })));
        assert!(!h.oracle.has_feed(&AssetType::new("WAL")));
    }

    #[test]
    fn duplicate_feed_rejected() {
        let mut h = Harness::new();
        let sui = h.sui.clone();
        let result = h.oracle.add_feed(sui, sample_params(), &h.providers, 0);
        assert!(matches!(result, Err(OracleError::FeedAlreadyExists(_))));
    }

    #[test]
    fn both_stale_rejects_without_mutation() {
        let mut h = Harness::new();
        let before = h.oracle.feed(&h.sui).unwrap().clone();
        // Readings stamped at 0, staleness 60s.
        let result = h.update(120_000);
        assert!(matches!(result, Err(OracleError::StalePrice(_))));
        assert_eq!(h.oracle.feed(&h.sui).unwrap(), &before);
    }

    #[test]
    fn single_fresh_source_is_accepted_as_degraded() {
        let mut h = Harness::new();
        h.pyth.push("SUI/USD", 101 * DOLLAR, 100_000);
        let update = h.update(120_000).unwrap();
        assert_eq!(update.price, 101 * DOLLAR);
        assert!(update.degraded());
        let events = h.oracle.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e.event, VaultEvent::OracleDegraded { .. })));
    }

    #[test]
    fn zero_price_counts_as_stale() {
        let mut h = Harness::new();
        h.push(0, 0, 1_000);
        assert!(matches!(h.update(1_000), Err(OracleError::StalePrice(_))));
    }

    #[test]
    fn warning_band_accepts_primary() {
        let mut h = Harness::new();
        h.push(100, 119, 1_000);
        let update = h.update(1_000).unwrap();
        assert_eq!(update.severity, Severity::Warning);
        assert_eq!(update.price, 100 * DOLLAR);
        assert_eq!(h.oracle.feed(&h.sui).unwrap().warning_since(), Some(1_000));
    }

    #[test]
    fn critical_divergence_rejected() {
        let mut h = Harness::new();
        h.push(100, 121, 1_000);
        match h.update(1_000) {
            Err(OracleError::PriceDivergence {
                severity,
                divergence_bps,
                ..
            }) => {
                assert_eq!(severity, Severity::Critical);
                assert_eq!(divergence_bps, 2100);
            }
            other => panic!("expected divergence rejection, got {other:?}"),
        }
    }

    #[test]
    fn persistent_warning_escalates_to_major() {
        let mut h = Harness::new();
        let max = sample_params().max_duration_within_thresholds_ms;
        h.push(100, 115, 1_000);
        h.update(1_000).unwrap();
        h.push(100, 115, 1_000 + max);
        h.update(1_000 + max).unwrap();
        h.push(100, 115, 1_001 + max);
        let result = h.update(1_001 + max);
        assert!(matches!(
            result,
            Err(OracleError::PriceDivergence {
                severity: Severity::Major,
                ..
            })
        ));
        // Timer survives the rejection.
        assert_eq!(h.oracle.feed(&h.sui).unwrap().warning_since(), Some(1_000));
    }

    #[test]
    fn normal_reading_resets_warning_timer() {
        let mut h = Harness::new();
        h.push(100, 115, 1_000);
        h.update(1_000).unwrap();
        h.push(100, 101, 2_000);
        assert_eq!(h.update(2_000).unwrap().severity, Severity::Normal);
        assert_eq!(h.oracle.feed(&h.sui).unwrap().warning_since(), None);
    }

    #[test]
    fn min_price_enforced_without_max() {
        let mut h = Harness::new();
        let sui = h.sui.clone();
        h.oracle
            .configure_feed(&sui, |f| f.set_min_price(50 * DOLLAR))
            .unwrap();
        h.push(40, 40, 1_000);
        assert!(matches!(h.update(1_000), Err(OracleError::PriceOutOfRange { .. })));
    }

    #[test]
    fn max_price_enforced_without_min() {
        let mut h = Harness::new();
        let sui = h.sui.clone();
        h.oracle
            .configure_feed(&sui, |f| f.set_max_price(150 * DOLLAR))
            .unwrap();
        h.push(160, 160, 1_000);
        assert!(matches!(h.update(1_000), Err(OracleError::PriceOutOfRange { .. })));
    }

    #[test]
    fn configure_feed_rejects_invalid_mutation() {
        let mut h = Harness::new();
        let sui = h.sui.clone();
        let before = h.oracle.feed(&sui).unwrap().params().clone();
        let result = h.oracle.configure_feed(&sui, |f| f.set_threshold1(5_000));
        assert!(matches!(result, Err(OracleError::InvalidFeedConfig(_))));
        assert_eq!(h.oracle.feed(&sui).unwrap().params(), &before);
    }

    #[test]
    fn span_check_rejects_jump_within_ttl() {
        let mut h = Harness::new();
        let sui = h.sui.clone();
        h.oracle
            .configure_feed(&sui, |f| f.set_history_policy(60_000, 1_000))
            .unwrap();
        h.push(130, 130, 10_000);
        assert!(matches!(
            h.update(10_000),
            Err(OracleError::PriceSpanExceeded { .. })
        ));
        // After the TTL lapses the same price is fine.
        h.push(130, 130, 61_000);
        assert!(h.update(61_000).is_ok());
    }

    #[test]
    fn span_check_skipped_on_single_to_dual_recovery() {
        let mut h = Harness::new();
        let sui = h.sui.clone();
        h.oracle
            .configure_feed(&sui, |f| f.set_history_policy(60_000, 1_000))
            .unwrap();
        // Primary alone reports a bad price (secondary stale).
        h.supra.clear("sui_usdt");
        h.pyth.push("SUI/USD", 105 * DOLLAR, 5_000);
        let single = h.update(5_000).unwrap();
        assert!(single.degraded());

        // Both back at a price 20% away from the single-source reading.
        h.push(126, 126, 6_000);
        let recovered = h.update(6_000).unwrap();
        assert_eq!(recovered.mode, SourceMode::Dual);
        assert_eq!(recovered.price, 126 * DOLLAR);
    }

    #[test]
    fn normalized_price_scales_by_decimals() {
        let mut h = Harness::new();
        // sample_params uses 9 decimals: normalized == raw.
        assert_eq!(h.oracle.normalized_price(&h.sui, 0).unwrap(), 100 * DOLLAR);
        let mut params = sample_params();
        params.coin_decimals = 6;
        params.primary.source_id = "USDC/USD".into();
        params.secondary.source_id = "usdc_usd".into();
        h.pyth.push("USDC/USD", DOLLAR, 0);
        h.supra.push("usdc_usd", DOLLAR, 0);
        let usdc = AssetType::new("USDC");
        h.oracle.add_feed(usdc.clone(), params, &h.providers, 0).unwrap();
        assert_eq!(h.oracle.normalized_price(&usdc, 0).unwrap(), DOLLAR * 1_000);
        // 1 USDC == $1 in the 9-decimal base.
        assert_eq!(
            h.oracle.usd_value(&usdc, 1_000_000, 0).unwrap(),
            crate::config::DECIMALS
        );
    }

    #[test]
    fn stale_stored_price_is_not_served() {
        let h = Harness::new();
        assert!(matches!(
            h.oracle.normalized_price(&h.sui, 60_001),
            Err(OracleError::PriceNotUpdated { .. })
        ));
    }

    #[test]
    fn version_lag_blocks_reads_and_writes() {
        let mut h = Harness::new();
        h.oracle.force_version(0);
        assert!(matches!(
            h.oracle.normalized_price(&h.sui, 0),
            Err(OracleError::VersionMismatch { .. })
        ));
        assert!(matches!(h.update(0), Err(OracleError::VersionMismatch { .. })));
        h.oracle.upgrade().unwrap();
        assert!(h.oracle.normalized_price(&h.sui, 0).is_ok());
    }

    #[test]
    fn disabled_feed_refuses_reads() {
        let mut h = Harness::new();
        let sui = h.sui.clone();
        h.oracle.set_feed_enabled(&sui, false).unwrap();
        assert!(matches!(
            h.oracle.normalized_price(&sui, 0),
            Err(OracleError::FeedDisabled(_))
        ));
        assert!(matches!(h.update(0), Err(OracleError::FeedDisabled(_))));
    }
}
