//! Shared fixtures for the engine integration tests.
//!
//! Two manual providers ("pyth" and "supra") price USDC (6 decimals) at $1
//! and SUI (9 decimals) at $2. Everything is fresh at [`NOW`].

#![allow(dead_code)]

use std::sync::Arc;

use strata_engine::adaptor::{net_holdings_value, Adaptor, AdaptorError, Holding, Position};
use strata_engine::config::{VaultConfig, ORACLE_DECIMALS};
use strata_engine::oracle::{FeedParams, ManualProvider, PriceOracle, ProviderSet, ProviderSource};
use strata_engine::{AdminCap, AssetType, OperatorCap, Vault};

pub const NOW: u64 = 1_700_000_000_000;
pub const USDC: u128 = 1_000_000;
pub const SUI: u128 = 1_000_000_000;

/// Values any position as supply minus debt at oracle prices.
pub struct BookAdaptor;

impl Adaptor for BookAdaptor {
    fn protocol(&self) -> &str {
        "book"
    }

    fn valuation(&self, position: &Position, oracle: &PriceOracle, now: u64) -> Result<u128, AdaptorError> {
        self.ensure_protocol(position)?;
        net_holdings_value(position, oracle, now)
    }
}

pub fn sui_position(asset_type: &str, amount: u128) -> Position {
    Position::new(asset_type, "book").with_holding(Holding::supply("SUI", amount))
}

pub fn feed_params(pyth_id: &str, supra_id: &str, coin_decimals: u8) -> FeedParams {
    FeedParams {
        primary: ProviderSource::new("pyth", pyth_id, 60_000),
        secondary: ProviderSource::new("supra", supra_id, 60_000),
        coin_decimals,
        threshold1_bps: 100,
        threshold2_bps: 300,
        max_duration_within_thresholds_ms: 60_000,
        min_price: 0,
        max_price: 0,
        history_ttl_ms: 0,
        max_allowed_span_bps: 0,
    }
}

pub struct Oracles {
    pub oracle: PriceOracle,
    pub providers: ProviderSet,
    pub pyth: Arc<ManualProvider>,
    pub supra: Arc<ManualProvider>,
}

pub fn oracles() -> Oracles {
    let pyth = Arc::new(ManualProvider::new("pyth"));
    let supra = Arc::new(ManualProvider::new("supra"));
    pyth.push("USDC/USD", ORACLE_DECIMALS, NOW);
    supra.push("usdc_usd", ORACLE_DECIMALS, NOW);
    pyth.push("SUI/USD", 2 * ORACLE_DECIMALS, NOW);
    supra.push("sui_usd", 2 * ORACLE_DECIMALS, NOW);
    let providers = ProviderSet::new();
    providers.register(pyth.clone());
    providers.register(supra.clone());

    let mut oracle = PriceOracle::new(60_000);
    oracle
        .add_feed(AssetType::new("USDC"), feed_params("USDC/USD", "usdc_usd", 6), &providers, NOW)
        .unwrap();
    oracle
        .add_feed(AssetType::new("SUI"), feed_params("SUI/USD", "sui_usd", 9), &providers, NOW)
        .unwrap();
    Oracles {
        oracle,
        providers,
        pyth,
        supra,
    }
}

/// Fee-free config with no request locks.
pub fn open_config() -> VaultConfig {
    VaultConfig {
        deposit_fee_bps: 0,
        withdraw_fee_bps: 0,
        locking_time_for_withdraw_ms: 0,
        locking_time_for_cancel_request_ms: 0,
        ..VaultConfig::default()
    }
}

pub struct Harness {
    pub vault: Vault,
    pub admin: AdminCap,
    pub operator: OperatorCap,
    pub oracles: Oracles,
}

impl Harness {
    pub fn new(config: VaultConfig) -> Self {
        let (mut vault, admin) = Vault::new(config, AssetType::new("USDC"), NOW).unwrap();
        let operator = vault.create_operator(&admin, NOW).unwrap();
        Self {
            vault,
            admin,
            operator,
            oracles: oracles(),
        }
    }

    /// Requests and executes a deposit at `NOW`, returning the receipt id.
    pub fn deposit(&mut self, owner: &str, amount: u128) -> uuid::Uuid {
        let (request_id, receipt_id) = self.vault.request_deposit(owner, None, amount, 0, NOW).unwrap();
        self.vault
            .execute_deposit(&self.operator, request_id, u128::MAX, &self.oracles.oracle, NOW)
            .unwrap();
        receipt_id
    }

    pub fn usdc() -> AssetType {
        AssetType::new("USDC")
    }
}
