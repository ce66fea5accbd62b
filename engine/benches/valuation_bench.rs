// Valuation and oracle benchmarks for the Strata engine.
//
// Covers the total-value read over growing asset registries, a full
// start/end/finalize operation cycle, dual-source price updates and the
// pure divergence classifier.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use strata_engine::adaptor::{Adaptor, AdaptorError, Position};
use strata_engine::config::{VaultConfig, DECIMALS, ORACLE_DECIMALS};
use strata_engine::oracle::strategy::classify_divergence;
use strata_engine::oracle::{FeedParams, ManualProvider, PriceOracle, ProviderSet, ProviderSource};
use strata_engine::{AssetType, OperatorCap, Vault};

const NOW: u64 = 1_700_000_000_000;

struct Flat;

impl Adaptor for Flat {
    fn protocol(&self) -> &str {
        "flat"
    }

    fn valuation(&self, _position: &Position, _oracle: &PriceOracle, _now: u64) -> Result<u128, AdaptorError> {
        Ok(DECIMALS)
    }
}

/// Vault with `n` positions, each worth $1, all fresh at `NOW`.
fn vault_with_positions(n: usize) -> (Vault, OperatorCap, Vec<AssetType>) {
    let (mut vault, admin) = Vault::new(VaultConfig::default(), AssetType::new("USDC"), NOW).unwrap();
    let operator = vault.create_operator(&admin, NOW).unwrap();
    let oracle = PriceOracle::default();
    let mut assets = Vec::with_capacity(n);
    for i in 0..n {
        let asset = AssetType::new(format!("flat:{i}"));
        vault
            .add_position(&admin, Position::new(asset.clone(), "flat"), &Flat, &oracle, NOW)
            .unwrap();
        vault.update_position_value(&asset, &Flat, &oracle, NOW).unwrap();
        assets.push(asset);
    }
    (vault, operator, assets)
}

fn bench_total_usd_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("valuation/total_usd_value");
    for n in [1usize, 10, 50, 200] {
        let (vault, _, _) = vault_with_positions(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &vault, |b, vault| {
            b.iter(|| vault.total_usd_value(NOW).unwrap());
        });
    }
    group.finish();
}

fn bench_operation_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("operation/full_cycle");
    for n in [1usize, 10, 50] {
        let (vault, operator, assets) = vault_with_positions(n);
        let oracle = PriceOracle::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter_with_setup(
                || vault.clone(),
                |mut vault| {
                    let borrowed = vault.start_operation(&operator, &assets, 0, NOW).unwrap();
                    let ticket = vault
                        .end_operation(&operator, borrowed.ticket, borrowed.positions, 0, NOW)
                        .unwrap();
                    for asset in &assets {
                        vault.update_position_value(asset, &Flat, &oracle, NOW).unwrap();
                    }
                    vault.finalize_operation(&operator, ticket, NOW).unwrap()
                },
            );
        });
    }
    group.finish();
}

fn bench_price_update(c: &mut Criterion) {
    let pyth = Arc::new(ManualProvider::new("pyth"));
    let supra = Arc::new(ManualProvider::new("supra"));
    pyth.push("SUI/USD", 2 * ORACLE_DECIMALS, NOW);
    supra.push("sui_usd", 2 * ORACLE_DECIMALS + ORACLE_DECIMALS / 200, NOW);
    let providers = ProviderSet::new();
    providers.register(pyth);
    providers.register(supra);

    let params = FeedParams {
        primary: ProviderSource::new("pyth", "SUI/USD", 60_000),
        secondary: ProviderSource::new("supra", "sui_usd", 60_000),
        coin_decimals: 9,
        threshold1_bps: 100,
        threshold2_bps: 300,
        max_duration_within_thresholds_ms: 60_000,
        min_price: 0,
        max_price: 0,
        history_ttl_ms: 0,
        max_allowed_span_bps: 0,
    };
    let sui = AssetType::new("SUI");
    let mut oracle = PriceOracle::new(60_000);
    oracle.add_feed(sui.clone(), params, &providers, NOW).unwrap();

    c.bench_function("oracle/update_price_dual", |b| {
        b.iter(|| {
            let update = oracle.update_price(&sui, &providers, NOW).unwrap();
            oracle.take_events();
            update
        });
    });
}

fn bench_classify_divergence(c: &mut Criterion) {
    c.bench_function("oracle/classify_divergence", |b| {
        b.iter(|| classify_divergence(100 * ORACLE_DECIMALS, 119 * ORACLE_DECIMALS, 1_000, 2_000));
    });
}

criterion_group!(
    benches,
    bench_total_usd_value,
    bench_operation_cycle,
    bench_price_update,
    bench_classify_divergence,
);
criterion_main!(benches);
