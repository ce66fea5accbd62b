//! # Prometheus Metrics
//!
//! Counters and gauges describing vault activity, kept in a dedicated
//! [`prometheus::Registry`] under the `strata` namespace. The engine does
//! not serve them; hosts call [`VaultMetrics::encode`] from whatever
//! endpoint they expose.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::events::{EventRecord, VaultEvent};

/// Metric handles for one engine instance. Cheap to clone.
#[derive(Clone)]
pub struct VaultMetrics {
    registry: Registry,
    pub operations_started_total: IntCounter,
    pub operations_finalized_total: IntCounter,
    pub operations_force_cleared_total: IntCounter,
    pub deposits_executed_total: IntCounter,
    pub withdrawals_executed_total: IntCounter,
    /// Accepted prices, labelled by severity.
    pub price_updates_total: IntCounterVec,
    /// Rejected price updates, labelled by reason.
    pub price_rejections_total: IntCounterVec,
    pub oracle_degraded_total: IntCounter,
    /// Rejected engine calls, labelled by error kind.
    pub call_errors_total: IntCounterVec,
    /// 1 while an operation is in flight.
    pub vault_busy: IntGauge,
    /// Cached total value, whole USD.
    pub total_usd_value: IntGauge,
    /// Accumulated loss in the current epoch, whole USD.
    pub epoch_loss_usd: IntGauge,
    /// Share ratio over cached values, 9 decimals.
    pub share_ratio: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let metric = IntCounter::new(name, help)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn counter_vec(registry: &Registry, name: &str, help: &str, label: &str) -> Result<IntCounterVec, prometheus::Error> {
    let metric = IntCounterVec::new(Opts::new(name, help), &[label])?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let metric = IntGauge::new(name, help)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl VaultMetrics {
    /// Creates and registers every metric.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("strata".into()), None)?;
        Ok(Self {
            operations_started_total: counter(&registry, "operations_started_total", "Operations started")?,
            operations_finalized_total: counter(&registry, "operations_finalized_total", "Operations finalized")?,
            operations_force_cleared_total: counter(
                &registry,
                "operations_force_cleared_total",
                "Operations closed by admin recovery",
            )?,
            deposits_executed_total: counter(&registry, "deposits_executed_total", "Deposit requests executed")?,
            withdrawals_executed_total: counter(
                &registry,
                "withdrawals_executed_total",
                "Withdraw requests executed",
            )?,
            price_updates_total: counter_vec(&registry, "price_updates_total", "Accepted price updates", "severity")?,
            price_rejections_total: counter_vec(
                &registry,
                "price_rejections_total",
                "Rejected price updates",
                "reason",
            )?,
            oracle_degraded_total: counter(
                &registry,
                "oracle_degraded_total",
                "Prices accepted from a single provider",
            )?,
            call_errors_total: counter_vec(&registry, "call_errors_total", "Rejected engine calls", "kind")?,
            vault_busy: gauge(&registry, "vault_busy", "1 while an operation is in flight")?,
            total_usd_value: gauge(&registry, "total_usd_value", "Cached total vault value in whole USD")?,
            epoch_loss_usd: gauge(&registry, "epoch_loss_usd", "Loss booked in the current epoch in whole USD")?,
            share_ratio: gauge(&registry, "share_ratio", "USD value per share over cached values, 9 decimals")?,
            registry,
        })
    }

    /// Bumps counters for a batch of committed events.
    pub fn observe_events(&self, records: &[EventRecord]) {
        for record in records {
            match &record.event {
                VaultEvent::OperationStarted { .. } => self.operations_started_total.inc(),
                VaultEvent::OperationFinalized { .. } => self.operations_finalized_total.inc(),
                VaultEvent::OperationForceCleared { .. } => self.operations_force_cleared_total.inc(),
                VaultEvent::DepositExecuted { .. } => self.deposits_executed_total.inc(),
                VaultEvent::WithdrawExecuted { .. } => self.withdrawals_executed_total.inc(),
                VaultEvent::OracleDegraded { .. } => self.oracle_degraded_total.inc(),
                VaultEvent::PriceUpdated { severity, .. } => self
                    .price_updates_total
                    .with_label_values(&[&format!("{severity:?}").to_lowercase()])
                    .inc(),
                _ => {}
            }
        }
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::oracle::Severity;
    use crate::vault::AssetType;

    #[test]
    fn test_events_drive_counters() {
        let metrics = VaultMetrics::new().unwrap();
        let mut log = EventLog::default();
        log.push(
            0,
            VaultEvent::OperationStarted {
                operator: uuid::Uuid::nil(),
                borrowed: vec![],
                principal: 0,
                total_usd_value_before: 0,
            },
        );
        log.push(
            0,
            VaultEvent::PriceUpdated {
                asset_type: AssetType::new("SUI"),
                price: 1,
                severity: Severity::Warning,
            },
        );
        metrics.observe_events(&log.drain());

        assert_eq!(metrics.operations_started_total.get(), 1);
        assert_eq!(metrics.price_updates_total.with_label_values(&["warning"]).get(), 1);
    }

    #[test]
    fn test_encode_uses_namespace() {
        let metrics = VaultMetrics::new().unwrap();
        metrics.vault_busy.set(1);
        let text = metrics.encode().unwrap();
        assert!(text.contains("strata_vault_busy 1"));
    }
}
