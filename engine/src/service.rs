//! # VaultService: Transactional Facade
//!
//! The engine types are plain data with `&mut self` methods. This facade
//! makes them safe to drive from many threads and gives every call
//! all-or-nothing semantics:
//!
//! 1. take the write lock (single writer per vault),
//! 2. run the call against a clone of the current state,
//! 3. on `Ok`, persist the clone and swap it in; on `Err`, drop it.
//!
//! A failed call therefore leaves no trace beyond an error counter.
//! Readers take the read lock and always observe a committed state.
//!
//! Lock order is vault before oracle. The oracle is only ever written by
//! [`VaultService::transact_oracle`], which takes no vault lock.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DECIMALS;
use crate::error::{VaultError, VaultResult};
use crate::events::EventRecord;
use crate::math::div_d;
use crate::metrics::VaultMetrics;
use crate::oracle::{OracleError, PriceOracle, PriceUpdate, ProviderSet};
use crate::storage::{VaultDb, DEFAULT_ORACLE};
use crate::vault::{AssetType, Vault, VaultStatus};

/// Committed events kept for [`VaultService::recent_events`].
pub const EVENT_HISTORY_CAPACITY: usize = 1_024;

pub struct VaultService {
    vault: RwLock<Vault>,
    oracle: RwLock<PriceOracle>,
    providers: ProviderSet,
    db: Option<VaultDb>,
    metrics: VaultMetrics,
    recent_events: Mutex<VecDeque<EventRecord>>,
}

impl VaultService {
    /// Wraps a vault and an oracle. With a database, both are persisted
    /// immediately and after every committed call.
    pub fn new(vault: Vault, oracle: PriceOracle, providers: ProviderSet, db: Option<VaultDb>) -> VaultResult<Self> {
        if let Some(db) = &db {
            db.put_vault(&vault)?;
            db.put_oracle(DEFAULT_ORACLE, &oracle)?;
        }
        let service = Self {
            vault: RwLock::new(vault),
            oracle: RwLock::new(oracle),
            providers,
            db,
            metrics: VaultMetrics::new()?,
            recent_events: Mutex::new(VecDeque::new()),
        };
        service.refresh_gauges();
        Ok(service)
    }

    /// Restores a vault (and the default oracle, if one was saved) from
    /// `db`.
    pub fn open(db: VaultDb, vault_id: &Uuid, providers: ProviderSet) -> VaultResult<Self> {
        let vault = db.load_vault(vault_id)?;
        let oracle = db.get_oracle(DEFAULT_ORACLE)?.unwrap_or_default();
        debug!(vault = %vault_id, status = %vault.status(), "vault restored from storage");
        Self::new(vault, oracle, providers, Some(db))
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn metrics(&self) -> &VaultMetrics {
        &self.metrics
    }

    /// Runs `f` against the committed state.
    pub fn read<T>(&self, f: impl FnOnce(&Vault, &PriceOracle) -> T) -> T {
        let vault = self.vault.read();
        let oracle = self.oracle.read();
        f(&vault, &oracle)
    }

    pub fn snapshot(&self) -> Vault {
        self.vault.read().clone()
    }

    /// Runs a vault call atomically. See the module docs.
    pub fn transact<T>(&self, f: impl FnOnce(&mut Vault, &PriceOracle) -> VaultResult<T>) -> VaultResult<T> {
        let mut vault = self.vault.write();
        let oracle = self.oracle.read();
        let mut working = vault.clone();

        let value = match f(&mut working, &oracle) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.call_errors_total.with_label_values(&[e.kind()]).inc();
                warn!(vault = %vault.id(), error = %e, "vault call rejected");
                return Err(e);
            }
        };

        let events = working.take_events();
        if let Some(db) = &self.db {
            db.put_vault(&working)?;
        }
        *vault = working;
        drop(oracle);
        drop(vault);

        self.publish(events);
        Ok(value)
    }

    /// Runs an oracle call atomically.
    pub fn transact_oracle<T>(
        &self,
        f: impl FnOnce(&mut PriceOracle, &ProviderSet) -> Result<T, OracleError>,
    ) -> VaultResult<T> {
        let mut oracle = self.oracle.write();
        let mut working = oracle.clone();

        let value = match f(&mut working, &self.providers) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.price_rejections_total.with_label_values(&[e.kind()]).inc();
                return Err(VaultError::Oracle(e));
            }
        };

        let events = working.take_events();
        if let Some(db) = &self.db {
            db.put_oracle(DEFAULT_ORACLE, &working)?;
        }
        *oracle = working;
        drop(oracle);

        self.publish(events);
        Ok(value)
    }

    /// Pulls a new price for `asset_type` from its providers.
    pub fn update_price(&self, asset_type: &AssetType, now: u64) -> VaultResult<PriceUpdate> {
        self.transact_oracle(|oracle, providers| oracle.update_price(asset_type, providers, now))
    }

    /// Most recent committed events, oldest first.
    pub fn recent_events(&self) -> Vec<EventRecord> {
        self.recent_events.lock().iter().cloned().collect()
    }

    fn publish(&self, events: Vec<EventRecord>) {
        self.metrics.observe_events(&events);
        {
            let mut recent = self.recent_events.lock();
            for record in events {
                debug!(event = ?record.event, at = %record.at, "vault event");
                if recent.len() == EVENT_HISTORY_CAPACITY {
                    recent.pop_front();
                }
                recent.push_back(record);
            }
        }
        self.refresh_gauges();
    }

    fn refresh_gauges(&self) {
        let vault = self.vault.read();
        self.metrics
            .vault_busy
            .set(i64::from(vault.status() == VaultStatus::Busy));
        self.metrics
            .total_usd_value
            .set(whole_usd(vault.cached_total_usd_value()));
        self.metrics.epoch_loss_usd.set(whole_usd(vault.cur_epoch_loss()));
        let ratio = match vault.total_shares() {
            0 => Some(DECIMALS),
            shares => div_d(vault.cached_total_usd_value(), shares),
        };
        self.metrics
            .share_ratio
            .set(ratio.map_or(i64::MAX, |r| i64::try_from(r).unwrap_or(i64::MAX)));
    }
}

fn whole_usd(value: u128) -> i64 {
    i64::try_from(value / DECIMALS).unwrap_or(i64::MAX)
}
