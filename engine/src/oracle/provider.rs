//! Oracle provider contract and registry.
//!
//! A provider is anything that can answer "what is the price behind this
//! source id, and when was it observed". The engine never trusts the
//! answer: freshness, non-zero-ness and bounds are all checked by the
//! validator.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::OracleError;

/// A single observation returned by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReading {
    /// USD per whole coin, 18 decimals.
    pub price: u128,
    /// Unix milliseconds when the provider observed the price.
    pub timestamp_ms: u64,
}

impl ProviderReading {
    /// Age of the reading at `now`. Readings from the future count as age 0.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp_ms)
    }
}

/// A price source. Calls are synchronous and must return promptly; a
/// provider that cannot answer returns an error instead of blocking.
pub trait OracleProvider: Send + Sync {
    /// Registry name referenced by [`super::ProviderSource::provider`].
    fn name(&self) -> &str;

    /// Reads the latest observation for `source_id`.
    fn read(&self, source_id: &str) -> Result<ProviderReading, OracleError>;
}

// ---------------------------------------------------------------------------
// ProviderSet
// ---------------------------------------------------------------------------

/// Runtime registry of providers, keyed by name.
///
/// Providers are not persisted; feeds reference them by name and are
/// re-bound to live providers on every update.
#[derive(Default, Clone)]
pub struct ProviderSet {
    providers: Arc<DashMap<String, Arc<dyn OracleProvider>>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a provider under its own name.
    pub fn register(&self, provider: Arc<dyn OracleProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.providers.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn OracleProvider>, OracleError> {
        self.providers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| OracleError::ProviderNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("ProviderSet").field("providers", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// ManualProvider
// ---------------------------------------------------------------------------

/// Push-based provider: an off-chain relayer (or a test) writes readings in,
/// the validator reads them out. Unknown source ids fail the read.
#[derive(Debug)]
pub struct ManualProvider {
    name: String,
    book: DashMap<String, ProviderReading>,
}

impl ManualProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            book: DashMap::new(),
        }
    }

    /// Records a reading, replacing any previous one for `source_id`.
    pub fn push(&self, source_id: &str, price: u128, timestamp_ms: u64) {
        self.book.insert(
            source_id.to_string(),
            ProviderReading {
                price,
                timestamp_ms,
            },
        );
    }

    /// Drops the reading for `source_id`; subsequent reads fail.
    pub fn clear(&self, source_id: &str) {
        self.book.remove(source_id);
    }
}

impl OracleProvider for ManualProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, source_id: &str) -> Result<ProviderReading, OracleError> {
        self.book
            .get(source_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| OracleError::ProviderUnavailable {
                provider: self.name.clone(),
                reason: format!("no reading for source {source_id}"),
            })
    }
}
