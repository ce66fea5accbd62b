//! # VaultDb: Persistent Snapshots
//!
//! Vaults and the price oracle are persisted as whole-object snapshots on
//! top of sled. Every successful engine call commits a fresh snapshot, so
//! the on-disk state is always the state after the last committed call.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                 | Value               |
//! |------------|---------------------|---------------------|
//! | `vaults`   | vault id (16 bytes) | `bincode(Vault)`    |
//! | `oracles`  | name (UTF-8)        | `bincode(PriceOracle)` |
//! | `metadata` | key (UTF-8)         | value (bytes)       |
//!
//! Snapshots carry their own schema version. Loading never migrates:
//! a lagging snapshot loads fine and then refuses every access until the
//! admin upgrades it.

use sled::{Db, Tree};
use std::path::Path;
use uuid::Uuid;

use crate::config::VERSION;
use crate::oracle::PriceOracle;
use crate::vault::Vault;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Well-known key in the `metadata` tree recording the engine version that
/// last wrote the database.
const META_SCHEMA_VERSION: &[u8] = b"schema_version";

/// Oracle snapshot key used when a deployment runs a single oracle.
pub const DEFAULT_ORACLE: &str = "default";

// ---------------------------------------------------------------------------
// VaultDb
// ---------------------------------------------------------------------------

/// sled-backed store for vault and oracle snapshots. Cheap to clone; all
/// clones share the same underlying database.
#[derive(Debug, Clone)]
pub struct VaultDb {
    db: Db,
    vaults: Tree,
    oracles: Tree,
    metadata: Tree,
}

impl VaultDb {
    /// Opens or creates a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database, removed on drop. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let vaults = db.open_tree("vaults")?;
        let oracles = db.open_tree("oracles")?;
        let metadata = db.open_tree("metadata")?;
        let store = Self {
            db,
            vaults,
            oracles,
            metadata,
        };
        store.metadata.insert(META_SCHEMA_VERSION, &VERSION.to_be_bytes())?;
        Ok(store)
    }

    pub fn schema_version(&self) -> DbResult<Option<u64>> {
        Ok(self.metadata.get(META_SCHEMA_VERSION)?.and_then(|bytes| {
            let raw: [u8; 8] = bytes.as_ref().try_into().ok()?;
            Some(u64::from_be_bytes(raw))
        }))
    }

    // -- Vaults -------------------------------------------------------------

    pub fn put_vault(&self, vault: &Vault) -> DbResult<()> {
        let bytes = bincode::serialize(vault).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.vaults.insert(vault.id().as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get_vault(&self, vault_id: &Uuid) -> DbResult<Option<Vault>> {
        match self.vaults.get(vault_id.as_bytes())? {
            Some(bytes) => {
                let vault = bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(vault))
            }
            None => Ok(None),
        }
    }

    pub fn load_vault(&self, vault_id: &Uuid) -> DbResult<Vault> {
        self.get_vault(vault_id)?
            .ok_or_else(|| DbError::NotFound(format!("vault {vault_id}")))
    }

    pub fn vault_ids(&self) -> DbResult<Vec<Uuid>> {
        self.vaults
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                Uuid::from_slice(&key).map_err(|e| DbError::Serialization(e.to_string()))
            })
            .collect()
    }

    // -- Oracles ------------------------------------------------------------

    pub fn put_oracle(&self, name: &str, oracle: &PriceOracle) -> DbResult<()> {
        let bytes = bincode::serialize(oracle).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.oracles.insert(name.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get_oracle(&self, name: &str) -> DbResult<Option<PriceOracle>> {
        match self.oracles.get(name.as_bytes())? {
            Some(bytes) => {
                let oracle = bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(oracle))
            }
            None => Ok(None),
        }
    }
}
