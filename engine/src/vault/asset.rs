//! Asset type identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of something the vault can value: the principal coin,
/// a plain coin balance, or a position in an external protocol.
///
/// By convention the identifier is `"<protocol>:<name>"` for positions
/// (e.g. `"lending:usdc-obligation-0"`) and a bare symbol for coins, but
/// the engine never parses it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetType(String);

impl AssetType {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
