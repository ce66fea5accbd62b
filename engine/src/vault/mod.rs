//! # Vault Module: Ledger, Custody & Request Buffer
//!
//! The vault is the ledger the rest of the engine writes to. It owns the
//! asset registry with its cached USD values, the positions in custody, the
//! share supply, the loss-epoch counters and the queue of user requests.
//!
//! ## Architecture
//!
//! ```text
//! asset.rs          - AssetType identifiers
//! capability.rs     - AdminCap / OperatorCap authority tokens
//! receipt.rs        - per-depositor share ledger entries
//! request_buffer.rs - queued deposit and withdraw requests
//! state.rs          - Vault struct, status machine, guards, admin surface
//! ```
//!
//! Behaviour that spans several of these lives next door:
//! [`crate::operation`] (three-phase operations), [`crate::valuation`]
//! (value updates, total value, share ratio) and [`crate::settlement`]
//! (request execution).
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u128` fixed point.** USD values and shares carry
//!    9 decimals; coin amounts are in smallest units.
//!
//! 2. **Validate, then write.** Every mutator checks all of its
//!    preconditions before touching state, so an `Err` leaves the vault
//!    exactly as it was.
//!
//! 3. **Serializable state.** Everything here derives `Serialize` and
//!    `Deserialize` so the vault can be snapshotted to sled by
//!    [`crate::storage`].

pub mod asset;
pub mod capability;
pub mod receipt;
pub mod request_buffer;
pub mod state;

pub use asset::AssetType;
pub use capability::{AdminCap, OperatorCap};
pub use receipt::Receipt;
pub use request_buffer::{DepositRequest, RequestBuffer, RequestStatus, WithdrawRequest};
pub use state::{Vault, VaultStatus};
