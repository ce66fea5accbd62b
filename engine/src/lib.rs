// Copyright (c) 2026 Strata Contributors. MIT License.
// See LICENSE for details.

//! # Strata Engine: Vault Operation Lifecycle & Valuation
//!
//! Strata pools depositor principal into one vault and lets whitelisted
//! operators lend it out to external strategies: lending markets, liquidity
//! pools, plain coin holdings. The engine is the accounting core that makes
//! that safe. It knows what the vault owns, what each piece is worth in
//! USD, and whether an operation lost more than the vault tolerates.
//!
//! ## Architecture
//!
//! - **config** - Fixed-point bases, fee ceilings, lock times, [`VaultConfig`].
//! - **math** - 1e9/1e18 fixed-point helpers. All checked, all `u128`.
//! - **oracle** - Dual-source price validation. Two providers or no price.
//! - **vault** - The vault itself: registry, shares, receipts, capabilities.
//! - **adaptor** - The [`Adaptor`] seam external strategies plug into.
//! - **valuation** - Per-asset USD values and the total-value/share-ratio reads.
//! - **operation** - Borrow, return, revalue, finalize. The loss gate lives here.
//! - **settlement** - Deposit and withdraw requests executed at the share ratio.
//! - **storage** - sled-backed snapshots of vaults and oracles.
//! - **service** - Thread-safe, all-or-nothing facade over the above.
//! - **events**, **metrics**, **logging** - What happened, how often, and where it was written.
//!
//! ## Ground Rules
//!
//! 1. Every mutator validates before it writes. An `Err` means nothing changed.
//! 2. Time is an argument (`now`, unix ms), never a syscall inside the engine.
//! 3. Values are integers. USD, shares and ratios carry 9 decimals; raw oracle
//!    prices carry 18.
//! 4. A vault is Busy exactly while an operation record exists.

pub mod adaptor;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod math;
pub mod metrics;
pub mod operation;
pub mod oracle;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod valuation;
pub mod vault;

pub use adaptor::{Adaptor, AdaptorError, Holding, HoldingSide, Position};
pub use config::VaultConfig;
pub use error::{VaultError, VaultResult};
pub use events::{EventRecord, VaultEvent};
pub use operation::{Borrowed, OperationRecord, OperationSummary, OperationTicket, RecoveryReport, ValueUpdateTicket};
pub use oracle::{OracleError, PriceOracle, ProviderSet, Severity};
pub use service::VaultService;
pub use settlement::{DepositExecution, WithdrawExecution};
pub use storage::VaultDb;
pub use vault::{AdminCap, AssetType, OperatorCap, Vault, VaultStatus};
