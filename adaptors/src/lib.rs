//! # Strata Adaptors
//!
//! Reference [`Adaptor`](strata_engine::Adaptor) implementations for the
//! position kinds a Strata vault typically holds:
//!
//! - **Coin** - a plain coin balance parked in custody.
//! - **Lending** - a lending-market obligation: supplied collateral minus
//!   borrowed debt, with an optional health-factor floor.
//! - **Liquidity** - a two-sided liquidity position, valued at oracle
//!   prices and refused when the pool has drifted away from them.
//!
//! Adaptors only ever produce a USD value. They never mutate the vault and
//! never see a price that has not passed the engine's dual-source oracle.
//!
//! ## Design Principles
//!
//! 1. Value with the normalized oracle accessor only. No adaptor reads a raw
//!    provider price.
//! 2. Refuse rather than guess: a malformed or unhealthy position is an
//!    error, and the vault keeps the previous value until someone fixes it.
//! 3. Checked arithmetic everywhere; overflow is an error, not a wrap.

pub mod coin;
pub mod lending;
pub mod liquidity;

pub use coin::CoinAdaptor;
pub use lending::LendingAdaptor;
pub use liquidity::LiquidityAdaptor;
