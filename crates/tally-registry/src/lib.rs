//! Release registry for Tally.
//!
//! Owns the lifecycle of every tokenized release and the bucketed ownership
//! history behind it:
//!
//! - [`ReleaseRegistry`] -- create, assign, unlock, initial sale, batched
//!   deletion, and the exchange-facing transfer operations
//! - the ownership ledger, which turns every balance change into a
//!   cumulative checkpoint in the current bucket
//! - [`PeriodPage`] queries: paginated, gap-filled, time-weighted holdings
//!   over a window of buckets
//! - [`HoldingsView`], the read interface the distribution engine consumes
//!
//! # Invariants
//!
//! 1. Held, unassigned and deleted shares always add up to the total supply.
//! 2. `locked_amount <= amount` for every balance.
//! 3. A holder's last checkpoint equals its live balance.
//! 4. A failed call changes nothing.

pub mod config;
pub mod error;
mod ownership;
pub mod period;
pub mod registry;
pub mod release;
pub mod view;

pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult};
pub use period::{period_shares, HolderShares, PeriodPage, PeriodWindow};
pub use registry::ReleaseRegistry;
pub use release::{BatchProgress, Release, TokenBalance};
pub use view::HoldingsView;
