//! Royalty distribution engine for Tally.
//!
//! A distribution pays a fixed set of asset amounts to whoever held a
//! release's shares during a period, pro rata to their time-weighted
//! holdings. It moves through resumable phases:
//!
//! 1. **Snapshot** -- [`DistributionEngine::init_shares_batched`] pages
//!    through period-shares from a [`HoldingsView`](tally_registry::HoldingsView)
//! 2. **Claims** -- [`DistributionEngine::init_claims_batched`] writes one
//!    floored claim record per holder
//! 3. **Prime** -- the calculated payout is pulled into engine custody
//! 4. **Active** -- holders claim until the claim window closes
//! 5. **Cancel** -- unpaid funds, rounding dust included, are refunded
//!
//! Every transition is appended to the shared event journal.

pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;

pub use config::DistributionConfig;
pub use distribution::{
    pro_rata, BatchStep, ClaimReceipt, Distribution, DistributionPhase, DistributionShares,
};
pub use engine::DistributionEngine;
pub use error::{DistributionError, DistributionResult};
