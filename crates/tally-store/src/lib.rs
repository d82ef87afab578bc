//! Storage backends for the Tally ownership ledger.
//!
//! Three leaf stores live here, each behind a trait with an in-memory
//! backend for tests and embedding:
//!
//! - [`OwnershipStore`] -- per-holder history of cumulative `(amount, bucket)`
//!   checkpoints for one release ([`InMemoryOwnershipStore`])
//! - [`ClaimStore`] -- append-only per-holder claim records for one
//!   distribution ([`InMemoryClaimStore`])
//! - [`Custody`] -- asset balances with mint, burn and move primitives
//!   ([`InMemoryVault`])
//!
//! # Design Rules
//!
//! 1. History entries are non-decreasing in bucket, at most one per bucket.
//! 2. Only the last history entry of a holder may be amended.
//! 3. Claim records are immutable once written, apart from the claimed flag.
//! 4. A custody move either applies in full or not at all.
//! 5. Lock poisoning is reported as [`StoreError::LockPoisoned`], never a panic.

pub mod claims;
pub mod custody;
pub mod error;
pub mod ownership;

pub use claims::{ClaimRecord, ClaimStore, InMemoryClaimStore};
pub use custody::{Custody, InMemoryVault};
pub use error::{StoreError, StoreResult};
pub use ownership::{InMemoryOwnershipStore, OwnershipEntry, OwnershipStore};
