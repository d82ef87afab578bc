//! Foundation types for Tally.
//!
//! This crate provides the identity, temporal, and access-control types used
//! throughout the Tally ownership ledger. Every other Tally crate depends on
//! `tally-types`.
//!
//! # Key Types
//!
//! - [`AccountId`]: Holder identity derived from a label or public key (BLAKE3)
//! - [`ReleaseId`]: Caller-chosen identifier of a tokenized release
//! - [`DistributionId`]: UUID v7 identifier of a royalty distribution
//! - [`AssetId`] / [`AssetAmount`]: Payout currencies and amounts
//! - [`LedgerTime`] / [`Bucket`] / [`BucketDuration`]: Coarse ledger clock and its buckets
//! - [`Clock`]: Injected monotonic time source
//! - [`AuthContext`] / [`Grant`] / [`Role`]: Injected permission checks

pub mod access;
pub mod error;
pub mod identity;
pub mod ids;
pub mod temporal;

pub use access::{AuthContext, Grant, GrantScope, Role};
pub use error::{AccessDenied, ErrorKind, TypeError};
pub use identity::{AccountId, IdentityMaterial};
pub use ids::{AssetAmount, AssetId, DistributionId, ReleaseId};
pub use temporal::{Bucket, BucketDuration, Clock, LedgerTime, ManualClock, SystemClock};
