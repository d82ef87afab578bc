//! High-level SDK for Tally.
//!
//! [`Tally`] wires a release registry and a distribution engine to one
//! clock, custody vault and event journal, and adds drive helpers that run
//! the batched phases to completion with configured batch sizes. This is
//! the main entry point for applications embedding Tally.

pub mod config;
pub mod error;
pub mod tally;

pub use config::{BatchConfig, TallyConfig};
pub use error::{SdkError, SdkResult};
pub use tally::{DriveReport, Tally};

// Re-export key types
pub use tally_distribution::{
    BatchStep, ClaimReceipt, Distribution, DistributionConfig, DistributionEngine, DistributionError,
    DistributionPhase,
};
pub use tally_fabric::{EventFilter, EventKind, EventPayload, EventSubject, LedgerEvent};
pub use tally_registry::{
    BatchProgress, HolderShares, PeriodPage, RegistryConfig, RegistryError, Release, ReleaseRegistry, TokenBalance,
};
pub use tally_store::{ClaimRecord, Custody, InMemoryVault, OwnershipEntry};
pub use tally_types::{
    AccountId, AssetAmount, AssetId, AuthContext, BucketDuration, Clock, DistributionId, ErrorKind, Grant,
    GrantScope, LedgerTime, ManualClock, ReleaseId, Role, SystemClock,
};
