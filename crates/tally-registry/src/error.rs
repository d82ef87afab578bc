use tally_fabric::FabricError;
use tally_store::StoreError;
use tally_types::{AccessDenied, AccountId, ErrorKind, ReleaseId};

/// Errors produced by registry operations.
///
/// A failed call never leaves partial state behind; the same call can be
/// resubmitted once the cause is corrected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Access(#[from] AccessDenied),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("event journal error: {0}")]
    Fabric(#[from] FabricError),

    #[error("release {0} already exists")]
    ReleaseExists(ReleaseId),

    #[error("release {0} not found")]
    ReleaseNotFound(ReleaseId),

    /// The operation needs an unlocked release.
    #[error("release {0} is locked")]
    ReleaseLocked(ReleaseId),

    /// The operation needs a locked release.
    #[error("release {0} is already unlocked")]
    ReleaseUnlocked(ReleaseId),

    #[error("release {0} is being deleted")]
    ReleaseDeleting(ReleaseId),

    #[error("release {0} is in its initial sale")]
    InInitialSale(ReleaseId),

    #[error("release {0} is not in its initial sale")]
    NotInInitialSale(ReleaseId),

    #[error("release {release} still has {unassigned} unassigned shares")]
    NotFullyAssigned { release: ReleaseId, unassigned: u64 },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("batch is empty")]
    EmptyBatch,

    #[error("batch size must be non-zero")]
    InvalidBatchSize,

    #[error("cannot transfer to the same holder")]
    SelfTransfer,

    #[error("requested {requested} shares but only {unassigned} are unassigned")]
    ExceedsUnassigned { requested: u64, unassigned: u64 },

    #[error("{holder} has {available} available shares, requested {requested}")]
    ExceedsAvailable {
        holder: AccountId,
        requested: u64,
        available: u64,
    },

    #[error("{holder} has {locked} locked shares, requested {requested}")]
    ExceedsLocked {
        holder: AccountId,
        requested: u64,
        locked: u64,
    },

    #[error("{holder} holds {balance} shares, requested {requested}")]
    InsufficientBalance {
        holder: AccountId,
        requested: u64,
        balance: u64,
    },

    #[error("no ownership history for {0}")]
    NoOwnershipHistory(AccountId),

    #[error("conservation violated for release {release}: held {held} + unassigned {unassigned} + deleted {deleted} != total {total}")]
    ConservationViolated {
        release: ReleaseId,
        held: u128,
        unassigned: u64,
        deleted: u64,
        total: u64,
    },

    #[error("invalid registry configuration: {0}")]
    InvalidConfig(String),

    #[error("arithmetic overflow")]
    Overflow,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Access(_) => ErrorKind::Permission,
            Self::Store(e) => e.kind(),
            Self::Fabric(_) | Self::ConservationViolated { .. } | Self::Overflow => ErrorKind::Internal,
            Self::ZeroAmount
            | Self::EmptyBatch
            | Self::InvalidBatchSize
            | Self::ExceedsUnassigned { .. }
            | Self::ExceedsAvailable { .. }
            | Self::ExceedsLocked { .. }
            | Self::InsufficientBalance { .. } => ErrorKind::Quantity,
            Self::ReleaseExists(_)
            | Self::ReleaseNotFound(_)
            | Self::ReleaseLocked(_)
            | Self::ReleaseUnlocked(_)
            | Self::ReleaseDeleting(_)
            | Self::InInitialSale(_)
            | Self::NotInInitialSale(_)
            | Self::NotFullyAssigned { .. }
            | Self::InvalidConfig(_)
            | Self::SelfTransfer
            | Self::NoOwnershipHistory(_) => ErrorKind::Precondition,
        }
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
