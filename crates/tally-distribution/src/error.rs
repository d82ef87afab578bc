use tally_fabric::FabricError;
use tally_registry::RegistryError;
use tally_store::StoreError;
use tally_types::{AccessDenied, AccountId, AssetId, DistributionId, ErrorKind, LedgerTime, ReleaseId};

/// Errors produced by the distribution engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DistributionError {
    #[error(transparent)]
    Access(#[from] AccessDenied),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("event journal error: {0}")]
    Fabric(#[from] FabricError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("distribution {0} not found")]
    NotFound(DistributionId),

    #[error("release {0} not found")]
    ReleaseNotFound(ReleaseId),

    #[error("release {0} is not fully assigned")]
    ReleaseNotFullyAssigned(ReleaseId),

    #[error("release {0} is being deleted")]
    ReleaseDeleting(ReleaseId),

    #[error("distribution window ends before it starts ({start} > {end})")]
    InvalidWindow { start: LedgerTime, end: LedgerTime },

    #[error("claim window closes at {claimable_until}, which is not after {now}")]
    ClaimWindowInPast { claimable_until: LedgerTime, now: LedgerTime },

    #[error("at least one asset amount is required")]
    NoAssets,

    #[error("asset {0} is not allow-listed")]
    AssetNotAllowed(AssetId),

    #[error("asset {0} listed more than once")]
    DuplicateAsset(AssetId),

    #[error("amount for asset {0} must be non-zero")]
    ZeroAmount(AssetId),

    #[error("distribution {0} is cancelled")]
    Cancelled(DistributionId),

    #[error("shares for distribution {0} are already assigned")]
    SharesAlreadyAssigned(DistributionId),

    #[error("shares for distribution {0} are not assigned yet")]
    SharesNotAssigned(DistributionId),

    #[error("claims for distribution {0} are already assigned")]
    ClaimsAlreadyAssigned(DistributionId),

    #[error("claims for distribution {0} are not assigned yet")]
    ClaimsNotAssigned(DistributionId),

    #[error("distribution {0} is already primed")]
    AlreadyPrimed(DistributionId),

    #[error("distribution {0} is not primed")]
    NotPrimed(DistributionId),

    #[error("distribution {0} is already active")]
    AlreadyActive(DistributionId),

    #[error("distribution {0} is not active")]
    NotActive(DistributionId),

    #[error("claim window of distribution {id} closed at {claimable_until}")]
    ClaimWindowClosed { id: DistributionId, claimable_until: LedgerTime },

    #[error("{holder} has no claim in distribution {id}")]
    NoClaim { id: DistributionId, holder: AccountId },

    #[error("{holder} already claimed from distribution {id}")]
    AlreadyClaimed { id: DistributionId, holder: AccountId },

    /// Active distributions can only be cancelled once their period is over.
    #[error("distribution {id} is active until {end}")]
    StillActive { id: DistributionId, end: LedgerTime },

    #[error("insufficient {asset} in {account}: needed {needed}, available {available}")]
    InsufficientFunds {
        asset: AssetId,
        account: AccountId,
        needed: u128,
        available: u128,
    },

    #[error("batch size must be non-zero")]
    InvalidBatchSize,

    #[error("invalid distribution configuration: {0}")]
    InvalidConfig(String),

    #[error("arithmetic overflow")]
    Overflow,
}

impl DistributionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Access(_) => ErrorKind::Permission,
            Self::Store(e) => e.kind(),
            Self::Registry(e) => e.kind(),
            Self::Fabric(_) | Self::Overflow => ErrorKind::Internal,
            Self::AssetNotAllowed(_) | Self::DuplicateAsset(_) | Self::NoAssets => ErrorKind::Asset,
            Self::ZeroAmount(_) | Self::InsufficientFunds { .. } | Self::InvalidBatchSize => ErrorKind::Quantity,
            Self::NotFound(_)
            | Self::ReleaseNotFound(_)
            | Self::ReleaseNotFullyAssigned(_)
            | Self::ReleaseDeleting(_)
            | Self::InvalidWindow { .. }
            | Self::ClaimWindowInPast { .. }
            | Self::Cancelled(_)
            | Self::SharesAlreadyAssigned(_)
            | Self::SharesNotAssigned(_)
            | Self::ClaimsAlreadyAssigned(_)
            | Self::ClaimsNotAssigned(_)
            | Self::AlreadyPrimed(_)
            | Self::NotPrimed(_)
            | Self::AlreadyActive(_)
            | Self::NotActive(_)
            | Self::ClaimWindowClosed { .. }
            | Self::NoClaim { .. }
            | Self::AlreadyClaimed { .. }
            | Self::StillActive { .. }
            | Self::InvalidConfig(_) => ErrorKind::Precondition,
        }
    }
}

/// Result alias for distribution operations.
pub type DistributionResult<T> = Result<T, DistributionError>;
