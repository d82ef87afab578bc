use tally_types::{AccountId, AssetId, Bucket, ErrorKind};

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// The holder has no ownership history to amend.
    #[error("no ownership history for {0}")]
    NoHistory(AccountId),

    /// An appended entry would break bucket ordering.
    #[error("history entry for {holder} out of order: last {last:?}, attempted {attempted:?}")]
    OutOfOrder {
        holder: AccountId,
        last: Option<Bucket>,
        attempted: Option<Bucket>,
    },

    /// A claim for this holder was already written.
    #[error("claim already recorded for {0}")]
    DuplicateClaim(AccountId),

    /// No claim exists for this holder.
    #[error("no claim recorded for {0}")]
    ClaimNotFound(AccountId),

    /// The claim was already paid out.
    #[error("claim for {0} already paid")]
    AlreadyClaimed(AccountId),

    /// The source account cannot cover a move or burn.
    #[error("insufficient {asset} in {account}: needed {needed}, available {available}")]
    InsufficientFunds {
        asset: AssetId,
        account: AccountId,
        needed: u128,
        available: u128,
    },

    /// A balance would exceed `u128::MAX`.
    #[error("balance overflow for {0}")]
    Overflow(AssetId),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LockPoisoned | Self::OutOfOrder { .. } | Self::Overflow(_) => ErrorKind::Internal,
            Self::NoHistory(_)
            | Self::DuplicateClaim(_)
            | Self::ClaimNotFound(_)
            | Self::AlreadyClaimed(_) => ErrorKind::Precondition,
            Self::InsufficientFunds { .. } => ErrorKind::Quantity,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
