use thiserror::Error;

use crate::access::{GrantScope, Role};
use crate::identity::AccountId;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("bucket duration must be non-zero")]
    ZeroBucketDuration,

    #[error("empty identifier")]
    EmptyIdentifier,
}

/// The caller does not hold a role required by the operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{caller} lacks role {role} for {scope}")]
pub struct AccessDenied {
    pub caller: AccountId,
    pub role: Role,
    pub scope: GrantScope,
}

/// Coarse failure taxonomy shared by every Tally error type.
///
/// Callers branch on the kind rather than on individual variants when all
/// they need to know is whether a retry with different inputs can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing entity, wrong lifecycle phase, or already in the target state.
    Precondition,
    /// Zero amount, exceeded balance, or an over-cap batch.
    Quantity,
    /// Missing role grant.
    Permission,
    /// Asset not allow-listed or listed twice.
    Asset,
    /// Storage, lock, or arithmetic failure inside the ledger itself.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Precondition => "precondition",
            Self::Quantity => "quantity",
            Self::Permission => "permission",
            Self::Asset => "asset",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}
