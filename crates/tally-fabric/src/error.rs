/// Errors produced by the event fabric.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FabricError {
    /// The journal or router lock was poisoned.
    #[error("event journal lock poisoned")]
    LockPoisoned,

    /// A stored event's integrity hash does not match its content.
    #[error("integrity check failed for event seq {seq}")]
    IntegrityViolation { seq: u64 },

    /// Journal sequence numbers are not contiguous.
    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },
}

/// Convenience alias used throughout the fabric crate.
pub type Result<T> = std::result::Result<T, FabricError>;
