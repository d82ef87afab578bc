use serde::{Deserialize, Serialize};

use tally_types::{AccountId, AssetAmount, DistributionId, LedgerTime, ReleaseId};

/// Unique identifier for a ledger event (its integrity hash).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub hash: [u8; 32],
}

impl EventId {
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    /// Short hex representation (first 8 hex chars).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.hash[..4])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt:{}", self.short_hex())
    }
}

/// The entity an event is about.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSubject {
    Release(ReleaseId),
    Distribution(DistributionId),
}

impl std::fmt::Display for EventSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Release(id) => write!(f, "release:{id}"),
            Self::Distribution(id) => write!(f, "distribution:{}", id.short_id()),
        }
    }
}

/// Classification of ledger events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ReleaseCreated,
    SharesAssigned,
    ReleaseUnlocked,
    InitialSaleStarted,
    InitialSaleEnded,
    InitialSaleCancelled,
    HoldersRemoved,
    ReleaseDeleted,
    Deposited,
    Withdrawn,
    Transferred,
    TokensLocked,
    TokensUnlocked,
    DistributionCreated,
    DistributionSharesAssigned,
    DistributionClaimsAssigned,
    DistributionPrimed,
    DistributionActivated,
    Claimed,
    DistributionCancelled,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Debug output of a fieldless enum is exactly the variant name.
        write!(f, "{self:?}")
    }
}

/// Payload data carried by a ledger event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Event kind is self-describing.
    Empty,
    /// Aggregate release balances after the transition.
    Release {
        total_shares: u64,
        unassigned_shares: u64,
        deleted_shares: u64,
    },
    /// Shares credited to a holder by the release manager.
    Assignment { holder: AccountId, amount: u64 },
    /// Units moved between accounts. `None` on either side is registry custody.
    Transfer {
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: u64,
    },
    /// A reservation change; `locked_total` is the holder's locked amount after it.
    Reservation {
        holder: AccountId,
        amount: u64,
        locked_total: u64,
    },
    /// Progress of a resumable batch.
    Batch {
        processed: u64,
        remaining: u64,
        done: bool,
    },
    /// Asset amounts tied to a distribution (requested, calculated, or funded).
    Distribution {
        release: ReleaseId,
        amounts: Vec<AssetAmount>,
    },
    /// A holder's payout.
    Claim {
        holder: AccountId,
        amounts: Vec<AssetAmount>,
    },
    /// Unclaimed funds returned on cancellation.
    Refund {
        receiver: AccountId,
        amounts: Vec<AssetAmount>,
    },
}

/// A single entry of the audit trail.
///
/// Every event carries a journal sequence number, the ledger time of the
/// call that produced it, its subject, a kind, a payload, and a BLAKE3
/// integrity hash over the bincode encoding of those fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: EventId,
    pub seq: u64,
    pub at: LedgerTime,
    pub subject: EventSubject,
    pub kind: EventKind,
    pub payload: EventPayload,
    pub integrity_hash: [u8; 32],
}

impl LedgerEvent {
    /// Build a new event, computing its integrity hash and id.
    pub fn new(seq: u64, at: LedgerTime, subject: EventSubject, kind: EventKind, payload: EventPayload) -> Self {
        let integrity_hash = Self::compute_integrity(seq, &at, &subject, &kind, &payload);
        Self {
            id: EventId::from_hash(integrity_hash),
            seq,
            at,
            subject,
            kind,
            payload,
            integrity_hash,
        }
    }

    /// Verify the integrity hash matches the event's content.
    pub fn verify_integrity(&self) -> bool {
        let expected =
            Self::compute_integrity(self.seq, &self.at, &self.subject, &self.kind, &self.payload);
        self.integrity_hash == expected
    }

    fn compute_integrity(
        seq: u64,
        at: &LedgerTime,
        subject: &EventSubject,
        kind: &EventKind,
        payload: &EventPayload,
    ) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tally-ledger-event-v1:");
        hasher.update(&seq.to_le_bytes());
        hasher.update(&at.secs().to_le_bytes());

        if let Ok(bytes) = bincode::serialize(subject) {
            hasher.update(&bytes);
        }
        if let Ok(bytes) = bincode::serialize(kind) {
            hasher.update(&bytes);
        }
        if let Ok(bytes) = bincode::serialize(payload) {
            hasher.update(&bytes);
        }

        *hasher.finalize().as_bytes()
    }
}
