use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tally_store::OwnershipStore;
use tally_types::{AccountId, Bucket, BucketDuration, LedgerTime, ReleaseId};

/// Lifecycle and aggregate balances of one release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub locked: bool,
    pub in_initial_sale: bool,
    pub deleting: bool,
    pub total_shares: u64,
    pub unassigned_shares: u64,
    pub deleted_shares: u64,
    pub bucket_duration: BucketDuration,
    pub unlocked_at: Option<LedgerTime>,
    pub created_at: LedgerTime,
}

impl Release {
    pub fn is_fully_assigned(&self) -> bool {
        self.unassigned_shares == 0
    }

    /// Bucket in which the release unlocked, if it has.
    pub fn unlock_bucket(&self) -> Option<Bucket> {
        self.unlocked_at.map(|t| self.bucket_duration.align(t))
    }
}

/// A holder's live balance in one release.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub amount: u64,
    /// Reserved by the exchange (e.g. listed for sale). Never exceeds `amount`.
    pub locked_amount: u64,
}

impl TokenBalance {
    pub fn available(&self) -> u64 {
        self.amount.saturating_sub(self.locked_amount)
    }
}

/// Progress report of a resumable batch call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Items handled by this call.
    pub processed: usize,
    /// Items left for later calls.
    pub remaining: usize,
    /// Sticky completion flag.
    pub done: bool,
}

/// Everything the registry owns for one release.
pub(crate) struct ReleaseBook<S> {
    pub(crate) release: Release,
    /// Live balances; the key set doubles as the holder index.
    pub(crate) balances: BTreeMap<AccountId, TokenBalance>,
    pub(crate) history: S,
}

impl<S: OwnershipStore> ReleaseBook<S> {
    pub(crate) fn open(release: Release) -> Self {
        let history = S::open(release.bucket_duration);
        Self {
            release,
            balances: BTreeMap::new(),
            history,
        }
    }

    pub(crate) fn balance(&self, holder: &AccountId) -> TokenBalance {
        self.balances.get(holder).copied().unwrap_or_default()
    }

    /// Sum of every live balance.
    pub(crate) fn held_shares(&self) -> u128 {
        self.balances.values().map(|b| b.amount as u128).sum()
    }
}
