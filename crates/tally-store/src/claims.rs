use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tally_types::{AccountId, AssetAmount, LedgerTime};

use crate::error::{StoreError, StoreResult};

/// A holder's entitlement within one distribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub holder: AccountId,
    /// One amount per distributed asset, in the distribution's asset order.
    pub amounts: Vec<AssetAmount>,
    /// Period-shares the amounts were computed from.
    pub user_shares: u128,
    pub created_at: LedgerTime,
    pub claimed: bool,
}

impl ClaimRecord {
    /// Returns `true` if every amount floored to zero.
    pub fn is_dust(&self) -> bool {
        self.amounts.iter().all(|a| a.amount == 0)
    }
}

/// Append-only claim records for a single distribution.
pub trait ClaimStore: Send + Sync + Default {
    /// Record a new claim. Fails if the holder already has one.
    fn insert(&self, record: ClaimRecord) -> StoreResult<()>;

    fn get(&self, holder: &AccountId) -> StoreResult<Option<ClaimRecord>>;

    /// Flip the claimed flag, returning the record as it now stands.
    fn mark_claimed(&self, holder: &AccountId) -> StoreResult<ClaimRecord>;

    /// Up to `limit` records in insertion order, starting at `cursor`.
    fn page(&self, cursor: usize, limit: usize) -> StoreResult<Vec<ClaimRecord>>;

    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[derive(Default)]
struct ClaimState {
    records: Vec<ClaimRecord>,
    by_holder: HashMap<AccountId, usize>,
}

/// In-memory claim store.
#[derive(Default)]
pub struct InMemoryClaimStore {
    inner: RwLock<ClaimState>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimStore for InMemoryClaimStore {
    fn insert(&self, record: ClaimRecord) -> StoreResult<()> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        if state.by_holder.contains_key(&record.holder) {
            return Err(StoreError::DuplicateClaim(record.holder));
        }
        let index = state.records.len();
        state.by_holder.insert(record.holder.clone(), index);
        state.records.push(record);
        Ok(())
    }

    fn get(&self, holder: &AccountId) -> StoreResult<Option<ClaimRecord>> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state
            .by_holder
            .get(holder)
            .and_then(|&i| state.records.get(i))
            .cloned())
    }

    fn mark_claimed(&self, holder: &AccountId) -> StoreResult<ClaimRecord> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let index = *state
            .by_holder
            .get(holder)
            .ok_or_else(|| StoreError::ClaimNotFound(holder.clone()))?;
        let record = state
            .records
            .get_mut(index)
            .ok_or_else(|| StoreError::ClaimNotFound(holder.clone()))?;
        if record.claimed {
            return Err(StoreError::AlreadyClaimed(holder.clone()));
        }
        record.claimed = true;
        Ok(record.clone())
    }

    fn page(&self, cursor: usize, limit: usize) -> StoreResult<Vec<ClaimRecord>> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.records.iter().skip(cursor).take(limit).cloned().collect())
    }

    fn len(&self) -> StoreResult<usize> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.records.len())
    }
}

impl std::fmt::Debug for InMemoryClaimStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or(0);
        f.debug_struct("InMemoryClaimStore")
            .field("claim_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::AssetId;

    fn record(label: &str, amount: u128) -> ClaimRecord {
        ClaimRecord {
            holder: AccountId::from_label(label),
            amounts: vec![AssetAmount::new(AssetId::currency("USD"), amount)],
            user_shares: 10,
            created_at: LedgerTime::from_secs(5),
            claimed: false,
        }
    }

    #[test]
    fn insert_then_get() {
        let store = InMemoryClaimStore::new();
        store.insert(record("alice", 600)).unwrap();
        let got = store.get(&AccountId::from_label("alice")).unwrap().unwrap();
        assert_eq!(got.amounts[0].amount, 600);
        assert!(!got.claimed);
        assert!(store.get(&AccountId::from_label("bob")).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_rejected() {
        let store = InMemoryClaimStore::new();
        store.insert(record("alice", 1)).unwrap();
        let err = store.insert(record("alice", 2)).unwrap_err();
        assert_eq!(err, StoreError::DuplicateClaim(AccountId::from_label("alice")));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn mark_claimed_once() {
        let store = InMemoryClaimStore::new();
        let alice = AccountId::from_label("alice");
        store.insert(record("alice", 1)).unwrap();
        assert!(store.mark_claimed(&alice).unwrap().claimed);
        assert_eq!(store.mark_claimed(&alice).unwrap_err(), StoreError::AlreadyClaimed(alice));
    }

    #[test]
    fn mark_claimed_unknown_holder() {
        let store = InMemoryClaimStore::new();
        let bob = AccountId::from_label("bob");
        assert_eq!(store.mark_claimed(&bob).unwrap_err(), StoreError::ClaimNotFound(bob));
    }

    #[test]
    fn pages_follow_insertion_order() {
        let store = InMemoryClaimStore::new();
        for (i, label) in ["a", "b", "c"].iter().enumerate() {
            store.insert(record(label, i as u128)).unwrap();
        }
        let page = store.page(1, 5).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].holder, AccountId::from_label("b"));
        assert!(store.page(3, 5).unwrap().is_empty());
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn dust_detection() {
        assert!(record("a", 0).is_dust());
        assert!(!record("a", 1).is_dust());
    }
}
