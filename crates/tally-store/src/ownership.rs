use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tally_types::{AccountId, Bucket, BucketDuration};

use crate::error::{StoreError, StoreResult};

/// One checkpoint of a holder's balance.
///
/// `amount` is the cumulative balance as of `bucket`, not a delta. A `None`
/// bucket marks activity recorded while the release was still locked; the
/// ledger resolves it to the unlock bucket on the first later mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipEntry {
    pub amount: u64,
    pub bucket: Option<Bucket>,
}

impl OwnershipEntry {
    pub fn new(amount: u64, bucket: Option<Bucket>) -> Self {
        Self { amount, bucket }
    }

    /// A checkpoint recorded before the release unlocked.
    pub fn pre_unlock(amount: u64) -> Self {
        Self {
            amount,
            bucket: None,
        }
    }
}

/// Append-only bucketed ownership history for one release.
///
/// All implementations must satisfy these invariants:
/// - Per holder, buckets are strictly increasing (`None` sorts first and may
///   only appear as the sole pre-unlock checkpoint).
/// - Only the last entry of a holder can change, via [`amend_last`].
/// - Holder enumeration order is first-seen order and is stable across
///   appends, so a cursor into it stays valid between calls.
///
/// [`amend_last`]: OwnershipStore::amend_last
pub trait OwnershipStore: Send + Sync {
    /// Open an empty store with the given bucket width.
    fn open(bucket_duration: BucketDuration) -> Self
    where
        Self: Sized;

    fn bucket_duration(&self) -> BucketDuration;

    /// Full checkpoint list of a holder (empty if unknown).
    fn history(&self, holder: &AccountId) -> StoreResult<Vec<OwnershipEntry>>;

    /// Last checkpoint of a holder, if any.
    fn last_entry(&self, holder: &AccountId) -> StoreResult<Option<OwnershipEntry>>;

    /// Append a checkpoint, enforcing bucket ordering.
    fn insert(&self, holder: &AccountId, entry: OwnershipEntry) -> StoreResult<()>;

    /// Replace the last checkpoint of a holder.
    fn amend_last(&self, holder: &AccountId, entry: OwnershipEntry) -> StoreResult<()>;

    /// Drop every checkpoint of a holder. Returns how many were removed.
    fn delete_all(&self, holder: &AccountId) -> StoreResult<usize>;

    /// Number of holders with at least one checkpoint.
    fn holder_count(&self) -> StoreResult<usize>;

    /// Up to `limit` holders starting at position `cursor`.
    fn holders_page(&self, cursor: usize, limit: usize) -> StoreResult<Vec<AccountId>>;
}

#[derive(Default)]
struct OwnershipState {
    order: Vec<AccountId>,
    entries: HashMap<AccountId, Vec<OwnershipEntry>>,
}

/// In-memory ownership history behind a `RwLock`.
pub struct InMemoryOwnershipStore {
    bucket_duration: BucketDuration,
    inner: RwLock<OwnershipState>,
}

impl InMemoryOwnershipStore {
    /// Total checkpoints across all holders.
    pub fn entry_count(&self) -> StoreResult<usize> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.entries.values().map(Vec::len).sum())
    }
}

impl OwnershipStore for InMemoryOwnershipStore {
    fn open(bucket_duration: BucketDuration) -> Self {
        Self {
            bucket_duration,
            inner: RwLock::new(OwnershipState::default()),
        }
    }

    fn bucket_duration(&self) -> BucketDuration {
        self.bucket_duration
    }

    fn history(&self, holder: &AccountId) -> StoreResult<Vec<OwnershipEntry>> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.entries.get(holder).cloned().unwrap_or_default())
    }

    fn last_entry(&self, holder: &AccountId) -> StoreResult<Option<OwnershipEntry>> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.entries.get(holder).and_then(|h| h.last().copied()))
    }

    fn insert(&self, holder: &AccountId, entry: OwnershipEntry) -> StoreResult<()> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let is_new = !state.entries.contains_key(holder);
        let history = state.entries.entry(holder.clone()).or_default();
        if let Some(last) = history.last() {
            // Option ordering puts the pre-unlock marker before every bucket.
            if entry.bucket <= last.bucket {
                return Err(StoreError::OutOfOrder {
                    holder: holder.clone(),
                    last: last.bucket,
                    attempted: entry.bucket,
                });
            }
        }
        history.push(entry);
        if is_new {
            state.order.push(holder.clone());
        }
        Ok(())
    }

    fn amend_last(&self, holder: &AccountId, entry: OwnershipEntry) -> StoreResult<()> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let history = state
            .entries
            .get_mut(holder)
            .ok_or_else(|| StoreError::NoHistory(holder.clone()))?;
        let len = history.len();
        if len >= 2 && entry.bucket <= history[len - 2].bucket {
            return Err(StoreError::OutOfOrder {
                holder: holder.clone(),
                last: history[len - 2].bucket,
                attempted: entry.bucket,
            });
        }
        match history.last_mut() {
            Some(last) => {
                *last = entry;
                Ok(())
            }
            None => Err(StoreError::NoHistory(holder.clone())),
        }
    }

    fn delete_all(&self, holder: &AccountId) -> StoreResult<usize> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let removed = state.entries.remove(holder).map(|h| h.len()).unwrap_or(0);
        if removed > 0 {
            state.order.retain(|h| h != holder);
        }
        Ok(removed)
    }

    fn holder_count(&self) -> StoreResult<usize> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.order.len())
    }

    fn holders_page(&self, cursor: usize, limit: usize) -> StoreResult<Vec<AccountId>> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.order.iter().skip(cursor).take(limit).cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryOwnershipStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let holders = self.holder_count().unwrap_or(0);
        f.debug_struct("InMemoryOwnershipStore")
            .field("bucket_duration", &self.bucket_duration)
            .field("holder_count", &holders)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_types::LedgerTime;

    fn store() -> InMemoryOwnershipStore {
        InMemoryOwnershipStore::open(BucketDuration::from_secs(600).unwrap())
    }

    fn bucket(secs: u64) -> Option<Bucket> {
        Some(BucketDuration::from_secs(600).unwrap().align(LedgerTime::from_secs(secs)))
    }

    #[test]
    fn insert_and_read_history() {
        let s = store();
        let alice = AccountId::from_label("alice");
        s.insert(&alice, OwnershipEntry::new(100, bucket(0))).unwrap();
        s.insert(&alice, OwnershipEntry::new(150, bucket(600))).unwrap();
        assert_eq!(s.history(&alice).unwrap().len(), 2);
        assert_eq!(s.last_entry(&alice).unwrap().unwrap().amount, 150);
        assert_eq!(s.entry_count().unwrap(), 2);
    }

    #[test]
    fn unknown_holder_has_empty_history() {
        let s = store();
        let ghost = AccountId::from_label("ghost");
        assert!(s.history(&ghost).unwrap().is_empty());
        assert!(s.last_entry(&ghost).unwrap().is_none());
    }

    #[test]
    fn same_bucket_append_is_rejected() {
        let s = store();
        let alice = AccountId::from_label("alice");
        s.insert(&alice, OwnershipEntry::new(100, bucket(600))).unwrap();
        let err = s.insert(&alice, OwnershipEntry::new(200, bucket(700))).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
    }

    #[test]
    fn pre_unlock_marker_sorts_first() {
        let s = store();
        let alice = AccountId::from_label("alice");
        s.insert(&alice, OwnershipEntry::pre_unlock(100)).unwrap();
        s.insert(&alice, OwnershipEntry::new(50, bucket(1200))).unwrap();
        let err = s.insert(&alice, OwnershipEntry::pre_unlock(10)).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
    }

    #[test]
    fn amend_last_replaces_in_place() {
        let s = store();
        let alice = AccountId::from_label("alice");
        s.insert(&alice, OwnershipEntry::pre_unlock(100)).unwrap();
        s.amend_last(&alice, OwnershipEntry::new(100, bucket(600))).unwrap();
        assert_eq!(s.history(&alice).unwrap(), vec![OwnershipEntry::new(100, bucket(600))]);
    }

    #[test]
    fn amend_without_history_fails() {
        let s = store();
        let bob = AccountId::from_label("bob");
        let err = s.amend_last(&bob, OwnershipEntry::new(1, bucket(0))).unwrap_err();
        assert_eq!(err, StoreError::NoHistory(bob));
    }

    #[test]
    fn holders_keep_first_seen_order() {
        let s = store();
        let ids: Vec<AccountId> = ["c", "a", "b"].iter().map(|l| AccountId::from_label(*l)).collect();
        for id in &ids {
            s.insert(id, OwnershipEntry::new(1, bucket(0))).unwrap();
        }
        s.insert(&ids[0], OwnershipEntry::new(2, bucket(600))).unwrap();
        assert_eq!(s.holders_page(0, 10).unwrap(), ids);
        assert_eq!(s.holders_page(1, 1).unwrap(), vec![ids[1].clone()]);
        assert!(s.holders_page(5, 1).unwrap().is_empty());
    }

    #[test]
    fn delete_all_drops_holder() {
        let s = store();
        let alice = AccountId::from_label("alice");
        let bob = AccountId::from_label("bob");
        s.insert(&alice, OwnershipEntry::new(1, bucket(0))).unwrap();
        s.insert(&alice, OwnershipEntry::new(2, bucket(600))).unwrap();
        s.insert(&bob, OwnershipEntry::new(1, bucket(0))).unwrap();
        assert_eq!(s.delete_all(&alice).unwrap(), 2);
        assert_eq!(s.holder_count().unwrap(), 1);
        assert_eq!(s.holders_page(0, 10).unwrap(), vec![bob]);
        assert_eq!(s.delete_all(&alice).unwrap(), 0);
    }

    fn at_index(index: Option<u64>) -> Option<Bucket> {
        index.and_then(|i| bucket(i * 600))
    }

    proptest! {
        #[test]
        fn history_stays_strictly_ordered(
            ops in proptest::collection::vec((proptest::option::of(0u64..12), any::<bool>(), 0u64..1_000), 1..40),
        ) {
            let s = store();
            let alice = AccountId::from_label("alice");
            let mut model: Vec<Option<Bucket>> = Vec::new();
            for (index, amend, amount) in ops {
                let entry = OwnershipEntry::new(amount, at_index(index));
                if amend {
                    let accepted = match model.len() {
                        0 => false,
                        1 => true,
                        n => entry.bucket > model[n - 2],
                    };
                    prop_assert_eq!(s.amend_last(&alice, entry).is_ok(), accepted);
                    if accepted {
                        *model.last_mut().unwrap() = entry.bucket;
                    }
                } else {
                    let accepted = model.last().map_or(true, |last| entry.bucket > *last);
                    prop_assert_eq!(s.insert(&alice, entry).is_ok(), accepted);
                    if accepted {
                        model.push(entry.bucket);
                    }
                }
                let buckets: Vec<_> = s.history(&alice).unwrap().iter().map(|e| e.bucket).collect();
                prop_assert_eq!(&buckets, &model);
                prop_assert!(buckets.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }
}
