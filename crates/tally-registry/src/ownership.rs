//! Credit/debit engine that turns balance changes into bucketed checkpoints.
//!
//! Each holder keeps one cumulative checkpoint per bucket. A change inside
//! the current bucket amends the last checkpoint; a change in a later bucket
//! appends a new one. Changes made while the release is locked land on a
//! pre-unlock checkpoint (`bucket == None`) which is pinned to the unlock
//! bucket the first time the holder is touched after unlock.

use tally_store::{OwnershipEntry, OwnershipStore};
use tally_types::{AccountId, Bucket, LedgerTime};

use crate::error::{RegistryError, RegistryResult};
use crate::release::{ReleaseBook, TokenBalance};

impl<S: OwnershipStore> ReleaseBook<S> {
    /// Bucket a mutation at `now` is recorded in.
    pub(crate) fn current_bucket(&self, now: LedgerTime) -> Option<Bucket> {
        if self.release.locked {
            None
        } else {
            Some(self.release.bucket_duration.align(now))
        }
    }

    /// Add `delta` to a holder's balance and history.
    pub(crate) fn credit(&mut self, holder: &AccountId, delta: u64, now: LedgerTime) -> RegistryResult<TokenBalance> {
        let balance = self.balance(holder);
        let amount = balance.amount.checked_add(delta).ok_or(RegistryError::Overflow)?;

        self.checkpoint(holder, now, |last| last.checked_add(delta).ok_or(RegistryError::Overflow))?;

        let updated = TokenBalance { amount, ..balance };
        self.balances.insert(holder.clone(), updated);
        Ok(updated)
    }

    /// Remove `delta` from a holder's balance and history.
    ///
    /// A balance that reaches zero is pruned; its history stays so period
    /// queries still see the holdings it had.
    pub(crate) fn debit(&mut self, holder: &AccountId, delta: u64, now: LedgerTime) -> RegistryResult<TokenBalance> {
        if self.history.last_entry(holder)?.is_none() {
            return Err(RegistryError::NoOwnershipHistory(holder.clone()));
        }
        let balance = self.balance(holder);
        let amount = balance
            .amount
            .checked_sub(delta)
            .ok_or_else(|| RegistryError::InsufficientBalance {
                holder: holder.clone(),
                requested: delta,
                balance: balance.amount,
            })?;

        self.checkpoint(holder, now, |last| {
            last.checked_sub(delta).ok_or_else(|| RegistryError::InsufficientBalance {
                holder: holder.clone(),
                requested: delta,
                balance: last,
            })
        })?;

        let updated = TokenBalance {
            amount,
            locked_amount: balance.locked_amount.min(amount),
        };
        if amount == 0 {
            self.balances.remove(holder);
        } else {
            self.balances.insert(holder.clone(), updated);
        }
        Ok(updated)
    }

    fn checkpoint(
        &self,
        holder: &AccountId,
        now: LedgerTime,
        apply: impl FnOnce(u64) -> RegistryResult<u64>,
    ) -> RegistryResult<()> {
        let bucket = self.current_bucket(now);

        let Some(last) = self.history.last_entry(holder)? else {
            let amount = apply(0)?;
            self.history.insert(holder, OwnershipEntry::new(amount, bucket))?;
            return Ok(());
        };

        let amount = apply(last.amount)?;
        let mut last_bucket = last.bucket;
        if last_bucket.is_none() {
            if let Some(unlock) = self.release.unlock_bucket() {
                last_bucket = Some(unlock);
                if last_bucket != bucket {
                    self.history
                        .amend_last(holder, OwnershipEntry::new(last.amount, last_bucket))?;
                }
            }
        }

        if last_bucket == bucket {
            self.history.amend_last(holder, OwnershipEntry::new(amount, bucket))?;
        } else {
            self.history.insert(holder, OwnershipEntry::new(amount, bucket))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::Release;
    use tally_store::InMemoryOwnershipStore;
    use tally_types::{BucketDuration, ReleaseId};

    const BUCKET: u64 = 600;

    fn book() -> ReleaseBook<InMemoryOwnershipStore> {
        ReleaseBook::open(Release {
            id: ReleaseId::new("album").unwrap(),
            locked: true,
            in_initial_sale: false,
            deleting: false,
            total_shares: 1_000,
            unassigned_shares: 1_000,
            deleted_shares: 0,
            bucket_duration: BucketDuration::from_secs(BUCKET).unwrap(),
            unlocked_at: None,
            created_at: LedgerTime::zero(),
        })
    }

    fn unlock(book: &mut ReleaseBook<InMemoryOwnershipStore>, at: u64) {
        book.release.locked = false;
        book.release.unlocked_at = Some(LedgerTime::from_secs(at));
    }

    fn at(secs: u64) -> LedgerTime {
        LedgerTime::from_secs(secs)
    }

    fn bucket(secs: u64) -> Option<Bucket> {
        Some(BucketDuration::from_secs(BUCKET).unwrap().align(at(secs)))
    }

    #[test]
    fn locked_credits_share_the_pre_unlock_checkpoint() {
        let mut b = book();
        let alice = AccountId::from_label("alice");
        b.credit(&alice, 100, at(10)).unwrap();
        b.credit(&alice, 50, at(5_000)).unwrap();
        assert_eq!(b.history.history(&alice).unwrap(), vec![OwnershipEntry::pre_unlock(150)]);
        assert_eq!(b.balance(&alice).amount, 150);
    }

    #[test]
    fn first_touch_after_unlock_backfills_unlock_bucket() {
        let mut b = book();
        let alice = AccountId::from_label("alice");
        b.credit(&alice, 600, at(10)).unwrap();
        unlock(&mut b, 1_250);
        b.debit(&alice, 200, at(1_900)).unwrap();
        assert_eq!(
            b.history.history(&alice).unwrap(),
            vec![OwnershipEntry::new(600, bucket(1_200)), OwnershipEntry::new(400, bucket(1_800))]
        );
    }

    #[test]
    fn touch_in_unlock_bucket_amends_in_place() {
        let mut b = book();
        let alice = AccountId::from_label("alice");
        b.credit(&alice, 600, at(10)).unwrap();
        unlock(&mut b, 1_250);
        b.credit(&alice, 10, at(1_300)).unwrap();
        assert_eq!(b.history.history(&alice).unwrap(), vec![OwnershipEntry::new(610, bucket(1_200))]);
    }

    #[test]
    fn same_bucket_trades_collapse_to_one_checkpoint() {
        let mut b = book();
        unlock(&mut b, 0);
        let bob = AccountId::from_label("bob");
        b.credit(&bob, 10, at(600)).unwrap();
        b.credit(&bob, 10, at(700)).unwrap();
        b.debit(&bob, 5, at(1_199)).unwrap();
        b.credit(&bob, 1, at(1_200)).unwrap();
        assert_eq!(
            b.history.history(&bob).unwrap(),
            vec![OwnershipEntry::new(15, bucket(600)), OwnershipEntry::new(16, bucket(1_200))]
        );
    }

    #[test]
    fn zero_balance_is_pruned_but_history_kept() {
        let mut b = book();
        unlock(&mut b, 0);
        let carol = AccountId::from_label("carol");
        b.credit(&carol, 10, at(0)).unwrap();
        b.debit(&carol, 10, at(600)).unwrap();
        assert!(!b.balances.contains_key(&carol));
        assert_eq!(b.history.history(&carol).unwrap().len(), 2);
        assert_eq!(b.history.last_entry(&carol).unwrap().unwrap().amount, 0);
    }

    #[test]
    fn debit_without_history_fails() {
        let mut b = book();
        let dave = AccountId::from_label("dave");
        let err = b.debit(&dave, 1, at(0)).unwrap_err();
        assert_eq!(err, RegistryError::NoOwnershipHistory(dave));
    }

    #[test]
    fn overdraw_fails_without_side_effects() {
        let mut b = book();
        unlock(&mut b, 0);
        let erin = AccountId::from_label("erin");
        b.credit(&erin, 10, at(0)).unwrap();
        let err = b.debit(&erin, 11, at(600)).unwrap_err();
        assert!(matches!(err, RegistryError::InsufficientBalance { requested: 11, balance: 10, .. }));
        assert_eq!(b.history.history(&erin).unwrap().len(), 1);
        assert_eq!(b.balance(&erin).amount, 10);
    }

    #[test]
    fn debit_clamps_reservation() {
        let mut b = book();
        unlock(&mut b, 0);
        let frank = AccountId::from_label("frank");
        b.credit(&frank, 10, at(0)).unwrap();
        b.balances.get_mut(&frank).unwrap().locked_amount = 8;
        let after = b.debit(&frank, 5, at(0)).unwrap();
        assert_eq!(after.locked_amount, 5);
    }
}
