//! Time-weighted share queries over bucketed ownership history.
//!
//! A holder who held `N` units across `k` buckets of the window accrues
//! `N * k` period-shares, however many trades produced that history.

use serde::{Deserialize, Serialize};

use tally_store::{OwnershipEntry, OwnershipStore};
use tally_types::{AccountId, Bucket, BucketDuration, LedgerTime};

use crate::error::{RegistryError, RegistryResult};
use crate::release::ReleaseBook;

/// Period-shares accrued by one holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderShares {
    pub holder: AccountId,
    pub shares: u128,
}

/// One page of a period query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodPage {
    /// Holders with a non-zero total, in store order.
    pub user_shares: Vec<HolderShares>,
    /// Sum of `user_shares` for this page.
    pub total_shares: u128,
    pub has_more: bool,
    /// Cursor to pass to the next call.
    pub next_cursor: usize,
    /// Holders not yet scanned after this page.
    pub remaining: usize,
}

/// Bucket index range `[start, end)` a query covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodWindow {
    pub start: u64,
    pub end: u64,
}

impl PeriodWindow {
    /// Align the requested times to buckets, clamp the start to the unlock
    /// bucket, and widen an empty window to a single bucket.
    pub fn resolve(duration: BucketDuration, unlock: Bucket, start: LedgerTime, end: LedgerTime) -> Self {
        let start = duration.index_of(start).max(unlock.index(duration));
        let mut end = duration.index_of(end);
        if end <= start {
            end = start + 1;
        }
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Period-shares of one holder's checkpoints inside `window`.
///
/// Checkpoints before the window only seed the carried amount. Each
/// checkpoint inside contributes itself plus the carried amount for every
/// skipped bucket before it; the tail up to the window end is filled with the
/// last amount seen. A pre-unlock checkpoint reads as the unlock bucket.
pub fn period_shares(
    history: &[OwnershipEntry],
    duration: BucketDuration,
    unlock: Bucket,
    window: PeriodWindow,
) -> RegistryResult<u128> {
    let mut carried: u128 = 0;
    let mut next = window.start;
    let mut total: u128 = 0;

    for entry in history {
        let index = entry.bucket.unwrap_or(unlock).index(duration);
        if index >= window.end {
            break;
        }
        if index < window.start {
            carried = entry.amount as u128;
            continue;
        }
        let gap = (index - next) as u128;
        total = gap
            .checked_mul(carried)
            .and_then(|filled| total.checked_add(filled))
            .and_then(|t| t.checked_add(entry.amount as u128))
            .ok_or(RegistryError::Overflow)?;
        carried = entry.amount as u128;
        next = index + 1;
    }

    let tail = (window.end - next) as u128;
    tail.checked_mul(carried)
        .and_then(|filled| total.checked_add(filled))
        .ok_or(RegistryError::Overflow)
}

impl<S: OwnershipStore> ReleaseBook<S> {
    pub(crate) fn shares_in_period(
        &self,
        start: LedgerTime,
        end: LedgerTime,
        cursor: usize,
        limit: usize,
    ) -> RegistryResult<PeriodPage> {
        if limit == 0 {
            return Err(RegistryError::InvalidBatchSize);
        }
        let unlock = self
            .release
            .unlock_bucket()
            .ok_or_else(|| RegistryError::ReleaseLocked(self.release.id.clone()))?;
        let duration = self.history.bucket_duration();
        let window = PeriodWindow::resolve(duration, unlock, start, end);

        let count = self.history.holder_count()?;
        let holders = self.history.holders_page(cursor, limit)?;
        let next_cursor = cursor.saturating_add(holders.len()).min(count);

        let mut page = PeriodPage {
            next_cursor,
            has_more: next_cursor < count,
            remaining: count - next_cursor,
            ..Default::default()
        };
        for holder in holders {
            let history = self.history.history(&holder)?;
            let shares = period_shares(&history, duration, unlock, window)?;
            if shares == 0 {
                continue;
            }
            page.total_shares = page
                .total_shares
                .checked_add(shares)
                .ok_or(RegistryError::Overflow)?;
            page.user_shares.push(HolderShares { holder, shares });
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const D: u64 = 600;

    fn duration() -> BucketDuration {
        BucketDuration::from_secs(D).unwrap()
    }

    fn b(index: u64) -> Option<Bucket> {
        Some(duration().align(LedgerTime::from_secs(index * D)))
    }

    fn window(start: u64, end: u64) -> PeriodWindow {
        PeriodWindow { start, end }
    }

    #[test]
    fn continuous_holding_scales_with_window() {
        let history = [OwnershipEntry::new(100, b(2))];
        let unlock = b(0).unwrap();
        assert_eq!(period_shares(&history, duration(), unlock, window(2, 7)).unwrap(), 500);
        // Window starting after the checkpoint still counts every bucket.
        assert_eq!(period_shares(&history, duration(), unlock, window(4, 7)).unwrap(), 300);
    }

    #[test]
    fn checkpoint_after_window_contributes_nothing() {
        let history = [OwnershipEntry::new(100, b(9))];
        assert_eq!(period_shares(&history, duration(), b(0).unwrap(), window(2, 7)).unwrap(), 0);
    }

    #[test]
    fn gaps_are_filled_with_previous_amount() {
        // 10 in bucket 1, 30 from bucket 4 on; window [0, 6).
        let history = [OwnershipEntry::new(10, b(1)), OwnershipEntry::new(30, b(4))];
        let shares = period_shares(&history, duration(), b(0).unwrap(), window(0, 6)).unwrap();
        // buckets 1,2,3 -> 10 each; buckets 4,5 -> 30 each
        assert_eq!(shares, 30 + 60);
    }

    #[test]
    fn pre_unlock_checkpoint_reads_as_unlock_bucket() {
        let history = [OwnershipEntry::pre_unlock(600)];
        let unlock = b(3).unwrap();
        assert_eq!(period_shares(&history, duration(), unlock, window(3, 5)).unwrap(), 1_200);
    }

    #[test]
    fn sold_out_holder_accrues_until_exit() {
        let history = [OwnershipEntry::new(50, b(0)), OwnershipEntry::new(0, b(2))];
        assert_eq!(period_shares(&history, duration(), b(0).unwrap(), window(0, 10)).unwrap(), 100);
    }

    #[test]
    fn window_resolution_clamps_and_widens() {
        let unlock = b(5).unwrap();
        let w = PeriodWindow::resolve(duration(), unlock, LedgerTime::from_secs(0), LedgerTime::from_secs(2 * D));
        assert_eq!(w, window(5, 6));
        let w = PeriodWindow::resolve(duration(), unlock, LedgerTime::from_secs(6 * D + 10), LedgerTime::from_secs(9 * D + 599));
        assert_eq!(w, window(6, 9));
        assert_eq!(w.len(), 3);
    }

    proptest! {
        #[test]
        fn constant_holding_is_amount_times_buckets(
            amount in 1u64..1_000_000,
            at in 0u64..50,
            start in 0u64..50,
            len in 1u64..50,
        ) {
            let history = [OwnershipEntry::new(amount, b(at))];
            let w = window(start, start + len);
            let expected = if at >= w.end {
                0
            } else {
                amount as u128 * (w.end - at.max(w.start)) as u128
            };
            prop_assert_eq!(period_shares(&history, duration(), b(0).unwrap(), w).unwrap(), expected);
        }
    }
}
