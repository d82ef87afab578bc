use std::fmt;

use serde::{Deserialize, Serialize};

use tally_registry::HolderShares;
use tally_types::{AccountId, AssetAmount, DistributionId, LedgerTime, ReleaseId};

use crate::error::{DistributionError, DistributionResult};

/// A royalty payout over one release and one holding period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: DistributionId,
    pub release_id: ReleaseId,
    pub start: LedgerTime,
    pub end: LedgerTime,
    /// Claims are accepted up to and including this time. `None` never closes.
    pub claimable_until: Option<LedgerTime>,
    /// Requested payout, one entry per asset.
    pub royalties_to_payout: Vec<AssetAmount>,
    /// Sum of every written claim; never exceeds the requested payout.
    pub calculated_royalties_to_payout: Vec<AssetAmount>,
    /// Sum of every paid claim.
    pub amounts_distributed: Vec<AssetAmount>,
    /// Period-shares across all holders, frozen once claims are assigned.
    pub total_shares: u128,
    /// Holders scanned by the share snapshot so far.
    pub holders_scanned: usize,
    /// Claim records written so far.
    pub claims_written: usize,
    pub all_shares_assigned: bool,
    pub all_claims_assigned: bool,
    pub primed: bool,
    pub active: bool,
    pub cancelled: bool,
    pub created_at: LedgerTime,
}

/// Lifecycle position of a distribution at a given time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionPhase {
    Created,
    SharesAssigning,
    SharesAssigned,
    ClaimsAssigning,
    ClaimsAssigned,
    Primed,
    Active,
    ClaimWindowElapsed,
    Cancelled,
}

impl fmt::Display for DistributionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Distribution {
    pub fn phase(&self, now: LedgerTime) -> DistributionPhase {
        if self.cancelled {
            DistributionPhase::Cancelled
        } else if self.active {
            if self.window_closed(now) {
                DistributionPhase::ClaimWindowElapsed
            } else {
                DistributionPhase::Active
            }
        } else if self.primed {
            DistributionPhase::Primed
        } else if self.all_claims_assigned {
            DistributionPhase::ClaimsAssigned
        } else if self.all_shares_assigned {
            if self.claims_written > 0 {
                DistributionPhase::ClaimsAssigning
            } else {
                DistributionPhase::SharesAssigned
            }
        } else if self.holders_scanned > 0 {
            DistributionPhase::SharesAssigning
        } else {
            DistributionPhase::Created
        }
    }

    /// Returns `true` once `now` is past `claimable_until`.
    pub fn window_closed(&self, now: LedgerTime) -> bool {
        self.claimable_until.is_some_and(|until| now.is_after(&until))
    }

    /// Primed but unpaid funds, per asset.
    pub fn unclaimed(&self) -> DistributionResult<Vec<AssetAmount>> {
        self.calculated_royalties_to_payout
            .iter()
            .zip(&self.amounts_distributed)
            .map(|(calculated, paid)| {
                calculated
                    .amount
                    .checked_sub(paid.amount)
                    .map(|left| AssetAmount::new(calculated.asset.clone(), left))
                    .ok_or(DistributionError::Overflow)
            })
            .collect()
    }
}

/// Snapshot side-table that lives between the first share batch and the
/// last claim batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionShares {
    pub holders: Vec<HolderShares>,
    pub total_shares: u128,
    /// Position in the ownership store's holder order.
    pub query_cursor: usize,
    /// Position in `holders`.
    pub claim_cursor: usize,
}

impl DistributionShares {
    /// Holders still waiting for a claim record.
    pub fn unclaimed_holders(&self) -> usize {
        self.holders.len().saturating_sub(self.claim_cursor)
    }
}

/// Progress of one snapshot batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStep {
    /// Holders read in this call.
    pub processed: usize,
    pub done: bool,
}

/// What a successful claim paid out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub distribution: DistributionId,
    pub release_id: ReleaseId,
    pub holder: AccountId,
    pub amounts: Vec<AssetAmount>,
}

/// `floor(total * user_shares / all_shares)`, or zero when nobody held shares.
pub fn pro_rata(total: u128, user_shares: u128, all_shares: u128) -> DistributionResult<u128> {
    if all_shares == 0 {
        return Ok(0);
    }
    total
        .checked_mul(user_shares)
        .map(|scaled| scaled / all_shares)
        .ok_or(DistributionError::Overflow)
}
