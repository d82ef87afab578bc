use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use tally_fabric::{EventJournal, EventKind, EventPayload, EventSubject};
use tally_registry::{BatchProgress, HoldingsView};
use tally_store::{ClaimRecord, ClaimStore, Custody, InMemoryClaimStore};
use tally_types::{
    AccountId, AssetAmount, AssetId, AuthContext, Clock, DistributionId, GrantScope, LedgerTime, ReleaseId, Role,
};

use crate::config::DistributionConfig;
use crate::distribution::{pro_rata, BatchStep, ClaimReceipt, Distribution, DistributionShares};
use crate::error::{DistributionError, DistributionResult};

/// Runs royalty distributions from creation to payout.
///
/// Holder-scaled work is split into resumable batches: the share snapshot
/// pages through the release's holders, and claim assignment pages through
/// the snapshot. Payouts flip their bookkeeping before any funds move.
pub struct DistributionEngine<C: ClaimStore = InMemoryClaimStore> {
    config: DistributionConfig,
    allowed_assets: BTreeSet<AssetId>,
    custody_account: AccountId,
    clock: Arc<dyn Clock>,
    vault: Arc<dyn Custody>,
    journal: Arc<EventJournal>,
    distributions: HashMap<DistributionId, Distribution>,
    claims: HashMap<DistributionId, C>,
    pending: HashMap<DistributionId, DistributionShares>,
    /// Distributions per release, in creation order.
    by_release: HashMap<ReleaseId, Vec<DistributionId>>,
    /// Distributions a holder still has an unpaid claim in, in assignment order.
    by_claimant: HashMap<AccountId, Vec<DistributionId>>,
}

fn checked_accumulate(into: &[AssetAmount], add: &[AssetAmount]) -> DistributionResult<Vec<AssetAmount>> {
    into.iter()
        .zip(add)
        .map(|(acc, extra)| {
            acc.amount
                .checked_add(extra.amount)
                .map(|sum| AssetAmount::new(acc.asset.clone(), sum))
                .ok_or(DistributionError::Overflow)
        })
        .collect()
}

impl<C: ClaimStore> DistributionEngine<C> {
    pub fn new(
        config: DistributionConfig,
        clock: Arc<dyn Clock>,
        vault: Arc<dyn Custody>,
        journal: Arc<EventJournal>,
    ) -> DistributionResult<Self> {
        if config.custody_account.trim().is_empty() {
            return Err(DistributionError::InvalidConfig("custody account label is empty".into()));
        }
        let allowed_assets = config.allowed_asset_ids();
        if allowed_assets.is_empty() {
            return Err(DistributionError::InvalidConfig("no payout assets are allowed".into()));
        }
        let custody_account = config.custody_account_id();
        Ok(Self {
            config,
            allowed_assets,
            custody_account,
            clock,
            vault,
            journal,
            distributions: HashMap::new(),
            claims: HashMap::new(),
            pending: HashMap::new(),
            by_release: HashMap::new(),
            by_claimant: HashMap::new(),
        })
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    /// Account holding primed royalties until they are claimed or refunded.
    pub fn custody_account(&self) -> &AccountId {
        &self.custody_account
    }

    fn authorize(&self, auth: &AuthContext, release: &ReleaseId, now: LedgerTime) -> DistributionResult<()> {
        auth.require(Role::RoyaltyManager, &GrantScope::Release(release.clone()), now)?;
        Ok(())
    }

    fn emit(&self, at: LedgerTime, id: DistributionId, kind: EventKind, payload: EventPayload) -> DistributionResult<()> {
        self.journal.emit(at, EventSubject::Distribution(id), kind, payload)?;
        Ok(())
    }

    fn get(&self, id: DistributionId) -> DistributionResult<&Distribution> {
        self.distributions.get(&id).ok_or(DistributionError::NotFound(id))
    }

    fn get_mut(&mut self, id: DistributionId) -> DistributionResult<&mut Distribution> {
        self.distributions.get_mut(&id).ok_or(DistributionError::NotFound(id))
    }

    // ---- Lifecycle ----

    /// Register a distribution of `asset_amounts` over holdings in `[start, end)`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_distribution<H: HoldingsView + ?Sized>(
        &mut self,
        auth: &AuthContext,
        holdings: &H,
        release_id: &ReleaseId,
        start: LedgerTime,
        end: LedgerTime,
        claimable_until: Option<LedgerTime>,
        asset_amounts: Vec<AssetAmount>,
    ) -> DistributionResult<Distribution> {
        let now = self.clock.now();
        self.authorize(auth, release_id, now)?;
        if !holdings.release_exists(release_id) {
            return Err(DistributionError::ReleaseNotFound(release_id.clone()));
        }
        if start.is_after(&end) {
            return Err(DistributionError::InvalidWindow { start, end });
        }
        if let Some(until) = claimable_until {
            if !until.is_after(&now) {
                return Err(DistributionError::ClaimWindowInPast { claimable_until: until, now });
            }
        }
        if asset_amounts.is_empty() {
            return Err(DistributionError::NoAssets);
        }
        let mut seen = BTreeSet::new();
        for entry in &asset_amounts {
            if !self.allowed_assets.contains(&entry.asset) {
                return Err(DistributionError::AssetNotAllowed(entry.asset.clone()));
            }
            if entry.amount == 0 {
                return Err(DistributionError::ZeroAmount(entry.asset.clone()));
            }
            if !seen.insert(entry.asset.clone()) {
                return Err(DistributionError::DuplicateAsset(entry.asset.clone()));
            }
        }

        let zeroed: Vec<AssetAmount> = asset_amounts.iter().map(AssetAmount::zeroed).collect();
        let distribution = Distribution {
            id: DistributionId::new(),
            release_id: release_id.clone(),
            start,
            end,
            claimable_until,
            royalties_to_payout: asset_amounts,
            calculated_royalties_to_payout: zeroed.clone(),
            amounts_distributed: zeroed,
            total_shares: 0,
            holders_scanned: 0,
            claims_written: 0,
            all_shares_assigned: false,
            all_claims_assigned: false,
            primed: false,
            active: false,
            cancelled: false,
            created_at: now,
        };
        let id = distribution.id;
        self.distributions.insert(id, distribution.clone());
        self.claims.insert(id, C::default());
        self.by_release.entry(release_id.clone()).or_default().push(id);

        info!(distribution = %id, release = %release_id, start = %start, end = %end, "distribution created");
        self.emit(
            now,
            id,
            EventKind::DistributionCreated,
            EventPayload::Distribution {
                release: release_id.clone(),
                amounts: distribution.royalties_to_payout.clone(),
            },
        )?;
        Ok(distribution)
    }

    /// Snapshot the next page of period-shares for a distribution.
    pub fn init_shares_batched<H: HoldingsView + ?Sized>(
        &mut self,
        auth: &AuthContext,
        holdings: &H,
        id: DistributionId,
        batch_size: usize,
    ) -> DistributionResult<BatchStep> {
        let now = self.clock.now();
        let distribution = self.get(id)?;
        let release_id = distribution.release_id.clone();
        self.authorize(auth, &release_id, now)?;
        if batch_size == 0 {
            return Err(DistributionError::InvalidBatchSize);
        }
        if distribution.cancelled {
            return Err(DistributionError::Cancelled(id));
        }
        if distribution.all_shares_assigned {
            return Err(DistributionError::SharesAlreadyAssigned(id));
        }
        if !holdings.release_exists(&release_id) {
            return Err(DistributionError::ReleaseNotFound(release_id));
        }
        if !holdings.is_fully_assigned(&release_id)? {
            return Err(DistributionError::ReleaseNotFullyAssigned(release_id));
        }
        if holdings.is_deleting(&release_id)? {
            return Err(DistributionError::ReleaseDeleting(release_id));
        }

        let cursor = self.pending.get(&id).map_or(0, |s| s.query_cursor);
        let page = holdings.shares_in_period(&release_id, distribution.start, distribution.end, cursor, batch_size)?;
        let pending_total = self.pending.get(&id).map_or(0, |s| s.total_shares);
        let total_shares = pending_total
            .checked_add(page.total_shares)
            .ok_or(DistributionError::Overflow)?;

        let processed = page.next_cursor.saturating_sub(cursor);
        let done = !page.has_more;
        let remaining = page.remaining;
        let shares = self.pending.entry(id).or_default();
        shares.holders.extend(page.user_shares);
        shares.total_shares = total_shares;
        shares.query_cursor = page.next_cursor;
        let snapshot_holders = shares.holders.len();

        let distribution = self.get_mut(id)?;
        distribution.holders_scanned += processed;
        distribution.all_shares_assigned = done;

        debug!(distribution = %id, processed, cursor = page.next_cursor, done, "share batch assigned");
        if done {
            if total_shares == 0 {
                warn!(distribution = %id, release = %release_id, "no shares held during the distribution period");
            }
            info!(distribution = %id, holders = snapshot_holders, total_shares = %total_shares, "distribution shares assigned");
        }
        self.emit(
            now,
            id,
            EventKind::DistributionSharesAssigned,
            EventPayload::Batch {
                processed: processed as u64,
                remaining: remaining as u64,
                done,
            },
        )?;
        Ok(BatchStep { processed, done })
    }

    /// Write claim records for the next `batch_size` snapshotted holders.
    pub fn init_claims_batched(
        &mut self,
        auth: &AuthContext,
        id: DistributionId,
        batch_size: usize,
    ) -> DistributionResult<BatchProgress> {
        let now = self.clock.now();
        let distribution = self.get(id)?;
        self.authorize(auth, &distribution.release_id, now)?;
        if batch_size == 0 {
            return Err(DistributionError::InvalidBatchSize);
        }
        if distribution.cancelled {
            return Err(DistributionError::Cancelled(id));
        }
        if !distribution.all_shares_assigned {
            return Err(DistributionError::SharesNotAssigned(id));
        }
        if distribution.all_claims_assigned {
            return Err(DistributionError::ClaimsAlreadyAssigned(id));
        }
        let shares = self.pending.get(&id).ok_or(DistributionError::SharesNotAssigned(id))?;

        let batch: Vec<_> = shares
            .holders
            .iter()
            .skip(shares.claim_cursor)
            .take(batch_size)
            .collect();
        let mut records = Vec::with_capacity(batch.len());
        let mut calculated = distribution.calculated_royalties_to_payout.clone();
        for holder in &batch {
            let amounts = distribution
                .royalties_to_payout
                .iter()
                .map(|total| {
                    pro_rata(total.amount, holder.shares, shares.total_shares)
                        .map(|amount| AssetAmount::new(total.asset.clone(), amount))
                })
                .collect::<DistributionResult<Vec<_>>>()?;
            calculated = checked_accumulate(&calculated, &amounts)?;
            records.push(ClaimRecord {
                holder: holder.holder.clone(),
                amounts,
                user_shares: holder.shares,
                created_at: now,
                claimed: false,
            });
        }
        let processed = records.len();
        let claim_cursor = shares.claim_cursor + processed;
        let remaining = shares.holders.len() - claim_cursor;
        let total_shares = shares.total_shares;

        let store = self.claims.get(&id).ok_or(DistributionError::NotFound(id))?;
        for record in records {
            let holder = record.holder.clone();
            store.insert(record)?;
            self.by_claimant.entry(holder).or_default().push(id);
        }

        let done = remaining == 0;
        if let Some(shares) = self.pending.get_mut(&id) {
            shares.claim_cursor = claim_cursor;
        }
        let distribution = self.get_mut(id)?;
        distribution.calculated_royalties_to_payout = calculated;
        distribution.claims_written += processed;
        if done {
            distribution.all_claims_assigned = true;
            distribution.total_shares = total_shares;
            self.pending.remove(&id);
            info!(distribution = %id, total_shares = %total_shares, "distribution claims assigned");
        }

        debug!(distribution = %id, processed, remaining, "claim batch assigned");
        self.emit(
            now,
            id,
            EventKind::DistributionClaimsAssigned,
            EventPayload::Batch {
                processed: processed as u64,
                remaining: remaining as u64,
                done,
            },
        )?;
        Ok(BatchProgress { processed, remaining, done })
    }

    /// Pull the calculated payout from `funds_source` into engine custody.
    pub fn prime_distribution(
        &mut self,
        auth: &AuthContext,
        id: DistributionId,
        funds_source: &AccountId,
    ) -> DistributionResult<()> {
        let now = self.clock.now();
        let distribution = self.get(id)?;
        self.authorize(auth, &distribution.release_id, now)?;
        if distribution.cancelled {
            return Err(DistributionError::Cancelled(id));
        }
        if !distribution.all_claims_assigned {
            return Err(DistributionError::ClaimsNotAssigned(id));
        }
        if distribution.primed {
            return Err(DistributionError::AlreadyPrimed(id));
        }
        let funding = distribution.calculated_royalties_to_payout.clone();
        let release = distribution.release_id.clone();
        for entry in &funding {
            let available = self.vault.balance_of(&entry.asset, funds_source)?;
            if available < entry.amount {
                return Err(DistributionError::InsufficientFunds {
                    asset: entry.asset.clone(),
                    account: funds_source.clone(),
                    needed: entry.amount,
                    available,
                });
            }
        }

        self.get_mut(id)?.primed = true;
        for entry in funding.iter().filter(|e| e.amount > 0) {
            self.vault
                .move_asset(&entry.asset, funds_source, &self.custody_account, entry.amount)?;
        }

        info!(distribution = %id, source = %funds_source.short_id(), "distribution primed");
        self.emit(
            now,
            id,
            EventKind::DistributionPrimed,
            EventPayload::Distribution {
                release,
                amounts: funding,
            },
        )
    }

    /// Open a primed distribution for claims.
    pub fn activate_distribution(&mut self, auth: &AuthContext, id: DistributionId) -> DistributionResult<()> {
        let now = self.clock.now();
        let distribution = self.get(id)?;
        self.authorize(auth, &distribution.release_id, now)?;
        if distribution.cancelled {
            return Err(DistributionError::Cancelled(id));
        }
        if !distribution.primed {
            return Err(DistributionError::NotPrimed(id));
        }
        if distribution.active {
            return Err(DistributionError::AlreadyActive(id));
        }
        self.get_mut(id)?.active = true;

        info!(distribution = %id, "distribution activated");
        self.emit(now, id, EventKind::DistributionActivated, EventPayload::Empty)
    }

    // ---- Claims ----

    fn check_claimable(&self, id: DistributionId, holder: &AccountId, now: LedgerTime) -> DistributionResult<ClaimRecord> {
        let distribution = self.get(id)?;
        if distribution.cancelled {
            return Err(DistributionError::Cancelled(id));
        }
        if !distribution.active {
            return Err(DistributionError::NotActive(id));
        }
        if let Some(until) = distribution.claimable_until {
            if now.is_after(&until) {
                return Err(DistributionError::ClaimWindowClosed { id, claimable_until: until });
            }
        }
        let store = self.claims.get(&id).ok_or(DistributionError::NotFound(id))?;
        let record = store.get(holder)?.ok_or_else(|| DistributionError::NoClaim {
            id,
            holder: holder.clone(),
        })?;
        if record.claimed {
            return Err(DistributionError::AlreadyClaimed {
                id,
                holder: holder.clone(),
            });
        }
        Ok(record)
    }

    /// Pay the caller's claim in one distribution.
    pub fn claim(&mut self, auth: &AuthContext, id: DistributionId) -> DistributionResult<ClaimReceipt> {
        let now = self.clock.now();
        let holder = auth.caller.clone();
        let record = self.check_claimable(id, &holder, now)?;
        let distribution = self.get(id)?;
        let distributed = checked_accumulate(&distribution.amounts_distributed, &record.amounts)?;
        let release_id = distribution.release_id.clone();

        let store = self.claims.get(&id).ok_or(DistributionError::NotFound(id))?;
        store.mark_claimed(&holder)?;
        self.get_mut(id)?.amounts_distributed = distributed;
        self.unindex_claimant(&holder, id);

        for entry in record.amounts.iter().filter(|e| e.amount > 0) {
            self.vault
                .move_asset(&entry.asset, &self.custody_account, &holder, entry.amount)?;
        }

        debug!(distribution = %id, holder = %holder.short_id(), "claim paid");
        self.emit(
            now,
            id,
            EventKind::Claimed,
            EventPayload::Claim {
                holder: holder.clone(),
                amounts: record.amounts.clone(),
            },
        )?;
        Ok(ClaimReceipt {
            distribution: id,
            release_id,
            holder,
            amounts: record.amounts,
        })
    }

    fn claim_eligible(&mut self, auth: &AuthContext, ids: Vec<DistributionId>) -> DistributionResult<Vec<ClaimReceipt>> {
        let now = self.clock.now();
        let mut receipts = Vec::new();
        for id in ids {
            if self.check_claimable(id, &auth.caller, now).is_err() {
                continue;
            }
            receipts.push(self.claim(auth, id)?);
        }
        Ok(receipts)
    }

    /// Pay every claim the caller can currently collect for one release.
    ///
    /// Distributions that are not claimable are skipped without error.
    pub fn claim_all_by_release(&mut self, auth: &AuthContext, release_id: &ReleaseId) -> DistributionResult<Vec<ClaimReceipt>> {
        let ids = self
            .claimant_distributions(&auth.caller)
            .into_iter()
            .filter(|id| self.distributions.get(id).is_some_and(|d| &d.release_id == release_id))
            .collect();
        self.claim_eligible(auth, ids)
    }

    /// Pay every claim the caller can currently collect.
    pub fn claim_all(&mut self, auth: &AuthContext) -> DistributionResult<Vec<ClaimReceipt>> {
        let ids = self.claimant_distributions(&auth.caller);
        self.claim_eligible(auth, ids)
    }

    fn claimant_distributions(&self, holder: &AccountId) -> Vec<DistributionId> {
        self.by_claimant.get(holder).cloned().unwrap_or_default()
    }

    /// Drop `id` from a holder's open-claim index once nothing is left to collect there.
    fn unindex_claimant(&mut self, holder: &AccountId, id: DistributionId) {
        if let Some(ids) = self.by_claimant.get_mut(holder) {
            ids.retain(|d| *d != id);
            if ids.is_empty() {
                self.by_claimant.remove(holder);
            }
        }
    }

    /// Cancel a distribution and return its unpaid funds.
    ///
    /// An active distribution can only be cancelled once its period has
    /// ended. Returns the refunded amounts (empty if it was never primed).
    pub fn cancel_distribution(
        &mut self,
        auth: &AuthContext,
        id: DistributionId,
        unclaimed_receiver: &AccountId,
    ) -> DistributionResult<Vec<AssetAmount>> {
        let now = self.clock.now();
        let distribution = self.get(id)?;
        self.authorize(auth, &distribution.release_id, now)?;
        if distribution.cancelled {
            return Err(DistributionError::Cancelled(id));
        }
        if distribution.active && now < distribution.end {
            return Err(DistributionError::StillActive { id, end: distribution.end });
        }
        let refund = if distribution.primed {
            distribution.unclaimed()?
        } else {
            Vec::new()
        };

        self.get_mut(id)?.cancelled = true;
        for entry in refund.iter().filter(|e| e.amount > 0) {
            self.vault
                .move_asset(&entry.asset, &self.custody_account, unclaimed_receiver, entry.amount)?;
        }
        self.pending.remove(&id);

        let store = self.claims.get(&id).ok_or(DistributionError::NotFound(id))?;
        let claimants = store.page(0, store.len()?)?;
        for record in claimants.iter().filter(|r| !r.claimed) {
            self.unindex_claimant(&record.holder, id);
        }

        info!(distribution = %id, receiver = %unclaimed_receiver.short_id(), claimants = claimants.len(), "distribution cancelled");
        self.emit(
            now,
            id,
            EventKind::DistributionCancelled,
            EventPayload::Refund {
                receiver: unclaimed_receiver.clone(),
                amounts: refund.clone(),
            },
        )?;
        Ok(refund)
    }

    // ---- Views ----

    pub fn fetch_distribution_by_id(&self, id: DistributionId) -> DistributionResult<&Distribution> {
        self.get(id)
    }

    /// Up to `limit` claim records of a distribution, in assignment order.
    pub fn fetch_distribution_claims(
        &self,
        id: DistributionId,
        cursor: usize,
        limit: usize,
    ) -> DistributionResult<Vec<ClaimRecord>> {
        if limit == 0 {
            return Err(DistributionError::InvalidBatchSize);
        }
        let store = self.claims.get(&id).ok_or(DistributionError::NotFound(id))?;
        Ok(store.page(cursor, limit)?)
    }

    /// A holder's claims across the live distributions of one release.
    pub fn fetch_user_claims_by_release_id(
        &self,
        release_id: &ReleaseId,
        holder: &AccountId,
    ) -> DistributionResult<Vec<(DistributionId, ClaimRecord)>> {
        let mut found = Vec::new();
        let ids = self.by_release.get(release_id).map(Vec::as_slice).unwrap_or_default();
        for &id in ids {
            if self.distributions.get(&id).map_or(true, |d| d.cancelled) {
                continue;
            }
            if let Some(store) = self.claims.get(&id) {
                if let Some(record) = store.get(holder)? {
                    found.push((id, record));
                }
            }
        }
        Ok(found)
    }

    /// Whether `holder` could claim from `id` right now.
    pub fn is_user_claimable(&self, id: DistributionId, holder: &AccountId) -> bool {
        self.check_claimable(id, holder, self.clock.now()).is_ok()
    }

    /// Every distribution of a release, oldest first.
    pub fn distributions_for_release(&self, release_id: &ReleaseId) -> Vec<&Distribution> {
        self.by_release
            .get(release_id)
            .map(|ids| ids.iter().filter_map(|id| self.distributions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Snapshot state of a distribution whose claims are not fully assigned.
    pub fn pending_shares(&self, id: DistributionId) -> Option<&DistributionShares> {
        self.pending.get(&id)
    }
}
