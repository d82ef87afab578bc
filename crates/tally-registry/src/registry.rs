use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use tally_fabric::{EventJournal, EventKind, EventPayload, EventSubject};
use tally_store::{Custody, InMemoryOwnershipStore, OwnershipEntry, OwnershipStore};
use tally_types::{
    AccountId, AssetId, AuthContext, BucketDuration, Clock, GrantScope, LedgerTime, ReleaseId, Role,
};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::period::PeriodPage;
use crate::release::{BatchProgress, Release, ReleaseBook, TokenBalance};
use crate::view::HoldingsView;

/// Lifecycle and balances of every release, plus their ownership histories.
///
/// Mutations take `&mut self`; the host serializes them. Each one checks the
/// caller's grants, validates its preconditions in full, then applies its
/// effects and appends an event to the journal.
pub struct ReleaseRegistry<S: OwnershipStore = InMemoryOwnershipStore> {
    config: RegistryConfig,
    min_bucket_duration: BucketDuration,
    custody_account: AccountId,
    clock: Arc<dyn Clock>,
    vault: Arc<dyn Custody>,
    journal: Arc<EventJournal>,
    books: HashMap<ReleaseId, ReleaseBook<S>>,
}

fn book<'a, S>(books: &'a HashMap<ReleaseId, ReleaseBook<S>>, id: &ReleaseId) -> RegistryResult<&'a ReleaseBook<S>> {
    books.get(id).ok_or_else(|| RegistryError::ReleaseNotFound(id.clone()))
}

fn book_mut<'a, S>(
    books: &'a mut HashMap<ReleaseId, ReleaseBook<S>>,
    id: &ReleaseId,
) -> RegistryResult<&'a mut ReleaseBook<S>> {
    books.get_mut(id).ok_or_else(|| RegistryError::ReleaseNotFound(id.clone()))
}

fn release_payload(release: &Release) -> EventPayload {
    EventPayload::Release {
        total_shares: release.total_shares,
        unassigned_shares: release.unassigned_shares,
        deleted_shares: release.deleted_shares,
    }
}

impl<S: OwnershipStore> ReleaseRegistry<S> {
    pub fn new(
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
        vault: Arc<dyn Custody>,
        journal: Arc<EventJournal>,
    ) -> RegistryResult<Self> {
        let min_bucket_duration = config
            .min_bucket_duration()
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        if config.custody_account.trim().is_empty() {
            return Err(RegistryError::InvalidConfig("custody account label is empty".into()));
        }
        let custody_account = config.custody_account_id();
        Ok(Self {
            config,
            min_bucket_duration,
            custody_account,
            clock,
            vault,
            journal,
            books: HashMap::new(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Account that escrows backing units and deposited shares.
    pub fn custody_account(&self) -> &AccountId {
        &self.custody_account
    }

    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }

    fn authorize(&self, auth: &AuthContext, role: Role, id: &ReleaseId, now: LedgerTime) -> RegistryResult<()> {
        auth.require(role, &GrantScope::Release(id.clone()), now)?;
        Ok(())
    }

    fn emit(&self, at: LedgerTime, id: &ReleaseId, kind: EventKind, payload: EventPayload) -> RegistryResult<()> {
        self.journal.emit(at, EventSubject::Release(id.clone()), kind, payload)?;
        Ok(())
    }

    // ---- Release lifecycle ----

    /// Register a release and escrow its backing units.
    ///
    /// The bucket duration is raised to the configured floor.
    pub fn create_release(
        &mut self,
        auth: &AuthContext,
        id: ReleaseId,
        total_supply: u64,
        bucket_duration: BucketDuration,
    ) -> RegistryResult<Release> {
        let now = self.clock.now();
        self.authorize(auth, Role::ReleaseManager, &id, now)?;
        if self.books.contains_key(&id) {
            return Err(RegistryError::ReleaseExists(id));
        }
        if total_supply == 0 {
            return Err(RegistryError::ZeroAmount);
        }

        self.vault
            .mint(&AssetId::release_units(&id), &self.custody_account, total_supply as u128)?;

        let release = Release {
            id: id.clone(),
            locked: true,
            in_initial_sale: false,
            deleting: false,
            total_shares: total_supply,
            unassigned_shares: total_supply,
            deleted_shares: 0,
            bucket_duration: bucket_duration.at_least(self.min_bucket_duration),
            unlocked_at: None,
            created_at: now,
        };
        self.books.insert(id.clone(), ReleaseBook::open(release.clone()));

        info!(release = %id, total_supply, bucket_secs = release.bucket_duration.secs(), "release created");
        self.emit(now, &id, EventKind::ReleaseCreated, release_payload(&release))?;
        Ok(release)
    }

    /// Credit unassigned shares to holders while the release is locked.
    pub fn assign_shares(&mut self, auth: &AuthContext, id: &ReleaseId, batch: &[(AccountId, u64)]) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::ReleaseManager, id, now)?;
        let book = book_mut(&mut self.books, id)?;
        if book.release.deleting {
            return Err(RegistryError::ReleaseDeleting(id.clone()));
        }
        if !book.release.locked {
            return Err(RegistryError::ReleaseUnlocked(id.clone()));
        }
        if batch.is_empty() {
            return Err(RegistryError::EmptyBatch);
        }
        let mut requested: u64 = 0;
        for (_, amount) in batch {
            if *amount == 0 {
                return Err(RegistryError::ZeroAmount);
            }
            requested = requested.checked_add(*amount).ok_or(RegistryError::Overflow)?;
        }
        if requested > book.release.unassigned_shares {
            return Err(RegistryError::ExceedsUnassigned {
                requested,
                unassigned: book.release.unassigned_shares,
            });
        }

        for (holder, amount) in batch {
            book.credit(holder, *amount, now)?;
        }
        book.release.unassigned_shares -= requested;
        debug!(release = %id, holders = batch.len(), requested, unassigned = book.release.unassigned_shares, "shares assigned");

        for (holder, amount) in batch {
            self.emit(
                now,
                id,
                EventKind::SharesAssigned,
                EventPayload::Assignment {
                    holder: holder.clone(),
                    amount: *amount,
                },
            )?;
        }
        Ok(())
    }

    /// Open a fully assigned release for trading and start bucketed history.
    pub fn unlock_release(&mut self, auth: &AuthContext, id: &ReleaseId) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::ReleaseManager, id, now)?;
        let book = book_mut(&mut self.books, id)?;
        let release = &mut book.release;
        if release.deleting {
            return Err(RegistryError::ReleaseDeleting(id.clone()));
        }
        if !release.locked {
            return Err(RegistryError::ReleaseUnlocked(id.clone()));
        }
        if release.in_initial_sale {
            return Err(RegistryError::InInitialSale(id.clone()));
        }
        if !release.is_fully_assigned() {
            return Err(RegistryError::NotFullyAssigned {
                release: id.clone(),
                unassigned: release.unassigned_shares,
            });
        }
        release.locked = false;
        release.unlocked_at = Some(now);

        info!(release = %id, at = %now, "release unlocked");
        self.emit(now, id, EventKind::ReleaseUnlocked, EventPayload::Empty)
    }

    pub fn start_initial_sale(&mut self, auth: &AuthContext, id: &ReleaseId) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::ReleaseManager, id, now)?;
        let release = &mut book_mut(&mut self.books, id)?.release;
        if release.deleting {
            return Err(RegistryError::ReleaseDeleting(id.clone()));
        }
        if !release.locked {
            return Err(RegistryError::ReleaseUnlocked(id.clone()));
        }
        if release.in_initial_sale {
            return Err(RegistryError::InInitialSale(id.clone()));
        }
        if !release.is_fully_assigned() {
            return Err(RegistryError::NotFullyAssigned {
                release: id.clone(),
                unassigned: release.unassigned_shares,
            });
        }
        release.in_initial_sale = true;

        info!(release = %id, "initial sale started");
        self.emit(now, id, EventKind::InitialSaleStarted, EventPayload::Empty)
    }

    /// Close the initial sale and unlock the release.
    pub fn end_initial_sale(&mut self, auth: &AuthContext, id: &ReleaseId) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::ReleaseManager, id, now)?;
        let release = &mut book_mut(&mut self.books, id)?.release;
        if !release.in_initial_sale {
            return Err(RegistryError::NotInInitialSale(id.clone()));
        }
        release.in_initial_sale = false;
        release.locked = false;
        release.unlocked_at = Some(now);

        info!(release = %id, at = %now, "initial sale ended, release unlocked");
        self.emit(now, id, EventKind::InitialSaleEnded, EventPayload::Empty)
    }

    /// Abort the initial sale; the release stays locked.
    pub fn cancel_initial_sale(&mut self, auth: &AuthContext, id: &ReleaseId) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::ReleaseManager, id, now)?;
        let release = &mut book_mut(&mut self.books, id)?.release;
        if !release.in_initial_sale {
            return Err(RegistryError::NotInInitialSale(id.clone()));
        }
        release.in_initial_sale = false;

        info!(release = %id, "initial sale cancelled");
        self.emit(now, id, EventKind::InitialSaleCancelled, EventPayload::Empty)
    }

    /// Remove up to `batch_size` live holders of a locked release.
    ///
    /// The first call marks the release as deleting. Once no live holder is
    /// left the backing units are burned and the release is dropped; the
    /// returned progress then reports `done`.
    pub fn batch_delete_release(
        &mut self,
        auth: &AuthContext,
        id: &ReleaseId,
        batch_size: usize,
    ) -> RegistryResult<BatchProgress> {
        let now = self.clock.now();
        self.authorize(auth, Role::ReleaseManager, id, now)?;
        if batch_size == 0 {
            return Err(RegistryError::InvalidBatchSize);
        }
        let book = book_mut(&mut self.books, id)?;
        if !book.release.locked {
            return Err(RegistryError::ReleaseUnlocked(id.clone()));
        }
        if book.release.in_initial_sale {
            return Err(RegistryError::InInitialSale(id.clone()));
        }
        if !book.release.deleting {
            info!(release = %id, holders = book.balances.len(), "release deletion started");
        }
        book.release.deleting = true;

        let victims: Vec<(AccountId, u64)> = book
            .balances
            .iter()
            .take(batch_size)
            .map(|(holder, balance)| (holder.clone(), balance.amount))
            .collect();
        let mut removed: u64 = 0;
        for (holder, _) in &victims {
            book.history.delete_all(holder)?;
        }
        for (holder, amount) in &victims {
            book.balances.remove(holder);
            removed = removed.checked_add(*amount).ok_or(RegistryError::Overflow)?;
        }
        book.release.deleted_shares = book
            .release
            .deleted_shares
            .checked_add(removed)
            .ok_or(RegistryError::Overflow)?;

        let progress = BatchProgress {
            processed: victims.len(),
            remaining: book.balances.len(),
            done: book.balances.is_empty(),
        };
        let total_supply = book.release.total_shares;
        debug!(release = %id, processed = progress.processed, remaining = progress.remaining, removed, "holders removed");
        self.emit(
            now,
            id,
            EventKind::HoldersRemoved,
            EventPayload::Batch {
                processed: progress.processed as u64,
                remaining: progress.remaining as u64,
                done: progress.done,
            },
        )?;

        if progress.done {
            self.vault
                .burn(&AssetId::release_units(id), &self.custody_account, total_supply as u128)?;
            self.books.remove(id);
            info!(release = %id, "release deleted");
            self.emit(now, id, EventKind::ReleaseDeleted, EventPayload::Empty)?;
        }
        Ok(progress)
    }

    // ---- Exchange-facing transfers ----

    /// Move `amount` from a holder into registry custody.
    pub fn deposit(&mut self, auth: &AuthContext, id: &ReleaseId, holder: &AccountId, amount: u64) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::Exchange, id, now)?;
        let custody = self.custody_account.clone();
        self.move_unlocked(id, holder, &custody, amount, now)?;

        debug!(release = %id, holder = %holder.short_id(), amount, "deposited");
        self.emit(
            now,
            id,
            EventKind::Deposited,
            EventPayload::Transfer {
                from: Some(holder.clone()),
                to: None,
                amount,
            },
        )
    }

    /// Move `amount` out of registry custody to a holder.
    pub fn withdraw(&mut self, auth: &AuthContext, id: &ReleaseId, holder: &AccountId, amount: u64) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::Exchange, id, now)?;
        let custody = self.custody_account.clone();
        self.move_unlocked(id, &custody, holder, amount, now)?;

        debug!(release = %id, holder = %holder.short_id(), amount, "withdrawn");
        self.emit(
            now,
            id,
            EventKind::Withdrawn,
            EventPayload::Transfer {
                from: None,
                to: Some(holder.clone()),
                amount,
            },
        )
    }

    /// Move unreserved shares between two holders of an unlocked release.
    pub fn transfer_ownership(
        &mut self,
        auth: &AuthContext,
        id: &ReleaseId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::Exchange, id, now)?;
        self.move_unlocked(id, from, to, amount, now)?;

        debug!(release = %id, from = %from.short_id(), to = %to.short_id(), amount, "ownership transferred");
        self.emit(
            now,
            id,
            EventKind::Transferred,
            EventPayload::Transfer {
                from: Some(from.clone()),
                to: Some(to.clone()),
                amount,
            },
        )
    }

    fn move_unlocked(
        &mut self,
        id: &ReleaseId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
        now: LedgerTime,
    ) -> RegistryResult<()> {
        let book = book_mut(&mut self.books, id)?;
        if book.release.locked {
            return Err(RegistryError::ReleaseLocked(id.clone()));
        }
        if book.release.deleting {
            return Err(RegistryError::ReleaseDeleting(id.clone()));
        }
        if amount == 0 {
            return Err(RegistryError::ZeroAmount);
        }
        if from == to {
            return Err(RegistryError::SelfTransfer);
        }
        let available = book.balance(from).available();
        if amount > available {
            return Err(RegistryError::ExceedsAvailable {
                holder: from.clone(),
                requested: amount,
                available,
            });
        }
        book.debit(from, amount, now)?;
        book.credit(to, amount, now)?;
        Ok(())
    }

    /// Settle an initial-sale trade.
    ///
    /// Reserved shares may be sold; the seller's reservation shrinks by the
    /// part of it the sale consumed.
    pub fn transfer_ownership_initial_sale(
        &mut self,
        auth: &AuthContext,
        id: &ReleaseId,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::Exchange, id, now)?;
        let book = book_mut(&mut self.books, id)?;
        if !book.release.in_initial_sale {
            return Err(RegistryError::NotInInitialSale(id.clone()));
        }
        if amount == 0 {
            return Err(RegistryError::ZeroAmount);
        }
        if from == to {
            return Err(RegistryError::SelfTransfer);
        }
        let seller = book.balance(from);
        if amount > seller.amount {
            return Err(RegistryError::InsufficientBalance {
                holder: from.clone(),
                requested: amount,
                balance: seller.amount,
            });
        }

        book.debit(from, amount, now)?;
        if let Some(balance) = book.balances.get_mut(from) {
            balance.locked_amount = seller.locked_amount - seller.locked_amount.min(amount);
        }
        book.credit(to, amount, now)?;

        debug!(release = %id, from = %from.short_id(), to = %to.short_id(), amount, "initial sale transfer");
        self.emit(
            now,
            id,
            EventKind::Transferred,
            EventPayload::Transfer {
                from: Some(from.clone()),
                to: Some(to.clone()),
                amount,
            },
        )
    }

    /// Reserve `amount` of a holder's available shares.
    pub fn lock_tokens(&mut self, auth: &AuthContext, id: &ReleaseId, holder: &AccountId, amount: u64) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::Exchange, id, now)?;
        let book = book_mut(&mut self.books, id)?;
        if book.release.deleting {
            return Err(RegistryError::ReleaseDeleting(id.clone()));
        }
        if amount == 0 {
            return Err(RegistryError::ZeroAmount);
        }
        let balance = book.balance(holder);
        if amount > balance.available() {
            return Err(RegistryError::ExceedsAvailable {
                holder: holder.clone(),
                requested: amount,
                available: balance.available(),
            });
        }
        let locked_total = balance.locked_amount + amount;
        if let Some(row) = book.balances.get_mut(holder) {
            row.locked_amount = locked_total;
        }

        debug!(release = %id, holder = %holder.short_id(), amount, locked_total, "tokens locked");
        self.emit(
            now,
            id,
            EventKind::TokensLocked,
            EventPayload::Reservation {
                holder: holder.clone(),
                amount,
                locked_total,
            },
        )
    }

    /// Release `amount` of a holder's reservation.
    pub fn unlock_tokens(&mut self, auth: &AuthContext, id: &ReleaseId, holder: &AccountId, amount: u64) -> RegistryResult<()> {
        let now = self.clock.now();
        self.authorize(auth, Role::Exchange, id, now)?;
        let book = book_mut(&mut self.books, id)?;
        if amount == 0 {
            return Err(RegistryError::ZeroAmount);
        }
        let balance = book.balance(holder);
        if amount > balance.locked_amount {
            return Err(RegistryError::ExceedsLocked {
                holder: holder.clone(),
                requested: amount,
                locked: balance.locked_amount,
            });
        }
        let locked_total = balance.locked_amount - amount;
        if let Some(row) = book.balances.get_mut(holder) {
            row.locked_amount = locked_total;
        }

        debug!(release = %id, holder = %holder.short_id(), amount, locked_total, "tokens unlocked");
        self.emit(
            now,
            id,
            EventKind::TokensUnlocked,
            EventPayload::Reservation {
                holder: holder.clone(),
                amount,
                locked_total,
            },
        )
    }

    // ---- Views ----

    pub fn release(&self, id: &ReleaseId) -> RegistryResult<&Release> {
        Ok(&book(&self.books, id)?.release)
    }

    pub fn release_exists(&self, id: &ReleaseId) -> bool {
        self.books.contains_key(id)
    }

    pub fn is_fully_assigned(&self, id: &ReleaseId) -> RegistryResult<bool> {
        Ok(book(&self.books, id)?.release.is_fully_assigned())
    }

    /// All releases, in no particular order.
    pub fn releases(&self) -> impl Iterator<Item = &Release> {
        self.books.values().map(|b| &b.release)
    }

    pub fn balance_of(&self, id: &ReleaseId, holder: &AccountId) -> RegistryResult<TokenBalance> {
        Ok(book(&self.books, id)?.balance(holder))
    }

    /// Balance minus reservations.
    pub fn available_balance(&self, id: &ReleaseId, holder: &AccountId) -> RegistryResult<u64> {
        Ok(book(&self.books, id)?.balance(holder).available())
    }

    /// Live holders and their balances, ordered by account id.
    pub fn holders(&self, id: &ReleaseId) -> RegistryResult<Vec<(AccountId, TokenBalance)>> {
        Ok(book(&self.books, id)?
            .balances
            .iter()
            .map(|(holder, balance)| (holder.clone(), *balance))
            .collect())
    }

    pub fn ownership_history(&self, id: &ReleaseId, holder: &AccountId) -> RegistryResult<Vec<OwnershipEntry>> {
        Ok(book(&self.books, id)?.history.history(holder)?)
    }

    /// Verify that held, unassigned and deleted shares add up to the supply.
    pub fn check_conservation(&self, id: &ReleaseId) -> RegistryResult<()> {
        let entry = book(&self.books, id)?;
        let release = &entry.release;
        let held = entry.held_shares();
        let accounted = held + release.unassigned_shares as u128 + release.deleted_shares as u128;
        if accounted != release.total_shares as u128 {
            warn!(release = %id, held = %held, total = release.total_shares, "conservation violated");
            return Err(RegistryError::ConservationViolated {
                release: id.clone(),
                held,
                unassigned: release.unassigned_shares,
                deleted: release.deleted_shares,
                total: release.total_shares,
            });
        }
        Ok(())
    }

    /// One page of time-weighted holdings over `[start, end)`.
    pub fn shares_in_period(
        &self,
        id: &ReleaseId,
        start: LedgerTime,
        end: LedgerTime,
        cursor: usize,
        limit: usize,
    ) -> RegistryResult<PeriodPage> {
        book(&self.books, id)?.shares_in_period(start, end, cursor, limit)
    }
}

impl<S: OwnershipStore> HoldingsView for ReleaseRegistry<S> {
    fn release_exists(&self, id: &ReleaseId) -> bool {
        ReleaseRegistry::release_exists(self, id)
    }

    fn is_fully_assigned(&self, id: &ReleaseId) -> RegistryResult<bool> {
        ReleaseRegistry::is_fully_assigned(self, id)
    }

    fn is_deleting(&self, id: &ReleaseId) -> RegistryResult<bool> {
        Ok(self.release(id)?.deleting)
    }

    fn shares_in_period(
        &self,
        id: &ReleaseId,
        start: LedgerTime,
        end: LedgerTime,
        cursor: usize,
        limit: usize,
    ) -> RegistryResult<PeriodPage> {
        ReleaseRegistry::shares_in_period(self, id, start, end, cursor, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tally_store::InMemoryVault;
    use tally_types::ManualClock;

    const BUCKET: u64 = 600;

    struct Fixture {
        clock: Arc<ManualClock>,
        vault: Arc<InMemoryVault>,
        journal: Arc<EventJournal>,
        registry: ReleaseRegistry,
        manager: AuthContext,
        exchange: AuthContext,
        id: ReleaseId,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(LedgerTime::zero()));
        let vault = Arc::new(InMemoryVault::new());
        let journal = Arc::new(EventJournal::default());
        let registry =
            ReleaseRegistry::new(RegistryConfig::default(), clock.clone(), vault.clone(), journal.clone()).unwrap();
        Fixture {
            clock,
            vault,
            journal,
            registry,
            manager: AuthContext::with_role(AccountId::from_label("label"), Role::ReleaseManager),
            exchange: AuthContext::with_role(AccountId::from_label("exchange"), Role::Exchange),
            id: ReleaseId::new("debut-album").unwrap(),
        }
    }

    fn acct(label: &str) -> AccountId {
        AccountId::from_label(label)
    }

    fn bucket() -> BucketDuration {
        BucketDuration::from_secs(BUCKET).unwrap()
    }

    /// Release of 1000 shares split 600/400 between alice and bob.
    fn assigned(f: &mut Fixture) {
        f.registry.create_release(&f.manager, f.id.clone(), 1_000, bucket()).unwrap();
        f.registry
            .assign_shares(&f.manager, &f.id, &[(acct("alice"), 600), (acct("bob"), 400)])
            .unwrap();
    }

    fn unlocked(f: &mut Fixture) {
        assigned(f);
        f.registry.unlock_release(&f.manager, &f.id).unwrap();
    }

    #[test]
    fn create_escrows_backing_units() {
        let mut f = fixture();
        let release = f.registry.create_release(&f.manager, f.id.clone(), 1_000, bucket()).unwrap();
        assert!(release.locked);
        assert_eq!(release.unassigned_shares, 1_000);
        let units = AssetId::release_units(&f.id);
        assert_eq!(f.vault.balance_of(&units, f.registry.custody_account()).unwrap(), 1_000);
        assert_eq!(f.vault.total_supply(&units).unwrap(), 1_000);
    }

    #[test]
    fn create_applies_bucket_floor() {
        let mut f = fixture();
        let short = BucketDuration::from_secs(60).unwrap();
        let release = f.registry.create_release(&f.manager, f.id.clone(), 10, short).unwrap();
        assert_eq!(release.bucket_duration.secs(), 600);
    }

    #[test]
    fn create_rejects_duplicates_and_zero_supply() {
        let mut f = fixture();
        f.registry.create_release(&f.manager, f.id.clone(), 10, bucket()).unwrap();
        let err = f.registry.create_release(&f.manager, f.id.clone(), 10, bucket()).unwrap_err();
        assert_eq!(err, RegistryError::ReleaseExists(f.id.clone()));

        let other = ReleaseId::new("other").unwrap();
        let err = f.registry.create_release(&f.manager, other, 0, bucket()).unwrap_err();
        assert_eq!(err, RegistryError::ZeroAmount);
    }

    #[test]
    fn create_requires_release_manager() {
        let mut f = fixture();
        let err = f
            .registry
            .create_release(&f.exchange, f.id.clone(), 10, bucket())
            .unwrap_err();
        assert!(matches!(err, RegistryError::Access(_)));
        assert_eq!(err.kind(), tally_types::ErrorKind::Permission);
        assert!(!f.registry.release_exists(&f.id));
    }

    #[test]
    fn scoped_grant_only_covers_its_release() {
        let mut f = fixture();
        let scoped = AuthContext::holder(acct("label")).grant(tally_types::Grant {
            role: Role::ReleaseManager,
            scope: GrantScope::Release(f.id.clone()),
            granted_at: LedgerTime::zero(),
            expires_at: None,
        });
        f.registry.create_release(&scoped, f.id.clone(), 10, bucket()).unwrap();
        let other = ReleaseId::new("other").unwrap();
        assert!(f.registry.create_release(&scoped, other, 10, bucket()).is_err());
    }

    #[test]
    fn over_assignment_is_rejected_atomically() {
        let mut f = fixture();
        f.registry.create_release(&f.manager, f.id.clone(), 100, bucket()).unwrap();
        let err = f
            .registry
            .assign_shares(&f.manager, &f.id, &[(acct("alice"), 60), (acct("bob"), 41)])
            .unwrap_err();
        assert_eq!(err, RegistryError::ExceedsUnassigned { requested: 101, unassigned: 100 });
        assert_eq!(f.registry.balance_of(&f.id, &acct("alice")).unwrap().amount, 0);
        assert!(f.registry.ownership_history(&f.id, &acct("alice")).unwrap().is_empty());
    }

    #[test]
    fn assignment_rejects_zero_amounts_and_empty_batches() {
        let mut f = fixture();
        f.registry.create_release(&f.manager, f.id.clone(), 100, bucket()).unwrap();
        assert_eq!(
            f.registry.assign_shares(&f.manager, &f.id, &[]).unwrap_err(),
            RegistryError::EmptyBatch
        );
        assert_eq!(
            f.registry
                .assign_shares(&f.manager, &f.id, &[(acct("alice"), 10), (acct("bob"), 0)])
                .unwrap_err(),
            RegistryError::ZeroAmount
        );
    }

    #[test]
    fn unlock_requires_full_assignment() {
        let mut f = fixture();
        f.registry.create_release(&f.manager, f.id.clone(), 1_000, bucket()).unwrap();
        f.registry.assign_shares(&f.manager, &f.id, &[(acct("alice"), 999)]).unwrap();
        let err = f.registry.unlock_release(&f.manager, &f.id).unwrap_err();
        assert_eq!(err, RegistryError::NotFullyAssigned { release: f.id.clone(), unassigned: 1 });

        f.registry.assign_shares(&f.manager, &f.id, &[(acct("bob"), 1)]).unwrap();
        f.clock.set(LedgerTime::from_secs(1_250));
        f.registry.unlock_release(&f.manager, &f.id).unwrap();
        let release = f.registry.release(&f.id).unwrap();
        assert!(!release.locked);
        assert_eq!(release.unlocked_at, Some(LedgerTime::from_secs(1_250)));

        let err = f.registry.unlock_release(&f.manager, &f.id).unwrap_err();
        assert_eq!(err, RegistryError::ReleaseUnlocked(f.id.clone()));
    }

    #[test]
    fn assignment_after_unlock_is_rejected() {
        let mut f = fixture();
        unlocked(&mut f);
        let err = f
            .registry
            .assign_shares(&f.manager, &f.id, &[(acct("carol"), 1)])
            .unwrap_err();
        assert_eq!(err, RegistryError::ReleaseUnlocked(f.id.clone()));
    }

    #[test]
    fn transfer_respects_reservations() {
        let mut f = fixture();
        unlocked(&mut f);
        f.registry.lock_tokens(&f.exchange, &f.id, &acct("alice"), 500).unwrap();
        assert_eq!(f.registry.available_balance(&f.id, &acct("alice")).unwrap(), 100);

        let err = f
            .registry
            .transfer_ownership(&f.exchange, &f.id, &acct("alice"), &acct("bob"), 101)
            .unwrap_err();
        assert!(matches!(err, RegistryError::ExceedsAvailable { requested: 101, available: 100, .. }));

        f.registry
            .transfer_ownership(&f.exchange, &f.id, &acct("alice"), &acct("bob"), 100)
            .unwrap();
        assert_eq!(f.registry.balance_of(&f.id, &acct("bob")).unwrap().amount, 500);
        f.registry.check_conservation(&f.id).unwrap();
    }

    #[test]
    fn transfer_requires_unlocked_release_and_exchange_role() {
        let mut f = fixture();
        assigned(&mut f);
        let err = f
            .registry
            .transfer_ownership(&f.exchange, &f.id, &acct("alice"), &acct("bob"), 1)
            .unwrap_err();
        assert_eq!(err, RegistryError::ReleaseLocked(f.id.clone()));

        f.registry.unlock_release(&f.manager, &f.id).unwrap();
        let err = f
            .registry
            .transfer_ownership(&f.manager, &f.id, &acct("alice"), &acct("bob"), 1)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Access(_)));
        let err = f
            .registry
            .transfer_ownership(&f.exchange, &f.id, &acct("alice"), &acct("alice"), 1)
            .unwrap_err();
        assert_eq!(err, RegistryError::SelfTransfer);
    }

    #[test]
    fn deposit_and_withdraw_round_trip_through_custody() {
        let mut f = fixture();
        unlocked(&mut f);
        let custody = f.registry.custody_account().clone();

        f.registry.deposit(&f.exchange, &f.id, &acct("alice"), 250).unwrap();
        assert_eq!(f.registry.balance_of(&f.id, &acct("alice")).unwrap().amount, 350);
        assert_eq!(f.registry.balance_of(&f.id, &custody).unwrap().amount, 250);

        let err = f
            .registry
            .withdraw(&f.exchange, &f.id, &acct("carol"), 251)
            .unwrap_err();
        assert!(matches!(err, RegistryError::ExceedsAvailable { available: 250, .. }));

        f.registry.withdraw(&f.exchange, &f.id, &acct("carol"), 250).unwrap();
        assert_eq!(f.registry.balance_of(&f.id, &acct("carol")).unwrap().amount, 250);
        assert_eq!(f.registry.balance_of(&f.id, &custody).unwrap().amount, 0);
        f.registry.check_conservation(&f.id).unwrap();
    }

    #[test]
    fn unlock_tokens_cannot_exceed_reservation() {
        let mut f = fixture();
        unlocked(&mut f);
        f.registry.lock_tokens(&f.exchange, &f.id, &acct("bob"), 100).unwrap();
        let err = f.registry.unlock_tokens(&f.exchange, &f.id, &acct("bob"), 101).unwrap_err();
        assert!(matches!(err, RegistryError::ExceedsLocked { locked: 100, .. }));
        f.registry.unlock_tokens(&f.exchange, &f.id, &acct("bob"), 100).unwrap();
        assert_eq!(f.registry.available_balance(&f.id, &acct("bob")).unwrap(), 400);

        let err = f.registry.lock_tokens(&f.exchange, &f.id, &acct("bob"), 401).unwrap_err();
        assert!(matches!(err, RegistryError::ExceedsAvailable { available: 400, .. }));
    }

    #[test]
    fn initial_sale_sells_reserved_shares() {
        let mut f = fixture();
        assigned(&mut f);
        f.registry.start_initial_sale(&f.manager, &f.id).unwrap();
        f.registry.lock_tokens(&f.exchange, &f.id, &acct("alice"), 300).unwrap();

        f.registry
            .transfer_ownership_initial_sale(&f.exchange, &f.id, &acct("alice"), &acct("carol"), 200)
            .unwrap();
        let alice = f.registry.balance_of(&f.id, &acct("alice")).unwrap();
        assert_eq!(alice, TokenBalance { amount: 400, locked_amount: 100 });

        let err = f
            .registry
            .transfer_ownership_initial_sale(&f.exchange, &f.id, &acct("alice"), &acct("carol"), 401)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InsufficientBalance { balance: 400, .. }));

        // Still locked, so the buyer's history is pre-unlock.
        assert_eq!(
            f.registry.ownership_history(&f.id, &acct("carol")).unwrap(),
            vec![OwnershipEntry::pre_unlock(200)]
        );

        f.clock.set(LedgerTime::from_secs(3_000));
        f.registry.end_initial_sale(&f.manager, &f.id).unwrap();
        let release = f.registry.release(&f.id).unwrap();
        assert!(!release.locked && !release.in_initial_sale);
        assert_eq!(release.unlocked_at, Some(LedgerTime::from_secs(3_000)));
        f.registry.check_conservation(&f.id).unwrap();
    }

    #[test]
    fn initial_sale_transfer_outside_sale_fails() {
        let mut f = fixture();
        assigned(&mut f);
        let err = f
            .registry
            .transfer_ownership_initial_sale(&f.exchange, &f.id, &acct("alice"), &acct("carol"), 1)
            .unwrap_err();
        assert_eq!(err, RegistryError::NotInInitialSale(f.id.clone()));
    }

    #[test]
    fn cancelled_sale_stays_locked() {
        let mut f = fixture();
        assigned(&mut f);
        f.registry.start_initial_sale(&f.manager, &f.id).unwrap();
        assert_eq!(
            f.registry.unlock_release(&f.manager, &f.id).unwrap_err(),
            RegistryError::InInitialSale(f.id.clone())
        );
        f.registry.cancel_initial_sale(&f.manager, &f.id).unwrap();
        let release = f.registry.release(&f.id).unwrap();
        assert!(release.locked && !release.in_initial_sale);
        assert_eq!(
            f.registry.cancel_initial_sale(&f.manager, &f.id).unwrap_err(),
            RegistryError::NotInInitialSale(f.id.clone())
        );
    }

    #[test]
    fn batched_delete_is_resumable() {
        let mut f = fixture();
        f.registry.create_release(&f.manager, f.id.clone(), 500, bucket()).unwrap();
        let batch: Vec<_> = (0..5).map(|i| (acct(&format!("h{i}")), 100)).collect();
        f.registry.assign_shares(&f.manager, &f.id, &batch).unwrap();

        let first = f.registry.batch_delete_release(&f.manager, &f.id, 2).unwrap();
        assert_eq!(first, BatchProgress { processed: 2, remaining: 3, done: false });
        let release = f.registry.release(&f.id).unwrap();
        assert!(release.deleting);
        assert_eq!(release.deleted_shares, 200);
        f.registry.check_conservation(&f.id).unwrap();

        // Deleting blocks new assignments.
        assert_eq!(
            f.registry.assign_shares(&f.manager, &f.id, &[(acct("x"), 1)]).unwrap_err(),
            RegistryError::ReleaseDeleting(f.id.clone())
        );

        let second = f.registry.batch_delete_release(&f.manager, &f.id, 2).unwrap();
        assert_eq!(second.remaining, 1);
        let last = f.registry.batch_delete_release(&f.manager, &f.id, 2).unwrap();
        assert_eq!(last, BatchProgress { processed: 1, remaining: 0, done: true });

        assert!(!f.registry.release_exists(&f.id));
        let units = AssetId::release_units(&f.id);
        assert_eq!(f.vault.total_supply(&units).unwrap(), 0);
        assert_eq!(
            f.registry.batch_delete_release(&f.manager, &f.id, 2).unwrap_err(),
            RegistryError::ReleaseNotFound(f.id.clone())
        );
    }

    #[test]
    fn unlocked_release_cannot_be_deleted() {
        let mut f = fixture();
        unlocked(&mut f);
        assert_eq!(
            f.registry.batch_delete_release(&f.manager, &f.id, 10).unwrap_err(),
            RegistryError::ReleaseUnlocked(f.id.clone())
        );
        assert_eq!(
            f.registry.batch_delete_release(&f.manager, &f.id, 0).unwrap_err(),
            RegistryError::InvalidBatchSize
        );
    }

    #[test]
    fn period_query_requires_unlock() {
        let mut f = fixture();
        assigned(&mut f);
        let err = f
            .registry
            .shares_in_period(&f.id, LedgerTime::zero(), LedgerTime::from_secs(6_000), 0, 10)
            .unwrap_err();
        assert_eq!(err, RegistryError::ReleaseLocked(f.id.clone()));
    }

    #[test]
    fn period_query_pages_through_holders() {
        let mut f = fixture();
        unlocked(&mut f);
        f.clock.set(LedgerTime::from_secs(5 * BUCKET));
        f.registry
            .transfer_ownership(&f.exchange, &f.id, &acct("bob"), &acct("carol"), 400)
            .unwrap();

        let end = LedgerTime::from_secs(10 * BUCKET);
        let page = f.registry.shares_in_period(&f.id, LedgerTime::zero(), end, 0, 2).unwrap();
        assert!(page.has_more);
        assert_eq!(page.next_cursor, 2);
        assert_eq!(page.remaining, 1);
        assert_eq!(page.user_shares[0].shares, 6_000);
        assert_eq!(page.user_shares[1].shares, 2_000);

        let rest = f.registry.shares_in_period(&f.id, LedgerTime::zero(), end, 2, 2).unwrap();
        assert!(!rest.has_more);
        assert_eq!(rest.next_cursor, 3);
        assert_eq!(rest.remaining, 0);
        assert_eq!(rest.user_shares, vec![crate::HolderShares { holder: acct("carol"), shares: 2_000 }]);
        assert_eq!(page.total_shares + rest.total_shares, 10_000);

        assert_eq!(
            f.registry.shares_in_period(&f.id, LedgerTime::zero(), end, 0, 0).unwrap_err(),
            RegistryError::InvalidBatchSize
        );
    }

    #[test]
    fn every_transition_is_journaled() {
        let mut f = fixture();
        unlocked(&mut f);
        f.registry.deposit(&f.exchange, &f.id, &acct("alice"), 1).unwrap();
        let kinds: Vec<_> = f.journal.events().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ReleaseCreated,
                EventKind::SharesAssigned,
                EventKind::SharesAssigned,
                EventKind::ReleaseUnlocked,
                EventKind::Deposited,
            ]
        );
        f.journal.verify().unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RegistryConfig {
            min_bucket_duration_secs: 0,
            ..Default::default()
        };
        let result = ReleaseRegistry::<InMemoryOwnershipStore>::new(
            config,
            Arc::new(ManualClock::default()),
            Arc::new(InMemoryVault::new()),
            Arc::new(EventJournal::default()),
        );
        assert!(matches!(result, Err(RegistryError::InvalidConfig(_))));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Transfer { from: usize, to: usize, amount: u64 },
        Deposit { holder: usize, amount: u64 },
        Withdraw { holder: usize, amount: u64 },
        Lock { holder: usize, amount: u64 },
        Advance(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..4, 0usize..4, 1u64..400).prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
            (0usize..4, 1u64..300).prop_map(|(holder, amount)| Op::Deposit { holder, amount }),
            (0usize..4, 1u64..300).prop_map(|(holder, amount)| Op::Withdraw { holder, amount }),
            (0usize..4, 1u64..200).prop_map(|(holder, amount)| Op::Lock { holder, amount }),
            (1u64..2_000).prop_map(Op::Advance),
        ]
    }

    proptest! {
        #[test]
        fn shares_are_conserved_under_any_trading(ops in proptest::collection::vec(op(), 1..60)) {
            let mut f = fixture();
            unlocked(&mut f);
            let names = ["alice", "bob", "carol", "dave"];
            for op in ops {
                // Rejected operations are fine; they must simply leave no trace.
                let _ = match op {
                    Op::Transfer { from, to, amount } => f.registry.transfer_ownership(
                        &f.exchange, &f.id, &acct(names[from]), &acct(names[to]), amount),
                    Op::Deposit { holder, amount } => f.registry.deposit(&f.exchange, &f.id, &acct(names[holder]), amount),
                    Op::Withdraw { holder, amount } => f.registry.withdraw(&f.exchange, &f.id, &acct(names[holder]), amount),
                    Op::Lock { holder, amount } => f.registry.lock_tokens(&f.exchange, &f.id, &acct(names[holder]), amount),
                    Op::Advance(secs) => {
                        f.clock.advance(secs);
                        Ok(())
                    }
                };
                prop_assert!(f.registry.check_conservation(&f.id).is_ok());
                for (holder, balance) in f.registry.holders(&f.id).unwrap() {
                    prop_assert!(balance.locked_amount <= balance.amount);
                    let last = f.registry.ownership_history(&f.id, &holder).unwrap().last().copied();
                    prop_assert_eq!(last.map(|e| e.amount), Some(balance.amount));
                }
            }
        }
    }
}
