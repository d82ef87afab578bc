use std::sync::Arc;

use tracing::info;

use tally_distribution::{BatchStep, Distribution, DistributionEngine};
use tally_fabric::{EventFilter, EventJournal, EventStream, LedgerEvent};
use tally_registry::{BatchProgress, ReleaseRegistry};
use tally_store::{ClaimRecord, InMemoryVault};
use tally_types::{AccountId, AssetAmount, AuthContext, Clock, DistributionId, LedgerTime, ReleaseId, SystemClock};

use crate::config::TallyConfig;
use crate::error::SdkResult;

/// Outcome of [`Tally::drive_distribution`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DriveReport {
    pub share_batches: usize,
    pub claim_batches: usize,
    /// Claim records written by this call.
    pub claims_written: usize,
    pub primed: bool,
    pub activated: bool,
}

/// High-level Tally API.
///
/// Owns one clock, custody vault and event journal, shared by a release
/// registry and a distribution engine.
pub struct Tally {
    config: TallyConfig,
    clock: Arc<dyn Clock>,
    vault: Arc<InMemoryVault>,
    journal: Arc<EventJournal>,
    registry: ReleaseRegistry,
    engine: DistributionEngine,
}

impl Tally {
    /// Build a ledger on the wall clock.
    pub fn init(config: TallyConfig) -> SdkResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: TallyConfig, clock: Arc<dyn Clock>) -> SdkResult<Self> {
        let vault = Arc::new(InMemoryVault::new());
        let journal = Arc::new(EventJournal::new(config.journal_capacity));
        let registry = ReleaseRegistry::new(config.registry.clone(), clock.clone(), vault.clone(), journal.clone())?;
        let engine = DistributionEngine::new(config.distribution.clone(), clock.clone(), vault.clone(), journal.clone())?;
        Ok(Self {
            config,
            clock,
            vault,
            journal,
            registry,
            engine,
        })
    }

    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    pub fn now(&self) -> LedgerTime {
        self.clock.now()
    }

    pub fn vault(&self) -> &InMemoryVault {
        &self.vault
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn registry(&self) -> &ReleaseRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ReleaseRegistry {
        &mut self.registry
    }

    pub fn engine(&self) -> &DistributionEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DistributionEngine {
        &mut self.engine
    }

    // ---- Operations that need both halves ----

    pub fn create_distribution(
        &mut self,
        auth: &AuthContext,
        release_id: &ReleaseId,
        start: LedgerTime,
        end: LedgerTime,
        claimable_until: Option<LedgerTime>,
        asset_amounts: Vec<AssetAmount>,
    ) -> SdkResult<Distribution> {
        Ok(self.engine.create_distribution(
            auth,
            &self.registry,
            release_id,
            start,
            end,
            claimable_until,
            asset_amounts,
        )?)
    }

    pub fn init_shares_batched(&mut self, auth: &AuthContext, id: DistributionId, batch_size: usize) -> SdkResult<BatchStep> {
        Ok(self.engine.init_shares_batched(auth, &self.registry, id, batch_size)?)
    }

    /// Run a distribution through every remaining phase up to active.
    ///
    /// Picks up wherever earlier calls left off, using the configured batch
    /// sizes for the snapshot and claim phases.
    pub fn drive_distribution(
        &mut self,
        auth: &AuthContext,
        id: DistributionId,
        funds_source: &AccountId,
    ) -> SdkResult<DriveReport> {
        let mut report = DriveReport::default();
        let batch = self.config.batch.clone();

        if !self.engine.fetch_distribution_by_id(id)?.all_shares_assigned {
            loop {
                report.share_batches += 1;
                let step = self.engine.init_shares_batched(auth, &self.registry, id, batch.share_batch_size)?;
                if step.done {
                    break;
                }
            }
        }
        if !self.engine.fetch_distribution_by_id(id)?.all_claims_assigned {
            loop {
                report.claim_batches += 1;
                let progress = self.engine.init_claims_batched(auth, id, batch.claim_batch_size)?;
                report.claims_written += progress.processed;
                if progress.done {
                    break;
                }
            }
        }
        if !self.engine.fetch_distribution_by_id(id)?.primed {
            self.engine.prime_distribution(auth, id, funds_source)?;
            report.primed = true;
        }
        if !self.engine.fetch_distribution_by_id(id)?.active {
            self.engine.activate_distribution(auth, id)?;
            report.activated = true;
        }

        info!(
            distribution = %id,
            share_batches = report.share_batches,
            claim_batches = report.claim_batches,
            claims = report.claims_written,
            "distribution driven to active"
        );
        Ok(report)
    }

    /// Delete a locked release in configured batches.
    pub fn delete_release(&mut self, auth: &AuthContext, id: &ReleaseId) -> SdkResult<Vec<BatchProgress>> {
        let batch_size = self.config.batch.delete_batch_size;
        let mut batches = Vec::new();
        loop {
            let progress = self.registry.batch_delete_release(auth, id, batch_size)?;
            batches.push(progress);
            if progress.done {
                return Ok(batches);
            }
        }
    }

    /// Every claim record of a distribution, paged with the claim batch size.
    pub fn all_claims(&self, id: DistributionId) -> SdkResult<Vec<ClaimRecord>> {
        let limit = self.config.batch.claim_batch_size;
        let mut claims = Vec::new();
        loop {
            let page = self.engine.fetch_distribution_claims(id, claims.len(), limit)?;
            let last = page.len() < limit;
            claims.extend(page);
            if last {
                return Ok(claims);
            }
        }
    }

    // ---- Audit trail ----

    pub fn events(&self) -> SdkResult<Vec<LedgerEvent>> {
        Ok(self.journal.events()?)
    }

    pub fn subscribe(&self, filter: EventFilter) -> SdkResult<EventStream> {
        Ok(self.journal.subscribe(filter)?)
    }

    /// Recheck every event's integrity hash and sequence number.
    pub fn verify_journal(&self) -> SdkResult<()> {
        Ok(self.journal.verify()?)
    }
}
