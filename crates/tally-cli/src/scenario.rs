//! Scenario files: a release, its holders, and a timeline of steps.
//!
//! ```toml
//! release = "debut-album"
//! bucket_secs = 600
//!
//! [[holders]]
//! account = "alice"
//! shares = 600
//!
//! [[steps]]
//! op = "advance"
//! secs = 600
//!
//! [[steps]]
//! op = "distribute"
//! start = 0
//! end = 1200
//! amounts = [{ asset = "USD", amount = 1000 }]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::info;

use tally_sdk::{
    AccountId, AssetAmount, AssetId, AuthContext, BucketDuration, Custody, DistributionId, LedgerTime, ManualClock,
    ReleaseId, Role, Tally, TallyConfig,
};

fn default_bucket_secs() -> u64 {
    600
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub release: String,
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: u64,
    /// Clock reading when the release is unlocked.
    #[serde(default)]
    pub unlock_at: u64,
    /// Ledger configuration; defaults apply to omitted keys.
    #[serde(default)]
    pub config: TallyConfig,
    pub holders: Vec<HolderSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HolderSpec {
    pub account: String,
    pub shares: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmountSpec {
    pub asset: String,
    pub amount: u128,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Advance {
        secs: u64,
    },
    Transfer {
        from: String,
        to: String,
        amount: u64,
    },
    Deposit {
        holder: String,
        amount: u64,
    },
    Withdraw {
        holder: String,
        amount: u64,
    },
    /// Fund, snapshot and activate a distribution over `[start, end)`.
    Distribute {
        start: u64,
        end: u64,
        /// Claim window length counted from the current clock reading.
        claimable_for: Option<u64>,
        amounts: Vec<AmountSpec>,
    },
    /// Claim one distribution (by creation index), or everything claimable.
    Claim {
        holder: String,
        distribution: Option<usize>,
    },
    Cancel {
        distribution: usize,
    },
}

impl Scenario {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let input = std::fs::read_to_string(path).with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&input).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

/// Something a step did, in timeline order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Advanced { now: u64 },
    Moved { from: String, to: String, amount: u64 },
    Distributed { distribution: usize, holders: usize },
    Claimed { holder: String, distribution: usize, amounts: Vec<AssetAmount> },
    Cancelled { distribution: usize, refund: Vec<AssetAmount> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimRow {
    pub holder: String,
    pub user_shares: u128,
    pub amounts: Vec<AssetAmount>,
    pub claimed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DistributionSummary {
    pub index: usize,
    pub id: String,
    pub phase: String,
    pub total_shares: u128,
    pub royalties_to_payout: Vec<AssetAmount>,
    pub calculated_royalties_to_payout: Vec<AssetAmount>,
    pub amounts_distributed: Vec<AssetAmount>,
    pub claims: Vec<ClaimRow>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub release: String,
    pub now: u64,
    pub outcomes: Vec<Outcome>,
    pub distributions: Vec<DistributionSummary>,
}

/// A ledger driven by one scenario.
pub struct Simulation {
    pub tally: Tally,
    clock: Arc<ManualClock>,
    release: ReleaseId,
    manager: AuthContext,
    exchange: AuthContext,
    royalty: AuthContext,
    treasury: AccountId,
    labels: HashMap<AccountId, String>,
    distributions: Vec<DistributionId>,
    outcomes: Vec<Outcome>,
}

impl Simulation {
    /// Create, assign and unlock the scenario's release.
    pub fn start(scenario: &Scenario) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(LedgerTime::zero()));
        let tally = Tally::with_clock(scenario.config.clone(), clock.clone())?;
        let mut sim = Self {
            tally,
            clock,
            release: ReleaseId::new(scenario.release.clone())?,
            manager: AuthContext::with_role(AccountId::system("scenario-manager"), Role::ReleaseManager),
            exchange: AuthContext::with_role(AccountId::system("scenario-exchange"), Role::Exchange),
            royalty: AuthContext::with_role(AccountId::system("scenario-royalties"), Role::RoyaltyManager),
            treasury: AccountId::system("scenario-treasury"),
            labels: HashMap::new(),
            distributions: Vec::new(),
            outcomes: Vec::new(),
        };
        sim.labels.insert(sim.treasury.clone(), "treasury".into());
        sim.labels
            .insert(sim.tally.registry().custody_account().clone(), "registry-custody".into());

        let split: Vec<(AccountId, u64)> = scenario
            .holders
            .iter()
            .map(|h| (sim.account(&h.account), h.shares))
            .collect();
        let supply = split
            .iter()
            .try_fold(0u64, |acc, (_, n)| acc.checked_add(*n))
            .context("total supply overflows")?;
        let bucket = BucketDuration::from_secs(scenario.bucket_secs)?;

        let registry = sim.tally.registry_mut();
        registry.create_release(&sim.manager, sim.release.clone(), supply, bucket)?;
        registry.assign_shares(&sim.manager, &sim.release, &split)?;
        sim.clock.set(LedgerTime::from_secs(scenario.unlock_at));
        sim.tally.registry_mut().unlock_release(&sim.manager, &sim.release)?;
        Ok(sim)
    }

    /// Run a whole scenario.
    pub fn run(scenario: &Scenario) -> anyhow::Result<Self> {
        let mut sim = Self::start(scenario)?;
        for (n, step) in scenario.steps.iter().enumerate() {
            sim.apply(step).with_context(|| format!("step {} ({step:?})", n + 1))?;
        }
        info!(release = %sim.release, steps = scenario.steps.len(), "scenario finished");
        Ok(sim)
    }

    fn account(&mut self, label: &str) -> AccountId {
        let id = AccountId::from_label(label);
        self.labels.entry(id.clone()).or_insert_with(|| label.to_string());
        id
    }

    fn label(&self, id: &AccountId) -> String {
        self.labels.get(id).cloned().unwrap_or_else(|| id.short_id())
    }

    fn distribution(&self, index: usize) -> anyhow::Result<DistributionId> {
        match self.distributions.get(index) {
            Some(id) => Ok(*id),
            None => bail!("no distribution #{index}; {} created so far", self.distributions.len()),
        }
    }

    pub fn apply(&mut self, step: &Step) -> anyhow::Result<()> {
        match step {
            Step::Advance { secs } => {
                let now = self.clock.advance(*secs);
                self.outcomes.push(Outcome::Advanced { now: now.secs() });
            }
            Step::Transfer { from, to, amount } => {
                let (sender, receiver) = (self.account(from), self.account(to));
                self.tally
                    .registry_mut()
                    .transfer_ownership(&self.exchange, &self.release, &sender, &receiver, *amount)?;
                self.outcomes.push(Outcome::Moved {
                    from: from.clone(),
                    to: to.clone(),
                    amount: *amount,
                });
            }
            Step::Deposit { holder, amount } => {
                let account = self.account(holder);
                self.tally
                    .registry_mut()
                    .deposit(&self.exchange, &self.release, &account, *amount)?;
                self.outcomes.push(Outcome::Moved {
                    from: holder.clone(),
                    to: "registry-custody".into(),
                    amount: *amount,
                });
            }
            Step::Withdraw { holder, amount } => {
                let account = self.account(holder);
                self.tally
                    .registry_mut()
                    .withdraw(&self.exchange, &self.release, &account, *amount)?;
                self.outcomes.push(Outcome::Moved {
                    from: "registry-custody".into(),
                    to: holder.clone(),
                    amount: *amount,
                });
            }
            Step::Distribute {
                start,
                end,
                claimable_for,
                amounts,
            } => self.distribute(*start, *end, *claimable_for, amounts)?,
            Step::Claim { holder, distribution } => {
                let auth = AuthContext::holder(self.account(holder));
                let receipts = match distribution {
                    Some(index) => {
                        let id = self.distribution(*index)?;
                        vec![self.tally.engine_mut().claim(&auth, id)?]
                    }
                    None => self.tally.engine_mut().claim_all(&auth)?,
                };
                for receipt in receipts {
                    let index = self
                        .distributions
                        .iter()
                        .position(|id| *id == receipt.distribution)
                        .context("receipt for an unknown distribution")?;
                    self.outcomes.push(Outcome::Claimed {
                        holder: holder.clone(),
                        distribution: index,
                        amounts: receipt.amounts,
                    });
                }
            }
            Step::Cancel { distribution } => {
                let id = self.distribution(*distribution)?;
                let refund = self
                    .tally
                    .engine_mut()
                    .cancel_distribution(&self.royalty, id, &self.treasury)?;
                self.outcomes.push(Outcome::Cancelled {
                    distribution: *distribution,
                    refund,
                });
            }
        }
        Ok(())
    }

    fn distribute(
        &mut self,
        start: u64,
        end: u64,
        claimable_for: Option<u64>,
        amounts: &[AmountSpec],
    ) -> anyhow::Result<()> {
        let amounts: Vec<AssetAmount> = amounts
            .iter()
            .map(|a| AssetAmount::new(AssetId::currency(a.asset.clone()), a.amount))
            .collect();
        // Royalties arrive in the treasury just in time for priming.
        for amount in &amounts {
            self.tally.vault().mint(&amount.asset, &self.treasury, amount.amount)?;
        }
        let claimable_until = claimable_for.map(|secs| self.tally.now().saturating_add(secs));
        let distribution = self.tally.create_distribution(
            &self.royalty,
            &self.release,
            LedgerTime::from_secs(start),
            LedgerTime::from_secs(end),
            claimable_until,
            amounts,
        )?;
        let report = self
            .tally
            .drive_distribution(&self.royalty, distribution.id, &self.treasury)?;
        self.distributions.push(distribution.id);
        self.outcomes.push(Outcome::Distributed {
            distribution: self.distributions.len() - 1,
            holders: report.claims_written,
        });
        Ok(())
    }

    pub fn report(&self) -> anyhow::Result<SimulationReport> {
        let now = self.tally.now();
        let mut distributions = Vec::with_capacity(self.distributions.len());
        for (index, id) in self.distributions.iter().enumerate() {
            let distribution = self.tally.engine().fetch_distribution_by_id(*id)?;
            let claims = self
                .tally
                .all_claims(*id)?
                .into_iter()
                .map(|c| ClaimRow {
                    holder: self.label(&c.holder),
                    user_shares: c.user_shares,
                    amounts: c.amounts,
                    claimed: c.claimed,
                })
                .collect();
            distributions.push(DistributionSummary {
                index,
                id: id.to_string(),
                phase: distribution.phase(now).to_string(),
                total_shares: distribution.total_shares,
                royalties_to_payout: distribution.royalties_to_payout.clone(),
                calculated_royalties_to_payout: distribution.calculated_royalties_to_payout.clone(),
                amounts_distributed: distribution.amounts_distributed.clone(),
                claims,
            });
        }
        Ok(SimulationReport {
            release: self.release.to_string(),
            now: now.secs(),
            outcomes: self.outcomes.clone(),
            distributions,
        })
    }
}
