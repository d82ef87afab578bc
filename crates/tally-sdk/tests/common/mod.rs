#![allow(dead_code)]

use std::sync::Arc;

use tally_sdk::{
    AccountId, AssetAmount, AssetId, AuthContext, BucketDuration, Custody, LedgerTime, ManualClock, ReleaseId, Role,
    Tally, TallyConfig,
};

pub const BUCKET: u64 = 600;

pub struct World {
    pub tally: Tally,
    pub clock: Arc<ManualClock>,
    pub manager: AuthContext,
    pub exchange: AuthContext,
    pub royalty: AuthContext,
    pub release: ReleaseId,
    pub treasury: AccountId,
}

pub fn acct(label: &str) -> AccountId {
    AccountId::from_label(label)
}

pub fn usd(amount: u128) -> AssetAmount {
    AssetAmount::new(AssetId::currency("USD"), amount)
}

pub fn at(secs: u64) -> LedgerTime {
    LedgerTime::from_secs(secs)
}

pub fn world(config: TallyConfig) -> World {
    let clock = Arc::new(ManualClock::new(LedgerTime::zero()));
    let tally = Tally::with_clock(config, clock.clone()).unwrap();
    let treasury = acct("label-treasury");
    tally
        .vault()
        .mint(&AssetId::currency("USD"), &treasury, 1_000_000_000)
        .unwrap();
    World {
        tally,
        clock,
        manager: AuthContext::with_role(acct("label"), Role::ReleaseManager),
        exchange: AuthContext::with_role(acct("exchange"), Role::Exchange),
        royalty: AuthContext::with_role(acct("royalties"), Role::RoyaltyManager),
        release: ReleaseId::new("debut-album").unwrap(),
        treasury,
    }
}

/// Create the release, assign `split` while locked, and unlock at `unlock_at`.
pub fn release(w: &mut World, split: &[(AccountId, u64)], unlock_at: u64) {
    let supply = split.iter().map(|(_, n)| *n).sum();
    let registry = w.tally.registry_mut();
    registry
        .create_release(&w.manager, w.release.clone(), supply, BucketDuration::from_secs(BUCKET).unwrap())
        .unwrap();
    registry.assign_shares(&w.manager, &w.release, split).unwrap();
    w.clock.set(at(unlock_at));
    w.tally.registry_mut().unlock_release(&w.manager, &w.release).unwrap();
}
