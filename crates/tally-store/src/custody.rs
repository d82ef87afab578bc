use std::collections::HashMap;
use std::sync::RwLock;

use tally_types::{AccountId, AssetId};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Asset custody primitive consumed by the registry and distribution engine.
///
/// Moves are all-or-nothing: a failed move leaves both balances untouched.
pub trait Custody: Send + Sync {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> StoreResult<u128>;

    /// Move `amount` of `asset` from `from` to `to`.
    fn move_asset(&self, asset: &AssetId, from: &AccountId, to: &AccountId, amount: u128) -> StoreResult<()>;

    /// Create `amount` of `asset` in `to`.
    fn mint(&self, asset: &AssetId, to: &AccountId, amount: u128) -> StoreResult<()>;

    /// Destroy `amount` of `asset` held by `from`.
    fn burn(&self, asset: &AssetId, from: &AccountId, amount: u128) -> StoreResult<()>;
}

#[derive(Default)]
struct VaultState {
    balances: HashMap<(AssetId, AccountId), u128>,
    supply: HashMap<AssetId, u128>,
}

impl VaultState {
    fn balance(&self, asset: &AssetId, account: &AccountId) -> u128 {
        self.balances
            .get(&(asset.clone(), account.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn set(&mut self, asset: &AssetId, account: &AccountId, amount: u128) {
        let key = (asset.clone(), account.clone());
        if amount == 0 {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, amount);
        }
    }
}

/// In-memory custody vault.
#[derive(Default)]
pub struct InMemoryVault {
    inner: RwLock<VaultState>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total minted minus burned for `asset`.
    pub fn total_supply(&self, asset: &AssetId) -> StoreResult<u128> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.supply.get(asset).copied().unwrap_or(0))
    }
}

impl Custody for InMemoryVault {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> StoreResult<u128> {
        let state = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.balance(asset, account))
    }

    fn move_asset(&self, asset: &AssetId, from: &AccountId, to: &AccountId, amount: u128) -> StoreResult<()> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let available = state.balance(asset, from);
        if available < amount {
            return Err(StoreError::InsufficientFunds {
                asset: asset.clone(),
                account: from.clone(),
                needed: amount,
                available,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let credited = state
            .balance(asset, to)
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(asset.clone()))?;
        state.set(asset, from, available - amount);
        state.set(asset, to, credited);
        debug!(%asset, %from, %to, amount, "custody move");
        Ok(())
    }

    fn mint(&self, asset: &AssetId, to: &AccountId, amount: u128) -> StoreResult<()> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let supply = state
            .supply
            .get(asset)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(asset.clone()))?;
        let credited = state
            .balance(asset, to)
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(asset.clone()))?;
        state.supply.insert(asset.clone(), supply);
        state.set(asset, to, credited);
        Ok(())
    }

    fn burn(&self, asset: &AssetId, from: &AccountId, amount: u128) -> StoreResult<()> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let available = state.balance(asset, from);
        if available < amount {
            return Err(StoreError::InsufficientFunds {
                asset: asset.clone(),
                account: from.clone(),
                needed: amount,
                available,
            });
        }
        let supply = state.supply.get(asset).copied().unwrap_or(0).saturating_sub(amount);
        state.supply.insert(asset.clone(), supply);
        state.set(asset, from, available - amount);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let accounts = self.inner.read().map(|s| s.balances.len()).unwrap_or(0);
        f.debug_struct("InMemoryVault")
            .field("funded_accounts", &accounts)
            .finish()
    }
}
