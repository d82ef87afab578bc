use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use tally_types::{AccountId, AssetId};

/// Configuration for the distribution engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Payout assets a distribution may carry.
    pub allowed_assets: Vec<String>,
    /// Label of the system account holding primed, unclaimed royalties.
    pub custody_account: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            allowed_assets: vec!["USD".into(), "USDC".into()],
            custody_account: "tally:distribution-custody".into(),
        }
    }
}

impl DistributionConfig {
    pub fn allowed_asset_ids(&self) -> BTreeSet<AssetId> {
        self.allowed_assets.iter().map(AssetId::currency).collect()
    }

    pub fn custody_account_id(&self) -> AccountId {
        AccountId::system(self.custody_account.clone())
    }
}
