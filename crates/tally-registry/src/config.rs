use serde::{Deserialize, Serialize};

use tally_types::{AccountId, BucketDuration, TypeError};

/// Configuration for the release registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Floor applied to every release's bucket duration. Bounds how fast
    /// ownership history can grow under frequent trading.
    pub min_bucket_duration_secs: u64,
    /// Label of the system account that holds escrowed backing units and
    /// deposited shares.
    pub custody_account: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_bucket_duration_secs: 600,
            custody_account: "tally:registry-custody".into(),
        }
    }
}

impl RegistryConfig {
    pub fn min_bucket_duration(&self) -> Result<BucketDuration, TypeError> {
        BucketDuration::from_secs(self.min_bucket_duration_secs)
    }

    pub fn custody_account_id(&self) -> AccountId {
        AccountId::system(self.custody_account.clone())
    }
}
