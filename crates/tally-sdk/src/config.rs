use std::path::Path;

use serde::{Deserialize, Serialize};

use tally_distribution::DistributionConfig;
use tally_registry::RegistryConfig;

use crate::error::{SdkError, SdkResult};

/// Batch sizes used by the facade's drive helpers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Holders per `init_shares_batched` call.
    pub share_batch_size: usize,
    /// Holders per `init_claims_batched` call.
    pub claim_batch_size: usize,
    /// Holders per `batch_delete_release` call.
    pub delete_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            share_batch_size: 100,
            claim_batch_size: 100,
            delete_batch_size: 100,
        }
    }
}

/// Top-level configuration, usually loaded from `tally.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Capacity of each event subscription channel.
    pub journal_capacity: usize,
    pub registry: RegistryConfig,
    pub distribution: DistributionConfig,
    pub batch: BatchConfig,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            journal_capacity: 1024,
            registry: RegistryConfig::default(),
            distribution: DistributionConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl TallyConfig {
    pub fn from_toml_str(input: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| SdkError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> SdkResult<()> {
        let batch = &self.batch;
        if batch.share_batch_size == 0 || batch.claim_batch_size == 0 || batch.delete_batch_size == 0 {
            return Err(SdkError::InvalidConfig("batch sizes must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        let config = TallyConfig::from_toml_str("").unwrap();
        assert_eq!(config, TallyConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = TallyConfig::from_toml_str(
            r#"
            [registry]
            min_bucket_duration_secs = 3600

            [distribution]
            allowed_assets = ["USDC"]

            [batch]
            claim_batch_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.registry.min_bucket_duration_secs, 3600);
        assert_eq!(config.registry.custody_account, RegistryConfig::default().custody_account);
        assert_eq!(config.distribution.allowed_assets, vec!["USDC".to_string()]);
        assert_eq!(config.batch.claim_batch_size, 25);
        assert_eq!(config.batch.share_batch_size, 100);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = TallyConfig::from_toml_str("[batch]\nshare_batch_size = 0\n").unwrap_err();
        assert!(matches!(err, SdkError::InvalidConfig(_)));
    }

    #[test]
    fn rendered_config_parses_back() {
        let rendered = TallyConfig::default().to_toml_string().unwrap();
        assert_eq!(TallyConfig::from_toml_str(&rendered).unwrap(), TallyConfig::default());
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "journal_capacity = 64").unwrap();
        let config = TallyConfig::load(file.path()).unwrap();
        assert_eq!(config.journal_capacity, 64);

        let err = TallyConfig::load("/nonexistent/tally.toml").unwrap_err();
        assert!(matches!(err, SdkError::ConfigIo { .. }));
    }
}
