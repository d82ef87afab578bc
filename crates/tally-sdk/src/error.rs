use std::path::PathBuf;

use thiserror::Error;

use tally_types::ErrorKind;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("registry error: {0}")]
    Registry(#[from] tally_registry::RegistryError),

    #[error("distribution error: {0}")]
    Distribution(#[from] tally_distribution::DistributionError),

    #[error("store error: {0}")]
    Store(#[from] tally_store::StoreError),

    #[error("event journal error: {0}")]
    Fabric(#[from] tally_fabric::FabricError),
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigIo { .. } | Self::ConfigParse(_) | Self::InvalidConfig(_) => ErrorKind::Precondition,
            Self::ConfigRender(_) | Self::Fabric(_) => ErrorKind::Internal,
            Self::Registry(e) => e.kind(),
            Self::Distribution(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
