use std::fmt;

use serde::{Deserialize, Serialize};

/// Material used to derive an [`AccountId`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityMaterial {
    /// A human-readable label (wallet name, service account).
    Label(String),
    /// A system account owned by a ledger component.
    System(String),
}

/// Identity of a holder or service account.
///
/// An `AccountId` is derived deterministically from [`IdentityMaterial`]
/// using BLAKE3. The same material always produces the same identity, so
/// custody accounts and wallets named in configuration resolve to stable ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId {
    hash: [u8; 32],
}

impl AccountId {
    /// Derive an `AccountId` from identity material.
    pub fn derive(material: &IdentityMaterial) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tally-account-v1:");
        match material {
            IdentityMaterial::Label(label) => {
                hasher.update(b"label:");
                hasher.update(label.as_bytes());
            }
            IdentityMaterial::System(name) => {
                hasher.update(b"system:");
                hasher.update(name.as_bytes());
            }
        }
        Self {
            hash: *hasher.finalize().as_bytes(),
        }
    }

    /// Shorthand for `derive(&IdentityMaterial::Label(..))`.
    pub fn from_label(label: impl Into<String>) -> Self {
        Self::derive(&IdentityMaterial::Label(label.into()))
    }

    /// Shorthand for `derive(&IdentityMaterial::System(..))`.
    pub fn system(name: impl Into<String>) -> Self {
        Self::derive(&IdentityMaterial::System(name.into()))
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("acct:{}", hex::encode(&self.hash[..4]))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.short_id())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}
