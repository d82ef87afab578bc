use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AccessDenied;
use crate::identity::AccountId;
use crate::ids::ReleaseId;
use crate::temporal::LedgerTime;

/// Roles recognized by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Holds every other role.
    Admin,
    /// Creates, assigns, unlocks and deletes releases.
    ReleaseManager,
    /// Order-book collaborator: deposits, withdrawals, transfers, reservations.
    Exchange,
    /// Runs distributions from creation through cancellation.
    RoyaltyManager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "Admin"),
            Self::ReleaseManager => write!(f, "ReleaseManager"),
            Self::Exchange => write!(f, "Exchange"),
            Self::RoyaltyManager => write!(f, "RoyaltyManager"),
        }
    }
}

/// Where a grant applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantScope {
    /// Applies to every release.
    Global,
    /// Applies to a single release.
    Release(ReleaseId),
}

impl GrantScope {
    /// Returns `true` if a grant with this scope covers `requested`.
    pub fn covers(&self, requested: &GrantScope) -> bool {
        match (self, requested) {
            (Self::Global, _) => true,
            (Self::Release(held), Self::Release(wanted)) => held == wanted,
            (Self::Release(_), Self::Global) => false,
        }
    }
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global scope"),
            Self::Release(id) => write!(f, "release {id}"),
        }
    }
}

/// A role granted to an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub role: Role,
    pub scope: GrantScope,
    pub granted_at: LedgerTime,
    pub expires_at: Option<LedgerTime>,
}

impl Grant {
    /// A non-expiring global grant.
    pub fn global(role: Role) -> Self {
        Self {
            role,
            scope: GrantScope::Global,
            granted_at: LedgerTime::zero(),
            expires_at: None,
        }
    }

    /// Returns `true` if the grant has expired at the given time.
    pub fn is_expired_at(&self, now: &LedgerTime) -> bool {
        self.expires_at
            .as_ref()
            .map(|exp| now.is_after(exp))
            .unwrap_or(false)
    }

    fn satisfies(&self, role: &Role, scope: &GrantScope, now: &LedgerTime) -> bool {
        let role_ok = self.role == Role::Admin || self.role == *role;
        role_ok && self.scope.covers(scope) && !self.is_expired_at(now)
    }
}

/// Caller identity plus the grants it presents for one call.
///
/// Passed explicitly into every mutating operation instead of consulting
/// ambient role tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub caller: AccountId,
    pub grants: Vec<Grant>,
}

impl AuthContext {
    /// A caller with no grants (a plain holder).
    pub fn holder(caller: AccountId) -> Self {
        Self {
            caller,
            grants: Vec::new(),
        }
    }

    /// A caller holding a single global role.
    pub fn with_role(caller: AccountId, role: Role) -> Self {
        Self {
            caller,
            grants: vec![Grant::global(role)],
        }
    }

    pub fn grant(mut self, grant: Grant) -> Self {
        self.grants.push(grant);
        self
    }

    /// Fail unless some unexpired grant covers `role` within `scope`.
    pub fn require(&self, role: Role, scope: &GrantScope, now: LedgerTime) -> Result<(), AccessDenied> {
        if self.grants.iter().any(|g| g.satisfies(&role, scope, &now)) {
            return Ok(());
        }
        Err(AccessDenied {
            caller: self.caller.clone(),
            role,
            scope: scope.clone(),
        })
    }
}
