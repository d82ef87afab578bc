use tally_types::{LedgerTime, ReleaseId};

use crate::error::RegistryResult;
use crate::period::PeriodPage;

/// Read-only holdings interface consumed by the distribution engine.
pub trait HoldingsView {
    fn release_exists(&self, id: &ReleaseId) -> bool;

    fn is_fully_assigned(&self, id: &ReleaseId) -> RegistryResult<bool>;

    /// Whether a batched deletion of the release is under way.
    fn is_deleting(&self, id: &ReleaseId) -> RegistryResult<bool>;

    /// One page of time-weighted holdings over `[start, end)`.
    fn shares_in_period(
        &self,
        id: &ReleaseId,
        start: LedgerTime,
        end: LedgerTime,
        cursor: usize,
        limit: usize,
    ) -> RegistryResult<PeriodPage>;
}
