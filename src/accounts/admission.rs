//! Plan-based admission policy for new linked accounts.

use super::Plan;
use crate::error::{Error, Result};

impl Plan {
    /// Maximum number of linked accounts for this tier.
    pub fn limit(&self) -> usize {
        match self {
            Plan::Free => 3,
            Plan::Pro => 6,
            Plan::Premium => 10,
        }
    }
}

/// Checks whether a user on `plan` with `current_count` linked accounts may
/// add one more.
///
/// Pure policy check; duplicate and existence checks live with the store,
/// which evaluates all three inside one transaction immediately before the
/// insert (see [`super::AccountStore::create`]).
pub fn check(plan: Plan, current_count: usize) -> Result<()> {
    let limit = plan.limit();
    if current_count >= limit {
        return Err(Error::PlanLimitExceeded { plan, limit });
    }
    Ok(())
}
