//! A point-in-time snapshot of a merge request's externally-observed state.

use serde::{Deserialize, Serialize};

use super::ids::MergeRequestId;

/// What the refresh preconditions need to know about a merge request right
/// now. Fetched fresh on every refresh rather than cached on the [`Car`],
/// because the merge request can change underneath the train at any time.
///
/// [`Car`]: super::car::Car
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestSnapshot {
    pub id: MergeRequestId,

    /// Short human-readable title, used in abort messages.
    pub title: String,

    /// False once the merge request is merged or closed.
    pub open: bool,

    /// Draft merge requests must not merge even with green pipelines.
    pub draft: bool,

    /// True when the merge request cannot be merged for content reasons
    /// (conflicts, missing diff). Distinct from pipeline failure.
    pub broken: bool,
}

impl MergeRequestSnapshot {
    /// Returns true if the merge request is in a state where the train may
    /// continue validating and eventually merge it.
    pub fn mergeable_state(&self) -> bool {
        self.open && !self.draft && !self.broken
    }
}
