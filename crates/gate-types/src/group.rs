//! Groups: named bundles of requirements attached to a community.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::requirement::Requirement;

/// Group primary key.
pub type GroupId = i64;

/// Descriptive and policy fields of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Quorum: `0` (or absent) means every requirement must pass; `k > 0`
    /// means any `k` of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_requirements: Option<u32>,
    /// Seconds a membership verdict stays fresh. Absent means the refresher's
    /// configured default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership_ttl: Option<u64>,
}

/// A gating group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub community_id: String,
    pub metadata: GroupMetadata,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl Group {
    /// Number of requirements that must pass, `0` meaning all.
    pub fn required_requirements(&self) -> usize {
        self.metadata.required_requirements.unwrap_or(0) as usize
    }

    /// How long a verdict for this group stays fresh.
    pub fn membership_ttl(&self, default_ttl: Duration) -> Duration {
        self.metadata
            .membership_ttl
            .map(Duration::from_secs)
            .unwrap_or(default_ttl)
    }
}
