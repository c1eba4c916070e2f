//! Persistence seam for groups, addresses and membership verdicts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use gate_types::{AddressId, AddressRecord, Group, GroupId, MembershipUpdate};

/// Counts reported by a membership upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub created: usize,
    pub updated: usize,
}

/// Storage behind the refresher.
///
/// `upsert_memberships` must be atomic: either every row in the call is
/// written with `last_checked = now()`, or none is.
#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    /// Clock used to stamp and age memberships.
    fn now(&self) -> DateTime<Utc>;

    async fn community_groups(&self, community_id: &str) -> Result<Vec<Group>>;

    async fn group(&self, group_id: GroupId) -> Result<Option<Group>>;

    async fn address(&self, address_id: AddressId) -> Result<Option<AddressRecord>>;

    /// Up to `limit` addresses of `community_id` with `id > after`, ascending
    /// by id, each carrying its existing memberships for `group_ids`.
    async fn address_page(
        &self,
        community_id: &str,
        group_ids: &[GroupId],
        after: Option<AddressId>,
        limit: usize,
    ) -> Result<Vec<AddressRecord>>;

    /// Insert or overwrite the `(group_id, address_id)` rows.
    async fn upsert_memberships(&self, updates: &[MembershipUpdate]) -> Result<UpsertSummary>;

    /// Remove every membership of a group, returning how many were removed.
    async fn delete_group_memberships(&self, group_id: GroupId) -> Result<usize>;
}

