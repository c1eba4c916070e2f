//! In-memory [`MembershipStore`] with a controllable clock.
//!
//! Backs the tests and the snapshot-driven worker. State can be exported to
//! and imported from a [`StoreSnapshot`] so a refresh can be run against a
//! JSON file and its results written back out.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use gate_types::{AddressId, AddressRecord, Group, GroupId, Membership, MembershipUpdate};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{MembershipStore, UpsertSummary};

/// Serializable contents of an [`InMemoryMembershipStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Addresses with every membership they hold.
    #[serde(default)]
    pub addresses: Vec<AddressRecord>,
}

#[derive(Debug, Clone)]
struct StoredAddress {
    address: String,
    community_id: String,
}

#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    groups: RwLock<BTreeMap<GroupId, Group>>,
    addresses: RwLock<BTreeMap<AddressId, StoredAddress>>,
    memberships: RwLock<BTreeMap<(GroupId, AddressId), Membership>>,
    /// Fixed clock; `None` follows the wall clock.
    clock: Mutex<Option<DateTime<Utc>>>,
    failing_upserts: AtomicUsize,
    upserts: AtomicUsize,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new();
        for group in snapshot.groups {
            store.insert_group(group);
        }
        for record in snapshot.addresses {
            store.insert_address_with_id(record.id, &record.address, &record.community_id)?;
            let mut memberships = store.memberships.write();
            for mut membership in record.memberships {
                if !store.groups.read().contains_key(&membership.group_id) {
                    bail!(
                        "Membership of address {} references unknown group {}",
                        record.id,
                        membership.group_id
                    );
                }
                membership.address_id = record.id;
                memberships.insert((membership.group_id, record.id), membership);
            }
        }
        Ok(store)
    }

    pub fn to_snapshot(&self) -> StoreSnapshot {
        let groups = self.groups.read().values().cloned().collect();
        let addresses = self
            .addresses
            .read()
            .iter()
            .map(|(id, stored)| self.record(*id, stored, None))
            .collect();
        StoreSnapshot { groups, addresses }
    }

    /// Insert or replace a group. Existing memberships are kept.
    pub fn insert_group(&self, group: Group) {
        self.groups.write().insert(group.id, group);
    }

    /// Register an address under the next free id.
    pub fn insert_address(&self, address: &str, community_id: &str) -> AddressId {
        let mut addresses = self.addresses.write();
        let id = addresses.keys().next_back().map_or(1, |last| last + 1);
        addresses.insert(
            id,
            StoredAddress {
                address: address.to_string(),
                community_id: community_id.to_string(),
            },
        );
        id
    }

    pub fn insert_address_with_id(
        &self,
        id: AddressId,
        address: &str,
        community_id: &str,
    ) -> Result<()> {
        let mut addresses = self.addresses.write();
        if addresses.contains_key(&id) {
            bail!("Address id {} already exists", id);
        }
        addresses.insert(
            id,
            StoredAddress {
                address: address.to_string(),
                community_id: community_id.to_string(),
            },
        );
        Ok(())
    }

    pub fn find_address(&self, community_id: &str, address: &str) -> Option<AddressId> {
        self.addresses
            .read()
            .iter()
            .find(|(_, stored)| stored.community_id == community_id && stored.address == address)
            .map(|(id, _)| *id)
    }

    pub fn membership(&self, group_id: GroupId, address_id: AddressId) -> Option<Membership> {
        self.memberships.read().get(&(group_id, address_id)).cloned()
    }

    pub fn memberships(&self) -> Vec<Membership> {
        self.memberships.read().values().cloned().collect()
    }

    /// Pin the clock to `now`.
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.clock.lock() = Some(now);
    }

    /// Move the clock forward, pinning it first if it follows the wall clock.
    pub fn advance(&self, by: Duration) {
        let mut clock = self.clock.lock();
        let current = (*clock).unwrap_or_else(Utc::now);
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        *clock = Some(current.checked_add_signed(by).unwrap_or(current));
    }

    /// Make the next `count` upserts fail without writing anything.
    pub fn fail_next_upserts(&self, count: usize) {
        self.failing_upserts.store(count, Ordering::SeqCst);
    }

    /// Number of upserts that were committed.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn record(
        &self,
        id: AddressId,
        stored: &StoredAddress,
        group_ids: Option<&[GroupId]>,
    ) -> AddressRecord {
        let memberships = self
            .memberships
            .read()
            .values()
            .filter(|m| m.address_id == id)
            .filter(|m| group_ids.map_or(true, |ids| ids.contains(&m.group_id)))
            .cloned()
            .collect();
        AddressRecord {
            id,
            address: stored.address.clone(),
            community_id: stored.community_id.clone(),
            memberships,
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl MembershipStore for InMemoryMembershipStore {
    fn now(&self) -> DateTime<Utc> {
        (*self.clock.lock()).unwrap_or_else(Utc::now)
    }

    async fn community_groups(&self, community_id: &str) -> Result<Vec<Group>> {
        Ok(self
            .groups
            .read()
            .values()
            .filter(|g| g.community_id == community_id)
            .cloned()
            .collect())
    }

    async fn group(&self, group_id: GroupId) -> Result<Option<Group>> {
        Ok(self.groups.read().get(&group_id).cloned())
    }

    async fn address(&self, address_id: AddressId) -> Result<Option<AddressRecord>> {
        Ok(self
            .addresses
            .read()
            .get(&address_id)
            .map(|stored| self.record(address_id, stored, None)))
    }

    async fn address_page(
        &self,
        community_id: &str,
        group_ids: &[GroupId],
        after: Option<AddressId>,
        limit: usize,
    ) -> Result<Vec<AddressRecord>> {
        if after == Some(AddressId::MAX) {
            return Ok(Vec::new());
        }
        let lower = after.map_or(AddressId::MIN, |after| after + 1);
        let addresses = self.addresses.read();
        Ok(addresses
            .range(lower..)
            .filter(|(_, stored)| stored.community_id == community_id)
            .take(limit)
            .map(|(id, stored)| self.record(*id, stored, Some(group_ids)))
            .collect())
    }

    async fn upsert_memberships(&self, updates: &[MembershipUpdate]) -> Result<UpsertSummary> {
        if self.take_injected_failure() {
            return Err(anyhow!("injected upsert failure"));
        }

        {
            let groups = self.groups.read();
            let addresses = self.addresses.read();
            for update in updates {
                if !groups.contains_key(&update.group_id) {
                    bail!("Upsert references unknown group {}", update.group_id);
                }
                if !addresses.contains_key(&update.address_id) {
                    bail!("Upsert references unknown address {}", update.address_id);
                }
            }
        }

        let now = self.now();
        let mut memberships = self.memberships.write();
        let mut summary = UpsertSummary::default();
        for update in updates {
            let key = (update.group_id, update.address_id);
            let previous = memberships.insert(
                key,
                Membership {
                    group_id: update.group_id,
                    address_id: update.address_id,
                    reject_reason: update.reject_reason.clone(),
                    last_checked: now,
                },
            );
            if previous.is_some() {
                summary.updated += 1;
            } else {
                summary.created += 1;
            }
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        debug!(
            rows = updates.len(),
            created = summary.created,
            updated = summary.updated,
            "upserted memberships"
        );
        Ok(summary)
    }

    async fn delete_group_memberships(&self, group_id: GroupId) -> Result<usize> {
        let mut memberships = self.memberships.write();
        let before = memberships.len();
        memberships.retain(|(g, _), _| *g != group_id);
        Ok(before - memberships.len())
    }
}
