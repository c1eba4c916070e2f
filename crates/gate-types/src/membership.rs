//! Cached membership verdicts and the addresses they belong to.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::group::GroupId;
use crate::requirement::Requirement;

/// Address primary key. Pages of addresses are ordered by it.
pub type AddressId = i64;

/// Verdict for one `(group_id, address_id)` pair.
///
/// `reject_reason == None` means the address is a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub address_id: AddressId,
    #[serde(default)]
    pub reject_reason: Option<String>,
    pub last_checked: DateTime<Utc>,
}

impl Membership {
    pub fn is_member(&self) -> bool {
        self.reject_reason.is_none()
    }

    /// `now < last_checked + ttl`. A TTL too large to represent never expires.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.last_checked.checked_add_signed(ttl));
        match expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    /// Decode the stored diagnostic back into per-requirement messages.
    pub fn reject_messages(&self) -> Result<Vec<RequirementMessage>> {
        match &self.reject_reason {
            None => Ok(Vec::new()),
            Some(reason) => serde_json::from_str(reason)
                .with_context(|| format!("Malformed reject reason for group {}", self.group_id)),
        }
    }
}

/// Diagnostic for one failed requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementMessage {
    pub requirement: Requirement,
    pub message: String,
}

/// A fresh verdict waiting to be written. The store stamps `last_checked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    pub group_id: GroupId,
    pub address_id: AddressId,
    pub reject_reason: Option<String>,
}

/// An address in a community along with the memberships already stored for
/// the groups being refreshed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: AddressId,
    pub address: String,
    pub community_id: String,
    #[serde(default)]
    pub memberships: Vec<Membership>,
}

impl AddressRecord {
    pub fn membership(&self, group_id: GroupId) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.group_id == group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn checked_at(secs: i64) -> Membership {
        Membership {
            group_id: 1,
            address_id: 1,
            reject_reason: None,
            last_checked: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let membership = checked_at(1_000);
        let ttl = Duration::from_secs(60);

        assert!(membership.is_fresh(Utc.timestamp_opt(1_059, 0).unwrap(), ttl));
        assert!(!membership.is_fresh(Utc.timestamp_opt(1_060, 0).unwrap(), ttl));
        assert!(!membership.is_fresh(Utc.timestamp_opt(2_000, 0).unwrap(), ttl));
    }

    #[test]
    fn test_zero_ttl_is_never_fresh() {
        let membership = checked_at(1_000);
        assert!(!membership.is_fresh(Utc.timestamp_opt(1_000, 0).unwrap(), Duration::ZERO));
    }

    #[test]
    fn test_reject_messages_round_trip() {
        let messages = vec![RequirementMessage {
            requirement: Requirement::allow(["0x111"]),
            message: "Address is not in the allow-list".to_string(),
        }];
        let mut membership = checked_at(0);
        membership.reject_reason = Some(serde_json::to_string(&messages).unwrap());

        assert!(!membership.is_member());
        assert_eq!(membership.reject_messages().unwrap(), messages);
    }
}
