//! Topic visibility from membership verdicts.
//!
//! A topic gated by one or more groups is visible to an address only if one of
//! those groups holds a membership row for it with no reject reason. A missing
//! row means the pair has not been evaluated yet and is treated as not visible.

use gate_types::{GroupId, Membership, RequirementMessage};

/// Why an address can or cannot see a topic.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicAccess {
    /// The topic is not gated.
    Open,
    /// Admitted through this group.
    Member(GroupId),
    /// Every gating group rejected the address.
    Denied(Vec<RequirementMessage>),
    /// Not rejected everywhere, but no gating group has a verdict yet.
    Unevaluated,
}

impl TopicAccess {
    pub fn can_view(&self) -> bool {
        matches!(self, TopicAccess::Open | TopicAccess::Member(_))
    }
}

/// Resolve access to a topic gated by `gating_group_ids`, given the
/// memberships held by one address.
pub fn topic_access(gating_group_ids: &[GroupId], memberships: &[Membership]) -> TopicAccess {
    if gating_group_ids.is_empty() {
        return TopicAccess::Open;
    }

    let mut messages = Vec::new();
    let mut missing = false;
    for group_id in gating_group_ids {
        match memberships.iter().find(|m| m.group_id == *group_id) {
            Some(membership) if membership.is_member() => return TopicAccess::Member(*group_id),
            // An unreadable reason still denies.
            Some(membership) => messages.extend(membership.reject_messages().unwrap_or_default()),
            None => missing = true,
        }
    }

    if missing {
        TopicAccess::Unevaluated
    } else {
        TopicAccess::Denied(messages)
    }
}

pub fn can_view_topic(gating_group_ids: &[GroupId], memberships: &[Membership]) -> bool {
    topic_access(gating_group_ids, memberships).can_view()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn membership(group_id: GroupId, reject_reason: Option<&str>) -> Membership {
        Membership {
            group_id,
            address_id: 1,
            reject_reason: reject_reason.map(str::to_string),
            last_checked: Utc::now(),
        }
    }

    #[test]
    fn test_ungated_topic_is_visible() {
        assert_eq!(topic_access(&[], &[]), TopicAccess::Open);
        assert!(can_view_topic(&[], &[]));
    }

    #[test]
    fn test_any_admitting_group_grants_access() {
        let memberships = vec![
            membership(1, Some("[]")),
            membership(2, None),
        ];
        assert_eq!(topic_access(&[1, 2], &memberships), TopicAccess::Member(2));
        assert!(can_view_topic(&[1, 2], &memberships));
    }

    #[test]
    fn test_missing_row_fails_closed() {
        assert_eq!(topic_access(&[1], &[]), TopicAccess::Unevaluated);
        assert!(!can_view_topic(&[1], &[]));

        let memberships = vec![membership(1, Some("[]"))];
        assert!(!can_view_topic(&[1, 2], &memberships));
    }

    #[test]
    fn test_denied_collects_messages() {
        let reason = r#"[{"requirement":{"rule":"allow","data":{"allow":["0xabc"]}},"message":"Address is not in the allow-list"}]"#;
        let memberships = vec![membership(1, Some(reason)), membership(2, Some("not json"))];

        match topic_access(&[1, 2], &memberships) {
            TopicAccess::Denied(messages) => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].message, "Address is not in the allow-list");
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_memberships_of_other_groups_are_ignored() {
        let memberships = vec![membership(9, None)];
        assert!(!can_view_topic(&[1], &memberships));
    }
}
