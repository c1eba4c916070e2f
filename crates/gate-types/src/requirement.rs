//! Gating rules attached to a group.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::{BalanceSource, SourceKey};

/// Holder must own strictly more than `threshold` units of `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdData {
    /// Unsigned decimal integer of arbitrary size, kept as a string on the wire.
    pub threshold: String,
    pub source: BalanceSource,
}

/// Explicit allow-list of addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistData {
    pub allow: BTreeSet<String>,
}

impl AllowlistData {
    /// Exact, case-sensitive membership test.
    pub fn contains(&self, address: &str) -> bool {
        self.allow.contains(address)
    }
}

/// One gating rule.
///
/// Serialized as `{"rule": "threshold" | "allow", "data": {...}}`. Rules this
/// engine does not know deserialize into [`Requirement::Unrecognized`] so they
/// can be failed closed at evaluation time instead of breaking group loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRequirement", into = "RawRequirement")]
pub enum Requirement {
    Threshold(ThresholdData),
    Allow(AllowlistData),
    Unrecognized { rule: String, data: Value },
}

impl Requirement {
    pub fn threshold(threshold: impl Into<String>, source: BalanceSource) -> Self {
        Requirement::Threshold(ThresholdData {
            threshold: threshold.into(),
            source,
        })
    }

    pub fn allow<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::Allow(AllowlistData {
            allow: addresses.into_iter().map(Into::into).collect(),
        })
    }

    /// Rule name as it appears on the wire.
    pub fn rule(&self) -> &str {
        match self {
            Requirement::Threshold(_) => RULE_THRESHOLD,
            Requirement::Allow(_) => RULE_ALLOW,
            Requirement::Unrecognized { rule, .. } => rule,
        }
    }

    /// Balance this requirement depends on, if any.
    pub fn source_key(&self) -> Option<SourceKey> {
        match self {
            Requirement::Threshold(data) => Some(data.source.source_key()),
            _ => None,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Threshold(data) => {
                write!(f, "threshold {} on {}", data.threshold, data.source.source_key())
            }
            Requirement::Allow(data) => write!(f, "allow-list of {}", data.allow.len()),
            Requirement::Unrecognized { rule, .. } => write!(f, "unrecognized rule '{}'", rule),
        }
    }
}

const RULE_THRESHOLD: &str = "threshold";
const RULE_ALLOW: &str = "allow";

/// Wire shape shared by every rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRequirement {
    rule: String,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawRequirement> for Requirement {
    type Error = serde_json::Error;

    fn try_from(raw: RawRequirement) -> Result<Self, Self::Error> {
        match raw.rule.as_str() {
            RULE_THRESHOLD => Ok(Requirement::Threshold(serde_json::from_value(raw.data)?)),
            RULE_ALLOW => Ok(Requirement::Allow(serde_json::from_value(raw.data)?)),
            _ => Ok(Requirement::Unrecognized {
                rule: raw.rule,
                data: raw.data,
            }),
        }
    }
}

impl From<Requirement> for RawRequirement {
    fn from(requirement: Requirement) -> Self {
        match requirement {
            Requirement::Threshold(data) => RawRequirement {
                rule: RULE_THRESHOLD.to_string(),
                data: serde_json::to_value(data).unwrap_or_default(),
            },
            Requirement::Allow(data) => RawRequirement {
                rule: RULE_ALLOW.to_string(),
                data: serde_json::to_value(data).unwrap_or_default(),
            },
            Requirement::Unrecognized { rule, data } => RawRequirement { rule, data },
        }
    }
}
