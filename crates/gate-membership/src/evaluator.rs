//! Membership evaluation for one address against one group's requirements.
//!
//! Every requirement is checked independently, so a verdict always carries a
//! message for each requirement that failed. Policy:
//!
//! - A matching allow-list admits the address outright; it is not counted
//!   toward the quorum.
//! - Otherwise, with `required_count = k > 0`, at least `k` requirements must
//!   pass; with `required_count = 0` all of them must (vacuously true for none).
//! - A rule the evaluator does not recognise rejects the address.
//!
//! Threshold requirements pass only when the balance is strictly greater than
//! the threshold.

use std::str::FromStr;

use gate_types::{BalanceResult, Requirement, RequirementMessage, ThresholdData};
use num_bigint::BigUint;
use thiserror::Error;

/// Why a single requirement did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementFailure {
    #[error("Address is not in the allow-list")]
    NotAllowListed,

    #[error("balance unavailable")]
    BalanceUnavailable,

    #[error("User Balance of {balance} below threshold {threshold}")]
    BelowThreshold { balance: String, threshold: String },

    #[error("Error: {0}")]
    Malformed(String),

    #[error("Invalid Requirement")]
    InvalidRequirement,
}

/// Verdict for one `(address, group)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub allowed: bool,
    /// Requirements that passed.
    pub num_met: usize,
    /// One entry per failed requirement, in requirement order.
    pub messages: Vec<RequirementMessage>,
}

impl Evaluation {
    /// Value persisted in `Membership::reject_reason`: `None` when allowed,
    /// otherwise the JSON array of failure messages.
    pub fn reject_reason(&self) -> Option<String> {
        if self.allowed {
            return None;
        }
        Some(
            serde_json::to_string(&self.messages)
                .unwrap_or_else(|_| format!("[{{\"message\":\"{}\"}}]", RequirementFailure::InvalidRequirement)),
        )
    }
}

/// Evaluate `address` against `requirements` using already-fetched balances.
pub fn evaluate_requirements(
    address: &str,
    requirements: &[Requirement],
    balances: &[BalanceResult],
    required_count: usize,
) -> Evaluation {
    let checks: Vec<(&Requirement, Result<(), RequirementFailure>)> = requirements
        .iter()
        .map(|requirement| (requirement, check_requirement(address, requirement, balances)))
        .collect();

    let num_met = checks.iter().filter(|(_, result)| result.is_ok()).count();
    let allow_listed = checks
        .iter()
        .any(|(requirement, result)| matches!(requirement, Requirement::Allow(_)) && result.is_ok());
    let has_invalid = checks
        .iter()
        .any(|(_, result)| matches!(result, Err(RequirementFailure::InvalidRequirement)));

    let allowed = if has_invalid {
        false
    } else if allow_listed {
        true
    } else if required_count > 0 {
        num_met >= required_count
    } else {
        num_met == requirements.len()
    };

    let messages = checks
        .into_iter()
        .filter_map(|(requirement, result)| {
            result.err().map(|failure| RequirementMessage {
                requirement: requirement.clone(),
                message: failure.to_string(),
            })
        })
        .collect();

    Evaluation {
        allowed,
        num_met,
        messages,
    }
}

/// Pass/fail for a single requirement.
pub fn check_requirement(
    address: &str,
    requirement: &Requirement,
    balances: &[BalanceResult],
) -> Result<(), RequirementFailure> {
    match requirement {
        Requirement::Allow(data) => {
            if data.contains(address) {
                Ok(())
            } else {
                Err(RequirementFailure::NotAllowListed)
            }
        }
        Requirement::Threshold(data) => check_threshold(address, data, balances),
        Requirement::Unrecognized { .. } => Err(RequirementFailure::InvalidRequirement),
    }
}

fn check_threshold(
    address: &str,
    data: &ThresholdData,
    balances: &[BalanceResult],
) -> Result<(), RequirementFailure> {
    let key = data.source.source_key();
    let balance = balances
        .iter()
        .find(|result| result.matches(&key))
        .and_then(|result| result.balance_of(address))
        .ok_or(RequirementFailure::BalanceUnavailable)?;

    let parsed_balance = parse_amount(balance)?;
    let parsed_threshold = parse_amount(&data.threshold)?;

    if parsed_balance > parsed_threshold {
        Ok(())
    } else {
        Err(RequirementFailure::BelowThreshold {
            balance: balance.to_string(),
            threshold: data.threshold.clone(),
        })
    }
}

/// Amounts are plain decimal digits. `BigUint::from_str` alone would also
/// take a leading `+` and `_` separators.
fn parse_amount(value: &str) -> Result<BigUint, RequirementFailure> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RequirementFailure::Malformed(format!(
            "cannot parse '{}' as an amount: not a decimal integer",
            value
        )));
    }
    BigUint::from_str(value)
        .map_err(|e| RequirementFailure::Malformed(format!("cannot parse '{}' as an amount: {}", value, e)))
}
