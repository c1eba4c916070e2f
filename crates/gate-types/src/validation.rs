//! Shape checks for groups and requirements.
//!
//! These run when groups are loaded or written, before any evaluation. The
//! evaluator does not rely on them: it still fails closed on anything it cannot
//! interpret.

use thiserror::Error;

use crate::group::Group;
use crate::requirement::Requirement;
use crate::source::BalanceSource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("threshold '{0}' is not an unsigned integer")]
    InvalidThreshold(String),

    #[error("allow-list is empty")]
    EmptyAllowList,

    #[error("allow-list entry '{0}' is not an EVM address")]
    InvalidAllowAddress(String),

    #[error("contract address '{0}' is not an EVM address")]
    InvalidContractAddress(String),

    #[error("erc1155 source requires a token_id")]
    MissingTokenId,

    #[error("token id '{0}' is not an unsigned integer")]
    InvalidTokenId(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("unrecognized rule '{0}'")]
    UnrecognizedRule(String),

    #[error("group requires {required} requirements but only has {available}")]
    QuorumTooLarge { required: usize, available: usize },

    #[error("requirement {index}: {source}")]
    Requirement {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

/// `0x` followed by 40 hex digits.
pub fn is_evm_address(value: &str) -> bool {
    value.len() == 42
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn is_unsigned_integer(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

pub fn validate_source(source: &BalanceSource) -> Result<(), ValidationError> {
    match source {
        BalanceSource::Erc20(c) | BalanceSource::Erc721(c) => {
            if !is_evm_address(&c.contract_address) {
                return Err(ValidationError::InvalidContractAddress(
                    c.contract_address.clone(),
                ));
            }
            if let Some(token_id) = &c.token_id {
                if !is_unsigned_integer(token_id) {
                    return Err(ValidationError::InvalidTokenId(token_id.clone()));
                }
            }
        }
        BalanceSource::Erc1155(c) => {
            if !is_evm_address(&c.contract_address) {
                return Err(ValidationError::InvalidContractAddress(
                    c.contract_address.clone(),
                ));
            }
            match &c.token_id {
                None => return Err(ValidationError::MissingTokenId),
                Some(token_id) if !is_unsigned_integer(token_id) => {
                    return Err(ValidationError::InvalidTokenId(token_id.clone()));
                }
                Some(_) => {}
            }
        }
        BalanceSource::EthNative(_) => {}
        BalanceSource::CosmosNative(c) => {
            if c.cosmos_chain_id.is_empty() {
                return Err(ValidationError::EmptyField("cosmos_chain_id"));
            }
            if c.token_symbol.is_empty() {
                return Err(ValidationError::EmptyField("token_symbol"));
            }
        }
        BalanceSource::Cw20(c) | BalanceSource::Cw721(c) => {
            if c.cosmos_chain_id.is_empty() {
                return Err(ValidationError::EmptyField("cosmos_chain_id"));
            }
            if c.contract_address.is_empty() {
                return Err(ValidationError::EmptyField("contract_address"));
            }
        }
    }
    Ok(())
}

pub fn validate_requirement(requirement: &Requirement) -> Result<(), ValidationError> {
    match requirement {
        Requirement::Threshold(data) => {
            if !is_unsigned_integer(&data.threshold) {
                return Err(ValidationError::InvalidThreshold(data.threshold.clone()));
            }
            validate_source(&data.source)
        }
        Requirement::Allow(data) => {
            if data.allow.is_empty() {
                return Err(ValidationError::EmptyAllowList);
            }
            match data.allow.iter().find(|a| !is_evm_address(a)) {
                Some(bad) => Err(ValidationError::InvalidAllowAddress(bad.clone())),
                None => Ok(()),
            }
        }
        Requirement::Unrecognized { rule, .. } => {
            Err(ValidationError::UnrecognizedRule(rule.clone()))
        }
    }
}

pub fn validate_group(group: &Group) -> Result<(), ValidationError> {
    if group.metadata.name.trim().is_empty() {
        return Err(ValidationError::EmptyField("name"));
    }
    if group.community_id.is_empty() {
        return Err(ValidationError::EmptyField("community_id"));
    }
    for (index, requirement) in group.requirements.iter().enumerate() {
        validate_requirement(requirement).map_err(|e| ValidationError::Requirement {
            index,
            source: Box::new(e),
        })?;
    }
    let required = group.required_requirements();
    if required > group.requirements.len() {
        return Err(ValidationError::QuorumTooLarge {
            required,
            available: group.requirements.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupMetadata;
    use crate::source::{ContractSource, NativeSource};

    const TOKEN: &str = "0x5555555555555555555555555555555555555555";

    fn erc20(threshold: &str) -> Requirement {
        Requirement::threshold(
            threshold,
            BalanceSource::Erc20(ContractSource {
                evm_chain_id: 1,
                contract_address: TOKEN.to_string(),
                token_id: None,
            }),
        )
    }

    #[test]
    fn test_threshold_must_be_digits() {
        assert!(validate_requirement(&erc20("100")).is_ok());
        assert_eq!(
            validate_requirement(&erc20("-1")),
            Err(ValidationError::InvalidThreshold("-1".to_string()))
        );
        assert!(validate_requirement(&erc20("1.5")).is_err());
        assert!(validate_requirement(&erc20("")).is_err());
    }

    #[test]
    fn test_allow_list_checks() {
        let empty = Requirement::allow(Vec::<String>::new());
        assert_eq!(validate_requirement(&empty), Err(ValidationError::EmptyAllowList));

        let bad = Requirement::allow(["0x111"]);
        assert_eq!(
            validate_requirement(&bad),
            Err(ValidationError::InvalidAllowAddress("0x111".to_string()))
        );

        let good = Requirement::allow(["0x1111111111111111111111111111111111111111"]);
        assert!(validate_requirement(&good).is_ok());
    }

    #[test]
    fn test_erc1155_needs_token_id() {
        let requirement = Requirement::threshold(
            "0",
            BalanceSource::Erc1155(ContractSource {
                evm_chain_id: 1,
                contract_address: TOKEN.to_string(),
                token_id: None,
            }),
        );
        assert_eq!(
            validate_requirement(&requirement),
            Err(ValidationError::MissingTokenId)
        );
    }

    #[test]
    fn test_group_quorum_cannot_exceed_requirements() {
        let group = Group {
            id: 1,
            community_id: "c".to_string(),
            metadata: GroupMetadata {
                name: "holders".to_string(),
                description: String::new(),
                required_requirements: Some(3),
                membership_ttl: None,
            },
            requirements: vec![
                erc20("1"),
                Requirement::threshold(
                    "1",
                    BalanceSource::EthNative(NativeSource { evm_chain_id: 1 }),
                ),
            ],
        };
        assert_eq!(
            validate_group(&group),
            Err(ValidationError::QuorumTooLarge {
                required: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_group_reports_failing_requirement_index() {
        let group = Group {
            id: 1,
            community_id: "c".to_string(),
            metadata: GroupMetadata {
                name: "holders".to_string(),
                description: String::new(),
                required_requirements: None,
                membership_ttl: None,
            },
            requirements: vec![erc20("1"), erc20("abc")],
        };
        let err = validate_group(&group).unwrap_err();
        assert!(matches!(err, ValidationError::Requirement { index: 1, .. }));
        assert!(err.to_string().contains("abc"));
    }
}
