//! Shared data model for the token-gate workspace.
//!
//! - [`Requirement`]: one gating rule (balance threshold or allow-list)
//! - [`BalanceSource`] / [`SourceKey`]: where a balance lives and its dedup key
//! - [`Group`]: a community's bundle of requirements plus quorum and TTL policy
//! - [`Membership`]: the cached verdict for one `(group, address)` pair
//! - [`BalanceBatchRequest`] / [`BalanceResult`]: the balance provider contract

pub mod balance;
pub mod env;
pub mod group;
pub mod membership;
pub mod requirement;
pub mod source;
pub mod validation;

pub use balance::{BalanceBatchRequest, BalanceResult, GetBalancesOptions};
pub use group::{Group, GroupId, GroupMetadata};
pub use membership::{
    AddressId, AddressRecord, Membership, MembershipUpdate, RequirementMessage,
};
pub use requirement::{AllowlistData, Requirement, ThresholdData};
pub use source::{
    BalanceSource, BalanceSourceType, ChainId, ContractSource, CosmosContractSource,
    CosmosSource, NativeSource, SourceKey,
};
pub use validation::{validate_group, validate_requirement, ValidationError};
