//! Token-gated community membership
//!
//! Decides which addresses may see gated community content from their on-chain
//! balances, and keeps those decisions fresh:
//!
//! - **Requirements**: balance thresholds and allow-lists, see [`types`]
//! - **Balances**: batched, deduplicated and cached fetches, see [`balances`]
//! - **Membership**: evaluation and paginated, TTL-aware refresh, see [`membership`]
//! - **Snapshots**: offline runs of the refresh worker, see [`snapshot`]

pub mod snapshot;

pub use gate_balances as balances;
pub use gate_membership as membership;
pub use gate_types as types;

pub use gate_membership::{
    can_view_topic, evaluate_requirements, MembershipRefresher, RefreshConfig, RefreshMode,
    RefreshReport, RefreshScope,
};
pub use snapshot::Snapshot;
