//! Membership evaluation and refresh for token-gated communities.
//!
//! - [`evaluate_requirements`]: pure verdict for one address and one group
//! - [`MembershipStore`]: storage seam, with [`InMemoryMembershipStore`]
//! - [`MembershipRefresher`]: paginated, TTL-aware community and address refresh
//! - [`can_view_topic`]: content gating on top of stored verdicts
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gate_balances::FixtureBalanceProvider;
//! use gate_membership::{InMemoryMembershipStore, MembershipRefresher, RefreshConfig, RefreshScope};
//! use tokio_util::sync::CancellationToken;
//!
//! let refresher = MembershipRefresher::new(
//!     Arc::new(InMemoryMembershipStore::new()),
//!     Arc::new(FixtureBalanceProvider::new()),
//!     RefreshConfig::from_env(),
//! );
//! let report = refresher
//!     .refresh_community(&RefreshScope::community("dao"), &CancellationToken::new())
//!     .await?;
//! println!("{}", report.format_report());
//! ```

pub mod access;
pub mod evaluator;
pub mod memory;
pub mod refresh;
pub mod store;

pub use access::{can_view_topic, topic_access, TopicAccess};
pub use evaluator::{check_requirement, evaluate_requirements, Evaluation, RequirementFailure};
pub use memory::{InMemoryMembershipStore, StoreSnapshot};
pub use refresh::{
    AddressRefresh, MembershipRefresher, PageFailure, RefreshConfig, RefreshMode, RefreshReport,
    RefreshScope, DEFAULT_BATCH_SIZE, DEFAULT_MEMBERSHIP_TTL,
};
pub use store::{MembershipStore, UpsertSummary};
