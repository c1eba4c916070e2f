//! Balance planning and fetching for token-gated membership.
//!
//! This crate provides:
//! - [`plan_balance_requests`]: the deduplicated set of fetches a page of addresses needs
//! - [`BalanceProvider`]: the seam to whatever actually reads chain balances
//! - [`fetch_balances`]: concurrent plan execution with per-source degradation
//! - [`CachedBalanceProvider`]: TTL cache decorator with [`BalanceCacheMetrics`]
//! - [`FixtureBalanceProvider`]: in-memory provider for tests and offline runs

pub mod cache;
pub mod fetch;
pub mod fixture;
pub mod metrics;
pub mod planner;
pub mod provider;

pub use cache::CachedBalanceProvider;
pub use fetch::{fetch_balances, FetchFailure, FetchOutcome, FetchSettings};
pub use fixture::{FixtureBalanceProvider, SourceBalances};
pub use metrics::{BalanceCacheMetrics, BalanceCacheSnapshot};
pub use planner::plan_balance_requests;
pub use provider::BalanceProvider;
