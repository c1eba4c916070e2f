//! Membership refresh orchestration.
//!
//! A community refresh walks the community's addresses in pages ordered by
//! address id. For each page it:
//!
//! 1. picks the `(address, group)` pairs whose membership is missing or older
//!    than the group's TTL (every pair in [`RefreshMode::Force`]),
//! 2. plans and concurrently fetches the balances those pairs need,
//! 3. evaluates every stale pair,
//! 4. writes all verdicts of the page in one upsert.
//!
//! Pages run strictly one after another. Cancellation is checked between
//! pages, so a cancelled run always stops on a committed page boundary and
//! can be resumed from [`RefreshReport::cursor`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gate_balances::{fetch_balances, plan_balance_requests, BalanceProvider, FetchSettings};
use gate_types::env::{env_bool_or, env_secs_or, env_var_or};
use gate_types::{
    AddressId, AddressRecord, GetBalancesOptions, Group, GroupId, Membership, MembershipUpdate,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::evaluator::evaluate_requirements;
use crate::store::MembershipStore;

/// Default page size for community refreshes.
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// TTL applied to groups without a `membership_ttl`.
pub const DEFAULT_MEMBERSHIP_TTL: Duration = Duration::from_secs(120);

/// Tuning for [`MembershipRefresher`].
///
/// Read from the environment with [`RefreshConfig::from_env`]:
///
/// | Variable | Default |
/// |----------|---------|
/// | `GATE_BATCH_SIZE` | 1000 |
/// | `GATE_MEMBERSHIP_TTL_SECS` | 120 |
/// | `GATE_FETCH_TIMEOUT_SECS` | 30 |
/// | `GATE_FETCH_CONCURRENCY` | 16 |
/// | `GATE_CACHE_REFRESH` | false |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Addresses per page.
    pub batch_size: usize,
    pub default_membership_ttl: Duration,
    /// Upper bound for one balance provider call.
    pub fetch_timeout: Duration,
    /// Balance provider calls in flight per page.
    pub fetch_concurrency: usize,
    /// Ask the provider to bypass its balance cache.
    pub cache_refresh: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            default_membership_ttl: DEFAULT_MEMBERSHIP_TTL,
            fetch_timeout: fetch.timeout,
            fetch_concurrency: fetch.concurrency,
            cache_refresh: false,
        }
    }
}

impl RefreshConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_var_or("GATE_BATCH_SIZE", defaults.batch_size),
            default_membership_ttl: env_secs_or(
                "GATE_MEMBERSHIP_TTL_SECS",
                defaults.default_membership_ttl.as_secs(),
            ),
            fetch_timeout: env_secs_or("GATE_FETCH_TIMEOUT_SECS", defaults.fetch_timeout.as_secs()),
            fetch_concurrency: env_var_or("GATE_FETCH_CONCURRENCY", defaults.fetch_concurrency),
            cache_refresh: env_bool_or("GATE_CACHE_REFRESH", defaults.cache_refresh),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_default_membership_ttl(mut self, ttl: Duration) -> Self {
        self.default_membership_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency;
        self
    }

    pub fn with_cache_refresh(mut self, cache_refresh: bool) -> Self {
        self.cache_refresh = cache_refresh;
        self
    }

    fn fetch_settings(&self, mode: RefreshMode) -> FetchSettings {
        FetchSettings {
            timeout: self.fetch_timeout,
            concurrency: self.fetch_concurrency,
            options: GetBalancesOptions {
                cache_refresh: self.cache_refresh || mode == RefreshMode::Force,
            },
        }
    }
}

/// Whether fresh memberships are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Skip memberships whose TTL has not elapsed.
    #[default]
    RespectTtl,
    /// Re-evaluate every membership and bypass balance caches.
    Force,
}

/// What a community refresh covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshScope {
    pub community_id: String,
    /// Restrict the run to one group of the community.
    pub group_id: Option<GroupId>,
    pub mode: RefreshMode,
    /// Resume after this address id.
    pub after: Option<AddressId>,
}

impl RefreshScope {
    pub fn community(community_id: impl Into<String>) -> Self {
        Self {
            community_id: community_id.into(),
            group_id: None,
            mode: RefreshMode::RespectTtl,
            after: None,
        }
    }

    pub fn group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn force(self) -> Self {
        self.mode(RefreshMode::Force)
    }

    pub fn resume_after(mut self, cursor: Option<AddressId>) -> Self {
        self.after = cursor;
        self
    }
}

/// Totals for one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub community_id: String,
    /// Membership rows written for the first time.
    pub created: usize,
    /// Existing rows overwritten.
    pub updated: usize,
    /// Pairs left alone because their membership was still fresh.
    pub skipped: usize,
    /// Verdicts written that admitted the address.
    pub members: usize,
    /// Verdicts written that rejected the address.
    pub rejected: usize,
    pub addresses: usize,
    pub pages: usize,
    /// Balance requests that failed or timed out.
    pub failed_fetches: usize,
    /// Last address id of the last committed page.
    pub cursor: Option<AddressId>,
    pub cancelled: bool,
}

impl RefreshReport {
    fn new(community_id: &str) -> Self {
        Self {
            community_id: community_id.to_string(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, page: &PageOutcome) {
        self.created += page.created;
        self.updated += page.updated;
        self.skipped += page.skipped;
        self.members += page.members;
        self.rejected += page.rejected;
        self.failed_fetches += page.failed_fetches;
    }

    pub fn evaluated(&self) -> usize {
        self.created + self.updated
    }

    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Membership refresh: {}", self.community_id));
        lines.push("=".repeat(40));
        lines.push(format!("  Addresses:      {}", self.addresses));
        lines.push(format!("  Pages:          {}", self.pages));
        lines.push(format!("  Created:        {}", self.created));
        lines.push(format!("  Updated:        {}", self.updated));
        lines.push(format!("  Skipped:        {}", self.skipped));
        lines.push(format!("  Members:        {}", self.members));
        lines.push(format!("  Rejected:       {}", self.rejected));
        lines.push(format!("  Failed fetches: {}", self.failed_fetches));
        match self.cursor {
            Some(cursor) => lines.push(format!("  Cursor:         {}", cursor)),
            None => lines.push("  Cursor:         -".to_string()),
        }
        if self.cancelled {
            lines.push("  Cancelled before completion".to_string());
        }
        lines.join("\n")
    }
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} created, {} updated, {} skipped over {} addresses in {} pages",
            self.community_id, self.created, self.updated, self.skipped, self.addresses, self.pages
        )
    }
}

/// Context attached to a storage error that aborted a page.
///
/// Pages before the failed one are committed; rerunning with
/// `RefreshScope::resume_after(cursor)` picks up at the failed page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("membership refresh of community {community_id} failed after {pages_committed} committed pages (resume cursor: {cursor:?})")]
pub struct PageFailure {
    pub community_id: String,
    pub cursor: Option<AddressId>,
    pub pages_committed: usize,
}

/// Result of refreshing one address.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRefresh {
    pub report: RefreshReport,
    /// Current membership for each requested group, after the refresh.
    pub memberships: Vec<Membership>,
}

impl AddressRefresh {
    pub fn membership(&self, group_id: GroupId) -> Option<&Membership> {
        self.memberships.iter().find(|m| m.group_id == group_id)
    }
}

#[derive(Debug, Default)]
struct PageOutcome {
    created: usize,
    updated: usize,
    skipped: usize,
    members: usize,
    rejected: usize,
    failed_fetches: usize,
}

/// Keeps a community's memberships up to date.
pub struct MembershipRefresher {
    store: Arc<dyn MembershipStore>,
    provider: Arc<dyn BalanceProvider>,
    config: RefreshConfig,
}

impl MembershipRefresher {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        provider: Arc<dyn BalanceProvider>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    /// Refresh every address of a community, one page at a time.
    pub async fn refresh_community(
        &self,
        scope: &RefreshScope,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport> {
        let community_id = scope.community_id.as_str();
        let groups = self.scope_groups(scope).await?;
        let mut report = RefreshReport::new(community_id);
        report.cursor = scope.after;
        if groups.is_empty() {
            debug!(community = %community_id, "no groups to refresh");
            return Ok(report);
        }

        let group_ids: Vec<GroupId> = groups.iter().map(|g| g.id).collect();
        let batch_size = self.config.batch_size.max(1);
        info!(
            community = %community_id,
            groups = groups.len(),
            batch_size,
            mode = ?scope.mode,
            "starting membership refresh"
        );

        loop {
            if cancel.is_cancelled() {
                info!(community = %community_id, cursor = ?report.cursor, "membership refresh cancelled");
                report.cancelled = true;
                break;
            }

            let page = self
                .store
                .address_page(community_id, &group_ids, report.cursor, batch_size)
                .await
                .with_context(|| page_failure(&report))?;
            if page.is_empty() {
                break;
            }

            let outcome = self
                .process_page(&groups, &page, scope.mode)
                .await
                .with_context(|| page_failure(&report))?;

            report.absorb(&outcome);
            report.pages += 1;
            report.addresses += page.len();
            report.cursor = page.last().map(|a| a.id);
            info!(
                community = %community_id,
                page = report.pages,
                addresses = page.len(),
                created = outcome.created,
                updated = outcome.updated,
                skipped = outcome.skipped,
                failed_fetches = outcome.failed_fetches,
                cursor = ?report.cursor,
                "committed membership page"
            );

            if page.len() < batch_size {
                break;
            }
        }

        info!(
            community = %community_id,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            addresses = report.addresses,
            pages = report.pages,
            cancelled = report.cancelled,
            "membership refresh finished"
        );
        Ok(report)
    }

    /// Refresh one address against `groups`, returning its resulting
    /// memberships. Used for on-demand access checks.
    pub async fn refresh_address(
        &self,
        address: &AddressRecord,
        groups: &[Group],
        mode: RefreshMode,
    ) -> Result<AddressRefresh> {
        if let Some(group) = groups
            .iter()
            .find(|group| group.community_id != address.community_id)
        {
            return Err(anyhow!(
                "Group {} belongs to community {}, not {}",
                group.id,
                group.community_id,
                address.community_id
            ));
        }

        let mut report = RefreshReport::new(&address.community_id);
        let outcome = self
            .process_page(groups, std::slice::from_ref(address), mode)
            .await
            .with_context(|| format!("Failed to refresh memberships of address {}", address.id))?;
        report.absorb(&outcome);
        report.pages = 1;
        report.addresses = 1;
        report.cursor = Some(address.id);

        let current = self
            .store
            .address(address.id)
            .await
            .with_context(|| format!("Failed to reload address {}", address.id))?
            .ok_or_else(|| anyhow!("Address {} disappeared during refresh", address.id))?;
        let memberships = groups
            .iter()
            .filter_map(|group| current.membership(group.id).cloned())
            .collect();

        debug!(
            address_id = address.id,
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "refreshed address"
        );
        Ok(AddressRefresh {
            report,
            memberships,
        })
    }

    /// Refresh one address by id against the given groups of the store.
    pub async fn refresh_address_by_id(
        &self,
        address_id: AddressId,
        group_ids: &[GroupId],
        mode: RefreshMode,
    ) -> Result<AddressRefresh> {
        let address = self
            .store
            .address(address_id)
            .await?
            .ok_or_else(|| anyhow!("Unknown address {}", address_id))?;
        let mut groups = Vec::with_capacity(group_ids.len());
        for group_id in group_ids {
            let group = self
                .store
                .group(*group_id)
                .await?
                .ok_or_else(|| anyhow!("Unknown group {}", group_id))?;
            groups.push(group);
        }
        self.refresh_address(&address, &groups, mode).await
    }

    /// Drop every membership of a group and re-evaluate the whole community
    /// against its current requirements.
    pub async fn reset_group(
        &self,
        group_id: GroupId,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport> {
        let group = self
            .store
            .group(group_id)
            .await?
            .ok_or_else(|| anyhow!("Unknown group {}", group_id))?;
        let removed = self
            .store
            .delete_group_memberships(group_id)
            .await
            .with_context(|| format!("Failed to delete memberships of group {}", group_id))?;
        info!(group = group_id, removed, "cleared group memberships");

        let scope = RefreshScope::community(group.community_id.clone())
            .group(group_id)
            .force();
        self.refresh_community(&scope, cancel).await
    }

    async fn scope_groups(&self, scope: &RefreshScope) -> Result<Vec<Group>> {
        match scope.group_id {
            Some(group_id) => {
                let group = self
                    .store
                    .group(group_id)
                    .await?
                    .ok_or_else(|| anyhow!("Unknown group {}", group_id))?;
                if group.community_id != scope.community_id {
                    return Err(anyhow!(
                        "Group {} belongs to community {}, not {}",
                        group_id,
                        group.community_id,
                        scope.community_id
                    ));
                }
                Ok(vec![group])
            }
            None => self
                .store
                .community_groups(&scope.community_id)
                .await
                .with_context(|| format!("Failed to load groups of {}", scope.community_id)),
        }
    }

    /// Evaluate and persist the stale pairs of one page.
    async fn process_page(
        &self,
        groups: &[Group],
        page: &[AddressRecord],
        mode: RefreshMode,
    ) -> Result<PageOutcome> {
        let now = self.store.now();
        let mut outcome = PageOutcome::default();

        let mut stale: Vec<(&AddressRecord, &Group)> = Vec::new();
        for address in page {
            for group in groups {
                let ttl = group.membership_ttl(self.config.default_membership_ttl);
                let fresh = mode == RefreshMode::RespectTtl
                    && address
                        .membership(group.id)
                        .is_some_and(|m| m.is_fresh(now, ttl));
                if fresh {
                    outcome.skipped += 1;
                } else {
                    stale.push((address, group));
                }
            }
        }
        if stale.is_empty() {
            return Ok(outcome);
        }

        // Only fetch what the stale pairs need.
        let mut seen_addresses = HashSet::new();
        let mut seen_groups = HashSet::new();
        let mut stale_addresses = Vec::new();
        let mut stale_groups = Vec::new();
        for (address, group) in &stale {
            if seen_addresses.insert(address.id) {
                stale_addresses.push(address.address.clone());
            }
            if seen_groups.insert(group.id) {
                stale_groups.push((*group).clone());
            }
        }

        let requests = plan_balance_requests(&stale_groups, &stale_addresses);
        debug!(
            pairs = stale.len(),
            addresses = stale_addresses.len(),
            requests = requests.len(),
            "planned balance fetches"
        );
        let fetched = fetch_balances(
            self.provider.as_ref(),
            &requests,
            &self.config.fetch_settings(mode),
        )
        .await;
        outcome.failed_fetches = fetched.failures.len();

        let updates: Vec<MembershipUpdate> = stale
            .iter()
            .map(|(address, group)| {
                let evaluation = evaluate_requirements(
                    &address.address,
                    &group.requirements,
                    &fetched.results,
                    group.required_requirements(),
                );
                if evaluation.allowed {
                    outcome.members += 1;
                } else {
                    outcome.rejected += 1;
                }
                MembershipUpdate {
                    group_id: group.id,
                    address_id: address.id,
                    reject_reason: evaluation.reject_reason(),
                }
            })
            .collect();

        let summary = self.store.upsert_memberships(&updates).await?;
        outcome.created = summary.created;
        outcome.updated = summary.updated;
        Ok(outcome)
    }
}

fn page_failure(report: &RefreshReport) -> PageFailure {
    PageFailure {
        community_id: report.community_id.clone(),
        cursor: report.cursor,
        pages_committed: report.pages,
    }
}
