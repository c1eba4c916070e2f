//! gate-refresh: run a membership refresh against a JSON snapshot
//!
//! Loads groups, addresses, memberships and fixture balances from a snapshot,
//! refreshes either a whole community or one address, prints the report and
//! optionally writes the updated snapshot.
//!
//! ## Example Usage
//!
//! ```bash
//! # Refresh every stale membership of a community
//! gate-refresh --snapshot state.json --community dao
//!
//! # Re-evaluate one group after its requirements changed
//! gate-refresh --snapshot state.json --community dao --group 3 --force --output state.json
//!
//! # On-demand check for a single address
//! gate-refresh --snapshot state.json --community dao --address 0xabc... --json
//! ```
//!
//! Ctrl-C stops a community refresh after the current page is committed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use token_gate::membership::{
    AddressRefresh, InMemoryMembershipStore, MembershipStore, DEFAULT_BATCH_SIZE,
};
use token_gate::types::{AddressId, GroupId};
use token_gate::{MembershipRefresher, RefreshConfig, RefreshMode, RefreshScope, Snapshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Used when `RUST_LOG` is unset; other targets log at `warn`.
const DEFAULT_LOG_FILTER: &str =
    "warn,gate_refresh=info,token_gate=info,gate_membership=info,gate_balances=info";

#[derive(Parser, Debug)]
#[command(
    name = "gate-refresh",
    version,
    about = "Refresh token-gated community memberships from a snapshot"
)]
struct Args {
    /// Snapshot file with groups, addresses, memberships and balances
    #[arg(long, env = "GATE_SNAPSHOT")]
    snapshot: PathBuf,

    /// Community to refresh
    #[arg(long, env = "GATE_COMMUNITY")]
    community: String,

    /// Only refresh this group
    #[arg(long)]
    group: Option<GroupId>,

    /// Only refresh this address (on-demand check)
    #[arg(long)]
    address: Option<String>,

    /// Re-evaluate memberships even if they are still fresh
    #[arg(long)]
    force: bool,

    /// Resume a community refresh after this address id
    #[arg(long, conflicts_with = "address")]
    resume_after: Option<AddressId>,

    /// Addresses per page
    #[arg(long, env = "GATE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// TTL in seconds for groups without their own membership_ttl
    #[arg(long, env = "GATE_MEMBERSHIP_TTL_SECS", default_value = "120")]
    membership_ttl_secs: u64,

    /// Timeout in seconds for one balance request
    #[arg(long, env = "GATE_FETCH_TIMEOUT_SECS", default_value = "30")]
    fetch_timeout_secs: u64,

    /// Balance requests in flight per page
    #[arg(long, env = "GATE_FETCH_CONCURRENCY", default_value = "16")]
    fetch_concurrency: usize,

    /// Ask the balance provider to bypass its cache
    #[arg(long, env = "GATE_CACHE_REFRESH")]
    cache_refresh: bool,

    /// Write the updated snapshot here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long)]
    json: bool,
}

impl Args {
    fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig::default()
            .with_batch_size(self.batch_size)
            .with_default_membership_ttl(Duration::from_secs(self.membership_ttl_secs))
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_fetch_concurrency(self.fetch_concurrency)
            .with_cache_refresh(self.cache_refresh)
    }

    fn mode(&self) -> RefreshMode {
        if self.force {
            RefreshMode::Force
        } else {
            RefreshMode::RespectTtl
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let snapshot = Snapshot::load(&args.snapshot)?;
    snapshot.validate()?;
    let (store, provider) = snapshot.open()?;
    let store = Arc::new(store);
    let refresher = MembershipRefresher::new(store.clone(), Arc::new(provider), args.refresh_config());

    match &args.address {
        Some(address) => {
            let refreshed = refresh_address(&refresher, &store, &args, address).await?;
            print_address(&refreshed, args.json)?;
        }
        None => {
            let mut scope = RefreshScope::community(args.community.clone())
                .mode(args.mode())
                .resume_after(args.resume_after);
            if let Some(group_id) = args.group {
                scope = scope.group(group_id);
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current page");
                    on_signal.cancel();
                }
            });

            let report = refresher.refresh_community(&scope, &cancel).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.format_report());
            }
        }
    }

    if let Some(output) = &args.output {
        snapshot.with_store(&store).save(output)?;
        info!(path = %output.display(), "wrote snapshot");
    }
    Ok(())
}

async fn refresh_address(
    refresher: &MembershipRefresher,
    store: &InMemoryMembershipStore,
    args: &Args,
    address: &str,
) -> Result<AddressRefresh> {
    let address_id = store
        .find_address(&args.community, address)
        .ok_or_else(|| anyhow!("Unknown address {} in community {}", address, args.community))?;

    let group_ids: Vec<GroupId> = match args.group {
        Some(group_id) => vec![group_id],
        None => store
            .community_groups(&args.community)
            .await?
            .iter()
            .map(|g| g.id)
            .collect(),
    };

    refresher
        .refresh_address_by_id(address_id, &group_ids, args.mode())
        .await
        .with_context(|| format!("Failed to refresh address {}", address))
}

fn print_address(refreshed: &AddressRefresh, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "report": refreshed.report,
            "memberships": refreshed.memberships,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", refreshed.report.format_report());
    for membership in &refreshed.memberships {
        if membership.is_member() {
            println!("  group {}: member", membership.group_id);
            continue;
        }
        let messages = membership.reject_messages()?;
        let reasons: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
        println!("  group {}: rejected ({})", membership.group_id, reasons.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_default_filter_reports_fetch_failures() {
        let subscriber = tracing_subscriber::registry().with(EnvFilter::new(DEFAULT_LOG_FILTER));

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "gate_balances::fetch", Level::WARN));
            assert!(tracing::enabled!(target: "gate_membership::refresh", Level::INFO));
            assert!(tracing::enabled!(target: "gate_refresh", Level::INFO));
            assert!(!tracing::enabled!(target: "gate_balances::fetch", Level::DEBUG));
            assert!(!tracing::enabled!(target: "hyper::client", Level::INFO));
        });
    }
}
