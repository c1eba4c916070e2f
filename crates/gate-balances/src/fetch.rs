//! Concurrent execution of a balance plan.
//!
//! Every planned request runs concurrently (bounded by `concurrency`) and is
//! awaited before this returns. A request that errors or times out degrades to
//! an empty [`BalanceResult`] for its source; it never fails the batch.

use std::time::Duration;

use anyhow::anyhow;
use futures::stream::{self, StreamExt};
use gate_types::{BalanceBatchRequest, BalanceResult, GetBalancesOptions, SourceKey};
use tracing::{debug, warn};

use crate::provider::BalanceProvider;

/// How a plan is executed.
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Upper bound for a single provider call.
    pub timeout: Duration,
    /// Maximum provider calls in flight.
    pub concurrency: usize,
    pub options: GetBalancesOptions,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            concurrency: 16,
            options: GetBalancesOptions::default(),
        }
    }
}

/// A source whose balances could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub source_key: SourceKey,
    pub reason: String,
}

/// Results of executing a plan: one [`BalanceResult`] per request, in no
/// particular order, plus the sources that degraded.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub results: Vec<BalanceResult>,
    pub failures: Vec<FetchFailure>,
}

/// Run every request against `provider` and wait for all of them.
pub async fn fetch_balances(
    provider: &dyn BalanceProvider,
    requests: &[BalanceBatchRequest],
    settings: &FetchSettings,
) -> FetchOutcome {
    let timeout = settings.timeout;
    let options = settings.options;

    let fetched: Vec<(SourceKey, anyhow::Result<BalanceResult>)> = stream::iter(requests)
        .map(|request| async move {
            let result =
                match tokio::time::timeout(timeout, provider.get_balances(request, options)).await
                {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(anyhow!("timed out after {}ms", timeout.as_millis())),
                };
            (request.source_key.clone(), result)
        })
        .buffer_unordered(settings.concurrency.max(1))
        .collect()
        .await;

    let mut outcome = FetchOutcome::default();
    for (source_key, result) in fetched {
        match result {
            Ok(mut result) => {
                // Results are matched to requirements by key, so pin it to the request.
                result.source_key = source_key;
                debug!(
                    source = %result.source_key,
                    balances = result.balances.len(),
                    "fetched balances"
                );
                outcome.results.push(result);
            }
            Err(e) => {
                warn!(source = %source_key, error = %e, "balance fetch failed, continuing without it");
                outcome.failures.push(FetchFailure {
                    source_key: source_key.clone(),
                    reason: e.to_string(),
                });
                outcome.results.push(BalanceResult::empty(source_key));
            }
        }
    }
    outcome
}
