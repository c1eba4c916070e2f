//! TTL cache in front of a balance provider.
//!
//! Balances are cached per `(source_key, address)`. A request is answered from
//! the cache where possible and only the missing or expired addresses are
//! forwarded upstream. With `cache_refresh` set, every address is re-read and
//! the fresh balances overwrite the cache.
//!
//! # Example
//!
//! ```ignore
//! use gate_balances::{CachedBalanceProvider, FixtureBalanceProvider};
//!
//! let provider = CachedBalanceProvider::new(FixtureBalanceProvider::new(), Duration::from_secs(300));
//! let result = provider.get_balances(&request, GetBalancesOptions::default()).await?;
//! println!("{}", provider.metrics().snapshot().format_report());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use gate_types::{BalanceBatchRequest, BalanceResult, GetBalancesOptions, SourceKey};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::BalanceCacheMetrics;
use crate::provider::BalanceProvider;

#[derive(Debug, Clone)]
struct CachedBalance {
    balance: String,
    fetched_at: Instant,
}

/// Caching decorator for any [`BalanceProvider`].
pub struct CachedBalanceProvider<P> {
    inner: P,
    ttl: Duration,
    entries: RwLock<HashMap<SourceKey, HashMap<String, CachedBalance>>>,
    metrics: BalanceCacheMetrics,
}

impl<P: BalanceProvider> CachedBalanceProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
            metrics: BalanceCacheMetrics::default(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn metrics(&self) -> &BalanceCacheMetrics {
        &self.metrics
    }

    /// Drop every cached balance for one source.
    pub fn invalidate(&self, key: &SourceKey) {
        self.entries.write().remove(key);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached `(source, address)` balances, including expired ones
    /// that have not been purged yet.
    pub fn len(&self) -> usize {
        self.entries.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired balance. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before: usize = entries.values().map(HashMap::len).sum();
        for cached in entries.values_mut() {
            cached.retain(|_, entry| now.duration_since(entry.fetched_at) < self.ttl);
        }
        entries.retain(|_, cached| !cached.is_empty());
        let after: usize = entries.values().map(HashMap::len).sum();
        before - after
    }

    /// Split `addresses` into cached balances and addresses needing a fetch.
    fn lookup(
        &self,
        key: &SourceKey,
        addresses: &[String],
        now: Instant,
    ) -> (HashMap<String, String>, Vec<String>) {
        let entries = self.entries.read();
        let cached = entries.get(key);
        let mut hits = HashMap::new();
        let mut misses = Vec::new();
        for address in addresses {
            match cached.and_then(|c| c.get(address)) {
                Some(entry) if now.duration_since(entry.fetched_at) < self.ttl => {
                    hits.insert(address.clone(), entry.balance.clone());
                }
                _ => misses.push(address.clone()),
            }
        }
        (hits, misses)
    }

    fn store(&self, key: &SourceKey, balances: &HashMap<String, String>, now: Instant) {
        let mut entries = self.entries.write();
        let cached = entries.entry(key.clone()).or_default();
        // Expired balances of this source are dropped on every write.
        cached.retain(|_, entry| now.duration_since(entry.fetched_at) < self.ttl);
        for (address, balance) in balances {
            cached.insert(
                address.clone(),
                CachedBalance {
                    balance: balance.clone(),
                    fetched_at: now,
                },
            );
        }
    }
}

#[async_trait::async_trait]
impl<P: BalanceProvider> BalanceProvider for CachedBalanceProvider<P> {
    async fn get_balances(
        &self,
        request: &BalanceBatchRequest,
        options: GetBalancesOptions,
    ) -> Result<BalanceResult> {
        let now = Instant::now();
        let (mut balances, misses) = if options.cache_refresh {
            self.metrics.record_bypass();
            (HashMap::new(), request.addresses.clone())
        } else {
            self.lookup(&request.source_key, &request.addresses, now)
        };

        self.metrics.record_hits(balances.len() as u64);
        self.metrics.record_misses(misses.len() as u64);
        debug!(
            source = %request.source_key,
            hits = balances.len(),
            misses = misses.len(),
            "balance cache lookup"
        );

        if misses.is_empty() {
            return Ok(BalanceResult::new(request.source_key.clone(), balances));
        }

        let upstream = BalanceBatchRequest {
            source_key: request.source_key.clone(),
            source: request.source.clone(),
            addresses: misses,
        };
        self.metrics.record_upstream_fetch();
        let fetched = match self.inner.get_balances(&upstream, options).await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.metrics.record_upstream_error();
                return Err(e);
            }
        };

        self.store(&request.source_key, &fetched.balances, Instant::now());
        balances.extend(fetched.balances);
        Ok(BalanceResult::new(request.source_key.clone(), balances))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureBalanceProvider;
    use gate_types::{BalanceSource, ContractSource};

    fn source() -> BalanceSource {
        BalanceSource::Erc721(ContractSource {
            evm_chain_id: 137,
            contract_address: "0xcccccccccccccccccccccccccccccccccccccccc".to_string(),
            token_id: None,
        })
    }

    fn request(addresses: &[&str]) -> BalanceBatchRequest {
        BalanceBatchRequest::new(source(), addresses.iter().map(|a| a.to_string()).collect())
    }

    fn cached_fixture(ttl: Duration) -> CachedBalanceProvider<FixtureBalanceProvider> {
        let fixture = FixtureBalanceProvider::new();
        fixture.set_balance(&source(), "0x111", "1");
        fixture.set_balance(&source(), "0x222", "2");
        CachedBalanceProvider::new(fixture, ttl)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_read_is_served_from_cache() {
        let provider = cached_fixture(Duration::from_secs(60));
        let options = GetBalancesOptions::default();

        let first = provider.get_balances(&request(&["0x111", "0x222"]), options).await.unwrap();
        let second = provider.get_balances(&request(&["0x111", "0x222"]), options).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.inner().calls().len(), 1);
        let snapshot = provider.metrics().snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 2);
        assert_eq!(snapshot.upstream_fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_missing_addresses_go_upstream() {
        let provider = cached_fixture(Duration::from_secs(60));
        let options = GetBalancesOptions::default();

        provider.get_balances(&request(&["0x111"]), options).await.unwrap();
        let result = provider
            .get_balances(&request(&["0x111", "0x222"]), options)
            .await
            .unwrap();

        assert_eq!(result.balance_of("0x111"), Some("1"));
        assert_eq!(result.balance_of("0x222"), Some("2"));
        let calls = provider.inner().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].addresses, vec!["0x222".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_refetched() {
        let provider = cached_fixture(Duration::from_secs(60));
        let options = GetBalancesOptions::default();

        provider.get_balances(&request(&["0x111"]), options).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        provider.get_balances(&request(&["0x111"]), options).await.unwrap();

        assert_eq!(provider.inner().calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_drop_expired_entries_of_the_source() {
        let provider = cached_fixture(Duration::from_secs(60));
        let options = GetBalancesOptions::default();

        provider.get_balances(&request(&["0x111"]), options).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        provider.get_balances(&request(&["0x222"]), options).await.unwrap();

        assert_eq!(provider.len(), 1);
        let calls_before = provider.inner().calls().len();
        provider.get_balances(&request(&["0x222"]), options).await.unwrap();
        assert_eq!(provider.inner().calls().len(), calls_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let provider = cached_fixture(Duration::from_secs(60));
        let options = GetBalancesOptions::default();

        provider.get_balances(&request(&["0x111", "0x222"]), options).await.unwrap();
        assert_eq!(provider.purge_expired(), 0);
        assert_eq!(provider.len(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(provider.purge_expired(), 2);
        assert!(provider.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_refresh_bypasses_reads() {
        let provider = cached_fixture(Duration::from_secs(600));

        provider
            .get_balances(&request(&["0x111"]), GetBalancesOptions::default())
            .await
            .unwrap();
        provider
            .inner()
            .set_balance(&source(), "0x111", "42");
        let refreshed = provider
            .get_balances(&request(&["0x111"]), GetBalancesOptions { cache_refresh: true })
            .await
            .unwrap();
        let cached = provider
            .get_balances(&request(&["0x111"]), GetBalancesOptions::default())
            .await
            .unwrap();

        assert_eq!(refreshed.balance_of("0x111"), Some("42"));
        assert_eq!(cached.balance_of("0x111"), Some("42"));
        assert_eq!(provider.inner().calls().len(), 2);
        assert_eq!(provider.metrics().snapshot().bypassed, 1);
    }

    #[tokio::test]
    async fn test_upstream_errors_are_not_cached() {
        let provider = cached_fixture(Duration::from_secs(60));
        provider.inner().fail_source(source().source_key());

        let result = provider
            .get_balances(&request(&["0x111"]), GetBalancesOptions::default())
            .await;

        assert!(result.is_err());
        assert!(provider.is_empty());
        assert_eq!(provider.metrics().snapshot().upstream_errors, 1);
    }
}
