//! In-memory balance provider backed by fixed balances.
//!
//! Used by tests and by the snapshot-driven worker. Individual sources can be
//! made to fail or respond slowly to exercise degraded fetches.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{anyhow, Result};
use gate_types::{
    BalanceBatchRequest, BalanceResult, BalanceSource, GetBalancesOptions, SourceKey,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::provider::BalanceProvider;

/// Balances for one source as they appear in snapshot files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBalances {
    pub source: BalanceSource,
    #[serde(default)]
    pub balances: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct FixtureBalanceProvider {
    balances: RwLock<HashMap<SourceKey, HashMap<String, String>>>,
    failing: RwLock<HashSet<SourceKey>>,
    delays: RwLock<HashMap<SourceKey, Duration>>,
    calls: Mutex<Vec<BalanceBatchRequest>>,
}

impl FixtureBalanceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sources(sources: impl IntoIterator<Item = SourceBalances>) -> Self {
        let provider = Self::new();
        for entry in sources {
            let key = entry.source.source_key();
            provider
                .balances
                .write()
                .entry(key)
                .or_default()
                .extend(entry.balances);
        }
        provider
    }

    pub fn set_balance(&self, source: &BalanceSource, address: &str, balance: &str) {
        self.balances
            .write()
            .entry(source.source_key())
            .or_default()
            .insert(address.to_string(), balance.to_string());
    }

    /// Make every request for `key` fail.
    pub fn fail_source(&self, key: SourceKey) {
        self.failing.write().insert(key);
    }

    /// Delay every response for `key`.
    pub fn delay_source(&self, key: SourceKey, delay: Duration) {
        self.delays.write().insert(key, delay);
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<BalanceBatchRequest> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait::async_trait]
impl BalanceProvider for FixtureBalanceProvider {
    async fn get_balances(
        &self,
        request: &BalanceBatchRequest,
        _options: GetBalancesOptions,
    ) -> Result<BalanceResult> {
        self.calls.lock().push(request.clone());

        let delay = self.delays.read().get(&request.source_key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.read().contains(&request.source_key) {
            return Err(anyhow!("balance source {} unavailable", request.source_key));
        }

        let balances = self.balances.read();
        let known = balances.get(&request.source_key);
        let found = request
            .addresses
            .iter()
            .filter_map(|address| {
                known
                    .and_then(|k| k.get(address))
                    .map(|balance| (address.clone(), balance.clone()))
            })
            .collect();
        Ok(BalanceResult::new(request.source_key.clone(), found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_types::NativeSource;

    #[tokio::test]
    async fn test_returns_only_requested_known_addresses() {
        let source = BalanceSource::EthNative(NativeSource { evm_chain_id: 10 });
        let provider = FixtureBalanceProvider::from_sources([SourceBalances {
            source: source.clone(),
            balances: HashMap::from([
                ("0x111".to_string(), "1".to_string()),
                ("0x999".to_string(), "9".to_string()),
            ]),
        }]);

        let request =
            BalanceBatchRequest::new(source, vec!["0x111".to_string(), "0x222".to_string()]);
        let result = provider
            .get_balances(&request, GetBalancesOptions::default())
            .await
            .unwrap();

        assert_eq!(result.balances.len(), 1);
        assert_eq!(result.balance_of("0x111"), Some("1"));
        assert_eq!(result.balance_of("0x222"), None);
        assert_eq!(provider.calls().len(), 1);
    }
}
