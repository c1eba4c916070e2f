//! Balance fetch requests and results exchanged with balance providers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::source::{BalanceSource, SourceKey};

/// One fetch: every listed address against one balance source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBatchRequest {
    pub source_key: SourceKey,
    /// Source the provider should query. Its key equals `source_key`.
    pub source: BalanceSource,
    pub addresses: Vec<String>,
}

impl BalanceBatchRequest {
    pub fn new(source: BalanceSource, addresses: Vec<String>) -> Self {
        Self {
            source_key: source.source_key(),
            source,
            addresses,
        }
    }
}

/// Balances returned for one source.
///
/// An address missing from `balances` means its balance is unknown, which is
/// not the same as a zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResult {
    pub source_key: SourceKey,
    #[serde(default)]
    pub balances: HashMap<String, String>,
}

impl BalanceResult {
    pub fn new(source_key: SourceKey, balances: HashMap<String, String>) -> Self {
        Self {
            source_key,
            balances,
        }
    }

    /// Result carrying no balances, used when a fetch failed.
    pub fn empty(source_key: SourceKey) -> Self {
        Self::new(source_key, HashMap::new())
    }

    pub fn balance_of(&self, address: &str) -> Option<&str> {
        self.balances.get(address).map(String::as_str)
    }

    pub fn matches(&self, key: &SourceKey) -> bool {
        &self.source_key == key
    }
}

/// Per-call provider options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBalancesOptions {
    /// Skip cached balances and read from the chain.
    #[serde(default)]
    pub cache_refresh: bool,
}
