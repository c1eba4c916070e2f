//! Balance provider abstraction.
//!
//! Lets the refresher read balances from different backends (chain RPC
//! clients, a TTL cache in front of them, in-memory fixtures) without coupling
//! to any one of them.

use std::sync::Arc;

use anyhow::Result;
use gate_types::{BalanceBatchRequest, BalanceResult, GetBalancesOptions};

/// Executes one balance batch request.
///
/// Implementations return every balance they could read. Addresses they could
/// not read are left out of the result rather than reported as zero.
#[async_trait::async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn get_balances(
        &self,
        request: &BalanceBatchRequest,
        options: GetBalancesOptions,
    ) -> Result<BalanceResult>;
}

#[async_trait::async_trait]
impl<P: BalanceProvider + ?Sized> BalanceProvider for Arc<P> {
    async fn get_balances(
        &self,
        request: &BalanceBatchRequest,
        options: GetBalancesOptions,
    ) -> Result<BalanceResult> {
        (**self).get_balances(request, options).await
    }
}
