//! Balance batch planning.
//!
//! Turns the threshold requirements of a set of groups into the smallest set
//! of balance fetches: one request per distinct [`SourceKey`], each covering
//! every address in the page.

use std::collections::BTreeMap;

use gate_types::{BalanceBatchRequest, BalanceSource, Group, Requirement, SourceKey};

/// Plan the balance fetches needed to evaluate `groups` for `addresses`.
///
/// - Each `SourceKey` appears at most once in the output.
/// - Every request carries the full `addresses` list.
/// - Allow-list requirements never need a balance.
/// - No requests are planned for an empty address list.
///
/// Pure; runs in O(groups × requirements).
pub fn plan_balance_requests(groups: &[Group], addresses: &[String]) -> Vec<BalanceBatchRequest> {
    if addresses.is_empty() {
        return Vec::new();
    }

    let mut sources: BTreeMap<SourceKey, &BalanceSource> = BTreeMap::new();
    for group in groups {
        for requirement in &group.requirements {
            if let Requirement::Threshold(data) = requirement {
                sources
                    .entry(data.source.source_key())
                    .or_insert(&data.source);
            }
        }
    }

    sources
        .into_iter()
        .map(|(source_key, source)| BalanceBatchRequest {
            source_key,
            source: source.clone(),
            addresses: addresses.to_vec(),
        })
        .collect()
}
