//! Round-robin assignment of workers to endpoints.

use crate::types::{Account, AccountSet, Endpoint};

/// Endpoint for the worker at `index`: `endpoints[index % endpoints.len()]`.
///
/// Returns `None` only when `endpoints` is empty, which a validated
/// [`RunConfig`](crate::RunConfig) never is.
pub fn select(endpoints: &[Endpoint], index: usize) -> Option<&Endpoint> {
    if endpoints.is_empty() {
        return None;
    }
    endpoints.get(index % endpoints.len())
}

/// One planned worker: which account sends, against which endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment<'a> {
    pub index: usize,
    pub account: &'a Account,
    pub endpoint: &'a Endpoint,
}

/// Full assignment plan for `accounts`, in account order.
pub fn assign<'a>(endpoints: &'a [Endpoint], accounts: &'a AccountSet) -> Vec<Assignment<'a>> {
    accounts
        .iter()
        .enumerate()
        .filter_map(|(index, account)| {
            select(endpoints, index).map(|endpoint| Assignment {
                index,
                account,
                endpoint,
            })
        })
        .collect()
}
