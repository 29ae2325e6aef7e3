//! Routing table id allocation

use crate::routing::{RouteEntry, RuleEntry};

/// Lowest table id handed out to per-source tables
pub const FIRST_TABLE_ID: u32 = 100;

/// Picks the first table id from `candidate` upwards that no rule points at
/// and no route lives in. `None` once the id space is used up.
pub fn next_table_id(rules: &[RuleEntry], routes: &[RouteEntry], candidate: u32) -> Option<u32> {
    (candidate..=u32::MAX).find(|table| {
        !rules.iter().any(|rule| rule.table == *table)
            && !routes.iter().any(|route| route.table == *table)
    })
}
