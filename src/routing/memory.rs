//! In-memory kernel routing state for exercising the SBR engine in tests

use crate::error::RouteError;
use crate::routing::{
    AddressEntry, Family, RouteEntry, RouteManager, RuleEntry, RuleFilter, RT_TABLE_MAIN,
};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    links: HashMap<String, u32>,
    addresses: Vec<(u32, AddressEntry)>,
    rules: Vec<RuleEntry>,
    routes: Vec<RouteEntry>,
    failing_rule_adds: HashSet<IpAddr>,
    failing_rule_deletes: HashSet<IpAddr>,
    failing_route_replaces: HashSet<u32>,
}

/// Route manager double keeping rules, routes and links in a mutex
#[derive(Default)]
pub struct InMemoryRouteManager {
    state: Mutex<State>,
}

impl InMemoryRouteManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(&self, name: &str, index: u32) {
        self.state.lock().unwrap().links.insert(name.to_string(), index);
    }

    pub fn add_address(&self, link: u32, address: &str) {
        let entry = AddressEntry {
            address: address.parse().unwrap(),
        };
        self.state.lock().unwrap().addresses.push((link, entry));
    }

    pub fn push_rule(&self, rule: RuleEntry) {
        self.state.lock().unwrap().rules.push(rule);
    }

    pub fn push_route(&self, route: RouteEntry) {
        self.state.lock().unwrap().routes.push(route);
    }

    pub fn fail_rule_add_for(&self, source: IpAddr) {
        self.state.lock().unwrap().failing_rule_adds.insert(source);
    }

    pub fn fail_rule_delete_for(&self, source: IpAddr) {
        self.state.lock().unwrap().failing_rule_deletes.insert(source);
    }

    /// Make every route replace into `table` fail
    pub fn fail_route_replace_for(&self, table: u32) {
        self.state.lock().unwrap().failing_route_replaces.insert(table);
    }

    pub fn rules(&self) -> Vec<RuleEntry> {
        self.state.lock().unwrap().rules.clone()
    }

    pub fn routes(&self) -> Vec<RouteEntry> {
        self.state.lock().unwrap().routes.clone()
    }
}

fn rule_family(rule: &RuleEntry, family: Family) -> bool {
    match family {
        Family::All => true,
        Family::V4 => !rule.is_ipv6(),
        Family::V6 => rule.is_ipv6(),
    }
}

fn route_family(route: &RouteEntry, family: Family) -> bool {
    family.includes(&route.destination.ip())
}

fn same_slot(a: &RouteEntry, b: &RouteEntry) -> bool {
    a.table == b.table && a.destination == b.destination && a.metric == b.metric
}

impl RouteManager for InMemoryRouteManager {
    async fn list_rules(&self, family: Family) -> Result<Vec<RuleEntry>, RouteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .filter(|rule| rule_family(rule, family))
            .cloned()
            .collect())
    }

    async fn list_rules_filtered(
        &self,
        family: Family,
        filter: RuleFilter,
    ) -> Result<Vec<RuleEntry>, RouteError> {
        let rules = self.list_rules(family).await?;
        Ok(rules.into_iter().filter(|rule| filter.matches(rule)).collect())
    }

    async fn list_routes(
        &self,
        link: Option<u32>,
        family: Family,
    ) -> Result<Vec<RouteEntry>, RouteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .routes
            .iter()
            .filter(|route| route_family(route, family))
            .filter(|route| match link {
                Some(index) => route.table == RT_TABLE_MAIN && route.link_index == Some(index),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn resolve_interface(&self, name: &str) -> Result<u32, RouteError> {
        let state = self.state.lock().unwrap();
        state
            .links
            .get(name)
            .copied()
            .ok_or_else(|| RouteError::InterfaceNotFound {
                name: name.to_string(),
            })
    }

    async fn list_addresses(
        &self,
        link: u32,
        family: Family,
    ) -> Result<Vec<AddressEntry>, RouteError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .addresses
            .iter()
            .filter(|(index, addr)| *index == link && family.includes(&addr.ip()))
            .map(|(_, addr)| *addr)
            .collect())
    }

    async fn add_rule(&self, rule: &RuleEntry) -> Result<(), RouteError> {
        let mut state = self.state.lock().unwrap();
        if let Some(source) = rule.source {
            if state.failing_rule_adds.contains(&source.ip()) {
                return Err(RouteError::AddRule(format!("{}: operation not permitted", source)));
            }
        }
        if state.rules.contains(rule) {
            return Err(RouteError::AddRule("file exists".to_string()));
        }
        state.rules.push(rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, rule: &RuleEntry) -> Result<(), RouteError> {
        let mut state = self.state.lock().unwrap();
        if let Some(source) = rule.source {
            if state.failing_rule_deletes.contains(&source.ip()) {
                return Err(RouteError::DeleteRule(format!("{}: device busy", source)));
            }
        }
        match state.rules.iter().position(|r| r == rule) {
            Some(pos) => {
                state.rules.remove(pos);
                Ok(())
            }
            None => Err(RouteError::DeleteRule("no such file or directory".to_string())),
        }
    }

    async fn add_route(&self, route: &RouteEntry) -> Result<(), RouteError> {
        let mut state = self.state.lock().unwrap();
        if state.routes.iter().any(|r| same_slot(r, route)) {
            return Err(RouteError::AddRoute(format!("{}: file exists", route)));
        }
        state.routes.push(route.clone());
        Ok(())
    }

    async fn replace_route(&self, route: &RouteEntry) -> Result<(), RouteError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_route_replaces.contains(&route.table) {
            return Err(RouteError::ReplaceRoute(format!("{}: no buffer space", route)));
        }
        match state.routes.iter_mut().find(|r| same_slot(r, route)) {
            Some(existing) => *existing = route.clone(),
            None => state.routes.push(route.clone()),
        }
        Ok(())
    }

    async fn remove_route(&self, route: &RouteEntry) -> Result<(), RouteError> {
        let mut state = self.state.lock().unwrap();
        let pos = state.routes.iter().position(|r| {
            same_slot(r, route) && r.gateway == route.gateway && r.link_index == route.link_index
        });
        match pos {
            Some(pos) => {
                state.routes.remove(pos);
                Ok(())
            }
            None => Err(RouteError::RemoveRoute(format!("{}: no such process", route))),
        }
    }
}
