//! Routing table management module
//!
//! Handles policy rules and per-source routing tables inside the container
//! network namespace.

use crate::error::RouteError;
use ipnetwork::IpNetwork;
use std::future::Future;
use std::net::IpAddr;

pub mod manager;
pub mod rules;
pub mod sbr;
pub mod table;

#[cfg(test)]
pub(crate) mod memory;

/// The kernel's main routing table
pub const RT_TABLE_MAIN: u32 = 254;

/// `RTPROT_BOOT`, the protocol `ip route add` uses for static routes
pub const RTPROT_BOOT: u8 = 3;

/// `RT_SCOPE_UNIVERSE`
pub const RT_SCOPE_UNIVERSE: u8 = 0;

/// `RTN_UNICAST`
pub const RTN_UNICAST: u8 = 1;

/// `FR_ACT_TO_TBL`, the rule action that looks up a table
pub const FR_ACT_TO_TBL: u8 = 1;

/// Address family selector for listing operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    All,
    V4,
    V6,
}

impl Family {
    pub fn includes(&self, ip: &IpAddr) -> bool {
        match self {
            Family::All => true,
            Family::V4 => ip.is_ipv4(),
            Family::V6 => ip.is_ipv6(),
        }
    }
}

/// Policy routing rule: traffic matching `source` is looked up in `table`
///
/// Selectors besides the source are kept so that a listed rule can be
/// deleted exactly as the kernel reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleEntry {
    pub source: Option<IpNetwork>,
    pub destination: Option<IpNetwork>,
    pub table: u32,
    pub priority: Option<u32>,
    /// `FR_ACT_*` action code
    pub action: u8,
    pub tos: u8,
    pub fwmark: Option<u32>,
    pub iif: Option<String>,
    pub oif: Option<String>,
    /// True for IPv6 rules. Only consulted when `source` is absent.
    pub ipv6: bool,
}

impl RuleEntry {
    /// Rule sending traffic from `source` to `table`
    pub fn from_source(source: IpNetwork, table: u32) -> Self {
        Self {
            source: Some(source),
            table,
            action: FR_ACT_TO_TBL,
            ipv6: source.is_ipv6(),
            ..Self::default()
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.source.map(|s| s.is_ipv6()).unwrap_or(self.ipv6)
    }
}

/// Route entry structure
///
/// Kernel header properties are carried as explicit numeric fields so a
/// listed route can be written back into another table unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub table: u32,
    pub destination: IpNetwork,
    pub gateway: Option<IpAddr>,
    /// Preferred source address
    pub source: Option<IpAddr>,
    pub link_index: Option<u32>,
    pub metric: Option<u32>,
    pub scope: u8,
    pub protocol: u8,
    pub kind: u8,
    pub flags: u32,
}

impl RouteEntry {
    /// A unicast route with the defaults `ip route add` would pick
    pub fn new(table: u32, destination: IpNetwork) -> Self {
        Self {
            table,
            destination,
            gateway: None,
            source: None,
            link_index: None,
            metric: None,
            scope: RT_SCOPE_UNIVERSE,
            protocol: RTPROT_BOOT,
            kind: RTN_UNICAST,
            flags: 0,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.destination.is_ipv6()
    }
}

impl std::fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.destination)?;
        if let Some(gateway) = self.gateway {
            write!(f, " via {}", gateway)?;
        }
        if let Some(index) = self.link_index {
            write!(f, " dev #{}", index)?;
        }
        if let Some(source) = self.source {
            write!(f, " src {}", source)?;
        }
        write!(f, " table {}", self.table)
    }
}

/// Address assigned to an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressEntry {
    pub address: IpNetwork,
}

impl AddressEntry {
    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }
}

/// An address handed to the plugin by the previous plugin in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAssignment {
    /// Address together with the prefix of the subnet it lives in
    pub address: IpNetwork,
    /// Index into the previous result's interface list
    pub interface: Option<usize>,
    pub gateway: Option<IpAddr>,
}

impl std::fmt::Display for IpAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.gateway {
            Some(gateway) => write!(f, "{} gw {}", self.address, gateway),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Server-side selection applied when listing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFilter {
    /// Only rules pointing at this table
    Table(u32),
}

impl RuleFilter {
    pub fn matches(&self, rule: &RuleEntry) -> bool {
        match self {
            RuleFilter::Table(table) => rule.table == *table,
        }
    }
}

/// Kernel routing access used by the source based routing engine
pub trait RouteManager {
    fn list_rules(
        &self,
        family: Family,
    ) -> impl Future<Output = Result<Vec<RuleEntry>, RouteError>> + Send;

    fn list_rules_filtered(
        &self,
        family: Family,
        filter: RuleFilter,
    ) -> impl Future<Output = Result<Vec<RuleEntry>, RouteError>> + Send;

    /// Lists routes of every table, or with `link` set, the main table routes
    /// leaving through that interface.
    fn list_routes(
        &self,
        link: Option<u32>,
        family: Family,
    ) -> impl Future<Output = Result<Vec<RouteEntry>, RouteError>> + Send;

    /// Returns [`RouteError::InterfaceNotFound`] when no such interface exists
    fn resolve_interface(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<u32, RouteError>> + Send;

    fn list_addresses(
        &self,
        link: u32,
        family: Family,
    ) -> impl Future<Output = Result<Vec<AddressEntry>, RouteError>> + Send;

    fn add_rule(&self, rule: &RuleEntry)
        -> impl Future<Output = Result<(), RouteError>> + Send;

    fn delete_rule(
        &self,
        rule: &RuleEntry,
    ) -> impl Future<Output = Result<(), RouteError>> + Send;

    fn add_route(
        &self,
        route: &RouteEntry,
    ) -> impl Future<Output = Result<(), RouteError>> + Send;

    fn replace_route(
        &self,
        route: &RouteEntry,
    ) -> impl Future<Output = Result<(), RouteError>> + Send;

    fn remove_route(
        &self,
        route: &RouteEntry,
    ) -> impl Future<Output = Result<(), RouteError>> + Send;
}
