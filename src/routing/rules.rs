//! Rule and route matching helpers shared by provisioning and teardown

use crate::error::RouteError;
use crate::routing::{AddressEntry, IpAssignment, RouteEntry, RuleEntry};
use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Single-address network for `ip`: /32 for IPv4, /128 for IPv6
pub fn host_network(ip: IpAddr) -> IpNetwork {
    match ip {
        IpAddr::V4(v4) => IpNetwork::V4(Ipv4Network::from(v4)),
        IpAddr::V6(v6) => IpNetwork::V6(Ipv6Network::from(v6)),
    }
}

/// The unspecified network of the same family as `ip`
pub fn default_destination(ip: IpAddr) -> Result<IpNetwork, RouteError> {
    let unspecified = match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    IpNetwork::new(unspecified, 0).map_err(|e| RouteError::InvalidRoute(e.to_string()))
}

/// Whether an interface route belongs in the table of `assignment`.
///
/// Routes with neither a preferred source nor a gateway are generic routes
/// and follow every assignment.
pub fn should_migrate(assignment: &IpAssignment, route: &RouteEntry) -> bool {
    let contains = |ip: Option<IpAddr>| ip.is_some_and(|ip| assignment.address.contains(ip));

    contains(route.source)
        || contains(route.gateway)
        || (route.source.is_none() && route.gateway.is_none())
}

/// Whether `rule` selects traffic from one of `addresses`
pub fn rule_owned_by(rule: &RuleEntry, addresses: &[AddressEntry]) -> bool {
    match rule.source {
        Some(source) => addresses.iter().any(|addr| addr.ip() == source.ip()),
        None => false,
    }
}
