//! Route management using rtnetlink

use crate::error::{NetworkError, RouteError};
use crate::routing::{
    AddressEntry, Family, RouteEntry, RouteManager, RuleEntry, RuleFilter, RT_TABLE_MAIN,
};
use futures_util::stream::TryStreamExt;
use ipnetwork::IpNetwork;
use nix::errno::Errno;
use rtnetlink::packet_route::address::{AddressAttribute, AddressMessage};
use rtnetlink::packet_route::route::{
    RouteAddress, RouteAttribute, RouteFlags, RouteHeader, RouteMessage, RouteProtocol, RouteScope,
    RouteType,
};
use rtnetlink::packet_route::rule::{RuleAction, RuleAttribute, RuleMessage};
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::{new_connection, Handle, IpVersion};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Route manager implementation using rtnetlink
///
/// The netlink socket is bound to the network namespace that was current
/// when [`RtNetlinkRouteManager::new`] ran.
pub struct RtNetlinkRouteManager {
    handle: Handle,
}

impl RtNetlinkRouteManager {
    /// Create a new route manager
    pub fn new() -> Result<Self, NetworkError> {
        let (connection, handle, _) =
            new_connection().map_err(|e| NetworkError::Connection(e.to_string()))?;

        // Spawn the connection handler
        tokio::spawn(connection);

        Ok(Self { handle })
    }

    async fn dump_rules(&self, family: Family) -> Result<Vec<RuleEntry>, RouteError> {
        let mut request = self.handle.rule().get(IpVersion::V4);
        request.message_mut().header.family = dump_family(family);

        let mut rules = Vec::new();
        let mut stream = request.execute();
        while let Some(message) = stream
            .try_next()
            .await
            .map_err(|e| RouteError::ListRules(e.to_string()))?
        {
            rules.push(rule_from_message(&message));
        }
        Ok(rules)
    }
}

/// Family of a dump request. Both IP families go out as a single
/// `AF_UNSPEC` dump, which also works with IPv6 disabled.
fn dump_family(family: Family) -> AddressFamily {
    match family {
        Family::All => AddressFamily::Unspec,
        Family::V4 => AddressFamily::Inet,
        Family::V6 => AddressFamily::Inet6,
    }
}

fn route_dump_request(family: Family) -> RouteMessage {
    let mut request = RouteMessage::default();
    request.header.address_family = dump_family(family);
    request
}

fn is_no_device(error: &rtnetlink::Error) -> bool {
    match error {
        rtnetlink::Error::NetlinkError(message) => {
            message.code.map(|code| code.get()) == Some(-(Errno::ENODEV as i32))
        }
        _ => false,
    }
}

fn network(ip: IpAddr, prefix: u8) -> Option<IpNetwork> {
    IpNetwork::new(ip, prefix).ok()
}

fn route_ip(address: &RouteAddress) -> Option<IpAddr> {
    match address {
        RouteAddress::Inet(v4) => Some(IpAddr::V4(*v4)),
        RouteAddress::Inet6(v6) => Some(IpAddr::V6(*v6)),
        _ => None,
    }
}

fn route_address(ip: IpAddr) -> RouteAddress {
    match ip {
        IpAddr::V4(v4) => RouteAddress::Inet(v4),
        IpAddr::V6(v6) => RouteAddress::Inet6(v6),
    }
}

fn family_of(ipv6: bool) -> AddressFamily {
    if ipv6 {
        AddressFamily::Inet6
    } else {
        AddressFamily::Inet
    }
}

fn rule_from_message(message: &RuleMessage) -> RuleEntry {
    let header = &message.header;
    let mut rule = RuleEntry {
        table: u32::from(header.table),
        action: u8::from(header.action),
        tos: header.tos,
        ipv6: header.family == AddressFamily::Inet6,
        ..RuleEntry::default()
    };

    for attribute in &message.attributes {
        match attribute {
            RuleAttribute::Source(ip) => rule.source = network(*ip, header.src_len),
            RuleAttribute::Destination(ip) => rule.destination = network(*ip, header.dst_len),
            RuleAttribute::Table(table) => rule.table = *table,
            RuleAttribute::Priority(priority) => rule.priority = Some(*priority),
            RuleAttribute::FwMark(mark) => rule.fwmark = Some(*mark),
            RuleAttribute::Iifname(name) => rule.iif = Some(name.clone()),
            RuleAttribute::Oifname(name) => rule.oif = Some(name.clone()),
            _ => {}
        }
    }
    rule
}

fn rule_to_message(rule: &RuleEntry) -> RuleMessage {
    let mut message = RuleMessage::default();
    let header = &mut message.header;
    header.family = family_of(rule.is_ipv6());
    header.action = RuleAction::from(rule.action);
    header.tos = rule.tos;
    header.table = u8::try_from(rule.table).unwrap_or(RouteHeader::RT_TABLE_UNSPEC);

    let attributes = &mut message.attributes;
    attributes.push(RuleAttribute::Table(rule.table));
    if let Some(source) = rule.source {
        header.src_len = source.prefix();
        attributes.push(RuleAttribute::Source(source.ip()));
    }
    if let Some(destination) = rule.destination {
        header.dst_len = destination.prefix();
        attributes.push(RuleAttribute::Destination(destination.ip()));
    }
    if let Some(priority) = rule.priority {
        attributes.push(RuleAttribute::Priority(priority));
    }
    if let Some(mark) = rule.fwmark {
        attributes.push(RuleAttribute::FwMark(mark));
    }
    if let Some(name) = &rule.iif {
        attributes.push(RuleAttribute::Iifname(name.clone()));
    }
    if let Some(name) = &rule.oif {
        attributes.push(RuleAttribute::Oifname(name.clone()));
    }
    message
}

fn route_from_message(message: &RouteMessage) -> Option<RouteEntry> {
    let header = &message.header;
    let unspecified = match header.address_family {
        AddressFamily::Inet => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        AddressFamily::Inet6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        _ => return None,
    };

    let mut route = RouteEntry::new(u32::from(header.table), network(unspecified, 0)?);
    route.scope = u8::from(header.scope);
    route.protocol = u8::from(header.protocol);
    route.kind = u8::from(header.kind);
    route.flags = header.flags.bits();

    for attribute in &message.attributes {
        match attribute {
            RouteAttribute::Destination(address) => {
                if let Some(ip) = route_ip(address) {
                    route.destination = network(ip, header.destination_prefix_length)?;
                }
            }
            RouteAttribute::Gateway(address) => route.gateway = route_ip(address),
            RouteAttribute::PrefSource(address) => route.source = route_ip(address),
            RouteAttribute::Oif(index) => route.link_index = Some(*index),
            RouteAttribute::Priority(metric) => route.metric = Some(*metric),
            RouteAttribute::Table(table) => route.table = *table,
            _ => {}
        }
    }
    Some(route)
}

fn route_to_message(route: &RouteEntry) -> RouteMessage {
    let mut message = RouteMessage::default();
    let header = &mut message.header;
    header.address_family = family_of(route.is_ipv6());
    header.destination_prefix_length = route.destination.prefix();
    header.table = u8::try_from(route.table).unwrap_or(RouteHeader::RT_TABLE_UNSPEC);
    header.scope = RouteScope::from(route.scope);
    header.protocol = RouteProtocol::from(route.protocol);
    header.kind = RouteType::from(route.kind);
    header.flags = RouteFlags::from_bits_retain(route.flags);

    message.attributes.push(RouteAttribute::Table(route.table));
    if route.destination.prefix() > 0 {
        message
            .attributes
            .push(RouteAttribute::Destination(route_address(route.destination.ip())));
    }
    if let Some(gateway) = route.gateway {
        message.attributes.push(RouteAttribute::Gateway(route_address(gateway)));
    }
    if let Some(source) = route.source {
        message.attributes.push(RouteAttribute::PrefSource(route_address(source)));
    }
    if let Some(index) = route.link_index {
        message.attributes.push(RouteAttribute::Oif(index));
    }
    if let Some(metric) = route.metric {
        message.attributes.push(RouteAttribute::Priority(metric));
    }
    message
}

impl RouteManager for RtNetlinkRouteManager {
    async fn list_rules(&self, family: Family) -> Result<Vec<RuleEntry>, RouteError> {
        self.dump_rules(family).await
    }

    async fn list_rules_filtered(
        &self,
        family: Family,
        filter: RuleFilter,
    ) -> Result<Vec<RuleEntry>, RouteError> {
        // The kernel has no rule dump filter, so select here
        let rules = self.dump_rules(family).await?;
        Ok(rules.into_iter().filter(|rule| filter.matches(rule)).collect())
    }

    async fn list_routes(
        &self,
        link: Option<u32>,
        family: Family,
    ) -> Result<Vec<RouteEntry>, RouteError> {
        let mut routes = Vec::new();
        let mut stream = self.handle.route().get(route_dump_request(family)).execute();
        while let Some(message) = stream
            .try_next()
            .await
            .map_err(|e| RouteError::ListRoutes(e.to_string()))?
        {
            // Multicast and other non-IP families are not ours to move
            let Some(route) = route_from_message(&message) else {
                continue;
            };
            if let Some(index) = link {
                if route.table != RT_TABLE_MAIN || route.link_index != Some(index) {
                    continue;
                }
            }
            routes.push(route);
        }
        debug!("Listed {} routes (link filter {:?})", routes.len(), link);
        Ok(routes)
    }

    async fn resolve_interface(&self, name: &str) -> Result<u32, RouteError> {
        let mut links = self.handle.link().get().match_name(name.to_string()).execute();
        match links.try_next().await {
            Ok(Some(link)) => Ok(link.header.index),
            Ok(None) => Err(RouteError::InterfaceNotFound {
                name: name.to_string(),
            }),
            Err(e) if is_no_device(&e) => Err(RouteError::InterfaceNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(RouteError::ResolveInterface {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn list_addresses(
        &self,
        link: u32,
        family: Family,
    ) -> Result<Vec<AddressEntry>, RouteError> {
        let mut addresses = Vec::new();
        let mut stream = self
            .handle
            .address()
            .get()
            .set_link_index_filter(link)
            .execute();
        while let Some(message) = stream
            .try_next()
            .await
            .map_err(|e| RouteError::ListAddresses(e.to_string()))?
        {
            if let Some(entry) = address_from_message(&message) {
                if family.includes(&entry.ip()) {
                    addresses.push(entry);
                }
            }
        }
        Ok(addresses)
    }

    async fn add_rule(&self, rule: &RuleEntry) -> Result<(), RouteError> {
        let mut request = self.handle.rule().add();
        *request.message_mut() = rule_to_message(rule);
        request
            .execute()
            .await
            .map_err(|e| RouteError::AddRule(e.to_string()))
    }

    async fn delete_rule(&self, rule: &RuleEntry) -> Result<(), RouteError> {
        self.handle
            .rule()
            .del(rule_to_message(rule))
            .execute()
            .await
            .map_err(|e| RouteError::DeleteRule(e.to_string()))
    }

    async fn add_route(&self, route: &RouteEntry) -> Result<(), RouteError> {
        self.handle
            .route()
            .add(route_to_message(route))
            .execute()
            .await
            .map_err(|e| RouteError::AddRoute(format!("{}: {}", route, e)))
    }

    async fn replace_route(&self, route: &RouteEntry) -> Result<(), RouteError> {
        self.handle
            .route()
            .add(route_to_message(route))
            .replace()
            .execute()
            .await
            .map_err(|e| RouteError::ReplaceRoute(format!("{}: {}", route, e)))
    }

    async fn remove_route(&self, route: &RouteEntry) -> Result<(), RouteError> {
        self.handle
            .route()
            .del(route_to_message(route))
            .execute()
            .await
            .map_err(|e| RouteError::RemoveRoute(format!("{}: {}", route, e)))
    }
}

fn address_from_message(message: &AddressMessage) -> Option<AddressEntry> {
    let mut local = None;
    let mut address = None;
    for attribute in &message.attributes {
        match attribute {
            AddressAttribute::Address(ip) => address = Some(*ip),
            AddressAttribute::Local(ip) => local = Some(*ip),
            _ => {}
        }
    }
    let ip = local.or(address)?;
    Some(AddressEntry {
        address: network(ip, message.header.prefix_len)?,
    })
}
