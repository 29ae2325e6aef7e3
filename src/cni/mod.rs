//! CNI invocation envelope
//!
//! Parses the network configuration handed over on stdin, extracts the
//! previous plugin's result and selects the addresses of the interface this
//! plugin is configuring.

use crate::error::PluginError;
use crate::routing::IpAssignment;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, info};

pub mod plugin;

/// Result document versions this plugin reads and writes
pub const SUPPORTED_VERSIONS: [&str; 5] = ["0.3.0", "0.3.1", "0.4.0", "1.0.0", "1.1.0"];

/// Network configuration passed on stdin
#[derive(Debug, Clone, Deserialize)]
pub struct NetConf {
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub plugin_type: String,
    /// Result of the previous plugin in the chain, kept verbatim so it can
    /// be handed on unchanged
    #[serde(rename = "prevResult")]
    pub prev_result: Option<serde_json::Value>,
    /// Route every source through this table instead of allocating tables
    pub table: Option<u32>,
}

impl NetConf {
    pub fn parse(stdin: &[u8]) -> Result<Self, PluginError> {
        serde_json::from_slice(stdin).map_err(|e| PluginError::InvalidNetworkConfig(e.to_string()))
    }

    /// Typed view of `prevResult`
    pub fn previous_result(&self) -> Result<Option<PrevResult>, PluginError> {
        self.prev_result
            .as_ref()
            .map(|raw| {
                serde_json::from_value(raw.clone()).map_err(|e| {
                    PluginError::InvalidNetworkConfig(format!("could not parse prevResult: {}", e))
                })
            })
            .transpose()
    }
}

/// The parts of a CNI result this plugin looks at
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrevResult {
    #[serde(default)]
    pub interfaces: Vec<InterfaceInfo>,
    #[serde(default)]
    pub ips: Vec<IpConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpConfig {
    /// Address in CIDR notation
    pub address: String,
    pub gateway: Option<IpAddr>,
    /// Index into the interface list
    pub interface: Option<i64>,
}

/// Error document printed on stdout when an invocation fails
#[derive(Debug, Serialize)]
pub struct ErrorDocument {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    pub code: u32,
    pub msg: String,
}

/// Addresses of `prev_result` that belong to `interface`.
///
/// Addresses without an interface index are assumed to belong to it.
pub fn select_assignments(
    interface: &str,
    prev_result: &PrevResult,
) -> Result<Vec<IpAssignment>, PluginError> {
    if prev_result.ips.is_empty() {
        return Err(PluginError::NoAddresses {
            interface: interface.to_string(),
        });
    }

    debug!("Checking for relevant interface: {}", interface);

    let mut assignments = Vec::with_capacity(prev_result.ips.len());
    for ip in &prev_result.ips {
        let address: IpNetwork = ip.address.parse().map_err(|e| {
            PluginError::InvalidNetworkConfig(format!("invalid address '{}': {}", ip.address, e))
        })?;

        if let Some(index) = ip.interface {
            let other = usize::try_from(index)
                .ok()
                .and_then(|i| prev_result.interfaces.get(i))
                .is_some_and(|iface| iface.name != interface);
            if other {
                debug!("Incorrect interface for IP address {}", address.ip());
                continue;
            }
        } else {
            debug!("No interface for IP address {}", address.ip());
        }

        info!("Found IP address {}", address.ip());
        assignments.push(IpAssignment {
            address,
            interface: ip.interface.and_then(|i| usize::try_from(i).ok()),
            gateway: ip.gateway,
        });
    }

    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF: &str = r#"{
        "cniVersion": "1.0.0",
        "name": "sbr-net",
        "type": "sbr",
        "table": 500,
        "prevResult": {
            "cniVersion": "1.0.0",
            "interfaces": [
                {"name": "eth0", "sandbox": "/var/run/netns/test"},
                {"name": "net1", "sandbox": "/var/run/netns/test"}
            ],
            "ips": [
                {"address": "10.0.0.5/24", "gateway": "10.0.0.1", "interface": 0},
                {"address": "192.168.1.5/24", "gateway": "192.168.1.1", "interface": 1},
                {"address": "2001:db8::5/64"},
                {"address": "10.1.0.5/16", "interface": 7}
            ],
            "dns": {}
        }
    }"#;

    #[test]
    fn test_parse_conf() {
        let conf = NetConf::parse(CONF.as_bytes()).unwrap();
        assert_eq!(conf.cni_version, "1.0.0");
        assert_eq!(conf.name, "sbr-net");
        assert_eq!(conf.plugin_type, "sbr");
        assert_eq!(conf.table, Some(500));

        let prev = conf.previous_result().unwrap().unwrap();
        assert_eq!(prev.interfaces.len(), 2);
        assert_eq!(prev.ips.len(), 4);
    }

    #[test]
    fn test_parse_conf_without_prev_result() {
        let conf = NetConf::parse(br#"{"cniVersion":"1.0.0","name":"n","type":"sbr"}"#).unwrap();
        assert!(conf.prev_result.is_none());
        assert!(conf.table.is_none());
        assert!(conf.previous_result().unwrap().is_none());
    }

    #[test]
    fn test_parse_conf_rejects_negative_table() {
        let result = NetConf::parse(br#"{"cniVersion":"1.0.0","table":-5}"#);
        assert!(matches!(result, Err(PluginError::InvalidNetworkConfig(_))));
    }

    #[test]
    fn test_select_assignments_filters_other_interfaces() {
        let conf = NetConf::parse(CONF.as_bytes()).unwrap();
        let prev = conf.previous_result().unwrap().unwrap();

        let assignments = select_assignments("eth0", &prev).unwrap();
        let addresses: Vec<String> = assignments.iter().map(|a| a.address.to_string()).collect();

        // net1's address is dropped; no index and out of range indexes are kept
        assert_eq!(addresses, vec!["10.0.0.5/24", "2001:db8::5/64", "10.1.0.5/16"]);
        assert_eq!(assignments[0].gateway, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(assignments[0].interface, Some(0));
        assert_eq!(assignments[1].gateway, None);
        assert_eq!(assignments[1].interface, None);
    }

    #[test]
    fn test_select_assignments_requires_addresses() {
        let result = select_assignments("eth0", &PrevResult::default());
        assert!(matches!(result, Err(PluginError::NoAddresses { .. })));
    }

    #[test]
    fn test_select_assignments_invalid_address() {
        let prev = PrevResult {
            interfaces: vec![],
            ips: vec![IpConfig {
                address: "not-an-ip".to_string(),
                gateway: None,
                interface: None,
            }],
        };
        let result = select_assignments("eth0", &prev);
        assert!(matches!(result, Err(PluginError::InvalidNetworkConfig(_))));
    }
}
