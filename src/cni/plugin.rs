//! CNI command dispatch

use crate::cni::{select_assignments, ErrorDocument, NetConf, SUPPORTED_VERSIONS};
use crate::config::cli::CliArgs;
use crate::config::AppConfig;
use crate::error::{AppError, PluginError};
use crate::network::namespace::NamespaceManager;
use crate::network::NetworkNamespace;
use crate::routing::sbr::SourceRouter;
use serde_json::{json, Value};
use std::io::Write;
use std::str::FromStr;
use tracing::info;

/// Version written into documents that cannot name one
const DEFAULT_VERSION: &str = "1.1.0";

/// Operation requested by the container runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CniCommand {
    Add,
    Del,
    Check,
    Version,
}

impl FromStr for CniCommand {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(CniCommand::Add),
            "DEL" => Ok(CniCommand::Del),
            "CHECK" => Ok(CniCommand::Check),
            "VERSION" => Ok(CniCommand::Version),
            other => Err(PluginError::UnknownCommand(other.to_string())),
        }
    }
}

/// Runtime-supplied arguments of one invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: CniCommand,
    pub netns: Option<String>,
    pub ifname: Option<String>,
}

impl Invocation {
    pub fn from_args(args: &CliArgs) -> Result<Self, PluginError> {
        let command = args
            .command
            .as_deref()
            .ok_or_else(|| PluginError::MissingEnvironment {
                name: "CNI_COMMAND".to_string(),
            })?
            .parse()?;

        Ok(Self {
            command,
            netns: args.netns.clone().filter(|ns| !ns.is_empty()),
            ifname: args.ifname.clone().filter(|name| !name.is_empty()),
        })
    }

    fn ifname(&self) -> Result<&str, PluginError> {
        self.ifname
            .as_deref()
            .ok_or_else(|| PluginError::MissingEnvironment {
                name: "CNI_IFNAME".to_string(),
            })
    }

    fn netns(&self) -> Result<&str, PluginError> {
        self.netns
            .as_deref()
            .ok_or_else(|| PluginError::MissingEnvironment {
                name: "CNI_NETNS".to_string(),
            })
    }
}

/// Source based routing plugin
pub struct SbrPlugin {
    config: AppConfig,
    namespaces: NamespaceManager,
}

impl SbrPlugin {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            namespaces: NamespaceManager::new(),
        }
    }

    /// Run one invocation, writing the CNI output document to `out`
    pub async fn run<W: Write>(
        &self,
        invocation: &Invocation,
        stdin: &[u8],
        out: &mut W,
    ) -> Result<(), AppError> {
        match invocation.command {
            CniCommand::Version => write_document(out, &version_document()),
            CniCommand::Add => {
                let conf = NetConf::parse(stdin)?;
                let result = self.cmd_add(invocation, &conf).await?;
                write_document(out, &result)
            }
            CniCommand::Del => {
                let conf = NetConf::parse(stdin)?;
                self.cmd_del(invocation, &conf).await
            }
            CniCommand::Check => {
                NetConf::parse(stdin)?;
                Ok(())
            }
        }
    }

    async fn cmd_add(&self, invocation: &Invocation, conf: &NetConf) -> Result<Value, AppError> {
        let ifname = invocation.ifname()?;
        let netns = invocation.netns()?;

        let prev_result = conf.previous_result()?.ok_or(PluginError::NotChained)?;
        if !SUPPORTED_VERSIONS.contains(&conf.cni_version.as_str()) {
            return Err(PluginError::IncompatibleVersion(conf.cni_version.clone()).into());
        }

        info!("Configure SBR for new interface {}", ifname);
        let assignments = select_assignments(ifname, &prev_result)?;

        let first_table_id = self.config.first_table_id;
        let table = conf.table;
        self.namespaces
            .execute_in_namespace(&NetworkNamespace::new(netns), |manager| async move {
                SourceRouter::new(manager)
                    .with_first_table_id(first_table_id)
                    .provision(&assignments, ifname, table)
                    .await
                    .map_err(AppError::from)
            })
            .await?;

        pass_through(conf)
    }

    async fn cmd_del(&self, invocation: &Invocation, conf: &NetConf) -> Result<(), AppError> {
        let ifname = invocation.ifname()?;

        // Nothing was set up without a namespace, and DEL must stay idempotent
        let Some(netns) = invocation.netns.as_deref() else {
            info!("No network namespace for {}, nothing to clean up", ifname);
            return Ok(());
        };

        info!("Cleaning up SBR for {}", ifname);
        let table = conf.table;
        self.namespaces
            .execute_in_namespace(&NetworkNamespace::new(netns), |manager| async move {
                SourceRouter::new(manager)
                    .teardown(ifname, table)
                    .await
                    .map_err(AppError::from)
            })
            .await
    }
}

/// The previous result, labelled with the configuration's version
fn pass_through(conf: &NetConf) -> Result<Value, AppError> {
    let mut result = conf.prev_result.clone().ok_or(PluginError::NotChained)?;
    if let Some(fields) = result.as_object_mut() {
        fields.insert(
            "cniVersion".to_string(),
            Value::String(conf.cni_version.clone()),
        );
    }
    Ok(result)
}

fn version_document() -> Value {
    json!({
        "cniVersion": DEFAULT_VERSION,
        "supportedVersions": SUPPORTED_VERSIONS,
    })
}

fn write_document<W: Write, T: serde::Serialize>(out: &mut W, document: &T) -> Result<(), AppError> {
    serde_json::to_writer(&mut *out, document).map_err(|e| PluginError::Output(e.to_string()))?;
    writeln!(out)?;
    Ok(())
}

/// Describe `error` on `out` in the CNI error format
pub fn report_error<W: Write>(stdin: &[u8], error: &AppError, out: &mut W) -> Result<(), AppError> {
    let cni_version = NetConf::parse(stdin)
        .ok()
        .map(|conf| conf.cni_version)
        .filter(|version| !version.is_empty())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string());

    let document = ErrorDocument {
        cni_version,
        code: error.cni_code(),
        msg: error.to_string(),
    };
    write_document(out, &document)
}
