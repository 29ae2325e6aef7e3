//! Source based routing meta plugin for container networks
//!
//! For every address of a container interface this library installs a policy
//! rule that routes traffic originating from that address through a
//! dedicated routing table, and removes those rules again on teardown.

pub mod cni;
pub mod config;
pub mod error;
pub mod network;
pub mod routing;

pub use error::AppError;
