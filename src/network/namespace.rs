//! Network namespace operations

use crate::error::{AppError, NetworkError};
use crate::network::NetworkNamespace;
use crate::routing::manager::RtNetlinkRouteManager;
use netns_rs::NetNs;
use nix::fcntl::{Flock, FlockArg};
use std::fs::File;
use std::future::Future;
use tracing::{debug, info};

/// Exclusive advisory lock on a network namespace file.
///
/// Released when dropped.
pub struct NamespaceLock {
    _lock: Flock<File>,
}

impl NamespaceLock {
    /// Block until the lock on `path` is held
    pub async fn acquire(path: &str) -> Result<Self, NetworkError> {
        let owned = path.to_string();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(&owned))
            .await
            .map_err(|e| NetworkError::Lock {
                path: path.to_string(),
                reason: e.to_string(),
            })?
    }

    fn acquire_blocking(path: &str) -> Result<Self, NetworkError> {
        let file = File::open(path).map_err(|e| NetworkError::Lock {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        let lock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            NetworkError::Lock {
                path: path.to_string(),
                reason: errno.to_string(),
            }
        })?;

        debug!("Locked network namespace {}", path);
        Ok(Self { _lock: lock })
    }
}

/// Network namespace manager
pub struct NamespaceManager;

impl NamespaceManager {
    pub fn new() -> Self {
        Self
    }

    /// Run `func` against the routing state of `namespace`.
    ///
    /// The namespace stays locked until `func` completes, whether it
    /// succeeds or not. The netlink socket handed to `func` is opened inside
    /// the namespace, so the calling thread never stays switched.
    pub async fn execute_in_namespace<F, Fut, R>(
        &self,
        namespace: &NetworkNamespace,
        func: F,
    ) -> Result<R, AppError>
    where
        F: FnOnce(RtNetlinkRouteManager) -> Fut,
        Fut: Future<Output = Result<R, AppError>>,
    {
        info!("Network namespace to use and lock: {}", namespace.path);
        let _lock = NamespaceLock::acquire(&namespace.path).await?;

        let ns = NetNs::get(&namespace.path)
            .map_err(|e| NetworkError::NamespaceAccess(e.to_string()))?;

        let manager = ns
            .run(|_| RtNetlinkRouteManager::new())
            .map_err(|e| NetworkError::NamespaceAccess(e.to_string()))??;

        func(manager).await
    }
}

impl Default for NamespaceManager {
    fn default() -> Self {
        Self::new()
    }
}
