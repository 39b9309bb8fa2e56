use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::LockStore;
use crate::config::LockConfig;
use crate::monitoring::AlertSink;
use crate::{Lifecycle, Result};

/// Namespace prefix for lock keys in the shared store.
const LOCK_NAMESPACE: &str = "lock";

const ALERT_SOURCE: &str = "lock_manager";

/// Opaque fencing token proving ownership of an acquired lock. Releasing a
/// lock requires the token handed out by the matching acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lease-based mutual exclusion over a shared [`LockStore`].
///
/// The store arbitrates: concurrent acquires for one name are serialized by
/// its atomic set-if-absent, and an unrefreshed lock frees itself when the
/// lease expires. The manager holds no lock state of its own, so any
/// process sharing the store participates, cluster member or not.
pub struct LockManager {
    store: Arc<dyn LockStore>,
    lease: Duration,
    alerts: AlertSink,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, config: &LockConfig, alerts: AlertSink) -> Self {
        Self {
            store,
            lease: config.lease(),
            alerts,
        }
    }

    /// Try to take the lock `name` for one lease window.
    ///
    /// `None` means the lock is held elsewhere — ordinary contention, not an
    /// error. A store failure also resolves to `None`: a lock the caller
    /// cannot be sure it won is never granted. That condition is raised on
    /// the alert sink too, since the primitive is unusable without its
    /// store.
    pub async fn acquire(&self, name: &str) -> Option<LockToken> {
        let key = lock_key(name);
        let token = LockToken::new();

        match self.store.set_if_absent(&key, token.as_str(), self.lease).await {
            Ok(true) => {
                debug!(%key, "lock acquired");
                Some(token)
            }
            Ok(false) => {
                debug!(%key, "lock is already held");
                None
            }
            Err(e) => {
                self.alerts.fatal(
                    ALERT_SOURCE,
                    format!("lock store unreachable, denying {}: {}", name, e),
                );
                None
            }
        }
    }

    /// Release `name`, presenting the fencing token from its acquire. The
    /// deletion is conditional on the token, so a caller cannot clear a lock
    /// it does not hold.
    ///
    /// Fire-and-forget: a token mismatch or store failure is logged and
    /// swallowed.
    pub async fn release(&self, name: &str, token: &LockToken) {
        let key = lock_key(name);
        match self.store.delete_if_match(&key, token.as_str()).await {
            Ok(true) => debug!(%key, "lock released"),
            Ok(false) => warn!(%key, "lock release: key missing or owned by another holder"),
            Err(e) => warn!(%key, "lock release failed: {}", e),
        }
    }
}

#[async_trait]
impl Lifecycle for LockManager {
    async fn when_ready(&self) -> Result<()> {
        self.store.ping().await
    }

    async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

fn lock_key(name: &str) -> String {
    format!("{}/{}", LOCK_NAMESPACE, name)
}
