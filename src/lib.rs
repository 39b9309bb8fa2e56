//! Coordination core for clustered realtime server instances.
//!
//! Two independently usable primitives, both consumed by the host server as
//! pluggable services:
//!
//! - [`Relay`] / [`ClusterTransport`]: a star-topology message relay across
//!   sibling processes of one host — broadcast, direct send, and
//!   topic-addressed subscription.
//! - [`LockManager`]: lease-based mutual exclusion on named resources,
//!   arbitrated through a shared store ([`RedisLockStore`] in production,
//!   [`MemoryLockStore`] for tests and single-host setups).
//!
//! Failures that make a primitive unusable are surfaced through the host's
//! [`AlertSink`] rather than raised across the plugin boundary.

pub mod cluster;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod monitoring;

pub use cluster::message::{Action, ClusterMessage, Envelope, Topic};
pub use cluster::relay::{Relay, RelayMetrics};
pub use cluster::subscription::SubscriptionTable;
pub use cluster::transport::ClusterTransport;
pub use config::{ClusterConfig, Config, LockConfig, RelayConfig};
pub use error::{Result, StarbusError};
pub use lock::manager::{LockManager, LockToken};
pub use lock::redis::RedisLockStore;
pub use lock::store::{LockStore, MemoryLockStore};
pub use monitoring::{Alert, AlertLevel, AlertSink};

use async_trait::async_trait;

/// Host-driven lifecycle of a coordination service.
///
/// Readiness is established by the async constructors; `when_ready`
/// re-checks that the service is still usable, `close` releases its sockets
/// and background tasks.
#[async_trait]
pub trait Lifecycle {
    async fn when_ready(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
