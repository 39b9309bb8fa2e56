//! Redis-backed lock store.
//!
//! `SET ... NX EX` makes key creation and lease assignment one atomic
//! command, so a crash between acquire and expiry-set cannot leave a
//! permanently held lock.

use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Pool;
use fred::interfaces::{ClientLike, KeysInterface, LuaInterface};
use fred::types::config::{Config as FredConfig, ReconnectPolicy, ServerConfig};
use fred::types::{Builder, Expiration, SetOptions};
use tracing::debug;

use super::store::LockStore;
use crate::config::LockConfig;
use crate::error::{Result, StarbusError};

/// Check-and-delete in one round trip: the key is removed only while it
/// still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

const POOL_SIZE: usize = 4;

pub struct RedisLockStore {
    pool: Pool,
}

impl RedisLockStore {
    /// Connect to the store described by `config`. The pool is initialised
    /// and PING-verified before this returns.
    pub async fn connect(config: &LockConfig) -> Result<Self> {
        let server = ServerConfig::new_centralized(&config.host, config.port);
        let fred_config = FredConfig {
            server,
            ..FredConfig::default()
        };

        let mut builder = Builder::from_config(fred_config);
        builder.set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2));

        let pool = builder
            .build_pool(POOL_SIZE)
            .map_err(|e| StarbusError::lock_store(format!("failed to build store pool: {}", e)))?;

        pool.init().await.map_err(|e| {
            StarbusError::lock_store(format!(
                "failed to connect to {}:{}: {}",
                config.host, config.port, e
            ))
        })?;

        let _: String = pool
            .ping(None)
            .await
            .map_err(|e| StarbusError::lock_store(format!("store PING failed: {}", e)))?;

        debug!("lock store connected to {}:{}", config.host, config.port);
        Ok(Self { pool })
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // Redis leases are whole seconds; never round a positive ttl down to
        // zero.
        let ttl_secs = ttl.as_secs().max(1) as i64;

        let reply: Option<String> = self
            .pool
            .set(
                key,
                value,
                Some(Expiration::EX(ttl_secs)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| StarbusError::lock_store(e.to_string()))?;

        // SET ... NX replies OK when the key was created, nil otherwise.
        Ok(reply.is_some())
    }

    async fn delete_if_match(&self, key: &str, value: &str) -> Result<bool> {
        let deleted: i64 = self
            .pool
            .eval(
                RELEASE_SCRIPT,
                vec![key.to_string()],
                vec![value.to_string()],
            )
            .await
            .map_err(|e| StarbusError::lock_store(e.to_string()))?;
        Ok(deleted == 1)
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self
            .pool
            .ping(None)
            .await
            .map_err(|e| StarbusError::lock_store(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool
            .quit()
            .await
            .map_err(|e| StarbusError::lock_store(e.to_string()))?;
        Ok(())
    }
}
