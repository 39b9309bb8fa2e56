//! Lease-based distributed mutual exclusion.
//!
//! A [`LockManager`](manager::LockManager) arbitrates named locks through a
//! shared [`LockStore`](store::LockStore). Existence of the store key means
//! held; the key's TTL frees an unmaintained lock after one lease window.

pub mod manager;
pub mod redis;
pub mod store;
