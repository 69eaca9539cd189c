//! Offline cache controller for transport-level request interception.
//!
//! This module keeps the application usable, with degraded freshness, when
//! the network is unavailable:
//! - versioned named stores with wholesale invalidation on version bumps
//! - per-request-class strategies (stale-while-revalidate, network-first,
//!   cache-first)
//! - a structured offline condition instead of silent empty responses

mod controller;
mod storage;
mod types;

pub use controller::{CacheController, ControllerConfig, CACHE_VERSION};
pub use storage::{MemoryStorage, SqliteStorage, StoreBackend};
pub use types::{
  is_offline, CachedResponse, FetchRequest, FetchResponse, OfflineError, RequestClass,
  ResponseSource, Served,
};
