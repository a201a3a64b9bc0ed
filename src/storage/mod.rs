// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote store backends for the L2 tier.

pub mod memory;
pub mod pool;
pub mod redis;
pub mod traits;

pub use memory::InMemoryStore;
pub use pool::{PoolSettings, RedisPool};
pub use redis::RedisStore;
pub use traits::{ClusterMode, RemoteStore, StoreError};
