// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded pool of multiplexed Redis connections.
//!
//! Each [`ConnectionManager`] reconnects on its own; the pool spreads
//! commands over them round-robin and caps the number of commands in
//! flight with a semaphore. Every command runs under the socket timeout
//! and, when enabled, is retried exactly once after a timeout.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info};

use super::traits::StoreError;
use crate::resilience::retry::{retry, retry_if, RetryConfig};

/// Sizing and timeout knobs for [`RedisPool`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Multiplexed connections to open.
    pub pool_size: usize,
    /// Upper bound on concurrently executing commands.
    pub max_connections: usize,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    pub retry_on_timeout: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            max_connections: 50,
            connect_timeout: Duration::from_secs(5),
            socket_timeout: Duration::from_secs(5),
            retry_on_timeout: true,
        }
    }
}

pub struct RedisPool {
    connections: RwLock<Vec<ConnectionManager>>,
    next: AtomicUsize,
    permits: Semaphore,
    socket_timeout: Duration,
    command_retry: RetryConfig,
}

impl RedisPool {
    /// Open `pool_size` connections, each bounded by `connect_timeout` and
    /// retried with the startup backoff.
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let pool_size = settings.pool_size.max(1);
        let connect_timeout = settings.connect_timeout;

        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = retry("redis_connect", &RetryConfig::startup(), || {
                let client = client.clone();
                async move {
                    match timeout(connect_timeout, ConnectionManager::new(client)).await {
                        Ok(result) => result.map_err(StoreError::from),
                        Err(_) => Err(StoreError::Timeout),
                    }
                }
            })
            .await?;
            connections.push(conn);
        }

        info!(pool_size, max_connections = settings.max_connections, "Redis pool connected");

        Ok(Self {
            connections: RwLock::new(connections),
            next: AtomicUsize::new(0),
            permits: Semaphore::new(settings.max_connections.max(1)),
            socket_timeout: settings.socket_timeout,
            command_retry: if settings.retry_on_timeout {
                RetryConfig::on_timeout()
            } else {
                RetryConfig::none()
            },
        })
    }

    fn checkout(&self) -> Result<ConnectionManager, StoreError> {
        let connections = self.connections.read();
        if connections.is_empty() {
            return Err(StoreError::Connection("pool closed".to_string()));
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % connections.len();
        Ok(connections[idx].clone())
    }

    /// Run one command. `command` is invoked once per attempt with a fresh
    /// connection handle.
    pub async fn run<T, F, Fut>(&self, operation: &str, command: F) -> Result<T, StoreError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Connection("pool closed".to_string()))?;
        let socket_timeout = self.socket_timeout;

        retry_if(operation, &self.command_retry, StoreError::is_timeout, || {
            let attempt = self.checkout().map(&command);
            async move {
                match timeout(socket_timeout, attempt?).await {
                    Ok(result) => result.map_err(StoreError::from),
                    Err(_) => Err(StoreError::Timeout),
                }
            }
        })
        .await
    }

    /// Drop every connection. Commands issued afterwards fail fast.
    pub fn close(&self) {
        let dropped = std::mem::take(&mut *self.connections.write());
        self.permits.close();
        debug!(connections = dropped.len(), "Redis pool closed");
    }
}
