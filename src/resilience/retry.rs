// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Two shapes are used by the remote tier:
//! - connecting at startup retries any error a few times, then fails fast
//! - individual commands retry exactly once, and only after a timeout
//!
//! # Example
//!
//! ```
//! use tiered_cache::RetryConfig;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_attempts, 5);
//!
//! // One original attempt plus one retry
//! let command = RetryConfig::on_timeout();
//! assert_eq!(command.max_attempts, 2);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for connection/command retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Fast-fail retry for the initial connection.
    /// 5 attempts with exponential backoff, giving up after a few seconds so
    /// a bad URL surfaces quickly.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// A single transparent retry, no backoff. Used for `retry_on_timeout`.
    #[must_use]
    pub fn on_timeout() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Never retry.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::on_timeout()
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

/// Retry `operation` on any error, up to `config.max_attempts` attempts.
pub async fn retry<F, Fut, T, E>(operation_name: &str, config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(operation_name, config, |_| true, operation).await
}

/// Retry `operation` only while `should_retry` accepts the error.
///
/// Errors the predicate rejects are returned immediately.
pub async fn retry_if<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, retries = attempts, "Operation succeeded after retry");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }

                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max_attempts,
                    error = %err,
                    retry_in = ?delay,
                    "Operation failed, retrying"
                );
                crate::metrics::record_retry(operation_name);

                if !delay.is_zero() {
                    sleep(delay).await;
                }
                delay = config.next_delay(delay);
            }
        }
    }
}
