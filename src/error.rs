// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::storage::traits::StoreError;

/// Errors surfaced to cache callers.
///
/// Misses and remote-tier failures are never reported through this type;
/// they come back as `None`/`false`. Only rejected input and construction
/// failures do.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache key must not be empty")]
    InvalidKey,
    #[error("Invalid namespace '{0}': must be non-empty and free of ':' and glob characters")]
    InvalidNamespace(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
