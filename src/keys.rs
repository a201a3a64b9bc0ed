// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache keys and generation versioning.
//!
//! Every stored key has the shape:
//!
//! ```text
//! v{version}:{namespace}:{sha256_hex(key)}     (namespaced)
//! v{version}:{sha256_hex(key)}                 (global)
//! ```
//!
//! The version prefix makes a generation bump a logical invalidate-all: keys
//! written under an older version become unaddressable. The namespace segment
//! lets [`TieredCache::invalidate_namespace`](crate::TieredCache::invalidate_namespace)
//! pattern-match on `v{version}:{namespace}:*`.
//!
//! # Example
//!
//! ```
//! use tiered_cache::{CacheKey, KeyVersioner};
//!
//! let versioner = KeyVersioner::new(1);
//! let key = CacheKey::namespaced("project-42", "src/main.rs").unwrap();
//!
//! let v1 = versioner.versioned_key(&key);
//! assert!(v1.starts_with("v1:project-42:"));
//!
//! versioner.bump();
//! assert_ne!(versioner.versioned_key(&key), v1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// A validated logical key, optionally scoped to a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Option<String>,
    key: String,
}

impl CacheKey {
    /// Create a global (non-namespaced) key. Empty keys are rejected.
    pub fn new(key: impl Into<String>) -> Result<Self, CacheError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CacheError::InvalidKey);
        }
        Ok(Self { namespace: None, key })
    }

    /// Create a key scoped to `namespace`.
    pub fn namespaced(namespace: impl Into<String>, key: impl Into<String>) -> Result<Self, CacheError> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        let mut this = Self::new(key)?;
        this.namespace = Some(namespace);
        Ok(this)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Hex SHA-256 of the logical key.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.key.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.key),
            None => write!(f, "{}", self.key),
        }
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = CacheError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

/// Check a namespace is usable as a single key segment and inside a SCAN pattern.
pub fn validate_namespace(namespace: &str) -> Result<(), CacheError> {
    let bad = namespace.is_empty()
        || namespace
            .chars()
            .any(|c| matches!(c, ':' | '*' | '?' | '[' | ']' | '\\'));
    if bad {
        Err(CacheError::InvalidNamespace(namespace.to_string()))
    } else {
        Ok(())
    }
}

/// Derives versioned keys from logical keys and owns the cache generation.
///
/// Shared between the L1 tier and the facade, so a bump is observed by both.
#[derive(Debug)]
pub struct KeyVersioner {
    version: AtomicU64,
}

impl KeyVersioner {
    #[must_use]
    pub fn new(version: u64) -> Self {
        Self {
            version: AtomicU64::new(version),
        }
    }

    #[must_use]
    #[inline]
    pub fn current(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Advance the generation. Returns the new version.
    pub fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn set(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }

    /// Versioned key under the current generation.
    #[must_use]
    pub fn versioned_key(&self, key: &CacheKey) -> String {
        Self::format_key(self.current(), key)
    }

    /// Versioned key under an explicit generation.
    #[must_use]
    pub fn format_key(version: u64, key: &CacheKey) -> String {
        match key.namespace() {
            Some(ns) => format!("v{}:{}:{}", version, ns, key.digest()),
            None => format!("v{}:{}", version, key.digest()),
        }
    }

    /// Prefix shared by every key of `namespace` in the current generation.
    #[must_use]
    pub fn namespace_prefix(&self, namespace: &str) -> String {
        format!("v{}:{}:", self.current(), namespace)
    }

    /// Glob pattern (for `SCAN MATCH`) covering `namespace` in the current generation.
    #[must_use]
    pub fn namespace_pattern(&self, namespace: &str) -> String {
        format!("{}*", self.namespace_prefix(namespace))
    }
}

impl Default for KeyVersioner {
    fn default() -> Self {
        Self::new(1)
    }
}
