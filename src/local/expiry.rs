// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-key expiry deadlines.
//!
//! Lookups go through a hash map (O(1)); a deadline-ordered set lets
//! [`ExpiryIndex::sweep`] touch only the keys that have actually expired.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct ExpiryIndex {
    deadlines: HashMap<String, Instant>,
    by_deadline: BTreeSet<(Instant, String)>,
}

impl ExpiryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the deadline for `key`.
    pub fn set_expiry(&mut self, key: &str, at: Instant) {
        if let Some(old) = self.deadlines.insert(key.to_string(), at) {
            self.by_deadline.remove(&(old, key.to_string()));
        }
        self.by_deadline.insert((at, key.to_string()));
    }

    /// Drop any deadline for `key`. Keys without a deadline never expire.
    pub fn clear_expiry(&mut self, key: &str) {
        if let Some(old) = self.deadlines.remove(key) {
            self.by_deadline.remove(&(old, key.to_string()));
        }
    }

    #[must_use]
    pub fn is_expired(&self, key: &str, now: Instant) -> bool {
        self.deadlines.get(key).is_some_and(|at| *at <= now)
    }

    #[must_use]
    pub fn deadline(&self, key: &str) -> Option<Instant> {
        self.deadlines.get(key).copied()
    }

    /// Remove and return every key whose deadline is at or before `now`.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();
        while let Some((at, _)) = self.by_deadline.first() {
            if *at > now {
                break;
            }
            if let Some((_, key)) = self.by_deadline.pop_first() {
                self.deadlines.remove(&key);
                expired.push(key);
            }
        }
        expired
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.by_deadline.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unknown_key_never_expires() {
        let index = ExpiryIndex::new();
        assert!(!index.is_expired("nope", Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn test_is_expired_boundary() {
        let mut index = ExpiryIndex::new();
        let now = Instant::now();
        index.set_expiry("k", now + Duration::from_secs(10));

        assert!(!index.is_expired("k", now));
        assert!(index.is_expired("k", now + Duration::from_secs(10)));
        assert!(index.is_expired("k", now + Duration::from_secs(11)));
    }

    #[test]
    fn test_reset_replaces_old_deadline() {
        let mut index = ExpiryIndex::new();
        let now = Instant::now();
        index.set_expiry("k", now + Duration::from_secs(1));
        index.set_expiry("k", now + Duration::from_secs(100));

        assert_eq!(index.len(), 1);
        assert!(index.sweep(now + Duration::from_secs(50)).is_empty());
        assert!(!index.is_expired("k", now + Duration::from_secs(50)));
    }

    #[test]
    fn test_sweep_returns_only_expired_in_deadline_order() {
        let mut index = ExpiryIndex::new();
        let now = Instant::now();
        index.set_expiry("late", now + Duration::from_secs(30));
        index.set_expiry("first", now + Duration::from_secs(1));
        index.set_expiry("second", now + Duration::from_secs(2));

        let expired = index.sweep(now + Duration::from_secs(5));
        assert_eq!(expired, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.deadline("late"), Some(now + Duration::from_secs(30)));
    }

    #[test]
    fn test_clear_expiry() {
        let mut index = ExpiryIndex::new();
        let now = Instant::now();
        index.set_expiry("k", now);
        index.clear_expiry("k");

        assert!(index.is_empty());
        assert!(!index.is_expired("k", now + Duration::from_secs(1)));
        assert!(index.sweep(now + Duration::from_secs(1)).is_empty());
    }
}
