// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Approximate in-memory sizing for cached values.
//!
//! The L1 budget is enforced against these estimates, so they only need to be
//! deterministic and monotonic in the payload length. Exact allocator-level
//! sizes are not attempted.

/// Fixed per-entry bookkeeping cost: list node, hash slot, expiry slot.
pub const ENTRY_OVERHEAD_BYTES: usize = 64;

/// Anything the L1 tier can account for against its byte budget.
pub trait SizedValue {
    #[must_use]
    fn size_bytes(&self) -> usize;
}

impl SizedValue for [u8] {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl SizedValue for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl SizedValue for str {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl SizedValue for String {
    fn size_bytes(&self) -> usize {
        self.len()
    }
}

impl<T: SizedValue + ?Sized> SizedValue for &T {
    fn size_bytes(&self) -> usize {
        (**self).size_bytes()
    }
}

/// Estimated footprint of one L1 entry holding `value` under `key`.
#[must_use]
#[inline]
pub fn estimate_entry<V: SizedValue + ?Sized>(key: &str, value: &V) -> usize {
    ENTRY_OVERHEAD_BYTES
        .saturating_add(key.len())
        .saturating_add(value.size_bytes())
}
