// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! L1 in-process tier.

pub mod expiry;
pub mod lru_cache;

pub use expiry::ExpiryIndex;
pub use lru_cache::LocalLruCache;
