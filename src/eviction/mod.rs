// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Eviction for the remote tier.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  coordinator.rs - access-order sweep                         │
//! │  └─ EvictionCoordinator: track_access / forget / sweep       │
//! │  └─ victim_count: max(1, ceil(10% of tracked))               │
//! ├──────────────────────────────────────────────────────────────┤
//! │  profile.rs     - cached INFO memory to avoid RTT            │
//! │  └─ RemoteMemoryProfile: used bytes, pending writes          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # L1 Memory Eviction
//!
//! L1 eviction is not handled here. [`LocalLruCache`](crate::LocalLruCache)
//! pops least recently used entries inline on every put that would exceed
//! its byte budget.

pub mod coordinator;
pub mod profile;

pub use coordinator::{victim_count, EvictionCoordinator, EvictionReport, EvictionStats, ACCESS_INDEX};
pub use profile::RemoteMemoryProfile;
