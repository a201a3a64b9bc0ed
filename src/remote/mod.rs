// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! L2 tier access: error-absorbing client and cluster topology.

pub mod client;
pub mod topology;

pub use client::RemoteStoreClient;
pub use topology::{ClusterTopology, TOTAL_SLOTS};
