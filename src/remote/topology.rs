// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::Serialize;

use crate::storage::ClusterMode;

/// Hash slots in a Redis cluster.
pub const TOTAL_SLOTS: u32 = 16384;

/// Slot layout of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClusterTopology {
    pub total_slots: u32,
    pub node_count: u32,
    pub slots_per_node: u32,
}

impl ClusterTopology {
    /// A single node owning every slot. Also the answer whenever the
    /// store cannot be introspected.
    pub const STANDALONE: Self = Self {
        total_slots: TOTAL_SLOTS,
        node_count: 1,
        slots_per_node: TOTAL_SLOTS,
    };

    #[must_use]
    pub fn from_mode(mode: ClusterMode) -> Self {
        match mode {
            ClusterMode::Standalone => Self::STANDALONE,
            ClusterMode::Cluster {
                slots_assigned,
                known_nodes,
            } => Self {
                total_slots: slots_assigned,
                node_count: known_nodes,
                slots_per_node: slots_assigned / known_nodes.max(1),
            },
        }
    }

    #[must_use]
    pub fn is_standalone(&self) -> bool {
        *self == Self::STANDALONE
    }
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self::STANDALONE
    }
}
