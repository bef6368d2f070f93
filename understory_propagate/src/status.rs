// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-slot propagation status.

use core::fmt;

/// Lifecycle of a node inside one queue.
///
/// Statuses only move forward: `None < Enqueued < Visited < Changed`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeStatus {
    /// Not part of this propagation.
    #[default]
    None,
    /// Waiting for its pass.
    Enqueued,
    /// Its propagation step ran (or is running) and reported no change.
    Visited,
    /// Its propagation step reported a change.
    Changed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Enqueued => "enqueued",
            Self::Visited => "visited",
            Self::Changed => "changed",
        })
    }
}

/// Arena entry: the status tag carries the node it applies to.
#[derive(Clone, Debug)]
pub(crate) enum Slot<N> {
    Empty,
    Enqueued(N),
    Visited(N),
    Changed(N),
}

impl<N> Default for Slot<N> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<N> Slot<N> {
    pub(crate) fn status(&self) -> NodeStatus {
        match self {
            Self::Empty => NodeStatus::None,
            Self::Enqueued(_) => NodeStatus::Enqueued,
            Self::Visited(_) => NodeStatus::Visited,
            Self::Changed(_) => NodeStatus::Changed,
        }
    }

    pub(crate) fn node(&self) -> Option<&N> {
        match self {
            Self::Empty => None,
            Self::Enqueued(n) | Self::Visited(n) | Self::Changed(n) => Some(n),
        }
    }

    /// Re-tags the slot, keeping its node. `NodeStatus::None` empties it.
    pub(crate) fn set_status(&mut self, status: NodeStatus) {
        let Some(node) = core::mem::take(self).into_node() else {
            return;
        };
        *self = match status {
            NodeStatus::None => Self::Empty,
            NodeStatus::Enqueued => Self::Enqueued(node),
            NodeStatus::Visited => Self::Visited(node),
            NodeStatus::Changed => Self::Changed(node),
        };
    }

    fn into_node(self) -> Option<N> {
        match self {
            Self::Empty => None,
            Self::Enqueued(n) | Self::Visited(n) | Self::Changed(n) => Some(n),
        }
    }
}
