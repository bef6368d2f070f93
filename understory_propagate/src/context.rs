// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read-only view handed to nodes, starter actions and group hooks.

use alloc::sync::Arc;
use core::fmt;

use crate::index::{NodeIndex, PassIndex};
use crate::node::Node;
use crate::queue::{Ancestors, NodeQueue};
use crate::scheduler::Scheduler;
use crate::status::NodeStatus;

/// Read-only view of the running propagation.
pub struct PropagationContext<'a, N: Node> {
    queue: &'a NodeQueue<N>,
    pass: Option<PassIndex>,
    changed: &'a [N],
}

impl<N: Node> fmt::Debug for PropagationContext<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationContext")
            .field("group", self.queue.group())
            .field("pass", &self.pass)
            .field("changed", &self.changed.len())
            .finish_non_exhaustive()
    }
}

impl<'a, N: Node> PropagationContext<'a, N> {
    pub(crate) fn new(queue: &'a NodeQueue<N>, pass: Option<PassIndex>, changed: &'a [N]) -> Self {
        Self {
            queue,
            pass,
            changed,
        }
    }

    /// Returns the group being propagated.
    #[must_use]
    pub fn group(&self) -> &'a N::Group {
        self.queue.group()
    }

    /// Returns the host scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &'a Arc<dyn Scheduler> {
        self.queue.scheduler()
    }

    /// Returns the pass currently being visited.
    ///
    /// `None` inside starter actions and [`NodeGroup::on_self_resolved`](crate::NodeGroup::on_self_resolved).
    #[must_use]
    pub fn pass(&self) -> Option<PassIndex> {
        self.pass
    }

    /// Returns the status of `index` in this group's queue.
    #[must_use]
    pub fn status(&self, index: NodeIndex) -> NodeStatus {
        self.queue.status(index)
    }

    /// Returns the status of `index` in the nearest ancestor queue holding it.
    #[must_use]
    pub fn ancestor_status(&self, index: NodeIndex) -> Option<NodeStatus> {
        self.queue.ancestor_status(index)
    }

    /// Iterates over ancestor frames, nearest first.
    pub fn ancestors(&self) -> Ancestors<'a, N> {
        self.queue.ancestors()
    }

    /// Returns the members of this group that reported a change so far, in
    /// visit order.
    #[must_use]
    pub fn changed(&self) -> &'a [N] {
        self.changed
    }

    /// Returns the underlying queue.
    #[must_use]
    pub fn queue(&self) -> &'a NodeQueue<N> {
        self.queue
    }
}
