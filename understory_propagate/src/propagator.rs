// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixpoint driver for one group.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::context::PropagationContext;
use crate::error::{CycleReason, PropagationError};
use crate::index::NodeIndex;
use crate::node::{Node, NodeGroup, PropagationResult};
use crate::queue::NodeQueue;
use crate::scheduler::Scheduler;
use crate::status::NodeStatus;

/// Lifecycle of a [`GroupPropagator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropagatorState {
    /// Accepting seed nodes; [`GroupPropagator::propagate`] not called yet.
    Created,
    /// Inside [`GroupPropagator::propagate`].
    Propagating,
    /// Fixpoint reached; child groups can be taken.
    Resolved,
    /// A fault stopped propagation. There is no way back.
    Aborted,
}

impl PropagatorState {
    fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Propagating => "propagating",
            Self::Resolved => "resolved",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for PropagatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drives one group's [`NodeQueue`] to a fixpoint.
///
/// Listeners that belong to other groups are collected while propagating and
/// handed out afterwards as child propagators by
/// [`next_groups`](Self::next_groups).
pub struct GroupPropagator<N: Node> {
    queue: NodeQueue<N>,
    state: PropagatorState,
    /// Lowest index enqueued locally; orders siblings.
    min_index: Option<NodeIndex>,
    /// Listeners in other groups, in discovery order.
    pending: Vec<N>,
    /// Members that reported a change, in visit order.
    changed: Vec<N>,
    visited: usize,
    scratch: Vec<N>,
}

impl<N: Node> fmt::Debug for GroupPropagator<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupPropagator")
            .field("group", self.queue.group())
            .field("state", &self.state)
            .field("min_index", &self.min_index)
            .field("pending", &self.pending.len())
            .field("changed", &self.changed.len())
            .field("visited", &self.visited)
            .finish_non_exhaustive()
    }
}

impl<N: Node> GroupPropagator<N> {
    /// Wraps `queue` in a propagator in the [`Created`](PropagatorState::Created) state.
    #[must_use]
    pub fn new(queue: NodeQueue<N>) -> Self {
        Self {
            queue,
            state: PropagatorState::Created,
            min_index: None,
            pending: Vec::new(),
            changed: Vec::new(),
            visited: 0,
            scratch: Vec::new(),
        }
    }

    /// Applies a change to `origin` and propagates it through its group.
    ///
    /// `starter` performs the change and reports whether anything changed.
    /// On [`PropagationResult::Changed`] the origin's group is notified (if it
    /// asks for immediate notification), the queue is seeded from `origin`
    /// and driven to its fixpoint; the resolved propagator is returned so its
    /// child groups can be taken. On [`PropagationResult::Unchanged`] nothing
    /// else happens and `None` is returned.
    pub fn begin<F>(
        origin: N,
        scheduler: Arc<dyn Scheduler>,
        starter: F,
    ) -> Result<Option<Self>, PropagationError>
    where
        F: FnOnce(&PropagationContext<'_, N>) -> PropagationResult,
    {
        let info = origin.info().ok_or(PropagationError::UnsupportedNode)?;
        let mut this = Self::new(NodeQueue::new(origin.group(), scheduler));

        let result = starter(&PropagationContext::new(&this.queue, None, &[]));
        if !result.is_changed() {
            tracing::debug!(
                group = ?this.queue.group(),
                origin = %info.index,
                "starter reported no change"
            );
            return Ok(None);
        }

        tracing::debug!(
            group = ?this.queue.group(),
            origin = %info.index,
            "beginning propagation"
        );

        let group = this.queue.group();
        if group.notifies_immediately() {
            group.on_changed(&origin);
        }
        this.changed.push(origin.clone());
        this.min_index = Some(info.index);

        let foreign = match this.queue.start_from(origin, NodeStatus::Changed) {
            Ok(foreign) => foreign,
            Err(err) => return Err(this.abort(err)),
        };
        for listener in foreign {
            if let Err(err) = this.route(listener) {
                return Err(this.abort(err));
            }
        }

        this.propagate()?;
        Ok(Some(this))
    }

    /// Like [`begin`](Self::begin), for a change whose result is already known.
    ///
    /// Hosts use this to continue after a suspended starter action completed
    /// through the scheduler.
    pub fn resume(
        origin: N,
        scheduler: Arc<dyn Scheduler>,
        result: PropagationResult,
    ) -> Result<Option<Self>, PropagationError> {
        Self::begin(origin, scheduler, |_| result)
    }

    /// Returns the group this propagator drives.
    #[must_use]
    pub fn group(&self) -> &N::Group {
        self.queue.group()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PropagatorState {
        self.state
    }

    /// Returns the lowest index enqueued in this group, if any.
    #[must_use]
    pub fn min_index(&self) -> Option<NodeIndex> {
        self.min_index
    }

    /// Returns the underlying queue.
    #[must_use]
    pub fn queue(&self) -> &NodeQueue<N> {
        &self.queue
    }

    /// Returns the listeners collected for other groups so far.
    #[must_use]
    pub fn pending(&self) -> &[N] {
        &self.pending
    }

    /// Returns the members that reported a change, in visit order.
    #[must_use]
    pub fn changed(&self) -> &[N] {
        &self.changed
    }

    /// Returns how many propagation steps ran.
    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.visited
    }

    /// Returns how many members reported a change, including a changed origin.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.changed.len()
    }

    /// Adds a seed node before [`propagate`](Self::propagate).
    ///
    /// Nodes of this propagator's group go to the local queue; others are
    /// held for [`next_groups`](Self::next_groups).
    ///
    /// # Errors
    ///
    /// [`PropagationError::InvalidState`] once propagation has started, plus
    /// the errors of [`NodeQueue::enqueue`].
    pub fn enqueue(&mut self, node: N) -> Result<(), PropagationError> {
        if self.state != PropagatorState::Created {
            return Err(PropagationError::InvalidState {
                state: self.state.name(),
                required: PropagatorState::Created.name(),
            });
        }
        self.route(node)
    }

    /// Visits passes until none remain, then calls the group's
    /// [`on_self_resolved`](NodeGroup::on_self_resolved) hook.
    ///
    /// For each node of a pass: mark it visited and run its step. A changed
    /// node notifies its group (if immediate), is marked changed, and enqueues
    /// every current listener.
    ///
    /// # Errors
    ///
    /// [`PropagationError::InvalidReentry`] if called more than once. Any
    /// other error aborts the propagator.
    pub fn propagate(&mut self) -> Result<(), PropagationError> {
        if self.state != PropagatorState::Created {
            return Err(PropagationError::InvalidReentry);
        }
        self.state = PropagatorState::Propagating;

        match self.run_to_fixpoint() {
            Ok(()) => {
                self.state = PropagatorState::Resolved;
                tracing::debug!(
                    group = ?self.queue.group(),
                    visited = self.visited,
                    changed = self.changed.len(),
                    pending = self.pending.len(),
                    "group resolved"
                );
                Ok(())
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Splits the collected cross-group listeners into one child propagator
    /// per target group.
    ///
    /// Children are sorted by the lowest index that triggered them; groups
    /// triggered at the same index keep discovery order.
    ///
    /// # Errors
    ///
    /// [`PropagationError::InvalidState`] unless the propagator is
    /// [`Resolved`](PropagatorState::Resolved).
    pub fn next_groups(self) -> Result<Vec<Self>, PropagationError> {
        if self.state != PropagatorState::Resolved {
            return Err(PropagationError::InvalidState {
                state: self.state.name(),
                required: PropagatorState::Resolved.name(),
            });
        }
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let frame = self.queue.snapshot();
        let mut children: Vec<Self> = Vec::new();
        let mut by_group: HashMap<N::Group, usize> = HashMap::new();
        for node in self.pending {
            let slot = match by_group.entry(node.group()) {
                Entry::Occupied(e) => *e.get(),
                Entry::Vacant(e) => {
                    let queue = NodeQueue::below(&frame, e.key().clone(), self.queue.scheduler());
                    children.push(Self::new(queue));
                    *e.insert(children.len() - 1)
                }
            };
            children[slot].route(node)?;
        }

        children.sort_by_key(Self::min_index);
        tracing::debug!(
            group = ?self.queue.group(),
            children = children.len(),
            "created child groups"
        );
        Ok(children)
    }

    fn run_to_fixpoint(&mut self) -> Result<(), PropagationError> {
        loop {
            let batch = self.queue.next_pass()?;
            let Some(first) = batch.first() else {
                break;
            };
            let pass = first.info().map(|info| info.pass);

            for node in batch {
                self.queue.update_status(&node, NodeStatus::Visited)?;
                self.visited += 1;

                let cx = PropagationContext::new(&self.queue, pass, &self.changed);
                if !node.on_propagation(&cx).is_changed() {
                    continue;
                }

                let group = self.queue.group();
                if group.notifies_immediately() {
                    group.on_changed(&node);
                }
                self.queue.update_status(&node, NodeStatus::Changed)?;

                let mut listeners = mem::take(&mut self.scratch);
                node.listeners(&mut listeners);
                for listener in listeners.drain(..) {
                    self.route(listener)?;
                }
                self.scratch = listeners;
                self.changed.push(node);
            }
        }

        self.queue
            .group()
            .on_self_resolved(&PropagationContext::new(&self.queue, None, &self.changed));
        Ok(())
    }

    fn route(&mut self, node: N) -> Result<(), PropagationError> {
        let info = node.info().ok_or(PropagationError::UnsupportedNode)?;
        if node.group() == *self.queue.group() {
            self.queue.enqueue(node)?;
            self.min_index = Some(self.min_index.map_or(info.index, |min| min.min(info.index)));
            return Ok(());
        }

        // A child queue starts empty, so the closed-pass check for listeners
        // of other groups has to happen against this queue's cursor.
        let next_pass_start = self.queue.next_pass_start();
        if info.index < next_pass_start {
            return Err(PropagationError::CycleDetected {
                index: info.index,
                reason: CycleReason::ClosedPass { next_pass_start },
            });
        }
        self.pending.push(node);
        Ok(())
    }

    fn abort(&mut self, err: PropagationError) -> PropagationError {
        self.state = PropagatorState::Aborted;
        tracing::warn!(group = ?self.queue.group(), error = %err, "propagation aborted");
        err
    }
}
