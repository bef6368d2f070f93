// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-group slot arena driving pass extraction.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use smallvec::SmallVec;

use crate::error::{CycleReason, PropagationError};
use crate::index::{NodeIndex, PassIndex};
use crate::node::Node;
use crate::scheduler::Scheduler;
use crate::status::{NodeStatus, Slot};

/// Nodes extracted for one pass, in ascending index order.
pub type PassBatch<N> = SmallVec<[N; 8]>;

// Positions come from `NodeIndex`. Only the cursor past a node at `u32::MAX`
// can exceed `u32`; built tables never assign that index (see `MAX_KINDS`).
#[inline]
fn to_index(i: usize) -> NodeIndex {
    NodeIndex::new(u32::try_from(i).unwrap_or(u32::MAX))
}

/// In-flight propagation state of one group.
///
/// Slots are indexed by [`NodeIndex`]. Each slot moves monotonically through
/// [`NodeStatus`]; `next_pass_start` marks the first slot whose pass has not
/// been extracted yet. Anything enqueued below the cursor would be processed
/// out of order and is rejected as a cycle.
///
/// # Example
///
/// Extracting passes by hand for `a -> {b, c}`, all in one group:
///
/// ```
/// # use std::rc::Rc;
/// # use std::sync::Arc;
/// # use understory_propagate::{
/// #     InlineScheduler, Node, NodeGroup, NodeIndex, NodeInfo, NodeQueue, NodeStatus,
/// #     PassIndex, PropagationContext, PropagationResult,
/// # };
/// # #[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// # struct G;
/// # impl NodeGroup<N> for G {}
/// # #[derive(Clone)]
/// # struct N(Rc<NodeInfo>);
/// # impl Node for N {
/// #     type Group = G;
/// #     fn info(&self) -> Option<NodeInfo> { Some(*self.0) }
/// #     fn group(&self) -> G { G }
/// #     fn listeners(&self, _: &mut Vec<Self>) {}
/// #     fn on_propagation(&self, _: &PropagationContext<'_, Self>) -> PropagationResult {
/// #         PropagationResult::Unchanged
/// #     }
/// #     fn is_same(&self, other: &Self) -> bool { Rc::ptr_eq(&self.0, &other.0) }
/// # }
/// # fn node(index: u32, pass: PassIndex) -> N {
/// #     N(Rc::new(NodeInfo { index: NodeIndex::new(index), pass }))
/// # }
/// let pass0 = PassIndex::new(0, NodeIndex::new(0), NodeIndex::new(0));
/// let pass1 = PassIndex::new(1, NodeIndex::new(1), NodeIndex::new(2));
/// let (a, b, c) = (node(0, pass0), node(1, pass1), node(2, pass1));
///
/// let mut queue = NodeQueue::new(G, Arc::new(InlineScheduler));
/// queue.enqueue(a.clone()).unwrap();
/// assert_eq!(queue.next_pass().unwrap().len(), 1);
/// queue.update_status(&a, NodeStatus::Changed).unwrap();
///
/// queue.enqueue(c).unwrap();
/// queue.enqueue(b).unwrap();
/// let pass = queue.next_pass().unwrap();
/// assert_eq!(pass.len(), 2);
/// assert!(queue.next_pass().unwrap().is_empty());
/// ```
pub struct NodeQueue<N: Node> {
    slots: Vec<Slot<N>>,
    next_pass_start: usize,
    group: N::Group,
    scheduler: Arc<dyn Scheduler>,
    ancestors: Option<Arc<AncestorFrame<N>>>,
}

impl<N: Node> fmt::Debug for NodeQueue<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeQueue")
            .field("group", &self.group)
            .field("slots", &self.slots.len())
            .field("next_pass_start", &self.next_pass_start)
            .field("depth", &self.ancestors().count())
            .finish_non_exhaustive()
    }
}

impl<N: Node> NodeQueue<N> {
    /// Creates an empty queue for `group`.
    #[must_use]
    pub fn new(group: N::Group, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_capacity(group, scheduler, 0)
    }

    /// Creates an empty queue with room for `capacity` slots.
    ///
    /// The arena grows on demand; a capacity equal to the index table's
    /// length avoids regrowth.
    #[must_use]
    pub fn with_capacity(group: N::Group, scheduler: Arc<dyn Scheduler>, capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            next_pass_start: 0,
            group,
            scheduler,
            ancestors: None,
        }
    }

    /// Returns the group this queue propagates.
    #[must_use]
    pub fn group(&self) -> &N::Group {
        &self.group
    }

    /// Returns the scheduler handed to this queue.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Returns the first index whose pass has not been extracted.
    #[must_use]
    pub fn next_pass_start(&self) -> NodeIndex {
        to_index(self.next_pass_start)
    }

    /// Returns the current arena length.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the status of slot `index`.
    #[must_use]
    pub fn status(&self, index: NodeIndex) -> NodeStatus {
        self.slots
            .get(index.as_usize())
            .map_or(NodeStatus::None, Slot::status)
    }

    /// Returns the node held by slot `index`.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&N> {
        self.slots.get(index.as_usize()).and_then(Slot::node)
    }

    /// Iterates over occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, NodeStatus, &N)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.node().map(|n| (to_index(i), slot.status(), n)))
    }

    /// Iterates over ancestor frames, nearest first.
    pub fn ancestors(&self) -> Ancestors<'_, N> {
        Ancestors {
            next: self.ancestors.as_deref(),
        }
    }

    /// Returns the status of `index` in the nearest ancestor that holds it.
    #[must_use]
    pub fn ancestor_status(&self, index: NodeIndex) -> Option<NodeStatus> {
        self.ancestors()
            .map(|frame| frame.status(index))
            .find(|&status| status != NodeStatus::None)
    }

    /// Marks `node` as waiting for its pass.
    ///
    /// Enqueueing a node that is already waiting is a no-op.
    ///
    /// # Errors
    ///
    /// - [`PropagationError::UnsupportedNode`] if `node` has no index information.
    /// - [`PropagationError::CycleDetected`] if the node's pass is closed or
    ///   its slot was already visited.
    /// - [`PropagationError::DuplicateIndexAssignment`] if a different node
    ///   already waits in the slot.
    pub fn enqueue(&mut self, node: N) -> Result<NodeIndex, PropagationError> {
        let info = node.info().ok_or(PropagationError::UnsupportedNode)?;
        let index = info.index;
        let i = index.as_usize();

        if i < self.next_pass_start {
            return Err(PropagationError::CycleDetected {
                index,
                reason: CycleReason::ClosedPass {
                    next_pass_start: self.next_pass_start(),
                },
            });
        }

        if i >= self.slots.len() {
            self.slots.resize_with(i + 1, Slot::default);
        }

        let slot = &mut self.slots[i];
        match &*slot {
            Slot::Empty => {}
            Slot::Enqueued(existing) => {
                if existing.is_same(&node) {
                    return Ok(index);
                }
                return Err(PropagationError::DuplicateIndexAssignment { index });
            }
            Slot::Visited(_) | Slot::Changed(_) => {
                return Err(PropagationError::CycleDetected {
                    index,
                    reason: CycleReason::AlreadyVisited {
                        status: slot.status(),
                    },
                });
            }
        }
        *slot = Slot::Enqueued(node);
        Ok(index)
    }

    /// Extracts the next pass.
    ///
    /// Scanning starts at `next_pass_start`. The first waiting slot fixes the
    /// pass; the scan collects waiting slots of that pass and stops after the
    /// pass's `max_node`, at the first waiting slot of another pass, or at the
    /// end of the arena. An empty batch means the fixpoint was reached.
    ///
    /// # Errors
    ///
    /// [`PropagationError::CycleDetected`] if a visited slot is found beyond
    /// the cursor.
    pub fn next_pass(&mut self) -> Result<PassBatch<N>, PropagationError> {
        let mut batch = PassBatch::new();
        let mut pass: Option<PassIndex> = None;
        let mut i = self.next_pass_start;

        while i < self.slots.len() {
            match &self.slots[i] {
                Slot::Empty => {}
                Slot::Enqueued(node) => {
                    let info = node.info().ok_or(PropagationError::UnsupportedNode)?;
                    match pass {
                        None => pass = Some(info.pass),
                        Some(current) if current.pass() == info.pass.pass() => {}
                        Some(_) => break,
                    }
                    batch.push(node.clone());
                }
                slot @ (Slot::Visited(_) | Slot::Changed(_)) => {
                    return Err(PropagationError::CycleDetected {
                        index: to_index(i),
                        reason: CycleReason::UnconsumedSlot {
                            status: slot.status(),
                        },
                    });
                }
            }
            i += 1;
            if let Some(current) = pass
                && i > current.max_node().as_usize()
            {
                break;
            }
        }

        self.next_pass_start = i;
        if let Some(current) = pass {
            tracing::trace!(
                group = ?self.group,
                pass = current.pass(),
                nodes = batch.len(),
                "extracted pass"
            );
        }
        Ok(batch)
    }

    /// Moves `node` to `status`.
    ///
    /// # Errors
    ///
    /// - [`PropagationError::NotEnqueued`] if `node` does not occupy its slot.
    /// - [`PropagationError::CycleDetected`] if `status` does not move forward.
    pub fn update_status(&mut self, node: &N, status: NodeStatus) -> Result<(), PropagationError> {
        let index = node.info().ok_or(PropagationError::UnsupportedNode)?.index;
        let slot = self
            .slots
            .get_mut(index.as_usize())
            .filter(|slot| slot.node().is_some_and(|held| held.is_same(node)))
            .ok_or(PropagationError::NotEnqueued { index })?;

        let from = slot.status();
        if status <= from {
            return Err(PropagationError::CycleDetected {
                index,
                reason: CycleReason::StatusRegression { from, to: status },
            });
        }
        slot.set_status(status);
        Ok(())
    }

    /// Seeds the queue with `node`, which already ran its step.
    ///
    /// The seed is enqueued and forced to `status`, the cursor moves just past
    /// it, and its listeners in this queue's group are enqueued. Listeners in
    /// other groups are returned for the caller to route.
    pub fn start_from(&mut self, node: N, status: NodeStatus) -> Result<Vec<N>, PropagationError> {
        let index = self.enqueue(node.clone())?;
        self.slots[index.as_usize()].set_status(status);
        self.next_pass_start = index.as_usize() + 1;

        let mut listeners = Vec::new();
        node.listeners(&mut listeners);

        let mut foreign = Vec::new();
        for listener in listeners {
            if listener.group() == self.group {
                self.enqueue(listener)?;
            } else {
                foreign.push(listener);
            }
        }
        Ok(foreign)
    }

    /// Creates an empty queue for `group` below this one.
    ///
    /// A snapshot of this queue's slots and cursor becomes the child's nearest
    /// ancestor frame. Later changes to this queue are not visible to the
    /// child, and sibling children never see each other.
    #[must_use]
    pub fn create_for_child_group(&self, group: N::Group) -> Self {
        Self::below(&self.snapshot(), group, &self.scheduler)
    }

    /// Freezes this queue into an ancestor frame shared by its children.
    pub(crate) fn snapshot(&self) -> Arc<AncestorFrame<N>> {
        Arc::new(AncestorFrame {
            group: self.group.clone(),
            slots: self.slots.clone(),
            next_pass_start: self.next_pass_start,
            parent: self.ancestors.clone(),
        })
    }

    pub(crate) fn below(
        frame: &Arc<AncestorFrame<N>>,
        group: N::Group,
        scheduler: &Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            slots: Vec::new(),
            next_pass_start: 0,
            group,
            scheduler: scheduler.clone(),
            ancestors: Some(frame.clone()),
        }
    }
}

/// Immutable snapshot of an ancestor queue.
pub struct AncestorFrame<N: Node> {
    group: N::Group,
    slots: Vec<Slot<N>>,
    next_pass_start: usize,
    parent: Option<Arc<AncestorFrame<N>>>,
}

impl<N: Node> fmt::Debug for AncestorFrame<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AncestorFrame")
            .field("group", &self.group)
            .field("slots", &self.slots.len())
            .field("next_pass_start", &self.next_pass_start)
            .finish_non_exhaustive()
    }
}

impl<N: Node> AncestorFrame<N> {
    /// Returns the ancestor's group.
    #[must_use]
    pub fn group(&self) -> &N::Group {
        &self.group
    }

    /// Returns the status `index` had when the snapshot was taken.
    #[must_use]
    pub fn status(&self, index: NodeIndex) -> NodeStatus {
        self.slots
            .get(index.as_usize())
            .map_or(NodeStatus::None, Slot::status)
    }

    /// Returns the node held by `index` when the snapshot was taken.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> Option<&N> {
        self.slots.get(index.as_usize()).and_then(Slot::node)
    }

    /// Returns the ancestor's cursor when the snapshot was taken.
    #[must_use]
    pub fn next_pass_start(&self) -> NodeIndex {
        to_index(self.next_pass_start)
    }
}

/// Iterator over a queue's ancestor frames, nearest first.
pub struct Ancestors<'a, N: Node> {
    next: Option<&'a AncestorFrame<N>>,
}

impl<N: Node> fmt::Debug for Ancestors<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ancestors")
            .field("next", &self.next)
            .finish()
    }
}

impl<'a, N: Node> Iterator for Ancestors<'a, N> {
    type Item = &'a AncestorFrame<N>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.next?;
        self.next = frame.parent.as_deref();
        Some(frame)
    }
}
