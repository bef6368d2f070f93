// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Running a propagator and all of its descendant groups.
//!
//! [`GroupPropagator::next_groups`] hands out one child per triggered group.
//! The driver keeps every not-yet-propagated child in a min-heap keyed by the
//! child's lowest triggering [`NodeIndex`](crate::NodeIndex), with creation
//! order as the tie-break, so groups run in the order their earliest change
//! was discovered across the whole tree.
//!
//! Each child runs to its own fixpoint before the next one starts. Order and
//! exactly-once visits therefore hold per group, not across the tree. A node
//! fed from two groups is visited once for each of them.

use alloc::collections::BinaryHeap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Reverse;

use crate::context::PropagationContext;
use crate::error::PropagationError;
use crate::index::NodeIndex;
use crate::node::{Node, PropagationResult};
use crate::propagator::{GroupPropagator, PropagatorState};
use crate::scheduler::Scheduler;

/// Totals of one driven propagation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PropagationSummary {
    /// Groups that reached their fixpoint.
    pub groups: usize,
    /// Propagation steps run across all groups.
    pub visited: usize,
    /// Nodes that reported a change, including a changed origin.
    pub changed: usize,
}

impl PropagationSummary {
    fn record<N: Node>(&mut self, propagator: &GroupPropagator<N>) {
        self.groups += 1;
        self.visited += propagator.visited_count();
        self.changed += propagator.changed_count();
    }
}

/// Propagates `root` and every group it triggers, transitively.
///
/// `root` is propagated first if it is still
/// [`Created`](PropagatorState::Created).
///
/// # Errors
///
/// The first error of any group stops the run.
pub fn drive<N: Node>(root: GroupPropagator<N>) -> Result<PropagationSummary, PropagationError> {
    drive_with(root, |_| {})
}

/// Like [`drive`], calling `inspect` with each group once it is resolved.
pub fn drive_with<N, F>(
    mut root: GroupPropagator<N>,
    mut inspect: F,
) -> Result<PropagationSummary, PropagationError>
where
    N: Node,
    F: FnMut(&GroupPropagator<N>),
{
    if root.state() == PropagatorState::Created {
        root.propagate()?;
    }

    let mut summary = PropagationSummary::default();
    let mut waiting: Vec<Option<GroupPropagator<N>>> = Vec::new();
    let mut heap: BinaryHeap<Reverse<(NodeIndex, usize)>> = BinaryHeap::new();

    let mut resolved = root;
    loop {
        summary.record(&resolved);
        inspect(&resolved);

        for child in resolved.next_groups()? {
            let key = child.min_index().unwrap_or_default();
            heap.push(Reverse((key, waiting.len())));
            waiting.push(Some(child));
        }

        let Some(Reverse((_, seq))) = heap.pop() else {
            break;
        };
        let Some(mut next) = waiting.get_mut(seq).and_then(Option::take) else {
            break;
        };
        next.propagate()?;
        resolved = next;
    }

    tracing::debug!(
        groups = summary.groups,
        visited = summary.visited,
        changed = summary.changed,
        "propagation finished"
    );
    Ok(summary)
}

/// Applies a change to `origin` and propagates it through every affected
/// group.
///
/// An unchanged starter yields an empty summary.
pub fn propagate_change<N, F>(
    origin: N,
    scheduler: Arc<dyn Scheduler>,
    starter: F,
) -> Result<PropagationSummary, PropagationError>
where
    N: Node,
    F: FnOnce(&PropagationContext<'_, N>) -> PropagationResult,
{
    match GroupPropagator::begin(origin, scheduler, starter)? {
        Some(root) => drive(root),
        None => Ok(PropagationSummary::default()),
    }
}
