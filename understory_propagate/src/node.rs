// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capabilities the engine consumes from the host's object graph.

use alloc::vec::Vec;
use core::fmt;
use core::hash::Hash;

use crate::context::PropagationContext;
use crate::index::NodeInfo;

/// Outcome of one propagation step or of a starter action.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PropagationResult {
    /// Nothing downstream needs to be revisited.
    #[default]
    Unchanged,
    /// The value changed; listeners must be revisited.
    Changed,
}

impl PropagationResult {
    /// Returns `true` for [`PropagationResult::Changed`].
    #[inline]
    #[must_use]
    pub fn is_changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

impl From<bool> for PropagationResult {
    fn from(changed: bool) -> Self {
        if changed { Self::Changed } else { Self::Unchanged }
    }
}

/// A live node taking part in propagation.
///
/// Implementors are usually cheap handles (for example an `Rc` or `Arc`
/// around the node's state). The engine clones handles freely and compares
/// instances with [`is_same`](Self::is_same).
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use understory_propagate::{
///     Node, NodeGroup, NodeIndex, NodeInfo, PassIndex, PropagationContext, PropagationResult,
/// };
///
/// #[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// struct Doc;
///
/// impl NodeGroup<Cell> for Doc {}
///
/// #[derive(Clone)]
/// struct Cell(Rc<(NodeInfo, Vec<Cell>)>);
///
/// impl Node for Cell {
///     type Group = Doc;
///
///     fn info(&self) -> Option<NodeInfo> {
///         Some(self.0.0)
///     }
///     fn group(&self) -> Doc {
///         Doc
///     }
///     fn listeners(&self, out: &mut Vec<Self>) {
///         out.extend(self.0.1.iter().cloned());
///     }
///     fn on_propagation(&self, _cx: &PropagationContext<'_, Self>) -> PropagationResult {
///         PropagationResult::Changed
///     }
///     fn is_same(&self, other: &Self) -> bool {
///         Rc::ptr_eq(&self.0, &other.0)
///     }
/// }
///
/// let pass = PassIndex::new(0, NodeIndex::new(0), NodeIndex::new(0));
/// let cell = Cell(Rc::new((NodeInfo { index: NodeIndex::new(0), pass }, Vec::new())));
/// assert!(cell.is_same(&cell.clone()));
/// ```
pub trait Node: Clone {
    /// Identity of the independent subgraph this node belongs to.
    type Group: NodeGroup<Self>;

    /// Returns the node's static index information.
    ///
    /// Nodes without index information cannot be enqueued; the engine reports
    /// [`PropagationError::UnsupportedNode`](crate::PropagationError::UnsupportedNode).
    fn info(&self) -> Option<NodeInfo>;

    /// Returns the group this node belongs to.
    fn group(&self) -> Self::Group;

    /// Appends the node's current downstream dependents to `out`.
    ///
    /// Listeners are read from the running object graph and may belong to
    /// any group.
    fn listeners(&self, out: &mut Vec<Self>);

    /// Executes one propagation step.
    fn on_propagation(&self, cx: &PropagationContext<'_, Self>) -> PropagationResult;

    /// Returns `true` if `other` is the same node instance.
    fn is_same(&self, other: &Self) -> bool;
}

/// Hooks of a group of nodes.
///
/// Equality and hashing identify the group: listeners whose group compares
/// equal are propagated by the same [`GroupPropagator`](crate::GroupPropagator).
pub trait NodeGroup<N>: Clone + Eq + Hash + fmt::Debug {
    /// Returns `true` if [`on_changed`](Self::on_changed) should fire as
    /// soon as a member reports a change.
    ///
    /// When this returns `false`, changed members are only reported through
    /// [`PropagationContext::changed`] in
    /// [`on_self_resolved`](Self::on_self_resolved).
    fn notifies_immediately(&self) -> bool {
        true
    }

    /// Called whenever a member of this group reports
    /// [`PropagationResult::Changed`].
    fn on_changed(&self, node: &N) {
        let _ = node;
    }

    /// Called once when this group's propagation run reaches its fixpoint.
    fn on_self_resolved(&self, cx: &PropagationContext<'_, N>)
    where
        N: Node,
    {
        let _ = cx;
    }
}
