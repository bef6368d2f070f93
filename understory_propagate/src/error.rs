// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Run-time propagation errors.

use crate::index::NodeIndex;
use crate::status::NodeStatus;

/// Why a run-time ordering check failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleReason {
    /// The node's pass was already extracted; `next_pass_start` is past it.
    ClosedPass {
        /// Cursor position at the time of the check.
        next_pass_start: NodeIndex,
    },
    /// The slot was already visited in this run.
    AlreadyVisited {
        /// Status held by the slot.
        status: NodeStatus,
    },
    /// A status update did not move forward.
    StatusRegression {
        /// Status held by the slot.
        from: NodeStatus,
        /// Status requested.
        to: NodeStatus,
    },
    /// Pass extraction found a visited slot beyond the cursor.
    UnconsumedSlot {
        /// Status held by the slot.
        status: NodeStatus,
    },
}

/// Error aborting a propagation.
///
/// All variants describe programmer or integration faults; none are retried.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PropagationError {
    /// Propagation order would be violated, which means the dependency graph
    /// has a cycle or the index table does not match the live graph.
    #[error("cycle detected at node {index}: {reason:?}")]
    CycleDetected {
        /// Offending slot.
        index: NodeIndex,
        /// Which check failed.
        reason: CycleReason,
    },
    /// Two distinct node instances claim the same slot.
    #[error("node index {index} is already held by a different node")]
    DuplicateIndexAssignment {
        /// Contested slot.
        index: NodeIndex,
    },
    /// A single-use operation was invoked again.
    #[error("propagation was already started on this instance")]
    InvalidReentry,
    /// The node exposes no static index information.
    #[error("node has no static index information")]
    UnsupportedNode,
    /// A status update targeted a node that is not in the queue.
    #[error("node {index} was never enqueued")]
    NotEnqueued {
        /// Slot addressed.
        index: NodeIndex,
    },
    /// The operation is not legal in the propagator's current state.
    #[error("propagator is {state}, operation requires {required}")]
    InvalidState {
        /// Current state.
        state: &'static str,
        /// State the operation needs.
        required: &'static str,
    },
}
