// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Propagate: indexed, pass-ordered change propagation.
//!
//! This crate pushes a change through a live graph of nodes so that, within
//! each group, every downstream dependent is recomputed exactly once, after
//! all of its dependencies in that group. It works in two phases:
//!
//! - **Static indexing** ([`GraphIndexer`], [`IndexTable`]): node *kinds* and
//!   their dependencies are declared once. The indexer sorts them and gives
//!   each kind a [`NodeIndex`] (topological position) and a [`PassIndex`]
//!   (the wave it runs in, one more than the deepest dependency).
//! - **Run-time propagation** ([`NodeQueue`], [`GroupPropagator`]): a changed
//!   node seeds a per-group queue. Passes are extracted in ascending order and
//!   nodes inside a pass in ascending index order. Changed nodes enqueue their
//!   listeners; listeners of other groups become child propagators.
//!
//! Host objects plug in through the [`Node`] and [`NodeGroup`] traits. Work
//! that suspends runs through a host [`Scheduler`], which the engine forwards
//! to every [`PropagationContext`] but never calls itself.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::{Cell, RefCell};
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use understory_propagate::{
//!     GraphIndexer, IndexTable, InlineScheduler, Node, NodeGroup, NodeInfo, PropagationContext,
//!     PropagationResult, propagate_change,
//! };
//!
//! #[derive(Clone, Debug, PartialEq, Eq, Hash)]
//! struct Sheet;
//! impl NodeGroup<Value> for Sheet {}
//!
//! struct Data {
//!     info: NodeInfo,
//!     value: Cell<i64>,
//!     compute: fn(&[i64]) -> i64,
//!     inputs: Vec<Value>,
//!     listeners: RefCell<Vec<Value>>,
//! }
//!
//! #[derive(Clone)]
//! struct Value(Rc<Data>);
//!
//! impl Node for Value {
//!     type Group = Sheet;
//!     fn info(&self) -> Option<NodeInfo> {
//!         Some(self.0.info)
//!     }
//!     fn group(&self) -> Sheet {
//!         Sheet
//!     }
//!     fn listeners(&self, out: &mut Vec<Self>) {
//!         out.extend(self.0.listeners.borrow().iter().cloned());
//!     }
//!     fn on_propagation(&self, _cx: &PropagationContext<'_, Self>) -> PropagationResult {
//!         let inputs: Vec<i64> = self.0.inputs.iter().map(|v| v.0.value.get()).collect();
//!         let next = (self.0.compute)(&inputs);
//!         PropagationResult::from(self.0.value.replace(next) != next)
//!     }
//!     fn is_same(&self, other: &Self) -> bool {
//!         Rc::ptr_eq(&self.0, &other.0)
//!     }
//! }
//!
//! fn value(
//!     table: &IndexTable<&'static str>,
//!     kind: &'static str,
//!     compute: fn(&[i64]) -> i64,
//!     inputs: Vec<Value>,
//! ) -> Value {
//!     let v = Value(Rc::new(Data {
//!         info: table.get(kind).unwrap(),
//!         value: Cell::new(0),
//!         compute,
//!         inputs: inputs.clone(),
//!         listeners: RefCell::new(Vec::new()),
//!     }));
//!     for input in &inputs {
//!         input.0.listeners.borrow_mut().push(v.clone());
//!     }
//!     v
//! }
//!
//! // `total` depends on `price` and `tax`; `tax` depends on `price`.
//! let mut indexer = GraphIndexer::new();
//! indexer
//!     .declare("price", [])
//!     .declare("tax", ["price"])
//!     .declare("total", ["price", "tax"]);
//! let table = indexer.build().unwrap();
//!
//! let price = value(&table, "price", |_: &[i64]| 0, vec![]);
//! let tax = value(&table, "tax", |v: &[i64]| v[0] / 10, vec![price.clone()]);
//! let total = value(&table, "total", |v: &[i64]| v[0] + v[1], vec![price.clone(), tax.clone()]);
//!
//! let summary = propagate_change(price.clone(), Arc::new(InlineScheduler), |_| {
//!     price.0.value.set(200);
//!     PropagationResult::Changed
//! })
//! .unwrap();
//!
//! assert_eq!(tax.0.value.get(), 20);
//! assert_eq!(total.0.value.get(), 220);
//! // `total` ran once, after `tax`.
//! assert_eq!(summary.visited, 2);
//! ```
//!
//! ## Ordering Guarantees
//!
//! - If kind `B` is a direct dependency of kind `A`, `index(B) < index(A)`.
//! - Every pass covers a contiguous index range; passes are laid out in
//!   ascending order.
//! - A node enqueued below the queue's cursor (its pass was already
//!   extracted) is reported as [`PropagationError::CycleDetected`].
//! - Exactly-once visits and dependency order hold inside one group's
//!   fixpoint. Child groups run in ascending order of the lowest index that
//!   triggered them, and each runs to its own fixpoint; see [`drive()`]. A
//!   node reached from several groups can therefore run once per triggering
//!   group, and a later visit may follow one of its dependents.
//!
//! ## `no_std` Support
//!
//! The core is `no_std` and uses `alloc`.
//!
//! ## Features
//!
//! - `std` (default): enables [`IndexCell`], a process-wide build-once holder
//!   for an index table, and the `std` integrations of `thiserror` and
//!   `tracing`.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod context;
mod drive;
mod error;
mod index;
mod node;
mod propagator;
mod queue;
pub mod scheduler;
mod status;

#[cfg(test)]
mod testing;

pub use context::PropagationContext;
pub use drive::{PropagationSummary, drive, drive_with, propagate_change};
pub use error::{CycleReason, PropagationError};
#[cfg(feature = "std")]
pub use index::IndexCell;
pub use index::{
    GraphIndexer, IndexEntry, IndexError, IndexTable, MAX_KINDS, NodeIndex, NodeInfo, PassIndex,
    build_index,
};
pub use node::{Node, NodeGroup, PropagationResult};
pub use propagator::{GroupPropagator, PropagatorState};
pub use queue::{AncestorFrame, Ancestors, NodeQueue, PassBatch};
pub use scheduler::{CancelToken, InlineScheduler, Scheduler, Unblock};
pub use status::NodeStatus;
