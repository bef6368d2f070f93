// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared node graph for integration tests.
//!
//! Items take their [`NodeInfo`] from an [`IndexTable`] built over `u32`
//! kinds and record every visit in a shared [`Trace`].

#![allow(
    missing_docs,
    unreachable_pub,
    dead_code,
    reason = "Integration-test helper module; not part of the public API."
)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use understory_propagate::{
    InlineScheduler, IndexTable, Node, NodeGroup, NodeInfo, PropagationContext,
    PropagationResult, Scheduler,
};

/// Visit and hook log shared by every group and item of one test.
#[derive(Clone, Default)]
pub struct Trace {
    visits: Rc<RefCell<Vec<(u32, u32)>>>,
    resolved: Rc<RefCell<Vec<(u32, Vec<u32>)>>>,
}

impl Trace {
    /// `(group, kind)` pairs in visit order.
    pub fn visits(&self) -> Vec<(u32, u32)> {
        self.visits.borrow().clone()
    }

    /// Visited kinds, ignoring groups.
    pub fn kinds(&self) -> Vec<u32> {
        self.visits.borrow().iter().map(|&(_, kind)| kind).collect()
    }

    /// `(group, changed kinds)` per resolved group, in resolution order.
    pub fn resolved(&self) -> Vec<(u32, Vec<u32>)> {
        self.resolved.borrow().clone()
    }
}

#[derive(Clone)]
pub struct Group {
    id: u32,
    trace: Trace,
}

impl Group {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Group {}

impl Hash for Group {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group({})", self.id)
    }
}

impl NodeGroup<Item> for Group {
    fn on_self_resolved(&self, cx: &PropagationContext<'_, Item>) {
        let changed = cx.changed().iter().map(Item::kind).collect();
        self.trace.resolved.borrow_mut().push((self.id, changed));
    }
}

struct ItemData {
    kind: u32,
    info: NodeInfo,
    group: Group,
    listeners: RefCell<Vec<Item>>,
    result: Cell<PropagationResult>,
}

#[derive(Clone)]
pub struct Item(Rc<ItemData>);

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item({}@{})", self.0.kind, self.0.group.id)
    }
}

impl Item {
    pub fn kind(&self) -> u32 {
        self.0.kind
    }

    pub fn index(&self) -> u32 {
        self.0.info.index.as_u32()
    }

    pub fn pass(&self) -> u32 {
        self.0.info.pass.pass()
    }

    /// Makes `listener` depend on `self`.
    pub fn feeds(&self, listener: &Self) -> &Self {
        self.0.listeners.borrow_mut().push(listener.clone());
        self
    }

    pub fn set_result(&self, result: PropagationResult) {
        self.0.result.set(result);
    }
}

impl Node for Item {
    type Group = Group;

    fn info(&self) -> Option<NodeInfo> {
        Some(self.0.info)
    }

    fn group(&self) -> Group {
        self.0.group.clone()
    }

    fn listeners(&self, out: &mut Vec<Self>) {
        out.extend(self.0.listeners.borrow().iter().cloned());
    }

    fn on_propagation(&self, cx: &PropagationContext<'_, Self>) -> PropagationResult {
        if let Some(pass) = cx.pass() {
            assert!(
                pass.contains(self.0.info.index),
                "item {} visited outside its pass",
                self.0.kind
            );
        }
        self.0
            .group
            .trace
            .visits
            .borrow_mut()
            .push((self.0.group.id, self.0.kind));
        self.0.result.get()
    }

    fn is_same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// An index table plus the trace its items report to.
pub struct World {
    pub table: IndexTable<u32>,
    pub trace: Trace,
}

impl World {
    pub fn new(table: IndexTable<u32>) -> Self {
        Self {
            table,
            trace: Trace::default(),
        }
    }

    pub fn group(&self, id: u32) -> Group {
        Group {
            id,
            trace: self.trace.clone(),
        }
    }

    /// Creates an item of `kind` in `group`; it reports a change when visited.
    pub fn item(&self, group: &Group, kind: u32) -> Item {
        let info = self
            .table
            .get(kind)
            .unwrap_or_else(|| panic!("kind {kind} is not in the table"));
        Item(Rc::new(ItemData {
            kind,
            info,
            group: group.clone(),
            listeners: RefCell::new(Vec::new()),
            result: Cell::new(PropagationResult::Changed),
        }))
    }
}

pub fn scheduler() -> Arc<dyn Scheduler> {
    Arc::new(InlineScheduler)
}
