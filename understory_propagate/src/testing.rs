// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording node graph shared by the unit tests.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::hash::{Hash, Hasher};

use crate::context::PropagationContext;
use crate::index::{NodeIndex, NodeInfo, PassIndex};
use crate::node::{Node, NodeGroup, PropagationResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Visit(&'static str),
    Changed(u32, &'static str),
    Resolved(u32, Vec<&'static str>),
}

#[derive(Clone, Default)]
pub(crate) struct Log(Rc<RefCell<Vec<Event>>>);

impl Log {
    pub(crate) fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub(crate) fn take(&self) -> Vec<Event> {
        core::mem::take(&mut *self.0.borrow_mut())
    }

    pub(crate) fn visits(&self) -> Vec<&'static str> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Visit(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn group(&self, id: u32) -> TestGroup {
        TestGroup {
            id,
            immediate: true,
            log: self.clone(),
        }
    }

    pub(crate) fn deferred_group(&self, id: u32) -> TestGroup {
        TestGroup {
            id,
            immediate: false,
            log: self.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct TestGroup {
    id: u32,
    immediate: bool,
    log: Log,
}

impl PartialEq for TestGroup {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TestGroup {}

impl Hash for TestGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TestGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestGroup({})", self.id)
    }
}

impl TestGroup {
    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn node(&self, name: &'static str, index: u32, pass: PassIndex) -> TestNode {
        self.make(
            name,
            Some(NodeInfo {
                index: NodeIndex::new(index),
                pass,
            }),
        )
    }

    pub(crate) fn unindexed(&self, name: &'static str) -> TestNode {
        self.make(name, None)
    }

    fn make(&self, name: &'static str, info: Option<NodeInfo>) -> TestNode {
        TestNode(Rc::new(NodeData {
            name,
            info,
            group: self.clone(),
            listeners: RefCell::new(Vec::new()),
            result: Cell::new(PropagationResult::Changed),
        }))
    }
}

impl NodeGroup<TestNode> for TestGroup {
    fn notifies_immediately(&self) -> bool {
        self.immediate
    }

    fn on_changed(&self, node: &TestNode) {
        self.log.push(Event::Changed(self.id, node.name()));
    }

    fn on_self_resolved(&self, cx: &PropagationContext<'_, TestNode>) {
        let changed = cx.changed().iter().map(TestNode::name).collect();
        self.log.push(Event::Resolved(self.id, changed));
    }
}

pub(crate) fn pass(pass: u32, min: u32, max: u32) -> PassIndex {
    PassIndex::new(pass, NodeIndex::new(min), NodeIndex::new(max))
}

struct NodeData {
    name: &'static str,
    info: Option<NodeInfo>,
    group: TestGroup,
    listeners: RefCell<Vec<TestNode>>,
    result: Cell<PropagationResult>,
}

#[derive(Clone)]
pub(crate) struct TestNode(Rc<NodeData>);

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name)
    }
}

impl TestNode {
    pub(crate) fn name(&self) -> &'static str {
        self.0.name
    }

    pub(crate) fn add_listener(&self, listener: &Self) {
        self.0.listeners.borrow_mut().push(listener.clone());
    }

    pub(crate) fn set_result(&self, result: PropagationResult) {
        self.0.result.set(result);
    }
}

impl Node for TestNode {
    type Group = TestGroup;

    fn info(&self) -> Option<NodeInfo> {
        self.0.info
    }

    fn group(&self) -> TestGroup {
        self.0.group.clone()
    }

    fn listeners(&self, out: &mut Vec<Self>) {
        out.extend(self.0.listeners.borrow().iter().cloned());
    }

    fn on_propagation(&self, _cx: &PropagationContext<'_, Self>) -> PropagationResult {
        self.0.group.log.push(Event::Visit(self.0.name));
        self.0.result.get()
    }

    fn is_same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
