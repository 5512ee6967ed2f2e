// Copyright 2025 hookscope contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The call tree built up as dispatches nest.
//!
//! Nodes live in an arena indexed by [`NodeId`]; parent and child links are
//! plain indices, so the tree serializes without back-references and never
//! forms an `Rc` cycle.

use hookscope_core::error::StructuralError;
use hookscope_core::hook::CallerSite;
use hookscope_core::identity::CallableIdentity;
use hookscope_core::timer::TimerStore;

/// Index of a node within its [`CallTree`] arena.
pub type NodeId = usize;

/// A callback execution observed inside one dispatch.
#[derive(Debug)]
pub struct FunctionRecord {
    /// Who ran.
    pub identity: CallableIdentity,
    /// When, and on what memory footprint.
    pub timer: TimerStore,
}

/// One dispatch in the tree. The root node carries no event name; it spans
/// the whole profiled session.
#[derive(Debug)]
pub struct CallNode {
    /// Event name, `None` only for the root.
    pub event: Option<String>,
    /// Source location the dispatch was issued from.
    pub caller: Option<CallerSite>,
    /// Span of this dispatch.
    pub timer: TimerStore,
    /// Callbacks that ran directly inside this dispatch.
    pub functions: Vec<FunctionRecord>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl CallNode {
    /// Child node ids, in dispatch order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena of dispatch nodes with a cursor for the currently open one.
#[derive(Debug)]
pub struct CallTree {
    nodes: Vec<CallNode>,
    current: NodeId,
}

impl CallTree {
    /// Creates a tree whose root span opens immediately.
    pub fn new() -> Self {
        Self {
            nodes: vec![CallNode {
                event: None,
                caller: None,
                timer: TimerStore::open(),
                functions: Vec::new(),
                parent: None,
                children: Vec::new(),
            }],
            current: 0,
        }
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        0
    }

    /// The node currently open.
    pub fn current(&self) -> NodeId {
        self.current
    }

    /// Borrow a node by id.
    pub fn node(&self, id: NodeId) -> &CallNode {
        &self.nodes[id]
    }

    /// How deep the open node sits below the root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut at = self.current;
        while let Some(parent) = self.nodes[at].parent {
            depth += 1;
            at = parent;
        }
        depth
    }

    /// Opens a child of the current node and makes it current.
    pub fn open_child(&mut self, event: &str, caller: Option<CallerSite>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(CallNode {
            event: Some(event.to_string()),
            caller,
            timer: TimerStore::open(),
            functions: Vec::new(),
            parent: Some(self.current),
            children: Vec::new(),
        });
        self.nodes[self.current].children.push(id);
        self.current = id;
        id
    }

    /// Closes the current node and returns to its parent.
    ///
    /// Function records still open are closed first, so a callback record
    /// never outlives the dispatch it ran in. Closing the root this way is
    /// a structural error and is refused.
    pub fn close_current(&mut self) {
        let Some(parent) = self.nodes[self.current].parent else {
            log::error!(
                "{}",
                StructuralError::StopWithoutStart {
                    context: "close of the root dispatch node",
                }
            );
            return;
        };
        let node = &mut self.nodes[self.current];
        for record in &mut node.functions {
            if !record.timer.is_closed() {
                log::warn!(
                    "callback '{}' never reported finishing; closing its record",
                    record.identity.name
                );
                record.timer.close();
            }
        }
        node.timer.close();
        self.current = parent;
    }

    /// Closes every node still open, the root last. Called once when the
    /// session ends.
    pub fn close_root(&mut self) {
        while self.nodes[self.current].parent.is_some() {
            self.close_current();
        }
        let root = &mut self.nodes[self.current];
        for record in &mut root.functions {
            if !record.timer.is_closed() {
                record.timer.close();
            }
        }
        if !root.timer.is_closed() {
            root.timer.close();
        }
    }

    /// Records that a callback began inside the current dispatch.
    pub fn push_function(&mut self, identity: CallableIdentity) {
        self.nodes[self.current].functions.push(FunctionRecord {
            identity,
            timer: TimerStore::open(),
        });
    }

    /// Closes the most recently opened callback record of the current
    /// dispatch. Logs a structural error when none is open.
    pub fn close_last_open_function(&mut self) {
        let node = &mut self.nodes[self.current];
        match node
            .functions
            .iter_mut()
            .rev()
            .find(|record| !record.timer.is_closed())
        {
            Some(record) => record.timer.close(),
            None => log::error!(
                "{}",
                StructuralError::StopWithoutStart {
                    context: "callback finish without a matching start",
                }
            ),
        }
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_builds_parent_child_links() {
        let mut tree = CallTree::new();
        let outer = tree.open_child("outer", None);
        let inner = tree.open_child("inner", None);
        tree.close_current();
        tree.close_current();

        assert_eq!(tree.node(tree.root()).children(), &[outer]);
        assert_eq!(tree.node(outer).children(), &[inner]);
        assert_eq!(tree.node(inner).event.as_deref(), Some("inner"));
        assert_eq!(tree.current(), tree.root());
    }

    #[test]
    fn depth_follows_open_and_close() {
        let mut tree = CallTree::new();
        assert_eq!(tree.depth(), 0);
        tree.open_child("a", None);
        tree.open_child("b", None);
        assert_eq!(tree.depth(), 2);
        tree.close_current();
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn close_current_refuses_the_root() {
        let mut tree = CallTree::new();
        tree.close_current();
        assert_eq!(tree.current(), tree.root());
        assert!(!tree.node(tree.root()).timer.is_closed());
    }

    #[test]
    fn close_current_force_closes_open_functions() {
        let mut tree = CallTree::new();
        tree.open_child("evt", None);
        tree.push_function(CallableIdentity::named("vanished"));
        // The callback removed itself mid-dispatch, so no finish arrives.
        tree.close_current();

        let node = tree.node(1);
        assert!(node.timer.is_closed());
        assert!(node.functions[0].timer.is_closed());
    }

    #[test]
    fn close_last_open_function_is_lifo() {
        let mut tree = CallTree::new();
        tree.open_child("evt", None);
        tree.push_function(CallableIdentity::named("a"));
        tree.close_last_open_function();
        tree.push_function(CallableIdentity::named("b"));
        tree.close_last_open_function();

        let node = tree.node(1);
        assert!(node.functions.iter().all(|r| r.timer.is_closed()));
        assert_eq!(node.functions.len(), 2);
    }

    #[test]
    fn close_root_closes_everything_still_open() {
        let mut tree = CallTree::new();
        tree.open_child("a", None);
        tree.open_child("b", None);
        tree.push_function(CallableIdentity::named("stuck"));
        tree.close_root();

        for id in [0, 1, 2] {
            assert!(tree.node(id).timer.is_closed());
        }
        assert!(tree.node(2).functions[0].timer.is_closed());
        assert_eq!(tree.current(), tree.root());
    }
}
