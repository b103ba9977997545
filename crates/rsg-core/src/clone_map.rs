//! Memoized deep cloning of scene subtrees.

use std::collections::HashMap;

use uuid::Uuid;

use crate::node::NodeRef;

/// Clone context shared across one logical copy operation.
///
/// Nodes referenced more than once within the cloned subtree (aliased
/// shapes, diamond-shaped sharing) are cloned exactly once, so the sharing
/// structure of the original is preserved in the copy.
#[derive(Default)]
pub struct CloneMap {
    clones: HashMap<Uuid, NodeRef>,
}

impl CloneMap {
    pub fn new() -> Self {
        Self {
            clones: HashMap::new(),
        }
    }

    /// Returns the clone of `node`, creating it on first request.
    pub fn get_clone(&mut self, node: &NodeRef) -> NodeRef {
        if let Some(clone) = self.clones.get(&node.object_id()) {
            return clone.clone();
        }
        let clone = node.read().clone_node(self);
        self.clones.insert(node.object_id(), clone.clone());
        clone
    }

    /// The already-created clone of `node`, if any.
    pub fn find_clone(&self, node: &NodeRef) -> Option<NodeRef> {
        self.clones.get(&node.object_id()).cloned()
    }
}
