//! Group nodes and child lists.

use crate::clone_map::CloneMap;
use crate::node::{NodeRef, SceneNode};

/// Ordered child list of a group-typed node.
///
/// Structural edits go through [`NodeRef::add_child`] and friends, which
/// keep the children's parent links consistent; this type only exposes the
/// read side to other crates.
#[derive(Default)]
pub struct Children {
    nodes: Vec<NodeRef>,
}

impl Children {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeRef> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeRef> {
        self.nodes.iter()
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.nodes.iter().any(|n| NodeRef::ptr_eq(n, node))
    }

    pub(crate) fn push(&mut self, node: NodeRef) {
        self.nodes.push(node);
    }

    pub(crate) fn remove(&mut self, node: &NodeRef) -> bool {
        if let Some(pos) = self.nodes.iter().position(|n| NodeRef::ptr_eq(n, node)) {
            self.nodes.remove(pos);
            true
        } else {
            false
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<NodeRef> {
        std::mem::take(&mut self.nodes)
    }
}

/// Plain aggregating node with no behavior of its own.
pub struct SceneGroup {
    name: String,
    children: Children,
}

impl SceneGroup {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            children: Children::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Children::new(),
        }
    }
}

impl Default for SceneGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneNode for SceneGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn children(&self) -> Option<&Children> {
        Some(&self.children)
    }

    fn children_mut(&mut self) -> Option<&mut Children> {
        Some(&mut self.children)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn clone_node(&self, map: &mut CloneMap) -> NodeRef {
        let clone = NodeRef::new(SceneGroup::named(self.name.clone()));
        for child in self.children.iter() {
            let child_clone = map.get_clone(child);
            clone.add_child(&child_clone);
        }
        clone
    }
}
