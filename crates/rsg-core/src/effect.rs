//! Effect group nodes.
//!
//! An effect group is a wrapper inserted into a parent-child chain directly
//! above whatever it modifies; the wrapped subtree needs no awareness of the
//! effect. Scene links keep effect groups in the graph only while their
//! effect is active, so the default render path pays no extra indirection.

use crate::clone_map::CloneMap;
use crate::group::Children;
use crate::node::{NodeRef, SceneNode};

/// Effect group rendering its subtree with a transparency factor.
pub struct TransparentGroup {
    name: String,
    children: Children,
    transparency: f32,
}

impl TransparentGroup {
    pub fn new(transparency: f32) -> Self {
        Self {
            name: String::new(),
            children: Children::new(),
            transparency,
        }
    }

    /// Transparency factor in `[0, 1]`; 0 means fully opaque.
    pub fn transparency(&self) -> f32 {
        self.transparency
    }

    pub fn set_transparency(&mut self, transparency: f32) {
        self.transparency = transparency;
    }
}

impl SceneNode for TransparentGroup {
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
        let mut group = TransparentGroup::new(self.transparency);
        group.name = self.name.clone();
        let clone = NodeRef::new(group);
        for child in self.children.iter() {
            let child_clone = map.get_clone(child);
            clone.add_child(&child_clone);
        }
        clone
    }
}
