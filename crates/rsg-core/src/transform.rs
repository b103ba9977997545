//! Transform group node.

use glam::{Quat, Vec3};

use crate::clone_map::CloneMap;
use crate::group::Children;
use crate::node::{NodeRef, SceneNode, TransformNode};

/// Group node applying a rigid-body transform to its subtree.
pub struct SceneTransform {
    name: String,
    children: Children,
    rotation: Quat,
    translation: Vec3,
}

impl SceneTransform {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            children: Children::new(),
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
        }
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
    }
}

impl Default for SceneTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformNode for SceneTransform {
    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn translation(&self) -> Vec3 {
        self.translation
    }
}

impl SceneNode for SceneTransform {
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

    fn as_transform(&self) -> Option<&dyn TransformNode> {
        Some(self)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn clone_node(&self, map: &mut CloneMap) -> NodeRef {
        let mut transform = SceneTransform::new();
        transform.name = self.name.clone();
        transform.rotation = self.rotation;
        transform.translation = self.translation;
        let clone = NodeRef::new(transform);
        for child in self.children.iter() {
            let child_clone = map.get_clone(child);
            clone.add_child(&child_clone);
        }
        clone
    }
}
