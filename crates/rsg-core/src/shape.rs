//! Renderable shape node.

use std::sync::Arc;

use crate::clone_map::CloneMap;
use crate::mesh::MeshData;
use crate::node::{NodeRef, SceneNode};

/// Leaf node holding renderable geometry.
///
/// Mesh data is immutable and shared between clones; appearance (the color)
/// is per node, so cloning a shape before recoloring it leaves other holders
/// of the same mesh untouched.
pub struct SceneShape {
    name: String,
    mesh: Arc<MeshData>,
    color: [f32; 4],
}

impl SceneShape {
    pub fn new(mesh: Arc<MeshData>) -> Self {
        Self {
            name: String::new(),
            mesh,
            color: [0.7, 0.7, 0.7, 1.0],
        }
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    pub fn mesh(&self) -> &Arc<MeshData> {
        &self.mesh
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }
}

impl SceneNode for SceneShape {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn clone_node(&self, _map: &mut CloneMap) -> NodeRef {
        let mut shape = SceneShape::new(self.mesh.clone()).with_color(self.color);
        shape.name = self.name.clone();
        NodeRef::new(shape)
    }
}
