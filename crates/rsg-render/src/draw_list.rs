//! Draw-list renderer.
//!
//! Walks a scene graph through the dispatch table and flattens it into an
//! ordered list of draw items (mesh, accumulated transform, color,
//! transparency). GPU back ends consume the list; the traversal logic stays
//! independent of any graphics API.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Mat4;

use rsg_core::{
    MeshData, NodeRef, SceneGroup, SceneShape, SceneTransform, TransparentGroup,
    register_core_node_classes,
};

use crate::functions::NodeFunctionSet;
use crate::property::PropertyKey;
use crate::renderer::SceneRenderer;

/// One flattened draw call.
#[derive(Clone)]
pub struct DrawItem {
    pub mesh: Arc<MeshData>,
    pub transform: Mat4,
    pub color: [f32; 4],
    pub transparency: f32,
}

/// Renderer that flattens a scene graph into a draw list.
pub struct DrawListRenderer {
    properties: HashMap<PropertyKey, i32>,
    transform_stack: Vec<Mat4>,
    transparency_stack: Vec<f32>,
    items: Vec<DrawItem>,
}

impl DrawListRenderer {
    pub fn new() -> Self {
        Self {
            properties: HashMap::new(),
            transform_stack: vec![Mat4::IDENTITY],
            transparency_stack: vec![0.0],
            items: Vec::new(),
        }
    }

    /// Builds the function set with the callbacks for the core node types.
    ///
    /// Further callbacks (for example the scene-body shape groups) are
    /// installed on top by the crates defining those node types.
    pub fn standard_functions() -> NodeFunctionSet<Self> {
        register_core_node_classes();
        let mut functions: NodeFunctionSet<Self> = NodeFunctionSet::new();

        functions.set_function::<SceneGroup>(|renderer, functions, node| {
            functions.dispatch_children(renderer, node);
        });

        functions.set_function::<SceneTransform>(|renderer, functions, node| {
            // Base-class callback: scene links and bodies land here too, so
            // only the transform facet may be assumed.
            let local = node
                .read()
                .as_transform()
                .map_or(Mat4::IDENTITY, |t| t.local_matrix());
            renderer.push_transform(local);
            functions.dispatch_children(renderer, node);
            renderer.pop_transform();
        });

        functions.set_function::<TransparentGroup>(|renderer, functions, node| {
            let transparency = node
                .downcast_read::<TransparentGroup>()
                .map_or(0.0, |g| g.transparency());
            renderer.push_transparency(transparency);
            functions.dispatch_children(renderer, node);
            renderer.pop_transparency();
        });

        functions.set_function::<SceneShape>(|renderer, _functions, node| {
            if let Some(shape) = node.downcast_read::<SceneShape>() {
                let item = DrawItem {
                    mesh: shape.mesh().clone(),
                    transform: renderer.current_transform(),
                    color: shape.color(),
                    transparency: renderer.current_transparency(),
                };
                renderer.items.push(item);
            }
        });

        functions
    }

    /// Traverses the graph from `root` and returns the flattened draw list.
    pub fn render_scene(
        &mut self,
        functions: &NodeFunctionSet<Self>,
        root: &NodeRef,
    ) -> Vec<DrawItem> {
        self.transform_stack.clear();
        self.transform_stack.push(Mat4::IDENTITY);
        self.transparency_stack.clear();
        self.transparency_stack.push(0.0);
        self.items.clear();

        functions.dispatch(self, root);
        std::mem::take(&mut self.items)
    }

    pub fn current_transform(&self) -> Mat4 {
        *self.transform_stack.last().unwrap_or(&Mat4::IDENTITY)
    }

    pub fn current_transparency(&self) -> f32 {
        *self.transparency_stack.last().unwrap_or(&0.0)
    }

    pub fn push_transform(&mut self, local: Mat4) {
        self.transform_stack.push(self.current_transform() * local);
    }

    pub fn pop_transform(&mut self) {
        if self.transform_stack.len() > 1 {
            self.transform_stack.pop();
        }
    }

    /// Transparency factors combine by taking the strongest one in scope.
    pub fn push_transparency(&mut self, transparency: f32) {
        self.transparency_stack
            .push(self.current_transparency().max(transparency));
    }

    pub fn pop_transparency(&mut self) {
        if self.transparency_stack.len() > 1 {
            self.transparency_stack.pop();
        }
    }
}

impl Default for DrawListRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneRenderer for DrawListRenderer {
    fn property(&self, key: PropertyKey, default: i32) -> i32 {
        self.properties.get(&key).copied().unwrap_or(default)
    }

    fn set_property(&mut self, key: PropertyKey, value: i32) {
        self.properties.insert(key, value);
    }
}
