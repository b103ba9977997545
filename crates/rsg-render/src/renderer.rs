//! Renderer boundary consumed by the scene graph.

use rsg_core::NodeRef;

use crate::functions::NodeFunctionSet;
use crate::property::PropertyKey;

/// What graph nodes may ask of the active renderer during traversal.
///
/// Properties are renderer-scoped: two renderers drawing the same graph can
/// disagree about, say, collision shape visibility without restructuring the
/// graph. `render_custom_group` is the hook for nodes that drive their own
/// traversal (a caching renderer can wrap it with cache bookkeeping for the
/// group's subtree).
pub trait SceneRenderer: Sized {
    /// Looks up a renderer-scoped property, falling back to `default`.
    fn property(&self, key: PropertyKey, default: i32) -> i32;

    fn set_property(&mut self, key: PropertyKey, value: i32);

    /// Runs a custom group's traversal callback. The default implementation
    /// simply invokes it.
    fn render_custom_group(
        &mut self,
        functions: &NodeFunctionSet<Self>,
        node: &NodeRef,
        render: &mut dyn FnMut(&mut Self, &NodeFunctionSet<Self>),
    ) {
        let _ = node;
        render(self, functions);
    }
}
