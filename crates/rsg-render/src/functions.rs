//! Per-renderer rendering dispatch table.
//!
//! Instead of a virtual draw method on every node type, a renderer owns a
//! [`NodeFunctionSet`] mapping class identities to callbacks. Any crate can
//! register node classes and callbacks without touching the renderer, which
//! keeps the set of node types open.

use std::collections::HashMap;

use rsg_core::{ClassId, NodeClassRegistry, NodeRef, SceneNode, find_class_id};

type RenderFn<R> = Box<dyn Fn(&mut R, &NodeFunctionSet<R>, &NodeRef) + Send + Sync>;

/// Dispatch table from node class to rendering callback.
///
/// Callbacks receive the renderer, the function set itself (for recursing
/// into children) and the node handle. A callback registered for a base
/// class must only rely on the facets that base exposes (`children()`,
/// `as_transform()`); exact-type callbacks may downcast.
pub struct NodeFunctionSet<R> {
    functions: HashMap<ClassId, RenderFn<R>>,
}

impl<R> NodeFunctionSet<R> {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registers `f` as the callback for nodes whose runtime class is `N`.
    pub fn set_function<N: SceneNode>(
        &mut self,
        f: impl Fn(&mut R, &NodeFunctionSet<R>, &NodeRef) + Send + Sync + 'static,
    ) {
        self.set_function_for(find_class_id::<N>(), f);
    }

    /// Registers `f` for an already-resolved class id.
    pub fn set_function_for(
        &mut self,
        class: ClassId,
        f: impl Fn(&mut R, &NodeFunctionSet<R>, &NodeRef) + Send + Sync + 'static,
    ) {
        self.functions.insert(class, Box::new(f));
    }

    /// True if `class` or one of its registered bases has a callback.
    pub fn resolves(&self, class: ClassId) -> bool {
        let registry = NodeClassRegistry::instance();
        let mut current = Some(class);
        while let Some(id) = current {
            if self.functions.contains_key(&id) {
                return true;
            }
            current = registry.base_of(id);
        }
        false
    }

    /// Invokes the most specific callback registered for the node's runtime
    /// class, falling back through base-class links.
    ///
    /// Nodes whose class chain has no callback are silently skipped: the
    /// graph legitimately contains utility and grouping nodes with no visual
    /// representation of their own.
    pub fn dispatch(&self, renderer: &mut R, node: &NodeRef) {
        let registry = NodeClassRegistry::instance();
        let mut current = Some(node.class_id());
        while let Some(id) = current {
            if let Some(f) = self.functions.get(&id) {
                f(renderer, self, node);
                return;
            }
            current = registry.base_of(id);
        }
    }

    /// Dispatches every child of a group-typed node.
    pub fn dispatch_children(&self, renderer: &mut R, node: &NodeRef) {
        for child in node.children() {
            self.dispatch(renderer, &child);
        }
    }
}

impl<R> Default for NodeFunctionSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsg_core::{SceneGroup, SceneTransform, register_core_node_classes};

    struct Recorder {
        seen: Vec<&'static str>,
    }

    #[test]
    fn test_dispatch_prefers_exact_match() {
        register_core_node_classes();
        let mut functions: NodeFunctionSet<Recorder> = NodeFunctionSet::new();
        functions.set_function::<SceneGroup>(|r, _, _| r.seen.push("group"));
        functions.set_function::<SceneTransform>(|r, _, _| r.seen.push("transform"));

        let mut recorder = Recorder { seen: Vec::new() };
        functions.dispatch(&mut recorder, &NodeRef::new(SceneTransform::new()));
        assert_eq!(recorder.seen, vec!["transform"]);
    }

    #[test]
    fn test_dispatch_falls_back_to_base_class() {
        register_core_node_classes();
        let mut functions: NodeFunctionSet<Recorder> = NodeFunctionSet::new();
        functions.set_function::<SceneGroup>(|r, _, _| r.seen.push("group"));

        let mut recorder = Recorder { seen: Vec::new() };
        // SceneTransform is registered as deriving from SceneGroup.
        functions.dispatch(&mut recorder, &NodeRef::new(SceneTransform::new()));
        assert_eq!(recorder.seen, vec!["group"]);
    }

    #[test]
    fn test_unknown_node_type_is_skipped() {
        struct Unregistered;
        impl SceneNode for Unregistered {
            fn name(&self) -> &str {
                ""
            }
            fn set_name(&mut self, _: &str) {}
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
            fn clone_node(&self, _: &mut rsg_core::CloneMap) -> NodeRef {
                NodeRef::new(Unregistered)
            }
        }

        let functions: NodeFunctionSet<Recorder> = NodeFunctionSet::new();
        let mut recorder = Recorder { seen: Vec::new() };
        functions.dispatch(&mut recorder, &NodeRef::new(Unregistered));
        assert!(recorder.seen.is_empty());
    }
}
