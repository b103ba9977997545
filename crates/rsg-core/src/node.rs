//! Scene node trait and shared node handles.
//!
//! Node data lives behind a [`NodeRef`], a shared-ownership handle: a node
//! may sit under multiple parents (the graph is a DAG, not a tree) and lives
//! as long as its longest holder. Identity, the update channel and the
//! parent links are kept on the handle, outside the data lock, so emitting a
//! notification never re-enters node data.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use glam::{Mat4, Quat, Vec3};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use uuid::Uuid;

use crate::clone_map::CloneMap;
use crate::group::Children;
use crate::registry::{self, ClassId};
use crate::update::{Connection, Update, UpdateFlags, UpdateSignal};

/// Behavior every scene node type implements.
///
/// Concrete node types expose their capabilities through facet accessors:
/// `children()` for group-typed nodes and `as_transform()` for nodes that
/// apply a rigid-body transform to their subtree. Rendering callbacks
/// registered for a base class must only rely on those facets; exact-type
/// callbacks may downcast through `as_any()`.
pub trait SceneNode: Any + Send + Sync {
    fn name(&self) -> &str;

    fn set_name(&mut self, name: &str);

    /// Child list, for group-typed nodes.
    fn children(&self) -> Option<&Children> {
        None
    }

    fn children_mut(&mut self) -> Option<&mut Children> {
        None
    }

    /// Local transform, for transform-typed nodes.
    fn as_transform(&self) -> Option<&dyn TransformNode> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Deep-clones this node through the clone map, so that nodes shared
    /// within the cloned subtree stay shared in the result.
    fn clone_node(&self, map: &mut CloneMap) -> NodeRef;
}

/// Access to a node's local rigid-body transform, independent of its
/// concrete type.
pub trait TransformNode {
    fn rotation(&self) -> Quat;

    fn translation(&self) -> Vec3;

    fn local_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation(), self.translation())
    }
}

struct NodeInner {
    object_id: Uuid,
    class_id: ClassId,
    signal: UpdateSignal,
    parents: Mutex<Vec<Weak<NodeInner>>>,
    data: RwLock<Box<dyn SceneNode>>,
}

/// Shared-ownership handle to a scene node.
#[derive(Clone)]
pub struct NodeRef {
    inner: Arc<NodeInner>,
}

impl NodeRef {
    /// Wraps a node, assigning its identity and resolving its class id.
    pub fn new<N: SceneNode>(node: N) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                object_id: Uuid::new_v4(),
                class_id: registry::find_class_id::<N>(),
                signal: UpdateSignal::new(),
                parents: Mutex::new(Vec::new()),
                data: RwLock::new(Box::new(node)),
            }),
        }
    }

    /// Stable identity of this node (clones get a fresh one).
    pub fn object_id(&self) -> Uuid {
        self.inner.object_id
    }

    /// Runtime class identity used for rendering dispatch.
    pub fn class_id(&self) -> ClassId {
        self.inner.class_id
    }

    /// True when both handles refer to the same node.
    pub fn ptr_eq(a: &NodeRef, b: &NodeRef) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn downgrade(&self) -> WeakNodeRef {
        WeakNodeRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn SceneNode>> {
        self.inner.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn SceneNode>> {
        self.inner.data.write()
    }

    /// Read access to the node data as its concrete type.
    pub fn downcast_read<N: SceneNode>(&self) -> Option<MappedRwLockReadGuard<'_, N>> {
        RwLockReadGuard::try_map(self.inner.data.read(), |data| {
            data.as_any().downcast_ref::<N>()
        })
        .ok()
    }

    /// Write access to the node data as its concrete type.
    pub fn downcast_write<N: SceneNode>(&self) -> Option<MappedRwLockWriteGuard<'_, N>> {
        RwLockWriteGuard::try_map(self.inner.data.write(), |data| {
            data.as_any_mut().downcast_mut::<N>()
        })
        .ok()
    }

    pub fn is<N: SceneNode>(&self) -> bool {
        self.inner.data.read().as_any().is::<N>()
    }

    pub fn name(&self) -> String {
        self.read().name().to_string()
    }

    pub fn set_name(&self, name: &str) {
        self.write().set_name(name);
    }

    /// True for group-typed nodes (those exposing a child list).
    pub fn is_group(&self) -> bool {
        self.read().children().is_some()
    }

    /// The node's update channel.
    pub fn updated(&self) -> &UpdateSignal {
        &self.inner.signal
    }

    /// Connects an observer to this node's update channel.
    pub fn on_updated(&self, f: impl Fn(&Update) + Send + Sync + 'static) -> Connection {
        self.inner.signal.connect(f)
    }

    /// Emits an update on this node and re-raises it on every parent, up to
    /// the graph roots. Call after the mutation is complete, never during.
    pub fn notify(&self, update: &Update) {
        self.inner.signal.emit(update);
        let parents: Vec<Arc<NodeInner>> = {
            let mut list = self.inner.parents.lock();
            list.retain(|p| p.strong_count() > 0);
            list.iter().filter_map(|p| p.upgrade()).collect()
        };
        for parent in parents {
            NodeRef { inner: parent }.notify(update);
        }
    }

    /// Convenience for [`NodeRef::notify`] with freshly built flags.
    pub fn notify_update(&self, flags: UpdateFlags) {
        self.notify(&Update::new(flags));
    }

    /// True while at least one parent holds this node.
    pub fn has_parents(&self) -> bool {
        self.inner
            .parents
            .lock()
            .iter()
            .any(|p| p.strong_count() > 0)
    }

    /// Adds `child` to this node's child list. Returns false when this node
    /// is not a group. No notification is emitted; callers notify once their
    /// whole edit is complete.
    pub fn add_child(&self, child: &NodeRef) -> bool {
        let added = match self.write().children_mut() {
            Some(children) => {
                children.push(child.clone());
                true
            }
            None => false,
        };
        if added {
            child
                .inner
                .parents
                .lock()
                .push(Arc::downgrade(&self.inner));
        }
        added
    }

    /// Removes the first occurrence of `child`. Returns whether a child was
    /// removed.
    pub fn remove_child(&self, child: &NodeRef) -> bool {
        let removed = match self.write().children_mut() {
            Some(children) => children.remove(child),
            None => false,
        };
        if removed {
            let mut parents = child.inner.parents.lock();
            if let Some(pos) = parents
                .iter()
                .position(|p| p.as_ptr() == Arc::as_ptr(&self.inner))
            {
                parents.swap_remove(pos);
            }
        }
        removed
    }

    /// Detaches every child.
    pub fn clear_children(&self) {
        let drained = match self.write().children_mut() {
            Some(children) => children.drain(),
            None => Vec::new(),
        };
        for child in &drained {
            let mut parents = child.inner.parents.lock();
            if let Some(pos) = parents
                .iter()
                .position(|p| p.as_ptr() == Arc::as_ptr(&self.inner))
            {
                parents.swap_remove(pos);
            }
        }
    }

    pub fn child_count(&self) -> usize {
        self.read().children().map_or(0, |c| c.len())
    }

    pub fn child(&self, index: usize) -> Option<NodeRef> {
        self.read().children().and_then(|c| c.get(index).cloned())
    }

    /// Snapshot of the current child list.
    pub fn children(&self) -> Vec<NodeRef> {
        self.read()
            .children()
            .map_or_else(Vec::new, |c| c.iter().cloned().collect())
    }

    pub fn contains_child(&self, child: &NodeRef) -> bool {
        self.read().children().is_some_and(|c| c.contains(child))
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("name", &self.name())
            .field("object_id", &self.object_id())
            .finish()
    }
}

/// Non-owning handle to a scene node.
#[derive(Clone)]
pub struct WeakNodeRef {
    inner: Weak<NodeInner>,
}

impl WeakNodeRef {
    pub fn upgrade(&self) -> Option<NodeRef> {
        self.inner.upgrade().map(|inner| NodeRef { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::SceneGroup;
    use crate::shape::SceneShape;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_and_remove_child_tracks_parents() {
        let parent = NodeRef::new(SceneGroup::new());
        let child = NodeRef::new(SceneGroup::new());

        assert!(!child.has_parents());
        assert!(parent.add_child(&child));
        assert!(child.has_parents());
        assert!(parent.contains_child(&child));

        assert!(parent.remove_child(&child));
        assert!(!child.has_parents());
        assert!(!parent.remove_child(&child));
    }

    #[test]
    fn test_non_group_refuses_children() {
        let shape = NodeRef::new(SceneShape::new(
            std::sync::Arc::new(crate::mesh::MeshData::new()),
        ));
        let child = NodeRef::new(SceneGroup::new());

        assert!(!shape.is_group());
        assert!(!shape.add_child(&child));
    }

    #[test]
    fn test_notify_propagates_to_all_parents() {
        let root_a = NodeRef::new(SceneGroup::new());
        let root_b = NodeRef::new(SceneGroup::new());
        let shared = NodeRef::new(SceneGroup::new());
        root_a.add_child(&shared);
        root_b.add_child(&shared);

        let hits = std::sync::Arc::new(AtomicUsize::new(0));
        let ha = hits.clone();
        let _ca = root_a.on_updated(move |_| {
            ha.fetch_add(1, Ordering::SeqCst);
        });
        let hb = hits.clone();
        let _cb = root_b.on_updated(move |_| {
            hb.fetch_add(1, Ordering::SeqCst);
        });

        shared.notify_update(UpdateFlags::MODIFIED);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_multi_parent_node_outlives_one_parent() {
        let child = NodeRef::new(SceneGroup::new());
        let parent_a = NodeRef::new(SceneGroup::new());
        let parent_b = NodeRef::new(SceneGroup::new());
        parent_a.add_child(&child);
        parent_b.add_child(&child);

        drop(parent_a);
        assert!(child.has_parents());

        parent_b.remove_child(&child);
        assert!(!child.has_parents());
    }
}
