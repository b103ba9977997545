//! Node class registry.
//!
//! Maps a node's runtime class identity (the Rust [`TypeId`]) to a stable
//! [`ClassId`] and an optional base class, so that rendering dispatch can
//! treat an externally defined node as "is-a" base type without compile-time
//! inheritance. Registrations are additive and process-wide; there is no
//! removal operation.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

/// Stable per-type identifier.
///
/// Assigned once per type for the lifetime of the process, monotonically
/// increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Default)]
struct RegistryState {
    ids: HashMap<TypeId, ClassId>,
    bases: Vec<Option<ClassId>>,
}

impl RegistryState {
    fn id_for(&mut self, type_id: TypeId) -> ClassId {
        if let Some(id) = self.ids.get(&type_id) {
            return *id;
        }
        let id = ClassId(self.bases.len() as u32);
        self.ids.insert(type_id, id);
        self.bases.push(None);
        id
    }
}

/// Process-wide class table.
///
/// Registrations happen from explicit initialization functions (for example
/// `rsg_body::register_node_classes`), not from static initializers, so the
/// registration order is always well defined.
pub struct NodeClassRegistry {
    state: RwLock<RegistryState>,
}

impl NodeClassRegistry {
    pub fn instance() -> &'static NodeClassRegistry {
        static INSTANCE: OnceLock<NodeClassRegistry> = OnceLock::new();
        INSTANCE.get_or_init(|| NodeClassRegistry {
            state: RwLock::new(RegistryState::default()),
        })
    }

    /// Returns the stable identifier for `T`, assigning one on first use.
    pub fn find_class_id<T: 'static>(&self) -> ClassId {
        let type_id = TypeId::of::<T>();
        if let Some(id) = self.state.read().ids.get(&type_id) {
            return *id;
        }
        self.state.write().id_for(type_id)
    }

    /// Records that `Derived` should be treated as `Base` for dispatch
    /// purposes. Registering the same pair twice is idempotent.
    pub fn register_class<Derived: 'static, Base: 'static>(&self) -> ClassId {
        let mut state = self.state.write();
        let derived = state.id_for(TypeId::of::<Derived>());
        let base = state.id_for(TypeId::of::<Base>());
        state.bases[derived.index()] = Some(base);
        derived
    }

    /// One step up the registered class chain.
    pub fn base_of(&self, id: ClassId) -> Option<ClassId> {
        self.state.read().bases.get(id.index()).copied().flatten()
    }

    /// Transitive "is-a" test along registered base links.
    pub fn is_derived_from(&self, id: ClassId, base: ClassId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == base {
                return true;
            }
            current = self.base_of(c);
        }
        false
    }
}

/// Convenience accessor for [`NodeClassRegistry::find_class_id`].
pub fn find_class_id<T: 'static>() -> ClassId {
    NodeClassRegistry::instance().find_class_id::<T>()
}

/// Registers the class links between the node types this crate defines.
///
/// Call once during startup, before building rendering function sets.
/// Safe to call repeatedly.
pub fn register_core_node_classes() {
    let registry = NodeClassRegistry::instance();
    registry.register_class::<crate::SceneTransform, crate::SceneGroup>();
    registry.register_class::<crate::TransparentGroup, crate::SceneGroup>();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NodeA;
    struct NodeB;
    struct NodeC;

    #[test]
    fn test_class_ids_are_stable() {
        let registry = NodeClassRegistry::instance();
        let a1 = registry.find_class_id::<NodeA>();
        let a2 = registry.find_class_id::<NodeA>();
        let b = registry.find_class_id::<NodeB>();

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }

    #[test]
    fn test_register_class_is_idempotent() {
        let registry = NodeClassRegistry::instance();
        let first = registry.register_class::<NodeB, NodeA>();
        let second = registry.register_class::<NodeB, NodeA>();

        assert_eq!(first, second);
        assert_eq!(registry.base_of(first), Some(registry.find_class_id::<NodeA>()));
    }

    #[test]
    fn test_is_derived_from_walks_the_chain() {
        let registry = NodeClassRegistry::instance();
        registry.register_class::<NodeB, NodeA>();
        registry.register_class::<NodeC, NodeB>();

        let a = registry.find_class_id::<NodeA>();
        let c = registry.find_class_id::<NodeC>();
        assert!(registry.is_derived_from(c, a));
        assert!(!registry.is_derived_from(a, c));
    }
}
