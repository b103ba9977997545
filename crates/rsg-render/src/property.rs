//! Renderer-scoped properties.
//!
//! Properties let graph nodes ask the *active* renderer for per-pass state
//! (for example the shape visibility bitmask) without baking that state into
//! the graph. Keys are interned process-wide so lookups are cheap integer
//! comparisons.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

/// Name of the well-known visibility property consulted by link shape
/// groups: bit 0 enables visual shapes, bit 1 enables collision shapes.
/// Renderers that never set it get the default value 1 (visuals only).
pub const COLLISION_MODEL_VISIBILITY: &str = "collision_model_visibility";

/// Interned property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyKey(usize);

impl PropertyKey {
    /// Interns `name`; the same name always yields the same key.
    pub fn new(name: &str) -> Self {
        static KEYS: OnceLock<RwLock<HashMap<String, usize>>> = OnceLock::new();
        let keys = KEYS.get_or_init(|| RwLock::new(HashMap::new()));
        if let Some(&index) = keys.read().get(name) {
            return Self(index);
        }
        let mut keys = keys.write();
        let next = keys.len();
        let index = *keys.entry(name.to_string()).or_insert(next);
        Self(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_key() {
        let a = PropertyKey::new("visibility_test_key");
        let b = PropertyKey::new("visibility_test_key");
        let c = PropertyKey::new("another_test_key");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
