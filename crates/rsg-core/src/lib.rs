//! Robot Scene Graph Core
//!
//! Retained-mode scene graph for the robot viewer:
//! - NodeRef/SceneNode: shared-ownership graph nodes (multi-parent DAG)
//! - UpdateSignal: versioned update notifications for graph observers
//! - NodeClassRegistry: runtime class identities for rendering dispatch
//! - CloneMap: memoized deep cloning of shared subtrees
//! - SceneLoader: asset file to scene node boundary

pub mod clone_map;
pub mod effect;
pub mod group;
pub mod loader;
pub mod mesh;
pub mod node;
pub mod registry;
pub mod shape;
pub mod transform;
pub mod update;

pub use clone_map::*;
pub use effect::*;
pub use group::*;
pub use loader::*;
pub use mesh::*;
pub use node::*;
pub use registry::*;
pub use shape::*;
pub use transform::*;
pub use update::*;
