//! Robot Scene Graph Body
//!
//! Mirrors a kinematic body into the retained scene graph:
//! - Body/Link/Device: the kinematic model read by the mirror
//! - SceneBody/SceneLink/LinkShapeGroup: the per-body scene structure
//! - SceneDevice: device visualizations built by registered factories
//! - ManipulatorManager: cached joint-path + IK-handler configuration
//! - URDF import building bodies from robot description files
//!
//! Call [`register_node_classes`] (or [`install_rendering_functions`]) once
//! during startup so renderers can dispatch the node types defined here.

pub mod body;
pub mod device;
pub mod import;
pub mod manipulator;
pub mod scene_body;

pub use body::*;
pub use device::*;
pub use import::*;
pub use manipulator::*;
pub use scene_body::*;
