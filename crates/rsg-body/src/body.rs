//! Kinematic model the scene body mirrors.
//!
//! The scene graph only reads from these types: link count, link-by-index,
//! poses, devices. Pose fields are interior-mutable so a simulation can
//! write current link poses while holders of `Arc<Body>` read them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use glam::{Quat, Vec3};
use parking_lot::RwLock;
use uuid::Uuid;

use rsg_core::NodeRef;

use crate::device::Device;
use crate::manipulator::KinematicsHandler;

/// A rigid body of the kinematic model.
pub struct Link {
    id: Uuid,
    name: String,
    index: usize,
    parent_index: Option<usize>,
    visual_shape: Option<NodeRef>,
    collision_shape: Option<NodeRef>,
    pose: RwLock<(Quat, Vec3)>,
}

impl Link {
    /// Create a new link. The index is assigned when the link is added to a
    /// [`Body`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            index: 0,
            parent_index: None,
            visual_shape: None,
            collision_shape: None,
            pose: RwLock::new((Quat::IDENTITY, Vec3::ZERO)),
        }
    }

    /// Sets the parent link by body index.
    pub fn with_parent(mut self, parent_index: usize) -> Self {
        self.parent_index = Some(parent_index);
        self
    }

    pub fn with_visual_shape(mut self, shape: NodeRef) -> Self {
        self.visual_shape = Some(shape);
        self
    }

    pub fn with_collision_shape(mut self, shape: NodeRef) -> Self {
        self.collision_shape = Some(shape);
        self
    }

    /// Uses one shape node as both the visual and the collision shape.
    pub fn with_shape(mut self, shape: NodeRef) -> Self {
        self.visual_shape = Some(shape.clone());
        self.collision_shape = Some(shape);
        self
    }

    pub fn with_pose(self, rotation: Quat, translation: Vec3) -> Self {
        *self.pose.write() = (rotation, translation);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this link in the body's link sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent_index
    }

    pub fn visual_shape(&self) -> Option<&NodeRef> {
        self.visual_shape.as_ref()
    }

    pub fn collision_shape(&self) -> Option<&NodeRef> {
        self.collision_shape.as_ref()
    }

    pub fn rotation(&self) -> Quat {
        self.pose.read().0
    }

    pub fn translation(&self) -> Vec3 {
        self.pose.read().1
    }

    /// Writes the link's current pose (typically once per simulation step).
    pub fn set_pose(&self, rotation: Quat, translation: Vec3) {
        *self.pose.write() = (rotation, translation);
    }
}

/// A kinematic body: ordered links, devices, and a named cache for derived
/// structures.
pub struct Body {
    id: Uuid,
    name: String,
    links: Vec<Arc<Link>>,
    link_name_index: HashMap<String, usize>,
    devices: Vec<Arc<dyn Device>>,
    caches: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    ik_handler: RwLock<Option<Arc<dyn KinematicsHandler>>>,
}

impl Body {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            links: Vec::new(),
            link_name_index: HashMap::new(),
            devices: Vec::new(),
            caches: RwLock::new(HashMap::new()),
            ik_handler: RwLock::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a link, assigning its index. Links are added root first, so a
    /// parent index always refers to an earlier link.
    pub fn add_link(&mut self, mut link: Link) -> usize {
        let index = self.links.len();
        link.index = index;
        self.link_name_index.insert(link.name.clone(), index);
        self.links.push(Arc::new(link));
        index
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn link(&self, index: usize) -> Option<&Arc<Link>> {
        self.links.get(index)
    }

    pub fn links(&self) -> &[Arc<Link>] {
        &self.links
    }

    pub fn find_link(&self, name: &str) -> Option<&Arc<Link>> {
        self.link_name_index
            .get(name)
            .and_then(|&index| self.links.get(index))
    }

    pub fn root_link(&self) -> Option<&Arc<Link>> {
        self.links.first()
    }

    /// The single leaf of the kinematic tree, or `None` when the tree has
    /// zero or several leaves.
    pub fn find_unique_end_link(&self) -> Option<&Arc<Link>> {
        let mut has_child = vec![false; self.links.len()];
        for link in &self.links {
            if let Some(parent) = link.parent_index {
                if let Some(flag) = has_child.get_mut(parent) {
                    *flag = true;
                }
            }
        }
        let mut end = None;
        for (index, link) in self.links.iter().enumerate() {
            if !has_child[index] && index > 0 {
                if end.is_some() {
                    return None;
                }
                end = Some(link);
            }
        }
        end
    }

    pub fn add_device(&mut self, device: Arc<dyn Device>) {
        self.devices.push(device);
    }

    pub fn devices(&self) -> &[Arc<dyn Device>] {
        &self.devices
    }

    /// Position of `device` in the body's device list.
    pub fn device_index(&self, device: &Arc<dyn Device>) -> Option<usize> {
        self.devices
            .iter()
            .position(|d| crate::device::device_ptr_eq(d, device))
    }

    /// Looks up a memoized derived structure by name.
    pub fn find_cache<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.caches
            .read()
            .get(name)
            .and_then(|value| value.clone().downcast::<T>().ok())
    }

    /// Stores a derived structure under a name, replacing any previous value.
    pub fn set_cache<T: Any + Send + Sync>(&self, name: &str, value: Arc<T>) {
        self.caches.write().insert(name.to_string(), value);
    }

    /// The inverse-kinematics handler, when one was installed by the
    /// application.
    pub fn ik_handler(&self) -> Option<Arc<dyn KinematicsHandler>> {
        self.ik_handler.read().clone()
    }

    pub fn set_ik_handler(&self, handler: Arc<dyn KinematicsHandler>) {
        *self.ik_handler.write() = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_link_assigns_indices_in_order() {
        let mut body = Body::new("robot");
        let base = body.add_link(Link::new("base"));
        let arm = body.add_link(Link::new("arm").with_parent(base));

        assert_eq!(base, 0);
        assert_eq!(arm, 1);
        assert_eq!(body.link(1).unwrap().name(), "arm");
        assert_eq!(body.find_link("arm").unwrap().index(), 1);
        assert_eq!(body.link(1).unwrap().parent_index(), Some(0));
    }

    #[test]
    fn test_unique_end_link_detection() {
        let mut body = Body::new("robot");
        let base = body.add_link(Link::new("base"));
        let arm = body.add_link(Link::new("arm").with_parent(base));
        body.add_link(Link::new("hand").with_parent(arm));
        assert_eq!(body.find_unique_end_link().unwrap().name(), "hand");

        // Adding a second branch makes the end link ambiguous.
        body.add_link(Link::new("camera_mast").with_parent(base));
        assert!(body.find_unique_end_link().is_none());
    }

    #[test]
    fn test_cache_round_trip_is_typed() {
        let body = Body::new("robot");
        body.set_cache("tool_offset", Arc::new(42usize));

        assert_eq!(body.find_cache::<usize>("tool_offset"), Some(Arc::new(42)));
        assert!(body.find_cache::<String>("tool_offset").is_none());
        assert!(body.find_cache::<usize>("missing").is_none());
    }

    #[test]
    fn test_link_pose_is_interior_mutable() {
        let mut body = Body::new("robot");
        body.add_link(Link::new("base"));
        let link = body.link(0).unwrap().clone();

        link.set_pose(Quat::IDENTITY, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(body.link(0).unwrap().translation(), Vec3::new(1.0, 2.0, 3.0));
    }
}
