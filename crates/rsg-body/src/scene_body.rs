//! Scene mirror of a kinematic body.
//!
//! One [`SceneLink`] per kinematic link, aggregated under a [`SceneBody`].
//! Each scene link owns a permanent [`LinkShapeGroup`] holding the link's
//! visual and collision shapes, plus a chain of zero or more effect groups
//! layered above it; the `top_shape_group` pointer always names the current
//! outermost node of that chain.
//!
//! Operations that restructure the graph take the node handle and lock
//! fine-grained, emitting one update notification after the edit completes.

use std::any::Any;
use std::sync::Arc;

use glam::{Quat, Vec3};

use rsg_core::{
    Children, CloneMap, Connection, NodeClassRegistry, NodeRef, SceneGroup, SceneNode,
    SceneTransform, TransformNode, TransparentGroup, UpdateFlags, register_core_node_classes,
};
use rsg_render::{COLLISION_MODEL_VISIBILITY, NodeFunctionSet, PropertyKey, SceneRenderer};

use crate::body::{Body, Link};
use crate::device::{Device, SceneDevice, device_ptr_eq};

/// Registers the scene-body node classes with the class registry.
///
/// Call once during startup, before building rendering function sets.
/// Safe to call repeatedly.
pub fn register_node_classes() {
    register_core_node_classes();
    let registry = NodeClassRegistry::instance();
    registry.register_class::<LinkShapeGroup, SceneGroup>();
    registry.register_class::<SceneLink, SceneTransform>();
    registry.register_class::<SceneBody, SceneTransform>();
    registry.register_class::<SceneDevice, SceneGroup>();
}

/// Installs the rendering callbacks for the scene-body node types into a
/// renderer's function set.
pub fn install_rendering_functions<R: SceneRenderer + 'static>(functions: &mut NodeFunctionSet<R>) {
    register_node_classes();
    functions.set_function::<LinkShapeGroup>(|renderer, functions, node| {
        renderer.render_custom_group(functions, node, &mut |renderer, functions| {
            if let Some(group) = node.downcast_read::<LinkShapeGroup>() {
                group.traverse(renderer, functions);
            }
        });
    });
}

/// Node holding a link's visual and collision shapes.
///
/// The visual shape is a graph child; the collision shape never is, so it
/// only reaches a renderer through [`LinkShapeGroup::traverse`] when the
/// renderer's visibility mask asks for it. When the two shapes are distinct,
/// updates of the collision shape are re-raised as updates of this group;
/// when they are aliased the ordinary child path already delivers them, so
/// no forwarding subscription exists.
pub struct LinkShapeGroup {
    name: String,
    children: Children,
    visual_shape: Option<NodeRef>,
    collision_shape: Option<NodeRef>,
    collision_update_connection: Option<Connection>,
    is_visible: bool,
    has_clone: bool,
}

impl LinkShapeGroup {
    pub fn new(link: &Link) -> NodeRef {
        let visual_shape = link.visual_shape().cloned();
        let collision_shape = link.collision_shape().cloned();
        let node = NodeRef::new(LinkShapeGroup {
            name: String::new(),
            children: Children::new(),
            visual_shape: visual_shape.clone(),
            collision_shape,
            collision_update_connection: None,
            is_visible: true,
            has_clone: false,
        });
        if let Some(visual) = &visual_shape {
            node.add_child(visual);
        }
        Self::reset_collision_update_connection(&node);
        node
    }

    pub fn visual_shape(&self) -> Option<&NodeRef> {
        self.visual_shape.as_ref()
    }

    pub fn collision_shape(&self) -> Option<&NodeRef> {
        self.collision_shape.as_ref()
    }

    /// Visibility is consulted at traversal time only; flipping it is not a
    /// structural change and emits no notification.
    pub fn set_visible(&mut self, on: bool) {
        self.is_visible = on;
    }

    /// Deep-clones the shapes for this instance, so later appearance edits
    /// cannot leak into other holders of the original shapes. Idempotent:
    /// the second call does nothing and notifies nothing.
    pub fn clone_shapes(node: &NodeRef, clone_map: &mut CloneMap) {
        let (old_visual, old_collision, aliased) = {
            let Some(group) = node.downcast_read::<LinkShapeGroup>() else {
                return;
            };
            if group.has_clone {
                return;
            }
            let aliased = match (&group.visual_shape, &group.collision_shape) {
                (Some(v), Some(c)) => NodeRef::ptr_eq(v, c),
                _ => false,
            };
            (
                group.visual_shape.clone(),
                group.collision_shape.clone(),
                aliased,
            )
        };

        let new_visual = old_visual.as_ref().map(|v| clone_map.get_clone(v));
        let new_collision = if aliased {
            new_visual.clone()
        } else {
            old_collision.as_ref().map(|c| clone_map.get_clone(c))
        };

        if let Some(old) = &old_visual {
            node.remove_child(old);
        }
        if let Some(new) = &new_visual {
            node.add_child(new);
        }
        if let Some(mut group) = node.downcast_write::<LinkShapeGroup>() {
            group.visual_shape = new_visual;
            group.collision_shape = new_collision;
            group.has_clone = true;
        }
        Self::reset_collision_update_connection(node);
        node.notify_update(UpdateFlags::REMOVED | UpdateFlags::ADDED);
    }

    /// Re-raises collision shape updates as updates of this group, but only
    /// while the collision shape is distinct from the visual shape.
    fn reset_collision_update_connection(node: &NodeRef) {
        let weak = node.downgrade();
        let connection = {
            let Some(group) = node.downcast_read::<LinkShapeGroup>() else {
                return;
            };
            let distinct = match (&group.collision_shape, &group.visual_shape) {
                (Some(c), Some(v)) => !NodeRef::ptr_eq(c, v),
                (Some(_), None) => true,
                _ => false,
            };
            if distinct {
                group.collision_shape.as_ref().map(|collision| {
                    collision.updated().connect(move |update| {
                        if let Some(node) = weak.upgrade() {
                            node.notify(update);
                        }
                    })
                })
            } else {
                None
            }
        };
        if let Some(mut group) = node.downcast_write::<LinkShapeGroup>() {
            group.collision_update_connection = connection;
        }
    }

    /// Dispatches this group's content subject to the renderer's visibility
    /// mask: bit 0 gates the visual shape, bit 1 additionally dispatches a
    /// distinct collision shape. Other children always render.
    pub fn traverse<R: SceneRenderer>(&self, renderer: &mut R, functions: &NodeFunctionSet<R>) {
        let mut visibility = 0;
        if self.is_visible {
            visibility = renderer.property(PropertyKey::new(COLLISION_MODEL_VISIBILITY), 1);
        }
        for child in self.children.iter() {
            if (visibility & 1) == 0
                && self
                    .visual_shape
                    .as_ref()
                    .is_some_and(|visual| NodeRef::ptr_eq(child, visual))
            {
                continue;
            }
            functions.dispatch(renderer, child);
        }
        if (visibility & 2) != 0
            && let Some(collision) = &self.collision_shape
        {
            let distinct = self
                .visual_shape
                .as_ref()
                .is_none_or(|visual| !NodeRef::ptr_eq(collision, visual));
            if distinct {
                functions.dispatch(renderer, collision);
            }
        }
    }
}

impl SceneNode for LinkShapeGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn children(&self) -> Option<&Children> {
        Some(&self.children)
    }

    fn children_mut(&mut self) -> Option<&mut Children> {
        Some(&mut self.children)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_node(&self, map: &mut CloneMap) -> NodeRef {
        let visual_shape = self.visual_shape.as_ref().map(|v| map.get_clone(v));
        let collision_shape = match (&self.collision_shape, &self.visual_shape) {
            (Some(c), Some(v)) if NodeRef::ptr_eq(c, v) => visual_shape.clone(),
            (Some(c), _) => Some(map.get_clone(c)),
            (None, _) => None,
        };
        let clone = NodeRef::new(LinkShapeGroup {
            name: self.name.clone(),
            children: Children::new(),
            visual_shape: visual_shape.clone(),
            collision_shape,
            collision_update_connection: None,
            is_visible: self.is_visible,
            has_clone: self.has_clone,
        });
        if let Some(visual) = &visual_shape {
            clone.add_child(visual);
        }
        Self::reset_collision_update_connection(&clone);
        clone
    }
}

/// Scene node mirroring one kinematic link.
pub struct SceneLink {
    name: String,
    children: Children,
    rotation: Quat,
    translation: Vec3,
    link: Arc<Link>,
    main_shape_group: NodeRef,
    top_shape_group: NodeRef,
    device_group: Option<NodeRef>,
    scene_devices: Vec<NodeRef>,
    transparent_group: Option<NodeRef>,
}

impl SceneLink {
    pub fn new(link: &Arc<Link>) -> NodeRef {
        let main_shape_group = LinkShapeGroup::new(link);
        let node = NodeRef::new(SceneLink {
            name: link.name().to_string(),
            children: Children::new(),
            rotation: link.rotation(),
            translation: link.translation(),
            link: link.clone(),
            main_shape_group: main_shape_group.clone(),
            top_shape_group: main_shape_group.clone(),
            device_group: None,
            scene_devices: Vec::new(),
            transparent_group: None,
        });
        node.add_child(&main_shape_group);
        node
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn main_shape_group(node: &NodeRef) -> Option<NodeRef> {
        node.downcast_read::<SceneLink>()
            .map(|link| link.main_shape_group.clone())
    }

    /// The current outermost node of the effect-group chain.
    pub fn top_shape_group(node: &NodeRef) -> Option<NodeRef> {
        node.downcast_read::<SceneLink>()
            .map(|link| link.top_shape_group.clone())
    }

    pub fn visual_shape(node: &NodeRef) -> Option<NodeRef> {
        let main = Self::main_shape_group(node)?;
        main.downcast_read::<LinkShapeGroup>()
            .and_then(|group| group.visual_shape.clone())
    }

    pub fn collision_shape(node: &NodeRef) -> Option<NodeRef> {
        let main = Self::main_shape_group(node)?;
        main.downcast_read::<LinkShapeGroup>()
            .and_then(|group| group.collision_shape.clone())
    }

    pub fn set_visible(node: &NodeRef, on: bool) {
        let Some(main) = Self::main_shape_group(node) else {
            return;
        };
        if let Some(mut group) = main.downcast_write::<LinkShapeGroup>() {
            group.set_visible(on);
        }
    }

    /// Copies the kinematic link's current pose into this node's transform.
    pub fn update_position(node: &NodeRef) {
        let link = {
            let Some(scene_link) = node.downcast_read::<SceneLink>() else {
                return;
            };
            scene_link.link.clone()
        };
        let (rotation, translation) = (link.rotation(), link.translation());
        if let Some(mut scene_link) = node.downcast_write::<SceneLink>() {
            scene_link.rotation = rotation;
            scene_link.translation = translation;
        }
    }

    /// Layers `group` above the current top of the chain: the previous top
    /// is reparented under `group` and `group` becomes the new top.
    pub fn insert_effect_group(node: &NodeRef, group: &NodeRef, notify: bool) {
        let Some(top) = Self::top_shape_group(node) else {
            return;
        };
        node.remove_child(&top);
        group.add_child(&top);
        node.add_child(group);
        if let Some(mut scene_link) = node.downcast_write::<SceneLink>() {
            scene_link.top_shape_group = group.clone();
        }
        if notify {
            node.notify_update(UpdateFlags::ADDED | UpdateFlags::REMOVED);
        }
    }

    /// Detaches `group` from the chain, promoting its first group-typed
    /// child into its place. Children of the removed group beyond that first
    /// group are dropped from the chain; effect groups are expected to carry
    /// at most one meaningful child. The base shape group itself is never
    /// removable. Returns whether a removal happened.
    pub fn remove_effect_group(node: &NodeRef, group: &NodeRef, notify: bool) -> bool {
        let Some(main) = Self::main_shape_group(node) else {
            return false;
        };
        Self::remove_effect_group_from(node, node, &main, group, notify)
    }

    fn remove_effect_group_from(
        node: &NodeRef,
        parent: &NodeRef,
        main: &NodeRef,
        group: &NodeRef,
        notify: bool,
    ) -> bool {
        if NodeRef::ptr_eq(parent, main) {
            return false;
        }
        if parent.remove_child(group) {
            let mut promoted: Option<NodeRef> = None;
            for child in group.children() {
                if child.is_group() {
                    parent.add_child(&child);
                    promoted = Some(child);
                    break;
                }
            }
            if let Some(mut scene_link) = node.downcast_write::<SceneLink>() {
                if NodeRef::ptr_eq(&scene_link.top_shape_group, group) {
                    scene_link.top_shape_group = promoted
                        .clone()
                        .unwrap_or_else(|| scene_link.main_shape_group.clone());
                }
            }
            group.clear_children();
            if notify {
                parent.notify_update(UpdateFlags::ADDED | UpdateFlags::REMOVED);
            }
            true
        } else {
            for child in parent.children() {
                if child.is_group()
                    && Self::remove_effect_group_from(node, &child, main, group, notify)
                {
                    return true;
                }
            }
            false
        }
    }

    /// The transparency currently applied through the effect chain.
    pub fn transparency(node: &NodeRef) -> f32 {
        let group = node
            .downcast_read::<SceneLink>()
            .and_then(|link| link.transparent_group.clone());
        match group {
            Some(group) if group.has_parents() => group
                .downcast_read::<TransparentGroup>()
                .map_or(0.0, |g| g.transparency()),
            _ => 0.0,
        }
    }

    /// Sets the link's transparency. The transparency wrapper sits in the
    /// graph only while the value is positive, so a fully opaque link costs
    /// no extra traversal depth.
    pub fn set_transparency(node: &NodeRef, transparency: f32, notify: bool) {
        let existing = node
            .downcast_read::<SceneLink>()
            .and_then(|link| link.transparent_group.clone());

        let group = match existing {
            Some(group) => {
                let changed = group
                    .downcast_read::<TransparentGroup>()
                    .is_some_and(|g| g.transparency() != transparency);
                if changed {
                    if let Some(mut g) = group.downcast_write::<TransparentGroup>() {
                        g.set_transparency(transparency);
                    }
                    if notify {
                        group.notify_update(UpdateFlags::MODIFIED);
                    }
                }
                group
            }
            None => {
                let group = NodeRef::new(TransparentGroup::new(transparency));
                if let Some(mut scene_link) = node.downcast_write::<SceneLink>() {
                    scene_link.transparent_group = Some(group.clone());
                }
                group
            }
        };

        if transparency > 0.0 {
            if !group.has_parents() {
                Self::insert_effect_group(node, &group, notify);
            }
        } else if group.has_parents() {
            Self::remove_effect_group(node, &group, notify);
        }
    }

    pub fn make_transparent(node: &NodeRef, transparency: f32) {
        Self::set_transparency(node, transparency, true);
    }

    /// Attaches a scene device under this link's lazily created device
    /// group.
    pub fn add_scene_device(node: &NodeRef, scene_device: &NodeRef) {
        let device_group = {
            let existing = node
                .downcast_read::<SceneLink>()
                .and_then(|link| link.device_group.clone());
            match existing {
                Some(group) => group,
                None => {
                    let group = NodeRef::new(SceneGroup::named("devices"));
                    node.add_child(&group);
                    if let Some(mut scene_link) = node.downcast_write::<SceneLink>() {
                        scene_link.device_group = Some(group.clone());
                    }
                    group
                }
            }
        };
        if let Some(mut scene_link) = node.downcast_write::<SceneLink>() {
            scene_link.scene_devices.push(scene_device.clone());
        }
        device_group.add_child(scene_device);
    }

    /// The scene device mirroring `device`, or `None` when this link does
    /// not carry it.
    pub fn scene_device(node: &NodeRef, device: &Arc<dyn Device>) -> Option<NodeRef> {
        let scene_devices = node
            .downcast_read::<SceneLink>()
            .map(|link| link.scene_devices.clone())?;
        scene_devices.into_iter().find(|sdev| {
            sdev.downcast_read::<SceneDevice>()
                .is_some_and(|s| device_ptr_eq(s.device(), device))
        })
    }

    pub fn clone_shapes(node: &NodeRef, clone_map: &mut CloneMap) {
        if let Some(main) = Self::main_shape_group(node) {
            LinkShapeGroup::clone_shapes(&main, clone_map);
        }
    }
}

impl TransformNode for SceneLink {
    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn translation(&self) -> Vec3 {
        self.translation
    }
}

impl SceneNode for SceneLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn children(&self) -> Option<&Children> {
        Some(&self.children)
    }

    fn children_mut(&mut self) -> Option<&mut Children> {
        Some(&mut self.children)
    }

    fn as_transform(&self) -> Option<&dyn TransformNode> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_node(&self, map: &mut CloneMap) -> NodeRef {
        let clone = NodeRef::new(SceneLink {
            name: self.name.clone(),
            children: Children::new(),
            rotation: self.rotation,
            translation: self.translation,
            link: self.link.clone(),
            main_shape_group: map.get_clone(&self.main_shape_group),
            top_shape_group: map.get_clone(&self.top_shape_group),
            device_group: self.device_group.as_ref().map(|g| map.get_clone(g)),
            scene_devices: self
                .scene_devices
                .iter()
                .map(|sdev| map.get_clone(sdev))
                .collect(),
            transparent_group: self.transparent_group.as_ref().map(|g| map.get_clone(g)),
        });
        for child in self.children.iter() {
            let child_clone = map.get_clone(child);
            clone.add_child(&child_clone);
        }
        clone
    }
}

/// Factory building the scene link for a kinematic link, injectable so a
/// subsystem can substitute its own [`SceneLink`] variant.
pub type SceneLinkFactory = Arc<dyn Fn(&Arc<Link>) -> NodeRef + Send + Sync>;

/// Scene node mirroring a whole kinematic body.
pub struct SceneBody {
    name: String,
    children: Children,
    rotation: Quat,
    translation: Vec3,
    body: Arc<Body>,
    scene_link_group: NodeRef,
    scene_links: Vec<NodeRef>,
    scene_devices: Vec<NodeRef>,
    scene_link_factory: SceneLinkFactory,
}

impl SceneBody {
    pub fn new(body: Arc<Body>) -> NodeRef {
        Self::with_link_factory(body, Arc::new(|link: &Arc<Link>| SceneLink::new(link)))
    }

    pub fn with_link_factory(body: Arc<Body>, factory: SceneLinkFactory) -> NodeRef {
        let scene_link_group = NodeRef::new(SceneGroup::new());
        let node = NodeRef::new(SceneBody {
            name: body.name().to_string(),
            children: Children::new(),
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
            body,
            scene_link_group: scene_link_group.clone(),
            scene_links: Vec::new(),
            scene_devices: Vec::new(),
            scene_link_factory: factory,
        });
        node.add_child(&scene_link_group);
        Self::update_model(&node);
        node
    }

    pub fn body(&self) -> &Arc<Body> {
        &self.body
    }

    pub fn scene_link(node: &NodeRef, index: usize) -> Option<NodeRef> {
        node.downcast_read::<SceneBody>()
            .and_then(|body| body.scene_links.get(index).cloned())
    }

    pub fn scene_links(node: &NodeRef) -> Vec<NodeRef> {
        node.downcast_read::<SceneBody>()
            .map_or_else(Vec::new, |body| body.scene_links.clone())
    }

    pub fn scene_device_count(node: &NodeRef) -> usize {
        node.downcast_read::<SceneBody>()
            .map_or(0, |body| body.scene_devices.len())
    }

    /// Rebuilds the scene links and scene devices from the current kinematic
    /// model. Call when the model's structure changed; per-frame pose and
    /// device updates mutate existing nodes instead.
    pub fn update_model(node: &NodeRef) {
        let (body, scene_link_group) = {
            let Some(scene_body) = node.downcast_read::<SceneBody>() else {
                return;
            };
            (scene_body.body.clone(), scene_body.scene_link_group.clone())
        };

        node.set_name(body.name());
        scene_link_group.clear_children();
        if let Some(mut scene_body) = node.downcast_write::<SceneBody>() {
            scene_body.scene_links.clear();
            scene_body.scene_devices.clear();
        }

        // One scene link per kinematic link, in link-index order; device
        // lookups below index directly into this sequence.
        let scene_links: Vec<NodeRef> = {
            let Some(scene_body) = node.downcast_read::<SceneBody>() else {
                return;
            };
            body.links()
                .iter()
                .map(|link| (scene_body.scene_link_factory)(link))
                .collect()
        };
        for scene_link in &scene_links {
            scene_link_group.add_child(scene_link);
        }

        let mut scene_devices = Vec::new();
        for device in body.devices() {
            let Some(scene_device) = SceneDevice::create(device) else {
                continue;
            };
            match scene_links.get(device.link_index()) {
                Some(scene_link) => {
                    SceneLink::add_scene_device(scene_link, &scene_device);
                    scene_devices.push(scene_device);
                }
                None => {
                    tracing::warn!(
                        "Device '{}' references link index {} outside the model",
                        device.name(),
                        device.link_index()
                    );
                }
            }
        }

        if let Some(mut scene_body) = node.downcast_write::<SceneBody>() {
            scene_body.scene_links = scene_links;
            scene_body.scene_devices = scene_devices;
        }

        Self::update_link_positions(node);
        Self::update_scene_devices(node, 0.0);
        node.notify_update(UpdateFlags::REMOVED | UpdateFlags::ADDED | UpdateFlags::MODIFIED);
    }

    /// Bulk pose sync: copies every kinematic link's pose into its scene
    /// link without per-link notifications.
    pub fn update_link_positions(node: &NodeRef) {
        for scene_link in Self::scene_links(node) {
            SceneLink::update_position(&scene_link);
        }
    }

    /// Pose sync emitting a per-link notification, for playback where graph
    /// observers repaint on every step.
    pub fn update_link_positions_notifying(node: &NodeRef, flags: UpdateFlags) {
        for scene_link in Self::scene_links(node) {
            SceneLink::update_position(&scene_link);
            scene_link.notify_update(flags);
        }
    }

    /// Deep-clones every link's shapes, for a duplicated body that must not
    /// share mutable shape state with the original.
    pub fn clone_shapes(node: &NodeRef, clone_map: &mut CloneMap) {
        for scene_link in Self::scene_links(node) {
            SceneLink::clone_shapes(&scene_link, clone_map);
        }
    }

    /// The scene device mirroring `device`, located through its owning
    /// link's index.
    pub fn scene_device(node: &NodeRef, device: &Arc<dyn Device>) -> Option<NodeRef> {
        let scene_link = Self::scene_link(node, device.link_index())?;
        SceneLink::scene_device(&scene_link, device)
    }

    pub fn set_device_update_connections(node: &NodeRef, on: bool) {
        let scene_devices = node
            .downcast_read::<SceneBody>()
            .map_or_else(Vec::new, |body| body.scene_devices.clone());
        for scene_device in scene_devices {
            SceneDevice::set_scene_update_connection(&scene_device, on);
        }
    }

    /// Refreshes every device visual from its device state at `time`.
    pub fn update_scene_devices(node: &NodeRef, time: f64) {
        let scene_devices = node
            .downcast_read::<SceneBody>()
            .map_or_else(Vec::new, |body| body.scene_devices.clone());
        for scene_device in scene_devices {
            if let Some(sdev) = scene_device.downcast_read::<SceneDevice>() {
                sdev.update_scene(time);
            }
        }
    }

    /// Applies one transparency value to every link, batching the observer
    /// traffic into a single body-level notification.
    pub fn set_transparency(node: &NodeRef, transparency: f32) {
        for scene_link in Self::scene_links(node) {
            SceneLink::set_transparency(&scene_link, transparency, false);
        }
        node.notify_update(UpdateFlags::MODIFIED);
    }

    pub fn make_transparent(node: &NodeRef, transparency: f32) {
        Self::set_transparency(node, transparency);
    }
}

impl TransformNode for SceneBody {
    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn translation(&self) -> Vec3 {
        self.translation
    }
}

impl SceneNode for SceneBody {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn children(&self) -> Option<&Children> {
        Some(&self.children)
    }

    fn children_mut(&mut self) -> Option<&mut Children> {
        Some(&mut self.children)
    }

    fn as_transform(&self) -> Option<&dyn TransformNode> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_node(&self, map: &mut CloneMap) -> NodeRef {
        let clone = NodeRef::new(SceneBody {
            name: self.name.clone(),
            children: Children::new(),
            rotation: self.rotation,
            translation: self.translation,
            body: self.body.clone(),
            scene_link_group: map.get_clone(&self.scene_link_group),
            scene_links: self
                .scene_links
                .iter()
                .map(|link| map.get_clone(link))
                .collect(),
            scene_devices: self
                .scene_devices
                .iter()
                .map(|sdev| map.get_clone(sdev))
                .collect(),
            scene_link_factory: self.scene_link_factory.clone(),
        });
        for child in self.children.iter() {
            let child_clone = map.get_clone(child);
            clone.add_child(&child_clone);
        }
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rsg_core::{MeshData, generate_box_mesh, generate_cylinder_mesh};
    use rsg_render::DrawListRenderer;

    use crate::device::{LightDevice, register_light_device_visual};

    struct TestRig {
        body: Arc<Body>,
        body_node: NodeRef,
        device: Arc<dyn Device>,
        base_visual_mesh: Arc<MeshData>,
        arm_visual_mesh: Arc<MeshData>,
        arm_collision_mesh: Arc<MeshData>,
    }

    /// Two-link body: link 0 has a visual-only shape, link 1 has distinct
    /// visual and collision shapes plus one light device.
    fn rig() -> TestRig {
        register_light_device_visual();

        let base_visual_mesh = Arc::new(generate_box_mesh(Vec3::new(0.2, 0.2, 0.1)));
        let arm_visual_mesh = Arc::new(generate_cylinder_mesh(0.05, 0.5, 16));
        let arm_collision_mesh = Arc::new(generate_box_mesh(Vec3::new(0.12, 0.12, 0.5)));

        let mut body = Body::new("test_robot");
        body.add_link(Link::new("base").with_visual_shape(NodeRef::new(
            rsg_core::SceneShape::new(base_visual_mesh.clone()),
        )));
        body.add_link(
            Link::new("arm")
                .with_parent(0)
                .with_visual_shape(NodeRef::new(rsg_core::SceneShape::new(
                    arm_visual_mesh.clone(),
                )))
                .with_collision_shape(NodeRef::new(rsg_core::SceneShape::new(
                    arm_collision_mesh.clone(),
                ))),
        );
        let light: Arc<dyn Device> = Arc::new(LightDevice::new("lamp", 1));
        body.add_device(light.clone());

        let body = Arc::new(body);
        let body_node = SceneBody::new(body.clone());
        TestRig {
            body,
            body_node,
            device: light,
            base_visual_mesh,
            arm_visual_mesh,
            arm_collision_mesh,
        }
    }

    fn render(rig: &TestRig, visibility_mask: Option<i32>) -> Vec<rsg_render::DrawItem> {
        let mut functions = DrawListRenderer::standard_functions();
        install_rendering_functions(&mut functions);
        let mut renderer = DrawListRenderer::new();
        if let Some(mask) = visibility_mask {
            renderer.set_property(PropertyKey::new(COLLISION_MODEL_VISIBILITY), mask);
        }
        renderer.render_scene(&functions, &rig.body_node)
    }

    fn count_items(items: &[rsg_render::DrawItem], mesh: &Arc<MeshData>) -> usize {
        items
            .iter()
            .filter(|item| Arc::ptr_eq(&item.mesh, mesh))
            .count()
    }

    #[test]
    fn test_update_model_builds_one_scene_link_per_link() {
        let rig = rig();
        let scene_links = SceneBody::scene_links(&rig.body_node);

        assert_eq!(scene_links.len(), rig.body.link_count());
        for (index, scene_link) in scene_links.iter().enumerate() {
            assert_eq!(scene_link.name(), rig.body.link(index).unwrap().name());
        }
    }

    #[test]
    fn test_scene_device_attached_to_owning_link() {
        let rig = rig();

        assert_eq!(SceneBody::scene_device_count(&rig.body_node), 1);
        let scene_device = SceneBody::scene_device(&rig.body_node, &rig.device).unwrap();

        // The device node hangs under link 1's device group.
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let from_link = SceneLink::scene_device(&arm, &rig.device).unwrap();
        assert!(NodeRef::ptr_eq(&scene_device, &from_link));

        let base = SceneBody::scene_link(&rig.body_node, 0).unwrap();
        assert!(SceneLink::scene_device(&base, &rig.device).is_none());
    }

    #[test]
    fn test_clone_shapes_is_idempotent() {
        let rig = rig();
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let visual_before = SceneLink::visual_shape(&arm).unwrap();

        let mut map = CloneMap::new();
        SceneBody::clone_shapes(&rig.body_node, &mut map);
        let visual_cloned = SceneLink::visual_shape(&arm).unwrap();
        assert!(!NodeRef::ptr_eq(&visual_before, &visual_cloned));

        // Second invocation keeps the shape identities and stays silent.
        let main = SceneLink::main_shape_group(&arm).unwrap();
        let version = main.updated().version();
        let mut map = CloneMap::new();
        SceneBody::clone_shapes(&rig.body_node, &mut map);
        assert!(NodeRef::ptr_eq(
            &visual_cloned,
            &SceneLink::visual_shape(&arm).unwrap()
        ));
        assert_eq!(main.updated().version(), version);
    }

    #[test]
    fn test_clone_shapes_preserves_aliasing() {
        let mut body = Body::new("aliased");
        let shared = NodeRef::new(rsg_core::SceneShape::new(Arc::new(generate_box_mesh(
            Vec3::ONE,
        ))));
        body.add_link(Link::new("base").with_shape(shared));
        let body_node = SceneBody::new(Arc::new(body));
        let link = SceneBody::scene_link(&body_node, 0).unwrap();

        let mut map = CloneMap::new();
        SceneBody::clone_shapes(&body_node, &mut map);

        let visual = SceneLink::visual_shape(&link).unwrap();
        let collision = SceneLink::collision_shape(&link).unwrap();
        assert!(NodeRef::ptr_eq(&visual, &collision));
    }

    #[test]
    fn test_insert_then_remove_effect_group_restores_structure() {
        let rig = rig();
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let main = SceneLink::main_shape_group(&arm).unwrap();
        let top_before = SceneLink::top_shape_group(&arm).unwrap();
        assert!(NodeRef::ptr_eq(&top_before, &main));

        let effect = NodeRef::new(TransparentGroup::new(0.3));
        SceneLink::insert_effect_group(&arm, &effect, true);

        assert!(NodeRef::ptr_eq(
            &SceneLink::top_shape_group(&arm).unwrap(),
            &effect
        ));
        assert!(arm.contains_child(&effect));
        assert!(!arm.contains_child(&main));
        assert!(effect.contains_child(&main));

        assert!(SceneLink::remove_effect_group(&arm, &effect, true));
        assert!(NodeRef::ptr_eq(
            &SceneLink::top_shape_group(&arm).unwrap(),
            &main
        ));
        assert!(arm.contains_child(&main));
        assert!(!arm.contains_child(&effect));
        assert_eq!(effect.child_count(), 0);
    }

    #[test]
    fn test_base_shape_group_is_not_removable() {
        let rig = rig();
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let main = SceneLink::main_shape_group(&arm).unwrap();

        assert!(!SceneLink::remove_effect_group(&arm, &main, true));
        assert!(arm.contains_child(&main));
    }

    #[test]
    fn test_removing_middle_effect_group_promotes_first_group_child() {
        let rig = rig();
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let main = SceneLink::main_shape_group(&arm).unwrap();

        let inner = NodeRef::new(TransparentGroup::new(0.2));
        let outer = NodeRef::new(TransparentGroup::new(0.4));
        SceneLink::insert_effect_group(&arm, &inner, false);
        SceneLink::insert_effect_group(&arm, &outer, false);
        // Chain: arm -> outer -> inner -> main.

        assert!(SceneLink::remove_effect_group(&arm, &inner, false));
        // Inner's group child (the shape group) moved up under outer.
        assert!(outer.contains_child(&main));
        assert!(NodeRef::ptr_eq(
            &SceneLink::top_shape_group(&arm).unwrap(),
            &outer
        ));

        assert!(SceneLink::remove_effect_group(&arm, &outer, false));
        assert!(arm.contains_child(&main));
        assert!(NodeRef::ptr_eq(
            &SceneLink::top_shape_group(&arm).unwrap(),
            &main
        ));
    }

    #[test]
    fn test_transparency_wrapper_present_only_when_transparent() {
        let rig = rig();
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let main = SceneLink::main_shape_group(&arm).unwrap();

        SceneLink::set_transparency(&arm, 0.5, true);
        assert_eq!(SceneLink::transparency(&arm), 0.5);
        let top = SceneLink::top_shape_group(&arm).unwrap();
        assert!(!NodeRef::ptr_eq(&top, &main));

        SceneLink::set_transparency(&arm, 0.0, true);
        assert_eq!(SceneLink::transparency(&arm), 0.0);
        assert!(NodeRef::ptr_eq(
            &SceneLink::top_shape_group(&arm).unwrap(),
            &main
        ));

        // Repeated toggling must not stack wrappers.
        SceneLink::set_transparency(&arm, 0.7, true);
        SceneLink::set_transparency(&arm, 0.0, true);
        SceneLink::set_transparency(&arm, 0.2, true);
        let wrappers = arm
            .children()
            .iter()
            .filter(|child| child.is::<TransparentGroup>())
            .count();
        assert_eq!(wrappers, 1);
        assert_eq!(SceneLink::transparency(&arm), 0.2);
    }

    #[test]
    fn test_visibility_mask_gates_shape_dispatch() {
        let rig = rig();

        // Default mask (1): visual shapes only, collision never dispatched.
        let items = render(&rig, None);
        assert_eq!(count_items(&items, &rig.base_visual_mesh), 1);
        assert_eq!(count_items(&items, &rig.arm_visual_mesh), 1);
        assert_eq!(count_items(&items, &rig.arm_collision_mesh), 0);

        // Mask 3: both visual and collision shapes.
        let items = render(&rig, Some(3));
        assert_eq!(count_items(&items, &rig.arm_visual_mesh), 1);
        assert_eq!(count_items(&items, &rig.arm_collision_mesh), 1);

        // Mask 2: collision shapes only.
        let items = render(&rig, Some(2));
        assert_eq!(count_items(&items, &rig.base_visual_mesh), 0);
        assert_eq!(count_items(&items, &rig.arm_visual_mesh), 0);
        assert_eq!(count_items(&items, &rig.arm_collision_mesh), 1);
    }

    #[test]
    fn test_invisible_link_renders_nothing() {
        let rig = rig();
        let base = SceneBody::scene_link(&rig.body_node, 0).unwrap();
        SceneLink::set_visible(&base, false);

        let items = render(&rig, Some(3));
        assert_eq!(count_items(&items, &rig.base_visual_mesh), 0);
        assert_eq!(count_items(&items, &rig.arm_visual_mesh), 1);
    }

    #[test]
    fn test_collision_updates_forwarded_only_when_distinct() {
        let rig = rig();

        // Distinct shapes: the collision shape is not a graph child, so the
        // forwarding subscription must re-raise its updates.
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let arm_main = SceneLink::main_shape_group(&arm).unwrap();
        let collision = SceneLink::collision_shape(&arm).unwrap();
        let before = arm_main.updated().version();
        collision.notify_update(UpdateFlags::MODIFIED);
        assert_eq!(arm_main.updated().version(), before + 1);

        // Aliased shapes: the child path already delivers the update; a
        // forwarding subscription would double it.
        let mut body = Body::new("aliased");
        let shared = NodeRef::new(rsg_core::SceneShape::new(Arc::new(generate_box_mesh(
            Vec3::ONE,
        ))));
        body.add_link(Link::new("base").with_shape(shared.clone()));
        let body_node = SceneBody::new(Arc::new(body));
        let link = SceneBody::scene_link(&body_node, 0).unwrap();
        let main = SceneLink::main_shape_group(&link).unwrap();

        let before = main.updated().version();
        shared.notify_update(UpdateFlags::MODIFIED);
        assert_eq!(main.updated().version(), before + 1);
    }

    #[test]
    fn test_body_transparency_batches_notifications() {
        let rig = rig();
        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        let _connection = rig.body_node.on_updated(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        SceneBody::set_transparency(&rig.body_node, 0.5);

        assert_eq!(notifications.load(Ordering::SeqCst), 1);
        for scene_link in SceneBody::scene_links(&rig.body_node) {
            assert_eq!(SceneLink::transparency(&scene_link), 0.5);
        }
    }

    #[test]
    fn test_update_link_positions_tracks_kinematic_pose() {
        let rig = rig();
        let pose = (
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            Vec3::new(0.0, 0.0, 0.3),
        );
        rig.body.link(1).unwrap().set_pose(pose.0, pose.1);

        SceneBody::update_link_positions(&rig.body_node);

        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let scene_link = arm.downcast_read::<SceneLink>().unwrap();
        assert!((scene_link.translation() - pose.1).length() < 1e-6);
        assert!(scene_link.rotation().angle_between(pose.0) < 1e-6);
    }

    #[test]
    fn test_update_link_positions_notifying_emits_per_link() {
        let rig = rig();
        let arm = SceneBody::scene_link(&rig.body_node, 1).unwrap();
        let before = arm.updated().version();

        SceneBody::update_link_positions_notifying(&rig.body_node, UpdateFlags::MODIFIED);
        assert_eq!(arm.updated().version(), before + 1);
    }

    #[test]
    fn test_two_link_scenario() {
        let rig = rig();

        assert_eq!(SceneBody::scene_links(&rig.body_node).len(), 2);
        assert!(SceneBody::scene_device(&rig.body_node, &rig.device).is_some());

        SceneBody::set_transparency(&rig.body_node, 0.5);
        SceneBody::update_link_positions(&rig.body_node);

        // Pose sync must not disturb the transparency wrappers.
        for scene_link in SceneBody::scene_links(&rig.body_node) {
            assert_eq!(SceneLink::transparency(&scene_link), 0.5);
        }

        SceneBody::set_transparency(&rig.body_node, 0.0);
        for scene_link in SceneBody::scene_links(&rig.body_node) {
            assert_eq!(SceneLink::transparency(&scene_link), 0.0);
            let main = SceneLink::main_shape_group(&scene_link).unwrap();
            assert!(NodeRef::ptr_eq(
                &SceneLink::top_shape_group(&scene_link).unwrap(),
                &main
            ));
        }
    }
}
