//! Robot description import.
//!
//! Builds a [`Body`] from a URDF file: links in traversal order (root
//! first), visual and collision shape nodes from mesh files or description
//! primitives, and link poses at the zero joint configuration. When a link's
//! visual and collision entries name the same geometry, one shape node is
//! shared between both roles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{EulerRot, Quat, Vec3};

use rsg_core::{
    NodeRef, SceneGroup, SceneLoader, SceneShape, SceneTransform, StlSceneLoader,
    generate_box_mesh, generate_cylinder_mesh, generate_sphere_mesh,
};

use crate::body::{Body, Link};

/// Import options for robot description loading.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Base directory for resolving relative mesh paths.
    pub base_dir: PathBuf,
    /// Uniform scale applied to imported meshes.
    pub mesh_scale: f32,
    /// Default shape color if no material is specified.
    pub default_color: [f32; 4],
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            mesh_scale: 1.0,
            default_color: [0.7, 0.7, 0.7, 1.0],
        }
    }
}

/// Errors that can occur during robot description import.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImportError {
    #[error("Failed to parse robot description: {0}")]
    Parse(String),

    #[error("Empty robot description: no links defined")]
    EmptyDescription,

    #[error("Joint '{joint}' references unknown link: {link}")]
    LinkNotFound { joint: String, link: String },

    #[error("Mesh file not found: {path}")]
    MeshNotFound { path: String },

    #[error("Failed to load mesh '{path}': {reason}")]
    MeshLoad { path: String, reason: String },

    #[error("Unsupported mesh format: {0} (only STL is supported)")]
    UnsupportedMeshFormat(String),

    #[error("package:// URIs are not supported: {0}")]
    PackageUriNotSupported(String),
}

/// Import a URDF file and build a [`Body`].
pub fn import_urdf(urdf_path: &Path, options: &ImportOptions) -> Result<Body, ImportError> {
    let robot =
        urdf_rs::read_file(urdf_path).map_err(|e| ImportError::Parse(e.to_string()))?;

    // Resolve meshes next to the description file unless told otherwise.
    let base_dir = if options.base_dir == Path::new(".") {
        urdf_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        options.base_dir.clone()
    };

    build_body(&robot, &base_dir, options)
}

/// Import a URDF document from a string.
pub fn import_urdf_str(text: &str, options: &ImportOptions) -> Result<Body, ImportError> {
    let robot = urdf_rs::read_from_string(text).map_err(|e| ImportError::Parse(e.to_string()))?;
    build_body(&robot, &options.base_dir, options)
}

fn build_body(
    robot: &urdf_rs::Robot,
    base_dir: &Path,
    options: &ImportOptions,
) -> Result<Body, ImportError> {
    if robot.links.is_empty() {
        return Err(ImportError::EmptyDescription);
    }

    let material_colors: HashMap<String, [f32; 4]> = robot
        .materials
        .iter()
        .filter_map(|m| m.color.as_ref().map(|c| (m.name.clone(), rgba(c))))
        .collect();

    let link_names: HashSet<&str> = robot.links.iter().map(|l| l.name.as_str()).collect();
    let mut joint_for_child: HashMap<&str, &urdf_rs::Joint> = HashMap::new();
    let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for joint in &robot.joints {
        for link in [&joint.parent.link, &joint.child.link] {
            if !link_names.contains(link.as_str()) {
                return Err(ImportError::LinkNotFound {
                    joint: joint.name.clone(),
                    link: link.clone(),
                });
            }
        }
        joint_for_child.insert(joint.child.link.as_str(), joint);
        children_of
            .entry(joint.parent.link.as_str())
            .or_default()
            .push(joint.child.link.as_str());
    }

    let root = robot
        .links
        .iter()
        .map(|l| l.name.as_str())
        .find(|name| !joint_for_child.contains_key(name))
        .ok_or_else(|| ImportError::Parse("no root link".to_string()))?;

    let urdf_links: HashMap<&str, &urdf_rs::Link> =
        robot.links.iter().map(|l| (l.name.as_str(), l)).collect();

    let mut body = Body::new(robot.name.clone());
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    let mut world_poses: Vec<(Quat, Vec3)> = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(name) = queue.pop_front() {
        let urdf_link = urdf_links[name];

        // Pose at the zero joint configuration.
        let (parent_index, world_pose) = match joint_for_child.get(name) {
            Some(joint) => {
                let parent_index = index_of[joint.parent.link.as_str()];
                let (parent_rotation, parent_translation) = world_poses[parent_index];
                let (joint_rotation, joint_translation) = pose_parts(&joint.origin);
                (
                    Some(parent_index),
                    (
                        parent_rotation * joint_rotation,
                        parent_translation + parent_rotation * joint_translation,
                    ),
                )
            }
            None => (None, (Quat::IDENTITY, Vec3::ZERO)),
        };

        let visual = visual_node(urdf_link, &material_colors, base_dir, options)?;
        let collision = collision_node(urdf_link, visual.as_ref(), base_dir, options)?;

        let mut link = Link::new(name).with_pose(world_pose.0, world_pose.1);
        if let Some(parent_index) = parent_index {
            link = link.with_parent(parent_index);
        }
        if let Some(visual) = visual {
            link = link.with_visual_shape(visual);
        }
        if let Some(collision) = collision {
            link = link.with_collision_shape(collision);
        }
        let index = body.add_link(link);
        index_of.insert(name, index);
        world_poses.push(world_pose);

        for child in children_of.get(name).into_iter().flatten() {
            queue.push_back(*child);
        }
    }

    tracing::info!(
        "Imported robot '{}': {} links",
        body.name(),
        body.link_count()
    );
    Ok(body)
}

fn visual_node(
    link: &urdf_rs::Link,
    materials: &HashMap<String, [f32; 4]>,
    base_dir: &Path,
    options: &ImportOptions,
) -> Result<Option<NodeRef>, ImportError> {
    let mut parts = Vec::new();
    for visual in &link.visual {
        let color = visual
            .material
            .as_ref()
            .and_then(|m| {
                m.color
                    .as_ref()
                    .map(rgba)
                    .or_else(|| materials.get(&m.name).copied())
            })
            .unwrap_or(options.default_color);
        let node = geometry_node(&visual.geometry, color, base_dir, options)?;
        parts.push(placed(node, &visual.origin));
    }
    Ok(combine(parts, &link.name))
}

fn collision_node(
    link: &urdf_rs::Link,
    visual: Option<&NodeRef>,
    base_dir: &Path,
    options: &ImportOptions,
) -> Result<Option<NodeRef>, ImportError> {
    // A collision entry naming the visual geometry shares its shape node.
    if let Some(visual) = visual
        && let [v] = link.visual.as_slice()
        && let [c] = link.collision.as_slice()
        && same_geometry(&v.geometry, &c.geometry)
        && same_pose(&v.origin, &c.origin)
    {
        return Ok(Some(visual.clone()));
    }

    let mut parts = Vec::new();
    for collision in &link.collision {
        let node = geometry_node(&collision.geometry, options.default_color, base_dir, options)?;
        parts.push(placed(node, &collision.origin));
    }
    Ok(combine(parts, &link.name))
}

fn geometry_node(
    geometry: &urdf_rs::Geometry,
    color: [f32; 4],
    base_dir: &Path,
    options: &ImportOptions,
) -> Result<NodeRef, ImportError> {
    let node = match geometry {
        urdf_rs::Geometry::Box { size } => shape_node(
            generate_box_mesh(Vec3::new(
                size.0[0] as f32,
                size.0[1] as f32,
                size.0[2] as f32,
            )),
            color,
        ),
        urdf_rs::Geometry::Cylinder { radius, length } => shape_node(
            generate_cylinder_mesh(*radius as f32, *length as f32, 32),
            color,
        ),
        urdf_rs::Geometry::Capsule { radius, length } => {
            tracing::warn!("Capsule geometry approximated by a cylinder");
            shape_node(
                generate_cylinder_mesh(*radius as f32, *length as f32, 32),
                color,
            )
        }
        urdf_rs::Geometry::Sphere { radius } => {
            shape_node(generate_sphere_mesh(*radius as f32, 24, 12), color)
        }
        urdf_rs::Geometry::Mesh { filename, scale } => {
            let path = resolve_mesh_path(filename, base_dir)?;
            let uniform_scale = match scale {
                Some(s) => {
                    if s.0[0] != s.0[1] || s.0[1] != s.0[2] {
                        tracing::warn!(
                            "Non-uniform mesh scale on '{}' reduced to its x component",
                            filename
                        );
                    }
                    s.0[0] as f32
                }
                None => 1.0,
            };
            let loader = StlSceneLoader::with_scale(options.mesh_scale * uniform_scale);
            let node = loader.load(&path).map_err(|e| ImportError::MeshLoad {
                path: filename.clone(),
                reason: e.to_string(),
            })?;
            if let Some(mut shape) = node.downcast_write::<SceneShape>() {
                shape.set_color(color);
            }
            node
        }
    };
    Ok(node)
}

fn resolve_mesh_path(filename: &str, base_dir: &Path) -> Result<PathBuf, ImportError> {
    if filename.starts_with("package://") {
        return Err(ImportError::PackageUriNotSupported(filename.to_string()));
    }
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    if extension.as_deref() != Some("stl") {
        return Err(ImportError::UnsupportedMeshFormat(filename.to_string()));
    }

    let path = Path::new(filename);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    if !path.exists() {
        return Err(ImportError::MeshNotFound {
            path: path.to_string_lossy().to_string(),
        });
    }
    Ok(path)
}

fn shape_node(mesh: rsg_core::MeshData, color: [f32; 4]) -> NodeRef {
    NodeRef::new(SceneShape::new(Arc::new(mesh)).with_color(color))
}

/// Wraps `node` in a transform when the description places it away from the
/// link origin.
fn placed(node: NodeRef, origin: &urdf_rs::Pose) -> NodeRef {
    if origin.xyz.0 == [0.0; 3] && origin.rpy.0 == [0.0; 3] {
        return node;
    }
    let (rotation, translation) = pose_parts(origin);
    let mut transform = SceneTransform::new();
    transform.set_rotation(rotation);
    transform.set_translation(translation);
    let wrapper = NodeRef::new(transform);
    wrapper.add_child(&node);
    wrapper
}

fn combine(mut parts: Vec<NodeRef>, link_name: &str) -> Option<NodeRef> {
    match parts.len() {
        0 => None,
        1 => {
            let node = parts.remove(0);
            if node.name().is_empty() {
                node.set_name(link_name);
            }
            Some(node)
        }
        _ => {
            let group = NodeRef::new(SceneGroup::named(link_name));
            for part in &parts {
                group.add_child(part);
            }
            Some(group)
        }
    }
}

fn pose_parts(pose: &urdf_rs::Pose) -> (Quat, Vec3) {
    let rotation = Quat::from_euler(
        EulerRot::XYZ,
        pose.rpy.0[0] as f32,
        pose.rpy.0[1] as f32,
        pose.rpy.0[2] as f32,
    );
    let translation = Vec3::new(
        pose.xyz.0[0] as f32,
        pose.xyz.0[1] as f32,
        pose.xyz.0[2] as f32,
    );
    (rotation, translation)
}

fn same_geometry(a: &urdf_rs::Geometry, b: &urdf_rs::Geometry) -> bool {
    use urdf_rs::Geometry::*;
    match (a, b) {
        (Box { size: a }, Box { size: b }) => a.0 == b.0,
        (
            Cylinder {
                radius: ra,
                length: la,
            },
            Cylinder {
                radius: rb,
                length: lb,
            },
        ) => ra == rb && la == lb,
        (
            Capsule {
                radius: ra,
                length: la,
            },
            Capsule {
                radius: rb,
                length: lb,
            },
        ) => ra == rb && la == lb,
        (Sphere { radius: a }, Sphere { radius: b }) => a == b,
        (
            Mesh {
                filename: fa,
                scale: sa,
            },
            Mesh {
                filename: fb,
                scale: sb,
            },
        ) => fa == fb && sa.as_ref().map(|s| s.0) == sb.as_ref().map(|s| s.0),
        _ => false,
    }
}

fn same_pose(a: &urdf_rs::Pose, b: &urdf_rs::Pose) -> bool {
    a.xyz.0 == b.xyz.0 && a.rpy.0 == b.rpy.0
}

fn rgba(color: &urdf_rs::Color) -> [f32; 4] {
    [
        color.rgba.0[0] as f32,
        color.rgba.0[1] as f32,
        color.rgba.0[2] as f32,
        color.rgba.0[3] as f32,
    ]
}
