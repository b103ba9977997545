//! Scene loader boundary.
//!
//! Loaders convert asset files into scene nodes; the graph core never
//! interprets file contents itself. Diagnostics go through `tracing`.

use std::collections::HashMap;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use glam::Vec3;

use crate::mesh::MeshData;
use crate::node::{NodeRef, SceneNode};
use crate::shape::SceneShape;

/// Errors surfaced by scene loaders.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SceneLoadError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Converts a file into a scene node.
pub trait SceneLoader {
    fn load(&self, path: &Path) -> Result<NodeRef, SceneLoadError>;
}

/// STL mesh loader producing [`SceneShape`] nodes.
#[derive(Debug, Clone)]
pub struct StlSceneLoader {
    /// Uniform scale applied to loaded vertices (STL files carry no unit).
    pub scale: f32,
}

impl StlSceneLoader {
    pub fn new() -> Self {
        Self { scale: 1.0 }
    }

    pub fn with_scale(scale: f32) -> Self {
        Self { scale }
    }
}

impl Default for StlSceneLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneLoader for StlSceneLoader {
    fn load(&self, path: &Path) -> Result<NodeRef, SceneLoadError> {
        let file = std::fs::File::open(path).map_err(|e| SceneLoadError::Io(e.to_string()))?;
        let mut reader = BufReader::new(file);

        let stl = stl_io::read_stl(&mut reader).map_err(|e| SceneLoadError::Parse {
            path: path.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;

        let mesh = index_mesh(&stl, self.scale);
        tracing::debug!(
            "Loaded {:?}: {} vertices, {} triangles",
            path,
            mesh.vertices.len(),
            mesh.triangle_count()
        );

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed");
        let mut shape = SceneShape::new(Arc::new(mesh));
        shape.set_name(name);
        Ok(NodeRef::new(shape))
    }
}

/// Convert STL triangle soup to an indexed mesh with per-vertex normals
/// accumulated from the adjacent faces.
fn index_mesh(stl: &stl_io::IndexedMesh, scale: f32) -> MeshData {
    // Quantized position key for vertex welding.
    const PRECISION: f32 = 10000.0;

    let mut unique_vertices: Vec<[f32; 3]> = Vec::new();
    let mut accumulated_normals: Vec<Vec3> = Vec::new();
    let mut vertex_map: HashMap<[i32; 3], u32> = HashMap::new();
    let mut indices: Vec<u32> = Vec::new();

    for face in &stl.faces {
        let normal = Vec3::new(face.normal[0], face.normal[1], face.normal[2]);
        for &vertex_index in &face.vertices {
            let vertex = stl.vertices[vertex_index];
            let v = [
                vertex[0] * scale,
                vertex[1] * scale,
                vertex[2] * scale,
            ];
            let key = [
                (v[0] * PRECISION) as i32,
                (v[1] * PRECISION) as i32,
                (v[2] * PRECISION) as i32,
            ];

            let index = if let Some(&existing) = vertex_map.get(&key) {
                existing
            } else {
                let new_index = unique_vertices.len() as u32;
                unique_vertices.push(v);
                accumulated_normals.push(Vec3::ZERO);
                vertex_map.insert(key, new_index);
                new_index
            };
            accumulated_normals[index as usize] += normal;
            indices.push(index);
        }
    }

    MeshData {
        vertices: unique_vertices,
        normals: accumulated_normals
            .into_iter()
            .map(|n| n.normalize_or_zero().to_array())
            .collect(),
        indices,
    }
}
