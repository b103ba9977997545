//! Triangle mesh data and primitive generators.

use std::f32::consts::PI;

use glam::Vec3;

/// Indexed triangle mesh.
///
/// Vertices and normals are parallel per-vertex arrays; indices form
/// counter-clockwise triangles.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.vertices.iter();
        let first = Vec3::from(*iter.next()?);
        let mut min = first;
        let mut max = first;
        for v in iter {
            let v = Vec3::from(*v);
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }
}

/// Generate an axis-aligned box centered at the origin.
pub fn generate_box_mesh(size: Vec3) -> MeshData {
    let h = size * 0.5;
    let mut mesh = MeshData::new();

    // One quad per face so each vertex can carry the face normal.
    let faces: [(Vec3, [Vec3; 4]); 6] = [
        (
            Vec3::X,
            [
                Vec3::new(h.x, -h.y, -h.z),
                Vec3::new(h.x, h.y, -h.z),
                Vec3::new(h.x, h.y, h.z),
                Vec3::new(h.x, -h.y, h.z),
            ],
        ),
        (
            -Vec3::X,
            [
                Vec3::new(-h.x, h.y, -h.z),
                Vec3::new(-h.x, -h.y, -h.z),
                Vec3::new(-h.x, -h.y, h.z),
                Vec3::new(-h.x, h.y, h.z),
            ],
        ),
        (
            Vec3::Y,
            [
                Vec3::new(h.x, h.y, -h.z),
                Vec3::new(-h.x, h.y, -h.z),
                Vec3::new(-h.x, h.y, h.z),
                Vec3::new(h.x, h.y, h.z),
            ],
        ),
        (
            -Vec3::Y,
            [
                Vec3::new(-h.x, -h.y, -h.z),
                Vec3::new(h.x, -h.y, -h.z),
                Vec3::new(h.x, -h.y, h.z),
                Vec3::new(-h.x, -h.y, h.z),
            ],
        ),
        (
            Vec3::Z,
            [
                Vec3::new(-h.x, -h.y, h.z),
                Vec3::new(h.x, -h.y, h.z),
                Vec3::new(h.x, h.y, h.z),
                Vec3::new(-h.x, h.y, h.z),
            ],
        ),
        (
            -Vec3::Z,
            [
                Vec3::new(h.x, -h.y, -h.z),
                Vec3::new(-h.x, -h.y, -h.z),
                Vec3::new(-h.x, h.y, -h.z),
                Vec3::new(h.x, h.y, -h.z),
            ],
        ),
    ];

    for (normal, corners) in faces {
        let base = mesh.vertices.len() as u32;
        for corner in corners {
            mesh.vertices.push(corner.to_array());
            mesh.normals.push(normal.to_array());
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    mesh
}

/// Generate a UV sphere of the given radius centered at the origin.
pub fn generate_sphere_mesh(radius: f32, segments: u32, rings: u32) -> MeshData {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let mut mesh = MeshData::new();

    for ring in 0..=rings {
        let theta = PI * ring as f32 / rings as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for segment in 0..=segments {
            let phi = 2.0 * PI * segment as f32 / segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let normal = Vec3::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta);
            mesh.vertices.push((normal * radius).to_array());
            mesh.normals.push(normal.to_array());
        }
    }

    let stride = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            mesh.indices
                .extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    mesh
}

/// Generate a Z-axis-aligned cylinder centered at the origin.
pub fn generate_cylinder_mesh(radius: f32, length: f32, segments: u32) -> MeshData {
    let segments = segments.max(3);
    let half = length * 0.5;
    let mut mesh = MeshData::new();

    // Side quads.
    for segment in 0..=segments {
        let phi = 2.0 * PI * segment as f32 / segments as f32;
        let (sin_phi, cos_phi) = phi.sin_cos();
        let normal = Vec3::new(cos_phi, sin_phi, 0.0);
        mesh.vertices
            .push([radius * cos_phi, radius * sin_phi, -half]);
        mesh.normals.push(normal.to_array());
        mesh.vertices
            .push([radius * cos_phi, radius * sin_phi, half]);
        mesh.normals.push(normal.to_array());
    }
    for segment in 0..segments {
        let a = segment * 2;
        mesh.indices
            .extend_from_slice(&[a, a + 2, a + 1, a + 1, a + 2, a + 3]);
    }

    // Caps.
    for (z, normal) in [(-half, -Vec3::Z), (half, Vec3::Z)] {
        let center = mesh.vertices.len() as u32;
        mesh.vertices.push([0.0, 0.0, z]);
        mesh.normals.push(normal.to_array());
        for segment in 0..=segments {
            let phi = 2.0 * PI * segment as f32 / segments as f32;
            mesh.vertices
                .push([radius * phi.cos(), radius * phi.sin(), z]);
            mesh.normals.push(normal.to_array());
        }
        for segment in 0..segments {
            let a = center + 1 + segment;
            if z < 0.0 {
                mesh.indices.extend_from_slice(&[center, a + 1, a]);
            } else {
                mesh.indices.extend_from_slice(&[center, a, a + 1]);
            }
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_mesh_bounds_match_size() {
        let mesh = generate_box_mesh(Vec3::new(2.0, 4.0, 6.0));
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn test_sphere_mesh_vertices_on_radius() {
        let mesh = generate_sphere_mesh(2.0, 16, 8);
        for v in &mesh.vertices {
            let r = Vec3::from(*v).length();
            assert!((r - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_cylinder_mesh_within_bounds() {
        let mesh = generate_cylinder_mesh(0.5, 3.0, 12);
        let (min, max) = mesh.bounds().unwrap();
        assert!((min.z + 1.5).abs() < 1e-5);
        assert!((max.z - 1.5).abs() < 1e-5);
        assert!(max.x <= 0.5 + 1e-5);
    }
}
