// Line-segment collision against a tracked geometry's proxy mesh.
//
// Proxies live in the geometry's local space; the caller supplies the current
// local-to-world transform so poses can change without rebuilding the proxy.

use glam::{Mat4, Vec3};

use super::mesh::{self, Aabb};

/// Closest intersection of a segment with a proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub point: Vec3,
    /// Unit normal facing the segment start.
    pub normal: Vec3,
    /// World-space distance from the segment start.
    pub distance: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedGeometryCollision {
    vertices: Vec<Vec3>,
    indices: Vec<u32>,
    local_bounds: Option<Aabb>,
}

impl TrackedGeometryCollision {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let local_bounds = Aabb::from_points(vertices.iter().copied());
        Self {
            vertices,
            indices,
            local_bounds,
        }
    }

    /// Quad proxy for a plane of the given half extent.
    pub fn for_plane(extent: Vec3) -> Self {
        let (vertices, indices) = mesh::plane_quad(extent);
        Self::new(vertices, indices)
    }

    /// Closed box proxy around `center`.
    pub fn for_bounding_box(center: Vec3, half_extents: Vec3) -> Self {
        let (vertices, indices) = mesh::bounding_box_mesh(center, half_extents);
        Self::new(vertices, indices)
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Test the segment `start..end` against the proxy placed by `mesh_to_world`.
    pub fn collides(&self, start: Vec3, end: Vec3, mesh_to_world: &Mat4) -> Option<Hit> {
        let bounds = self.local_bounds?;
        let delta = end - start;
        let length = delta.length();
        if length <= f32::EPSILON {
            return None;
        }
        bounds.transformed(mesh_to_world).segment_hit_t(start, delta)?;

        let world_vertex = |index: u32| {
            self.vertices
                .get(index as usize)
                .map(|v| mesh_to_world.transform_point3(*v))
        };

        let mut best: Option<(f32, Vec3)> = None;
        for tri in self.indices.chunks_exact(3) {
            let (Some(a), Some(b), Some(c)) = (world_vertex(tri[0]), world_vertex(tri[1]), world_vertex(tri[2])) else {
                continue;
            };
            if let Some((t, normal)) = mesh::segment_triangle(start, delta, a, b, c) {
                if best.is_none_or(|(best_t, _)| t < best_t) {
                    best = Some((t, normal));
                }
            }
        }

        best.map(|(t, normal)| Hit {
            point: start + delta * t,
            normal,
            distance: t * length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn plane_proxy_hit_distance_and_normal() {
        let proxy = TrackedGeometryCollision::for_plane(Vec3::new(1.0, 1.0, 0.0));
        let place = Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0));
        let hit = proxy
            .collides(Vec3::new(0.2, 0.1, 10.0), Vec3::new(0.2, 0.1, -10.0), &place)
            .unwrap();
        assert!((hit.distance - 8.0).abs() < 1e-4);
        assert!((hit.point - Vec3::new(0.2, 0.1, 2.0)).length() < 1e-4);
        assert!((hit.normal - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn transform_moves_proxy() {
        let proxy = TrackedGeometryCollision::for_plane(Vec3::new(1.0, 1.0, 0.0));
        let start = Vec3::new(5.2, 0.1, 10.0);
        let end = Vec3::new(5.2, 0.1, -10.0);
        assert!(proxy.collides(start, end, &Mat4::IDENTITY).is_none());
        let moved = Mat4::from_rotation_translation(Quat::IDENTITY, Vec3::new(5.0, 0.0, 0.0));
        assert!(proxy.collides(start, end, &moved).is_some());
    }

    #[test]
    fn box_proxy_reports_near_face() {
        let proxy = TrackedGeometryCollision::for_bounding_box(Vec3::ZERO, Vec3::ONE);
        let hit = proxy
            .collides(Vec3::new(-5.0, 0.5, 0.25), Vec3::new(5.0, 0.5, 0.25), &Mat4::IDENTITY)
            .unwrap();
        assert!((hit.distance - 4.0).abs() < 1e-4);
        assert!((hit.normal + Vec3::X).length() < 1e-5);
    }

    #[test]
    fn short_segment_misses() {
        let proxy = TrackedGeometryCollision::for_plane(Vec3::new(1.0, 1.0, 0.0));
        assert!(proxy.collides(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 1.0), &Mat4::IDENTITY).is_none());
    }

    #[test]
    fn out_of_range_indices_are_skipped() {
        let proxy = TrackedGeometryCollision::new(
            vec![Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
            vec![0, 1, 7, 0, 1, 2],
        );
        assert!(proxy.collides(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0), &Mat4::IDENTITY).is_some());
    }

    #[test]
    fn empty_proxy_never_collides() {
        let proxy = TrackedGeometryCollision::default();
        assert!(proxy.collides(Vec3::Z, -Vec3::Z, &Mat4::IDENTITY).is_none());
    }
}
