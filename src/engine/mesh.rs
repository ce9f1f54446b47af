// Collision-proxy geometry: quad and box builders, bounds and segment tests.
//
// Proxies are plain indexed triangle lists in local space. They are built on
// the decode task and only read afterwards.

use glam::{Mat4, Vec3};

const EPSILON: f32 = 1e-10;

// ============================================================================
// PROXY BUILDERS
// ============================================================================

/// Two-triangle quad spanning ±extent.x / ±extent.y at height extent.z.
pub fn plane_quad(extent: Vec3) -> (Vec<Vec3>, Vec<u32>) {
    let vertices = vec![
        extent,
        Vec3::new(extent.x, -extent.y, extent.z),
        Vec3::new(-extent.x, -extent.y, extent.z),
        Vec3::new(-extent.x, extent.y, extent.z),
    ];
    (vertices, vec![0, 2, 1, 2, 0, 3])
}

/// Closed box mesh (8 vertices, 12 triangles) around `center`.
pub fn bounding_box_mesh(center: Vec3, half_extents: Vec3) -> (Vec<Vec3>, Vec<u32>) {
    let (x, y, z) = (half_extents.x, half_extents.y, half_extents.z);
    let vertices = [
        Vec3::new(-x, -y, -z),
        Vec3::new(x, -y, -z),
        Vec3::new(x, y, -z),
        Vec3::new(-x, y, -z),
        Vec3::new(-x, -y, z),
        Vec3::new(x, -y, z),
        Vec3::new(x, y, z),
        Vec3::new(-x, y, z),
    ]
    .into_iter()
    .map(|corner| center + corner)
    .collect();
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1,  0, 3, 2,  // -Z
        4, 5, 6,  4, 6, 7,  // +Z
        0, 1, 5,  0, 5, 4,  // -Y
        3, 7, 6,  3, 6, 2,  // +Y
        0, 4, 7,  0, 7, 3,  // -X
        1, 2, 6,  1, 6, 5,  // +X
    ];
    (vertices, indices)
}

// ============================================================================
// BOUNDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Bounds of a point set. `None` for an empty set.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Aabb { min: first, max: first }, |b, p| Aabb {
            min: b.min.min(p),
            max: b.max.max(p),
        }))
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Axis-aligned bounds of this box after an arbitrary affine transform.
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| m.transform_point3(c));
        // Eight corners are never empty.
        Aabb::from_points(corners).unwrap_or(*self)
    }

    /// Slab test of the segment `start + t * delta`, t in [0, 1].
    /// Returns the entry parameter (0 when `start` is inside).
    pub fn segment_hit_t(&self, start: Vec3, delta: Vec3) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;
        for axis in 0..3 {
            let (o, d, lo, hi) = (start[axis], delta[axis], self.min[axis], self.max[axis]);
            if d.abs() < EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let (mut t0, mut t1) = ((lo - o) * inv, (hi - o) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

// ============================================================================
// TRIANGLE TEST
// ============================================================================

/// Möller–Trumbore intersection of the segment `start + t * delta` (t in [0, 1])
/// with triangle `abc`, accepting both windings.
/// Returns `t` and the unit triangle normal facing back towards `start`.
pub fn segment_triangle(start: Vec3, delta: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<(f32, Vec3)> {
    let e1 = b - a;
    let e2 = c - a;
    let p = delta.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = start - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = delta.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let mut normal = e1.cross(e2).normalize_or_zero();
    if normal.dot(delta) > 0.0 {
        normal = -normal;
    }
    Some((t, normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_covers_extent() {
        let (v, i) = plane_quad(Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(v.len(), 4);
        assert_eq!(i, vec![0, 2, 1, 2, 0, 3]);
        let b = Aabb::from_points(v).unwrap();
        assert_eq!(b.min, Vec3::new(-2.0, -1.0, 0.0));
        assert_eq!(b.max, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn box_mesh_is_closed() {
        let (v, i) = bounding_box_mesh(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(0.5));
        assert_eq!(v.len(), 8);
        assert_eq!(i.len(), 36);
        // Every edge of a closed mesh is shared by exactly two triangles.
        let mut edges = std::collections::HashMap::new();
        for tri in i.chunks_exact(3) {
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        assert!(edges.values().all(|&n| n == 2));
    }

    #[test]
    fn segment_hits_flat_box() {
        let b = Aabb { min: Vec3::new(-1.0, -1.0, 0.0), max: Vec3::new(1.0, 1.0, 0.0) };
        let t = b.segment_hit_t(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -10.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-6);
        assert!(b.segment_hit_t(Vec3::new(3.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -10.0)).is_none());
        // Segment stops short of the box.
        assert!(b.segment_hit_t(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn triangle_hit_reports_facing_normal() {
        let (a, b, c) = (Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        let (t, n) = segment_triangle(Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, -4.0), a, b, c).unwrap();
        assert!((t - 0.5).abs() < 1e-6);
        assert!((n - Vec3::Z).length() < 1e-6);
        // Same triangle approached from below flips the normal.
        let (_, n) = segment_triangle(Vec3::new(0.0, 0.0, -2.0), Vec3::new(0.0, 0.0, 4.0), a, b, c).unwrap();
        assert!((n + Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn degenerate_triangle_never_hits() {
        let z = Vec3::ZERO;
        assert!(segment_triangle(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -2.0), z, z, z).is_none());
    }
}
