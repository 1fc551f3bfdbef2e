//! Bounding volume hierarchy over triangle faces.
//!
//! Built once per mesh: a binary tree of axis-aligned boxes, median-split
//! on the longest axis of the centroid bounds. Traversal reports every
//! ray/triangle hit, not just the nearest one, since the LOS test needs to
//! distinguish hits in front of the destination from hits beyond it.

use nalgebra::{Point3, Vector3};

use crate::Triangle;

/// Leaves hold at most this many faces.
const LEAF_SIZE: usize = 4;

/// Rays closer than this to parallel with a face are treated as missing it.
const RAY_EPSILON: f64 = 1e-9;

// ============================================================================
// Axis-Aligned Bounding Box
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn empty() -> Self {
        Aabb {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    fn grow_point(&mut self, p: &Point3<f64>) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    fn grow_triangle(&mut self, tri: &Triangle) {
        self.grow_point(&tri.a);
        self.grow_point(&tri.b);
        self.grow_point(&tri.c);
    }

    /// Slab test against a ray with precomputed inverse direction.
    /// Accepts any overlap with t in [0, inf).
    fn hit_by(&self, origin: &Point3<f64>, inv_dir: &Vector3<f64>) -> bool {
        let mut t_min = 0.0_f64;
        let mut t_max = f64::INFINITY;
        for axis in 0..3 {
            let t0 = (self.min[axis] - origin[axis]) * inv_dir[axis];
            let t1 = (self.max[axis] - origin[axis]) * inv_dir[axis];
            let (near, far) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
            t_min = t_min.max(near);
            t_max = t_max.min(far);
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Ray/Triangle Intersection
// ============================================================================

/// Moller-Trumbore ray/triangle intersection.
///
/// `direction` must be unit length; the returned t is then the hit distance
/// from `origin` in meters. Hits behind the origin are rejected.
fn ray_triangle(origin: &Point3<f64>, direction: &Vector3<f64>, tri: &Triangle) -> Option<f64> {
    let edge1 = tri.b - tri.a;
    let edge2 = tri.c - tri.a;

    let pvec = direction.cross(&edge2);
    let det = edge1.dot(&pvec);
    if det.abs() < RAY_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = origin - tri.a;
    let u = tvec.dot(&pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(&edge1);
    let v = direction.dot(&qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(&qvec) * inv_det;
    if t >= 0.0 {
        Some(t)
    } else {
        None
    }
}

// ============================================================================
// BVH
// ============================================================================

#[derive(Debug)]
struct Node {
    aabb: Aabb,
    /// Child node indices; unused for leaves.
    left: u32,
    right: u32,
    /// Range into `order`; count is zero for interior nodes.
    start: u32,
    count: u32,
}

/// A static bounding volume hierarchy over a triangle soup.
#[derive(Debug, Default)]
pub struct Bvh {
    nodes: Vec<Node>,
    /// Triangle indices, permuted so each leaf owns a contiguous range.
    order: Vec<u32>,
}

impl Bvh {
    /// Build a hierarchy over the given faces. An empty slice yields an
    /// empty hierarchy that reports no hits.
    pub fn build(triangles: &[Triangle]) -> Self {
        if triangles.is_empty() {
            return Bvh::default();
        }
        let mut bvh = Bvh {
            nodes: Vec::with_capacity(2 * triangles.len() / LEAF_SIZE + 1),
            order: (0..triangles.len() as u32).collect(),
        };
        bvh.build_node(triangles, 0, triangles.len());
        bvh
    }

    /// Build the subtree over `order[start..end]`, returning its node index.
    fn build_node(&mut self, triangles: &[Triangle], start: usize, end: usize) -> u32 {
        let mut aabb = Aabb::empty();
        let mut centroid_bounds = Aabb::empty();
        for &idx in &self.order[start..end] {
            let tri = &triangles[idx as usize];
            aabb.grow_triangle(tri);
            centroid_bounds.grow_point(&tri.centroid());
        }

        let node_index = self.nodes.len() as u32;
        if end - start <= LEAF_SIZE {
            self.nodes.push(Node {
                aabb,
                left: 0,
                right: 0,
                start: start as u32,
                count: (end - start) as u32,
            });
            return node_index;
        }

        // Median split along the longest axis of the centroid bounds
        let extent = centroid_bounds.max - centroid_bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        let mid = start + (end - start) / 2;
        self.order[start..end].select_nth_unstable_by(mid - start, |&a, &b| {
            let ca = triangles[a as usize].centroid()[axis];
            let cb = triangles[b as usize].centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        // Placeholder so children get stable indices
        self.nodes.push(Node {
            aabb,
            left: 0,
            right: 0,
            start: 0,
            count: 0,
        });
        let left = self.build_node(triangles, start, mid);
        let right = self.build_node(triangles, mid, end);
        self.nodes[node_index as usize].left = left;
        self.nodes[node_index as usize].right = right;
        node_index
    }

    /// Collect the distances of every ray/triangle hit, unordered.
    ///
    /// `direction` must be unit length.
    pub fn ray_hits(
        &self,
        triangles: &[Triangle],
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Vec<f64> {
        let mut hits = Vec::new();
        if self.nodes.is_empty() {
            return hits;
        }

        let inv_dir = Vector3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        let mut stack = vec![0u32];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.aabb.hit_by(origin, &inv_dir) {
                continue;
            }
            if node.count > 0 {
                let start = node.start as usize;
                let end = start + node.count as usize;
                for &idx in &self.order[start..end] {
                    if let Some(t) = ray_triangle(origin, direction, &triangles[idx as usize]) {
                        hits.push(t);
                    }
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(z: f64, half: f64) -> Vec<Triangle> {
        // An axis-aligned square at height z, split into two triangles
        let a = Point3::new(-half, -half, z);
        let b = Point3::new(half, -half, z);
        let c = Point3::new(half, half, z);
        let d = Point3::new(-half, half, z);
        vec![Triangle::new(a, b, c), Triangle::new(a, c, d)]
    }

    #[test]
    fn test_ray_triangle_hit() {
        let tri = Triangle::new(
            Point3::new(-1.0, -1.0, 5.0),
            Point3::new(1.0, -1.0, 5.0),
            Point3::new(0.0, 1.0, 5.0),
        );
        let t = ray_triangle(
            &Point3::new(0.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 1.0),
            &tri,
        );
        assert!(t.is_some());
        assert!((t.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_ray_triangle_miss_behind() {
        let tri = Triangle::new(
            Point3::new(-1.0, -1.0, -5.0),
            Point3::new(1.0, -1.0, -5.0),
            Point3::new(0.0, 1.0, -5.0),
        );
        // Triangle is behind the ray origin
        let t = ray_triangle(
            &Point3::new(0.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 1.0),
            &tri,
        );
        assert!(t.is_none());
    }

    #[test]
    fn test_empty_bvh_reports_no_hits() {
        let bvh = Bvh::build(&[]);
        let hits = bvh.ray_hits(
            &[],
            &Point3::new(0.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 1.0),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_hits_match_brute_force() {
        // Stack several quads so a vertical ray crosses all of them
        let mut triangles = Vec::new();
        for layer in 1..=6 {
            triangles.extend(quad(layer as f64 * 10.0, 50.0));
        }
        let origin = Point3::new(3.0, -7.0, 0.0);
        let dir = Vector3::new(0.0, 0.0, 1.0);

        let bvh = Bvh::build(&triangles);
        let mut hits = bvh.ray_hits(&triangles, &origin, &dir);
        hits.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut expected: Vec<f64> = triangles
            .iter()
            .filter_map(|tri| ray_triangle(&origin, &dir, tri))
            .collect();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());

        assert_eq!(hits.len(), expected.len());
        for (h, e) in hits.iter().zip(&expected) {
            assert!((h - e).abs() < 1e-9);
        }
        // One hit per layer: each quad is two coplanar triangles but the
        // sample point lands inside exactly one of them
        assert_eq!(hits.len(), 6);
    }

    #[test]
    fn test_off_axis_ray() {
        let triangles = quad(10.0, 50.0);
        let bvh = Bvh::build(&triangles);
        let origin = Point3::new(0.0, 0.0, 0.0);
        let dir = Vector3::new(1.0, 0.0, 1.0).normalize();
        let hits = bvh.ray_hits(&triangles, &origin, &dir);
        assert_eq!(hits.len(), 1);
        // Plane z=10 reached at t = 10 / cos(45deg)
        assert!((hits[0] - 10.0 * 2.0_f64.sqrt()).abs() < 1e-9);
    }
}
