//! # ulsim-geom
//!
//! Urban mesh visibility index and line-of-sight raycasting.
//!
//! This crate provides:
//! - Static mesh loading and the spatial index ([`Mesh`])
//! - Line-of-sight queries between local-frame points ([`check_los`],
//!   [`check_los_with_config`])
//!
//! The mesh is loaded once at startup and is read-only afterwards, so a
//! single instance can serve any number of concurrent visibility queries.

mod bvh;
mod obj;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nalgebra::{Point3, Vector3};
use thiserror::Error;

pub use bvh::Bvh;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while loading the mesh asset.
#[derive(Debug, Error)]
pub enum MeshError {
    /// File missing or unreadable.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed OBJ record.
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// One-based line number in the source file.
        line: usize,
        /// What was wrong with the record.
        message: String,
    },

    /// The asset parsed cleanly but contains no faces.
    #[error("mesh '{0}' contains no faces")]
    Empty(String),
}

// ============================================================================
// Mesh
// ============================================================================

/// A single triangular face, in local-frame meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First corner.
    pub a: Point3<f64>,
    /// Second corner.
    pub b: Point3<f64>,
    /// Third corner.
    pub c: Point3<f64>,
}

impl Triangle {
    /// Create a face from its three corners.
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Triangle { a, b, c }
    }

    /// Face centroid.
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.a.coords + self.b.coords + self.c.coords) / 3.0)
    }
}

/// An immutable triangulated urban surface with its acceleration structure.
///
/// Construction cost (parsing plus BVH build) is paid once per process;
/// queries afterwards never mutate the mesh.
#[derive(Debug)]
pub struct Mesh {
    triangles: Vec<Triangle>,
    bvh: Bvh,
}

impl Mesh {
    /// Load a mesh from a Wavefront OBJ file and build its spatial index.
    ///
    /// Fails if the file is missing, unreadable, malformed, or contains
    /// zero faces. Sub-objects are merged into one coherent mesh.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MeshError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let triangles = obj::parse_obj(reader)?;
        if triangles.is_empty() {
            return Err(MeshError::Empty(path.display().to_string()));
        }
        tracing::info!(faces = triangles.len(), path = %path.display(), "mesh loaded");
        Ok(Self::from_triangles(triangles))
    }

    /// Build a mesh directly from faces.
    ///
    /// Unlike [`Mesh::load`] this accepts an empty face list; an empty mesh
    /// obstructs nothing.
    pub fn from_triangles(triangles: Vec<Triangle>) -> Self {
        let bvh = Bvh::build(&triangles);
        Mesh { triangles, bvh }
    }

    /// Number of triangular faces.
    pub fn face_count(&self) -> usize {
        self.triangles.len()
    }

    /// Distances from `origin` of every face hit along the ray, unordered.
    ///
    /// `direction` must be unit length.
    pub fn intersection_distances(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
    ) -> Vec<f64> {
        self.bvh.ray_hits(&self.triangles, origin, direction)
    }
}

// ============================================================================
// Line-of-Sight Query
// ============================================================================

/// Default tolerance band that absorbs surface noise near the destination.
pub const DEFAULT_HIT_TOLERANCE_M: f64 = 0.5;

/// Default segment length below which two points count as coincident.
pub const DEFAULT_MIN_SEGMENT_M: f64 = 0.1;

/// Configuration for line-of-sight queries.
///
/// Both values are uncalibrated field constants carried over from flight
/// campaigns; they are exposed here so recalibration against measured data
/// does not require a rebuild.
#[derive(Debug, Clone)]
pub struct LosConfig {
    /// Hits closer than `segment - tolerance` to the origin obstruct the
    /// segment; later hits are attributed to the destination surface itself.
    pub hit_tolerance_m: f64,
    /// Segments shorter than this are trivially visible.
    pub min_segment_m: f64,
}

impl Default for LosConfig {
    fn default() -> Self {
        LosConfig {
            hit_tolerance_m: DEFAULT_HIT_TOLERANCE_M,
            min_segment_m: DEFAULT_MIN_SEGMENT_M,
        }
    }
}

/// Check line-of-sight between two local-frame points.
///
/// Returns `true` when the straight segment from `origin` to `destination`
/// is unobstructed by the mesh. Uses the default [`LosConfig`]; for tuned
/// tolerances use [`check_los_with_config`].
pub fn check_los(mesh: &Mesh, origin: &Point3<f64>, destination: &Point3<f64>) -> bool {
    check_los_with_config(mesh, origin, destination, &LosConfig::default())
}

/// Check line-of-sight with explicit tolerances.
///
/// A pure query: the mesh is never mutated and repeated calls with the same
/// arguments return the same answer.
pub fn check_los_with_config(
    mesh: &Mesh,
    origin: &Point3<f64>,
    destination: &Point3<f64>,
    config: &LosConfig,
) -> bool {
    let direction = destination - origin;
    let distance = direction.norm();

    if distance < config.min_segment_m {
        // Coincident endpoints
        return true;
    }
    let direction = direction / distance;

    let hits = mesh.intersection_distances(origin, &direction);
    if hits.is_empty() {
        return true;
    }

    // Obstructed only if some face sits strictly in front of the
    // destination; hits inside the tolerance band or beyond it belong to
    // the destination surface or to geometry behind it.
    !hits.iter().any(|&hit| hit < distance - config.hit_tolerance_m)
}
