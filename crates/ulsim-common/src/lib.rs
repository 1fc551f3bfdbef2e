//! # ulsim-common
//!
//! Common types for the ulsim UAV link simulator.
//!
//! This crate provides the shared primitives the other crates build on:
//! - Geographic coordinates ([`GeoCoord`])
//! - The geodetic to local-tangent-plane transform ([`LocalFrame`])
//! - Timestamp formatting ([`time`])

pub mod time;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

// ============================================================================
// Geographic Types
// ============================================================================

/// Geographic coordinate (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoCoord {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above the WGS84 ellipsoid in meters.
    pub altitude_m: f64,
}

impl GeoCoord {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64, altitude_m: f64) -> Self {
        GeoCoord {
            latitude,
            longitude,
            altitude_m,
        }
    }
}

// ============================================================================
// Local Tangent-Plane Frame
// ============================================================================

/// WGS84 semi-major axis in meters.
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 first eccentricity squared.
const WGS84_E2: f64 = 6.694_379_990_141_316e-3;

/// Convert a geodetic coordinate to Earth-centered Earth-fixed (meters).
fn geodetic_to_ecef(geo: &GeoCoord) -> Vector3<f64> {
    let lat = geo.latitude.to_radians();
    let lon = geo.longitude.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // Prime vertical radius of curvature
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (n + geo.altitude_m) * cos_lat * cos_lon,
        (n + geo.altitude_m) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + geo.altitude_m) * sin_lat,
    )
}

/// A local East-North-Up frame anchored at a fixed reference datum.
///
/// Positions are expressed in meters relative to the reference point,
/// matching the axes of the 3D city mesh. The frame is computed once and
/// reused for every telemetry fix.
#[derive(Debug, Clone)]
pub struct LocalFrame {
    reference: GeoCoord,
    ref_ecef: Vector3<f64>,
    east: Vector3<f64>,
    north: Vector3<f64>,
    up: Vector3<f64>,
}

impl LocalFrame {
    /// Create a frame anchored at the given reference datum.
    pub fn new(reference: GeoCoord) -> Self {
        let lat = reference.latitude.to_radians();
        let lon = reference.longitude.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        LocalFrame {
            ref_ecef: geodetic_to_ecef(&reference),
            east: Vector3::new(-sin_lon, cos_lon, 0.0),
            north: Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
            up: Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat),
            reference,
        }
    }

    /// Get the reference datum this frame is anchored at.
    pub fn reference(&self) -> &GeoCoord {
        &self.reference
    }

    /// Convert a geodetic coordinate to local ENU coordinates in meters.
    pub fn to_local(&self, geo: &GeoCoord) -> Point3<f64> {
        let delta = geodetic_to_ecef(geo) - self.ref_ecef;
        Point3::new(
            delta.dot(&self.east),
            delta.dot(&self.north),
            delta.dot(&self.up),
        )
    }
}
