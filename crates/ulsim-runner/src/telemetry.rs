//! Telemetry sources.
//!
//! The driver consumes a lazy, pull-based, non-restartable stream of
//! geodetic position fixes through [`TelemetrySource`]. Two sources ship
//! with the simulator: [`ScriptedFlight`] interpolates a waypoint plan so
//! sessions can run standalone, and [`ReaderSource`] parses fixes from any
//! line-oriented reader (a replay file, or a live feed piped to stdin).

use std::io::BufRead;
use std::time::SystemTime;

use thiserror::Error;
use ulsim_common::{GeoCoord, LocalFrame};

use crate::config::FlightPlan;

/// One geodetic position report from the vehicle.
#[derive(Debug, Clone, Copy)]
pub struct PositionFix {
    /// Vehicle position.
    pub position: GeoCoord,
    /// When the fix was taken.
    pub timestamp: SystemTime,
}

/// Telemetry stream errors. Any error terminates the session cleanly.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Transport failure while reading from the source.
    #[error("telemetry stream IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record that could not be parsed as a position fix.
    #[error("malformed telemetry at line {line}: {message}")]
    Malformed {
        /// One-based record number.
        line: usize,
        /// What was wrong with the record.
        message: String,
    },
}

/// A pull-based stream of position fixes.
///
/// The driver controls pacing; sources never batch or drop fixes they have
/// already handed out. `Ok(None)` signals a clean end of stream and the
/// stream must not be polled again afterwards.
pub trait TelemetrySource: Send {
    /// Produce the next fix, or `Ok(None)` when the stream has ended.
    fn next_fix(&mut self) -> Result<Option<PositionFix>, TelemetryError>;
}

// ============================================================================
// Scripted Flight
// ============================================================================

/// Telemetry from a scripted waypoint flight.
///
/// The vehicle moves along the waypoint polyline at the plan's ground
/// speed; each poll advances it by one sampling period and reports the
/// interpolated position. Leg lengths are measured in the local frame;
/// interpolation is linear in the geodetic components, which is accurate
/// at urban leg lengths. The stream ends after the final waypoint is
/// reported once.
pub struct ScriptedFlight {
    waypoints: Vec<GeoCoord>,
    /// Cumulative path length at each waypoint, meters.
    cumulative_m: Vec<f64>,
    /// Meters advanced per poll.
    step_m: f64,
    traveled_m: f64,
    finished: bool,
}

impl ScriptedFlight {
    /// Build a flight from a plan and the sampling period.
    ///
    /// The plan must contain at least one waypoint; scenario validation
    /// guarantees two or more.
    pub fn new(plan: &FlightPlan, period_s: f64) -> Self {
        let frame = LocalFrame::new(plan.waypoints[0]);
        let mut cumulative_m = Vec::with_capacity(plan.waypoints.len());
        let mut total = 0.0;
        cumulative_m.push(0.0);
        for pair in plan.waypoints.windows(2) {
            let a = frame.to_local(&pair[0]);
            let b = frame.to_local(&pair[1]);
            total += (b - a).norm();
            cumulative_m.push(total);
        }

        ScriptedFlight {
            waypoints: plan.waypoints.clone(),
            cumulative_m,
            step_m: plan.ground_speed_mps * period_s,
            traveled_m: 0.0,
            finished: false,
        }
    }

    /// Interpolated position after traveling `distance_m` along the path.
    fn position_at(&self, distance_m: f64) -> GeoCoord {
        let last = *self.cumulative_m.last().unwrap_or(&0.0);
        if distance_m >= last {
            return *self.waypoints.last().unwrap();
        }
        // Find the leg containing this distance
        let mut leg = 0;
        while self.cumulative_m[leg + 1] <= distance_m {
            leg += 1;
        }
        let leg_len = self.cumulative_m[leg + 1] - self.cumulative_m[leg];
        let f = if leg_len > 0.0 {
            (distance_m - self.cumulative_m[leg]) / leg_len
        } else {
            0.0
        };
        let a = &self.waypoints[leg];
        let b = &self.waypoints[leg + 1];
        GeoCoord::new(
            a.latitude + (b.latitude - a.latitude) * f,
            a.longitude + (b.longitude - a.longitude) * f,
            a.altitude_m + (b.altitude_m - a.altitude_m) * f,
        )
    }

    /// Total path length in meters.
    pub fn path_length_m(&self) -> f64 {
        *self.cumulative_m.last().unwrap_or(&0.0)
    }
}

impl TelemetrySource for ScriptedFlight {
    fn next_fix(&mut self) -> Result<Option<PositionFix>, TelemetryError> {
        if self.finished {
            return Ok(None);
        }
        let position = self.position_at(self.traveled_m);
        if self.traveled_m >= self.path_length_m() {
            self.finished = true;
        } else {
            self.traveled_m += self.step_m;
        }
        Ok(Some(PositionFix {
            position,
            timestamp: SystemTime::now(),
        }))
    }
}

// ============================================================================
// Line Reader Source
// ============================================================================

/// Telemetry parsed from a line-oriented reader.
///
/// Each record is `latitude longitude altitude_m`, whitespace or comma
/// separated. Blank lines and `#` comments are skipped. EOF ends the
/// stream cleanly; a malformed record is a stream error.
pub struct ReaderSource<R: BufRead> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> ReaderSource<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        ReaderSource { reader, line_no: 0 }
    }
}

impl<R: BufRead + Send> TelemetrySource for ReaderSource<R> {
    fn next_fix(&mut self) -> Result<Option<PositionFix>, TelemetryError> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() != 3 {
                return Err(TelemetryError::Malformed {
                    line: self.line_no,
                    message: format!("expected 'lat lon alt', got '{}'", trimmed),
                });
            }
            let mut values = [0.0_f64; 3];
            for (slot, field) in values.iter_mut().zip(&fields) {
                *slot = field.parse().map_err(|_| TelemetryError::Malformed {
                    line: self.line_no,
                    message: format!("invalid number '{}'", field),
                })?;
            }

            return Ok(Some(PositionFix {
                position: GeoCoord::new(values[0], values[1], values[2]),
                timestamp: SystemTime::now(),
            }));
        }
    }
}
