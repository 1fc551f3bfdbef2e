//! YAML scenario configuration.
//!
//! A scenario file describes everything a sampling session needs: the mesh
//! asset, the gateway and the reference datum, channel parameters, the
//! sampling cadence, and optionally a scripted flight plan. CLI arguments
//! override individual fields after loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulsim_channel::ChannelParams;
use ulsim_common::GeoCoord;

/// Errors raised while loading or validating a scenario.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Semantically invalid configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Sampling cadence and seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SamplingConfig {
    /// Seconds between link samples.
    pub period_s: f64,
    /// Random seed for the shadowing draws (default: random per session).
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            period_s: 0.5,
            seed: None,
        }
    }
}

/// A scripted flight: the vehicle flies the waypoint polyline at a fixed
/// ground speed, emitting one fix per sampling tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlightPlan {
    /// Geodetic waypoints, visited in order.
    pub waypoints: Vec<GeoCoord>,
    /// Speed along the path in meters per second.
    pub ground_speed_mps: f64,
}

/// A complete sampling scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Path to the triangulated city mesh (Wavefront OBJ).
    pub mesh: PathBuf,
    /// Fixed gateway position.
    pub gateway: GeoCoord,
    /// Reference datum for the local frame. Defaults to the gateway
    /// position when omitted; must match the datum the mesh was exported
    /// against.
    #[serde(default)]
    pub reference: Option<GeoCoord>,
    /// Channel model parameters.
    #[serde(default)]
    pub channel: ChannelParams,
    /// Sampling cadence and seeding.
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Scripted flight plan, used when no external telemetry is wired in.
    #[serde(default)]
    pub flight: Option<FlightPlan>,
    /// Directory for flight logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl ScenarioConfig {
    /// The datum the local frame is anchored at.
    pub fn reference(&self) -> GeoCoord {
        self.reference.unwrap_or(self.gateway)
    }

    /// Check cross-field invariants after deserialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sampling.period_s > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sampling period must be positive, got {}",
                self.sampling.period_s
            )));
        }
        self.channel
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(flight) = &self.flight {
            if flight.waypoints.len() < 2 {
                return Err(ConfigError::Invalid(
                    "flight plan needs at least 2 waypoints".into(),
                ));
            }
            if !(flight.ground_speed_mps > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "flight ground speed must be positive, got {}",
                    flight.ground_speed_mps
                )));
            }
        }
        Ok(())
    }
}

/// Load and validate a scenario from a YAML file.
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<ScenarioConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: ScenarioConfig = serde_yaml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
mesh: assets/city.obj
gateway: { latitude: -25.43721, longitude: -49.26599, altitude_m: 935.0 }
reference: { latitude: -25.43721, longitude: -49.26599, altitude_m: 934.0 }
channel:
  tx_power_dbm: 20.0
sampling:
  period_s: 0.5
  seed: 7
flight:
  waypoints:
    - { latitude: -25.43721, longitude: -49.26599, altitude_m: 945.0 }
    - { latitude: -25.43900, longitude: -49.26800, altitude_m: 1000.0 }
  ground_speed_mps: 12.0
"#;

    #[test]
    fn test_parse_scenario() {
        let config: ScenarioConfig = serde_yaml::from_str(SCENARIO).unwrap();
        config.validate().unwrap();
        assert_eq!(config.sampling.seed, Some(7));
        assert_eq!(config.channel.tx_power_dbm, 20.0);
        // Unspecified channel fields fall back to defaults
        assert_eq!(config.channel.sensitivity_dbm, -120.0);
        assert_eq!(config.reference().altitude_m, 934.0);
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_reference_defaults_to_gateway() {
        let minimal = r#"
mesh: assets/city.obj
gateway: { latitude: 1.0, longitude: 2.0, altitude_m: 3.0 }
"#;
        let config: ScenarioConfig = serde_yaml::from_str(minimal).unwrap();
        config.validate().unwrap();
        assert_eq!(config.reference().latitude, 1.0);
        assert_eq!(config.sampling.period_s, 0.5);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let bad = r#"
mesh: assets/city.obj
gateway: { latitude: 1.0, longitude: 2.0, altitude_m: 3.0 }
antenna_gain: 3.0
"#;
        assert!(serde_yaml::from_str::<ScenarioConfig>(bad).is_err());
    }

    #[test]
    fn test_invalid_period_is_rejected() {
        let bad = r#"
mesh: assets/city.obj
gateway: { latitude: 1.0, longitude: 2.0, altitude_m: 3.0 }
sampling: { period_s: 0.0 }
"#;
        let config: ScenarioConfig = serde_yaml::from_str(bad).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_single_waypoint_flight_is_rejected() {
        let bad = r#"
mesh: assets/city.obj
gateway: { latitude: 1.0, longitude: 2.0, altitude_m: 3.0 }
flight:
  waypoints:
    - { latitude: 1.0, longitude: 2.0, altitude_m: 10.0 }
  ground_speed_mps: 5.0
"#;
        let config: ScenarioConfig = serde_yaml::from_str(bad).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
