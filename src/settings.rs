//! Simulation configuration.

use crate::error::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single value in the [Settings] store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "number",
            Self::Text(_) => "string",
        }
    }

    /// Whether `other` may overwrite a value of this type.
    /// Integers are accepted where numbers are expected.
    fn accepts(&self, other: &SettingValue) -> bool {
        use SettingValue::*;
        matches!(
            (self, other),
            (Bool(_), Bool(_))
                | (Int(_), Int(_))
                | (Float(_), Float(_) | Int(_))
                | (Text(_), Text(_))
        )
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A flat key/value store of general simulation settings.
///
/// The recognised keys only gate optional data collection:
///
/// | key                   | type    | default    |
/// |-----------------------|---------|------------|
/// | `storeTrajectoryData` | boolean | `false`    |
/// | `trajectoryPeriod`    | number  | `1` s      |
/// | `trajectoryBuffer`    | integer | `50`       |
/// | `storeDetectorData`   | boolean | `false`    |
/// | `detectorDelay`       | number  | `120` s    |
/// | `detectorPeriod`      | number  | `60` s     |
/// | `outputDir`           | string  | `"output"` |
/// | `debug`               | boolean | `false`    |
///
/// Unrecognised keys are stored as given and can be read back by user code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults: [(&str, SettingValue); 8] = [
            ("storeTrajectoryData", false.into()),
            ("trajectoryPeriod", 1.0.into()),
            ("trajectoryBuffer", 50i64.into()),
            ("storeDetectorData", false.into()),
            ("detectorDelay", 120.0.into()),
            ("detectorPeriod", 60.0.into()),
            ("outputDir", "output".into()),
            ("debug", false.into()),
        ];
        Self {
            values: defaults
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value))
                .collect(),
        }
    }
}

impl Settings {
    /// Creates a settings store holding the default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Parses a JSON object and merges it over the default values.
    pub fn from_json(json: &str) -> NetworkResult<Self> {
        let mut settings = Self::new();
        settings.merge_json(json)?;
        Ok(settings)
    }

    /// Merges the entries of a JSON object into this store.
    pub fn merge_json(&mut self, json: &str) -> NetworkResult<()> {
        let values: BTreeMap<String, SettingValue> = serde_json::from_str(json)?;
        for (key, value) in values {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Sets a value. Recognised keys must keep the type of their default value.
    pub fn set(&mut self, key: &str, value: impl Into<SettingValue>) -> NetworkResult<()> {
        let value = value.into();
        if let Some(current) = self.values.get(key) {
            if !current.accepts(&value) {
                return Err(NetworkError::InvalidSetting {
                    key: key.to_owned(),
                    expected: current.type_name(),
                });
            }
        }
        let value = match (self.values.get(key), value) {
            (Some(SettingValue::Float(_)), SettingValue::Int(i)) => SettingValue::Float(i as f64),
            (_, value) => value,
        };
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> NetworkResult<bool> {
        match self.values.get(key) {
            Some(SettingValue::Bool(value)) => Ok(*value),
            _ => Err(Self::mismatch(key, "boolean")),
        }
    }

    pub fn get_f64(&self, key: &str) -> NetworkResult<f64> {
        match self.values.get(key) {
            Some(SettingValue::Float(value)) => Ok(*value),
            Some(SettingValue::Int(value)) => Ok(*value as f64),
            _ => Err(Self::mismatch(key, "number")),
        }
    }

    pub fn get_i64(&self, key: &str) -> NetworkResult<i64> {
        match self.values.get(key) {
            Some(SettingValue::Int(value)) => Ok(*value),
            _ => Err(Self::mismatch(key, "integer")),
        }
    }

    pub fn get_str(&self, key: &str) -> NetworkResult<&str> {
        match self.values.get(key) {
            Some(SettingValue::Text(value)) => Ok(value),
            _ => Err(Self::mismatch(key, "string")),
        }
    }

    fn mismatch(key: &str, expected: &'static str) -> NetworkError {
        NetworkError::InvalidSetting {
            key: key.to_owned(),
            expected,
        }
    }

    pub fn store_trajectory_data(&self) -> bool {
        self.get_bool("storeTrajectoryData").unwrap_or(false)
    }

    /// The sampling period of trajectories in s.
    pub fn trajectory_period(&self) -> f64 {
        self.get_f64("trajectoryPeriod").unwrap_or(1.0)
    }

    /// The number of finished trajectories kept before the oldest are dropped.
    pub fn trajectory_buffer(&self) -> usize {
        self.get_i64("trajectoryBuffer").unwrap_or(50).max(0) as usize
    }

    pub fn store_detector_data(&self) -> bool {
        self.get_bool("storeDetectorData").unwrap_or(false)
    }

    /// The warm-up time before detectors start aggregating, in s.
    pub fn detector_delay(&self) -> f64 {
        self.get_f64("detectorDelay").unwrap_or(120.0)
    }

    /// The detector aggregation period in s.
    pub fn detector_period(&self) -> f64 {
        self.get_f64("detectorPeriod").unwrap_or(60.0)
    }

    pub fn output_dir(&self) -> &str {
        self.get_str("outputDir").unwrap_or("output")
    }

    /// Whether per-step consistency diagnostics are collected.
    pub fn debug(&self) -> bool {
        self.get_bool("debug").unwrap_or(false)
    }
}

/// The global parameters of a simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// The time step in s.
    pub dt: f64,
    /// The simulated period in s; the simulation stops once it is reached.
    pub period: f64,
    /// The seed of the random number generator used for vehicle generation.
    pub seed: u64,
    #[serde(default)]
    pub settings: Settings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 0.5,
            period: 3600.0,
            seed: 0,
            settings: Settings::default(),
        }
    }
}

impl SimulationConfig {
    /// Checks that the time step and period are usable.
    pub fn validate(&self) -> NetworkResult<()> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(NetworkError::InvalidParameter {
                name: "dt",
                reason: format!("time step must be positive and finite, got {}", self.dt),
            });
        }
        if !(self.period > 0.0) {
            return Err(NetworkError::InvalidParameter {
                name: "period",
                reason: format!("period must be positive, got {}", self.period),
            });
        }
        if !(self.settings.detector_period() > 0.0) {
            return Err(NetworkError::InvalidParameter {
                name: "detectorPeriod",
                reason: "aggregation period must be positive".to_owned(),
            });
        }
        Ok(())
    }
}
