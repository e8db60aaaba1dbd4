//! Measurement records.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DVector;

use crate::data::Time;
use crate::error::{FusionError, FusionResult};

/// The kind of sensor a measurement originates from.
///
/// The type determines the dimension of the mean and which auxiliary value
/// slots are expected to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorType {
    /// 2-D pseudorange: range to a known 2-D beacon plus a receiver offset.
    Pseudorange2,
    /// 3-D pseudorange: range to a known 3-D satellite plus a receiver offset.
    Pseudorange3,
    /// Plain 2-D range to a known beacon, no offset.
    Range2,
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorType::Pseudorange2 => "Pseudorange2",
            SensorType::Pseudorange3 => "Pseudorange3",
            SensorType::Range2 => "Range2",
        };
        write!(f, "{name}")
    }
}

/// Named auxiliary value slots of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorElement {
    /// Position of the observed satellite/beacon.
    SatellitePosition,
    /// Identifier of the observed satellite/beacon.
    SatelliteId,
}

impl fmt::Display for SensorElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorElement::SatellitePosition => "SatellitePosition",
            SensorElement::SatelliteId => "SatelliteId",
        };
        write!(f, "{name}")
    }
}

/// One time-stamped measurement record.
///
/// Carries a mean vector, an optional standard deviation vector and
/// type-dependent auxiliary values. Immutable once inserted into a
/// [`super::SensorDataSet`]; the setters exist for the construction phase.
#[derive(Debug, Clone)]
pub struct Measurement {
    sensor_type: SensorType,
    timestamp: Time,
    mean: DVector<f64>,
    std_dev: Option<DVector<f64>>,
    values: BTreeMap<SensorElement, DVector<f64>>,
}

impl Measurement {
    /// Create a measurement with the given mean.
    pub fn new(sensor_type: SensorType, timestamp: Time, mean: DVector<f64>) -> Self {
        Self {
            sensor_type,
            timestamp,
            mean,
            std_dev: None,
            values: BTreeMap::new(),
        }
    }

    /// Sensor type of the record.
    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    /// Timestamp of the record.
    pub fn timestamp(&self) -> Time {
        self.timestamp
    }

    /// Mean vector.
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// Optional standard deviation vector.
    pub fn std_dev(&self) -> Option<&DVector<f64>> {
        self.std_dev.as_ref()
    }

    /// Attach a standard deviation vector.
    pub fn set_std_dev(&mut self, std_dev: DVector<f64>) {
        self.std_dev = Some(std_dev);
    }

    /// Attach an auxiliary value.
    pub fn set_value(&mut self, element: SensorElement, value: DVector<f64>) {
        self.values.insert(element, value);
    }

    /// Look up an auxiliary value; absence is a configuration error of the
    /// producing loader.
    pub fn value(&self, element: SensorElement) -> FusionResult<&DVector<f64>> {
        self.values.get(&element).ok_or_else(|| {
            FusionError::NotFound(format!(
                "{} measurement at t={} has no {element} value",
                self.sensor_type, self.timestamp
            ))
        })
    }

    /// Human readable name/value dump for diagnostics and tests.
    pub fn name_value_string(&self) -> String {
        let mut out = format!(
            "{} t={} mean=[{}]",
            self.sensor_type,
            self.timestamp,
            join(&self.mean)
        );
        if let Some(std_dev) = &self.std_dev {
            out.push_str(&format!(" std=[{}]", join(std_dev)));
        }
        for (element, value) in &self.values {
            out.push_str(&format!(" {element}=[{}]", join(value)));
        }
        out
    }
}

fn join(v: &DVector<f64>) -> String {
    v.iter()
        .map(|x| format!("{x}"))
        .collect::<Vec<_>>()
        .join(", ")
}
