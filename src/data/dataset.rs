//! Ordered, type-and-time-keyed measurement storage.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::data::{Measurement, SensorType, Time};
use crate::error::{FusionError, FusionResult};

/// Append-only store of measurements, keyed by `(SensorType, Time, slot)`.
///
/// Per sensor type the time axis is a `BTreeMap`, so insertion and ordered
/// traversal are logarithmic in the number of distinct timestamps; duplicates
/// within one timestamp live in a small slot vector in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SensorDataSet {
    data: HashMap<SensorType, BTreeMap<Time, Vec<Measurement>>>,
}

impl SensorDataSet {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a measurement; it is appended to the slot list of its
    /// `(type, time)` cell and owned by the dataset from here on.
    pub fn add_element(&mut self, measurement: Measurement) {
        self.data
            .entry(measurement.sensor_type())
            .or_default()
            .entry(measurement.timestamp())
            .or_default()
            .push(measurement);
    }

    /// Look up one measurement by type, time and slot index.
    pub fn get_element(
        &self,
        sensor_type: SensorType,
        time: Time,
        slot: usize,
    ) -> FusionResult<&Measurement> {
        self.data
            .get(&sensor_type)
            .and_then(|timeline| timeline.get(&time))
            .and_then(|slots| slots.get(slot))
            .ok_or_else(|| {
                FusionError::NotFound(format!(
                    "no {sensor_type} measurement at t={time} slot {slot}"
                ))
            })
    }

    /// Number of measurements stored at `(type, time)`.
    pub fn count_element(&self, sensor_type: SensorType, time: Time) -> usize {
        self.data
            .get(&sensor_type)
            .and_then(|timeline| timeline.get(&time))
            .map_or(0, Vec::len)
    }

    /// Earliest timestamp of a sensor type, `None` if it has no data.
    pub fn time_first(&self, sensor_type: SensorType) -> Option<Time> {
        self.data
            .get(&sensor_type)?
            .keys()
            .next()
            .copied()
    }

    /// Latest timestamp of a sensor type, `None` if it has no data.
    pub fn time_last(&self, sensor_type: SensorType) -> Option<Time> {
        self.data
            .get(&sensor_type)?
            .keys()
            .next_back()
            .copied()
    }

    /// Next distinct timestamp strictly after `time`.
    ///
    /// `None` marks the end of the timeline; time-stepped graph construction
    /// uses it as the loop termination signal, not as an error.
    pub fn time_next(&self, sensor_type: SensorType, time: Time) -> Option<Time> {
        self.data
            .get(&sensor_type)?
            .range((Bound::Excluded(time), Bound::Unbounded))
            .next()
            .map(|(t, _)| *t)
    }

    /// All distinct timestamps of a sensor type, strictly increasing.
    pub fn times(&self, sensor_type: SensorType) -> impl Iterator<Item = Time> + '_ {
        self.data
            .get(&sensor_type)
            .into_iter()
            .flat_map(|timeline| timeline.keys().copied())
    }

    /// Total number of measurements of a sensor type.
    pub fn count_type(&self, sensor_type: SensorType) -> usize {
        self.data
            .get(&sensor_type)
            .map_or(0, |timeline| timeline.values().map(Vec::len).sum())
    }
}
