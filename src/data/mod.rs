//! Time-indexed measurement storage.
//!
//! Measurements are identified by `(SensorType, Time, slot)`, where the slot
//! index separates same-timestamp duplicates (for example several satellites
//! observed in one epoch). The containers keep the time axis of every sensor
//! type in strictly increasing order and expose it for time-stepped graph
//! construction: `time_first` / `time_next` drive the assembly loop, with
//! `None` from `time_next` as the normal termination signal.

mod dataset;
mod measurement;
mod time;

pub use dataset::SensorDataSet;
pub use measurement::{Measurement, SensorElement, SensorType};
pub use time::Time;
