//! Totally ordered timestamps.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A timestamp on the measurement/state timeline, in seconds.
///
/// Wraps `f64` with a total order (`f64::total_cmp`) so timestamps can key
/// ordered maps. Construction from a non-finite value is a programming error.
#[derive(Debug, Clone, Copy)]
pub struct Time(f64);

impl Time {
    /// Create a timestamp from seconds.
    pub fn new(seconds: f64) -> Self {
        debug_assert!(seconds.is_finite(), "timestamps must be finite");
        Self(seconds)
    }

    /// The timestamp in seconds.
    pub fn seconds(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Time {
    fn from(seconds: f64) -> Self {
        Self::new(seconds)
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Time {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// `Display` prints the raw seconds; used in state keys and diagnostics.
impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_ordering_is_total() {
        let mut map = BTreeMap::new();
        for t in [2.0, 0.0, 1.0, 0.5] {
            map.insert(Time::from(t), ());
        }
        let times: Vec<f64> = map.keys().map(|t| t.seconds()).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Time::from(1.5).to_string(), "1.5");
        assert_eq!(Time::from(2.0).to_string(), "2");
    }
}
