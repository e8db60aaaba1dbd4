//! State blocks and the time-indexed state storage.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use nalgebra::{DMatrix, DVector};

use crate::data::Time;
use crate::error::{FusionError, FusionResult};

/// The kind of estimated quantity a state block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// 2D position
    Point2,
    /// 3D position
    Point3,
    /// Scalar receiver clock error
    ClockError,
    /// Scalar heading angle
    Angle,
}

impl StateKind {
    /// Dimension of the underlying vector.
    pub fn dimension(&self) -> usize {
        match self {
            StateKind::Point2 => 2,
            StateKind::Point3 => 3,
            StateKind::ClockError => 1,
            StateKind::Angle => 1,
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Point2 => write!(f, "Point2"),
            StateKind::Point3 => write!(f, "Point3"),
            StateKind::ClockError => write!(f, "ClockError"),
            StateKind::Angle => write!(f, "Angle"),
        }
    }
}

/// One estimated quantity at one timestamp.
///
/// The value starts at zero and is overwritten by the solver; the covariance
/// stays empty until explicitly computed.
#[derive(Debug, Clone)]
pub struct StateBlock {
    kind: StateKind,
    value: DVector<f64>,
    covariance: Option<DMatrix<f64>>,
}

impl StateBlock {
    /// Create a zero-initialized block of the given kind.
    pub fn new(kind: StateKind) -> Self {
        Self {
            kind,
            value: DVector::zeros(kind.dimension()),
            covariance: None,
        }
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn dimension(&self) -> usize {
        self.kind.dimension()
    }

    /// Current estimate.
    pub fn value(&self) -> &DVector<f64> {
        &self.value
    }

    pub(crate) fn set_value(&mut self, value: DVector<f64>) {
        debug_assert_eq!(value.len(), self.kind.dimension());
        self.value = value;
    }

    /// Marginal covariance, present only after covariance recovery.
    pub fn covariance(&self) -> Option<&DMatrix<f64>> {
        self.covariance.as_ref()
    }

    pub(crate) fn set_covariance(&mut self, covariance: DMatrix<f64>) {
        self.covariance = Some(covariance);
    }

    /// Human-readable value line, covariance entries appended in row-major
    /// order when present.
    pub fn name_value_string(&self) -> String {
        let values: Vec<String> = self.value.iter().map(|v| format!("{v}")).collect();
        let mut line = format!("{} [{}]", self.kind, values.join(", "));
        if let Some(cov) = &self.covariance {
            let mut entries = Vec::with_capacity(cov.nrows() * cov.ncols());
            for i in 0..cov.nrows() {
                for j in 0..cov.ncols() {
                    entries.push(format!("{}", cov[(i, j)]));
                }
            }
            line.push_str(&format!(" cov [{}]", entries.join(", ")));
        }
        line
    }
}

/// An ordered list of (state name, timestamp) references, used to spell out
/// which state blocks a factor connects.
#[derive(Debug, Clone, Default)]
pub struct StateList {
    entries: Vec<(String, Time)>,
}

impl StateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a state reference.
    pub fn add(&mut self, name: &str, time: Time) {
        self.entries.push((name.to_string(), time));
    }

    /// Remove all references so the list can be reused.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Time)> {
        self.entries.iter()
    }
}

/// All state blocks of an estimation problem, grouped by name and ordered by
/// time within each name.
#[derive(Debug, Clone, Default)]
pub struct StateDataSet {
    states: BTreeMap<String, BTreeMap<Time, StateBlock>>,
}

impl StateDataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a zero-initialized state block. Returns `Ok(false)` without
    /// touching the stored block when one of the same kind already exists at
    /// this (name, time); re-adding under a different kind is a configuration
    /// error. Names must not contain `'@'`, which is reserved as the
    /// separator of the solver-side variable keys.
    pub fn add_state(&mut self, name: &str, kind: StateKind, time: Time) -> FusionResult<bool> {
        if name.contains('@') {
            return Err(FusionError::InvalidInput(format!(
                "state name '{name}' must not contain '@'"
            )));
        }
        let timeline = self.states.entry(name.to_string()).or_default();
        match timeline.entry(time) {
            Entry::Occupied(slot) => {
                let existing = slot.get().kind();
                if existing != kind {
                    return Err(FusionError::Configuration(format!(
                        "state '{name}' at t = {time} already exists as {existing}, \
                         cannot re-add as {kind}"
                    )));
                }
                Ok(false)
            }
            Entry::Vacant(slot) => {
                slot.insert(StateBlock::new(kind));
                Ok(true)
            }
        }
    }

    /// Look up a state block.
    pub fn get_state(&self, name: &str, time: Time) -> FusionResult<&StateBlock> {
        self.states
            .get(name)
            .and_then(|timeline| timeline.get(&time))
            .ok_or_else(|| {
                FusionError::NotFound(format!("no state '{name}' at t = {time}"))
            })
    }

    pub(crate) fn get_state_mut(&mut self, name: &str, time: Time) -> FusionResult<&mut StateBlock> {
        self.states
            .get_mut(name)
            .and_then(|timeline| timeline.get_mut(&time))
            .ok_or_else(|| {
                FusionError::NotFound(format!("no state '{name}' at t = {time}"))
            })
    }

    /// Whether any block exists under this name.
    pub fn has_name(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// All state names, lexicographically ordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// Timestamps of all blocks under this name, ascending.
    pub fn times(&self, name: &str) -> impl Iterator<Item = Time> + '_ {
        self.states
            .get(name)
            .into_iter()
            .flat_map(|timeline| timeline.keys().copied())
    }

    /// Number of blocks under this name.
    pub fn count_states(&self, name: &str) -> usize {
        self.states.get(name).map_or(0, BTreeMap::len)
    }

    /// Earliest timestamp under this name.
    pub fn time_first(&self, name: &str) -> Option<Time> {
        self.states
            .get(name)?
            .keys()
            .next()
            .copied()
    }

    /// Latest timestamp under this name.
    pub fn time_last(&self, name: &str) -> Option<Time> {
        self.states
            .get(name)?
            .keys()
            .next_back()
            .copied()
    }

    /// Earliest timestamp strictly after `time` under this name, `None` at
    /// the end of the timeline.
    pub fn time_next(&self, name: &str, time: Time) -> Option<Time> {
        self.states
            .get(name)?
            .range((Bound::Excluded(time), Bound::Unbounded))
            .next()
            .map(|(t, _)| *t)
    }
}
