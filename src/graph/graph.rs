//! The factor graph front end tying states, factors, and the engine together.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::DVector;
use tracing::{debug, info};

use crate::data::{Measurement, SensorElement, Time};
use crate::error::{FusionError, FusionResult};
use crate::graph::factor::{FactorKind, FactorNode};
use crate::graph::state::{StateDataSet, StateKind, StateList};
use crate::models::ErrorModel;
use crate::solver::{
    marginal_covariance, CostTerm, LevenbergMarquardt, Problem, SolverOptions, SolverReport,
};

/// Engine-side variable key for one state block.
fn state_key(name: &str, time: Time) -> String {
    format!("{name}@{time}")
}

/// A nonlinear least-squares estimation problem over time-indexed states.
///
/// States are added first, factors connect them, [`FactorGraph::solve`] runs
/// the minimization and writes the estimates back into the state storage, and
/// [`FactorGraph::compute_covariance`] fills in marginal covariances
/// afterwards.
#[derive(Default)]
pub struct FactorGraph {
    states: StateDataSet,
    factors: Vec<Arc<FactorNode>>,
    report: Option<SolverReport>,
}

impl FactorGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a zero-initialized state block. Returns `Ok(false)` without
    /// touching the existing block when (name, time) is already present with
    /// the same kind; re-adding with a different kind is a configuration
    /// error, and names must not contain `'@'`.
    pub fn add_state(&mut self, name: &str, kind: StateKind, time: Time) -> FusionResult<bool> {
        self.states.add_state(name, kind, time)
    }

    /// Overwrite the value of an existing state block, e.g. to seed the
    /// next solve from a previous estimate.
    pub fn set_state_value(
        &mut self,
        name: &str,
        time: Time,
        value: DVector<f64>,
    ) -> FusionResult<()> {
        let block = self.states.get_state_mut(name, time)?;
        if value.len() != block.dimension() {
            return Err(FusionError::InvalidInput(format!(
                "value has dimension {}, state '{name}' has {}",
                value.len(),
                block.dimension()
            )));
        }
        block.set_value(value);
        Ok(())
    }

    /// Read access to the state storage.
    pub fn state_data(&self) -> &StateDataSet {
        &self.states
    }

    /// Report of the last [`FactorGraph::solve`] run, if any.
    pub fn report(&self) -> Option<&SolverReport> {
        self.report.as_ref()
    }

    /// Number of factors in the graph.
    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Connect states with a factor.
    ///
    /// The connected states must already exist and match the factor's arity
    /// and dimensional layout; the error model must weight a residual of the
    /// factor's dimension. Measurement contents are copied into the factor,
    /// so the caller keeps ownership of its sensor storage.
    pub fn add_factor(
        &mut self,
        kind: FactorKind,
        states: &StateList,
        measurement: Option<&Measurement>,
        model: ErrorModel,
    ) -> FusionResult<()> {
        if states.len() != kind.arity() {
            return Err(FusionError::InvalidInput(format!(
                "factor {kind} connects {} states, got {}",
                kind.arity(),
                states.len()
            )));
        }

        let mut state_refs = Vec::with_capacity(states.len());
        let mut state_dims = Vec::with_capacity(states.len());
        for (name, time) in states.iter() {
            let block = self.states.get_state(name, *time)?;
            state_dims.push(block.dimension());
            state_refs.push((name.clone(), *time));
        }

        if kind.needs_measurement() && measurement.is_none() {
            return Err(FusionError::InvalidInput(format!(
                "factor {kind} requires a measurement"
            )));
        }

        let (dimension, mean, beacon) = match kind {
            FactorKind::Prior => {
                let m = measurement.ok_or_else(|| {
                    FusionError::InvalidInput(format!("factor {kind} requires a measurement"))
                })?;
                let mean = m.mean().clone();
                if mean.len() != state_dims[0] {
                    return Err(FusionError::InvalidInput(format!(
                        "prior mean has dimension {}, state has {}",
                        mean.len(),
                        state_dims[0]
                    )));
                }
                (state_dims[0], Some(mean), None)
            }
            FactorKind::Pseudorange2 | FactorKind::Pseudorange3 => {
                let position_dim = if kind == FactorKind::Pseudorange2 { 2 } else { 3 };
                if state_dims[0] != position_dim || state_dims[1] != 1 {
                    return Err(FusionError::InvalidInput(format!(
                        "factor {kind} expects a {position_dim}D position and a scalar offset, \
                         got dimensions {} and {}",
                        state_dims[0], state_dims[1]
                    )));
                }
                let m = measurement.ok_or_else(|| {
                    FusionError::InvalidInput(format!("factor {kind} requires a measurement"))
                })?;
                if m.mean().len() != 1 {
                    return Err(FusionError::InvalidInput(format!(
                        "pseudorange mean must be scalar, got dimension {}",
                        m.mean().len()
                    )));
                }
                let beacon = m.value(SensorElement::SatellitePosition)?.clone();
                if beacon.len() != position_dim {
                    return Err(FusionError::InvalidInput(format!(
                        "satellite position has dimension {}, expected {position_dim}",
                        beacon.len()
                    )));
                }
                (1, Some(m.mean().clone()), Some(beacon))
            }
            FactorKind::Range2 => {
                if state_dims[0] != 2 {
                    return Err(FusionError::InvalidInput(format!(
                        "factor {kind} expects a 2D position, got dimension {}",
                        state_dims[0]
                    )));
                }
                let m = measurement.ok_or_else(|| {
                    FusionError::InvalidInput(format!("factor {kind} requires a measurement"))
                })?;
                if m.mean().len() != 1 {
                    return Err(FusionError::InvalidInput(format!(
                        "range mean must be scalar, got dimension {}",
                        m.mean().len()
                    )));
                }
                let beacon = m.value(SensorElement::SatellitePosition)?.clone();
                if beacon.len() != 2 {
                    return Err(FusionError::InvalidInput(format!(
                        "beacon position has dimension {}, expected 2",
                        beacon.len()
                    )));
                }
                (1, Some(m.mean().clone()), Some(beacon))
            }
            FactorKind::ConstantValue => {
                if state_dims[0] != state_dims[1] {
                    return Err(FusionError::InvalidInput(format!(
                        "constant value factor needs equal dimensions, got {} and {}",
                        state_dims[0], state_dims[1]
                    )));
                }
                (state_dims[0], None, None)
            }
        };

        if model.dimension() != dimension {
            return Err(FusionError::Configuration(format!(
                "error model weights dimension {}, factor {kind} produces {dimension}",
                model.dimension()
            )));
        }

        debug!(factor = %kind, states = state_refs.len(), "adding factor");
        self.factors.push(Arc::new(FactorNode::new(
            kind,
            state_refs,
            dimension,
            mean,
            beacon,
            Arc::new(model),
        )));
        Ok(())
    }

    /// Build the engine problem and the initial values of every state block
    /// referenced by at least one factor.
    fn build_problem(
        &self,
    ) -> FusionResult<(
        Problem,
        HashMap<String, DVector<f64>>,
        HashMap<String, (String, Time)>,
    )> {
        let mut problem = Problem::new();
        let mut values: HashMap<String, DVector<f64>> = HashMap::new();
        let mut origins: HashMap<String, (String, Time)> = HashMap::new();

        for factor in &self.factors {
            let mut keys = Vec::with_capacity(factor.states().len());
            for (name, time) in factor.states() {
                let key = state_key(name, *time);
                if !values.contains_key(&key) {
                    let block = self.states.get_state(name, *time)?;
                    values.insert(key.clone(), block.value().clone());
                    origins.insert(key.clone(), (name.clone(), *time));
                }
                keys.push(key);
            }
            problem.add_residual_block(&keys, Arc::clone(factor) as Arc<dyn CostTerm>);
        }

        Ok((problem, values, origins))
    }

    /// Optimize all states connected to factors and write the estimates back.
    ///
    /// States no factor references are left untouched. Non-convergence is
    /// reported through the returned report, not as an error.
    pub fn solve(&mut self, options: &SolverOptions) -> FusionResult<SolverReport> {
        if self.factors.is_empty() {
            return Err(FusionError::Solver(
                "cannot solve a graph without factors".to_string(),
            ));
        }

        let (problem, initial, origins) = self.build_problem()?;
        info!(
            factors = self.factors.len(),
            states = initial.len(),
            "solving factor graph"
        );

        let mut solver = LevenbergMarquardt::with_options(options.clone());
        let minimization = solver.minimize(&problem, &initial)?;

        for (key, value) in minimization.values {
            let (name, time) = &origins[&key];
            self.states.get_state_mut(name, *time)?.set_value(value);
        }

        self.report = Some(minimization.report.clone());
        Ok(minimization.report)
    }

    /// Compute marginal covariances for every solved state block under the
    /// given name and store them in the blocks.
    ///
    /// Requires a prior successful [`FactorGraph::solve`] run so the graph is
    /// linearized at the estimate.
    pub fn compute_covariance(&mut self, name: &str) -> FusionResult<()> {
        if self.report.is_none() {
            return Err(FusionError::Configuration(
                "covariance requires a solved graph, call solve() first".to_string(),
            ));
        }
        if !self.states.has_name(name) {
            return Err(FusionError::NotFound(format!("no state named '{name}'")));
        }

        let (problem, values, origins) = self.build_problem()?;
        let keys: Vec<String> = self
            .states
            .times(name)
            .map(|time| state_key(name, time))
            .filter(|key| values.contains_key(key))
            .collect();
        if keys.is_empty() {
            return Err(FusionError::NotFound(format!(
                "no factor references a state named '{name}'"
            )));
        }

        let covariances = marginal_covariance(&problem, &values, &keys)?;
        for (key, covariance) in covariances {
            let (state_name, time) = &origins[&key];
            self.states
                .get_state_mut(state_name, *time)?
                .set_covariance(covariance);
        }
        Ok(())
    }
}
