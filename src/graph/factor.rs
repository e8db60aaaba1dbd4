//! Factor definitions and their residual formulas.

use std::fmt;
use std::sync::Arc;

use nalgebra::{convert, DVector, RealField};

use crate::data::Time;
use crate::models::ErrorModel;
use crate::solver::{CostTerm, Residual};

/// The measurement equation a factor encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorKind {
    /// Direct observation of a single state
    Prior,
    /// 2D pseudorange: geometric range to a beacon plus a scalar offset
    Pseudorange2,
    /// 3D pseudorange
    Pseudorange3,
    /// 2D range without an offset state
    Range2,
    /// Soft equality between two states of the same kind
    ConstantValue,
}

impl FactorKind {
    /// Number of state blocks this factor connects.
    pub fn arity(&self) -> usize {
        match self {
            FactorKind::Prior => 1,
            FactorKind::Pseudorange2 => 2,
            FactorKind::Pseudorange3 => 2,
            FactorKind::Range2 => 1,
            FactorKind::ConstantValue => 2,
        }
    }

    /// Whether this factor needs a measurement attached.
    pub fn needs_measurement(&self) -> bool {
        !matches!(self, FactorKind::ConstantValue)
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorKind::Prior => write!(f, "Prior"),
            FactorKind::Pseudorange2 => write!(f, "Pseudorange2"),
            FactorKind::Pseudorange3 => write!(f, "Pseudorange3"),
            FactorKind::Range2 => write!(f, "Range2"),
            FactorKind::ConstantValue => write!(f, "ConstantValue"),
        }
    }
}

/// One instantiated factor: the residual formula plus the extracted
/// measurement data and the robust error model applied on top.
///
/// The measurement contents are copied out at construction so evaluation
/// never reaches back into the sensor storage.
pub(crate) struct FactorNode {
    kind: FactorKind,
    states: Vec<(String, Time)>,
    dimension: usize,
    mean: Option<DVector<f64>>,
    beacon: Option<DVector<f64>>,
    model: Arc<ErrorModel>,
}

impl FactorNode {
    pub(crate) fn new(
        kind: FactorKind,
        states: Vec<(String, Time)>,
        dimension: usize,
        mean: Option<DVector<f64>>,
        beacon: Option<DVector<f64>>,
        model: Arc<ErrorModel>,
    ) -> Self {
        Self {
            kind,
            states,
            dimension,
            mean,
            beacon,
            model,
        }
    }

    pub(crate) fn states(&self) -> &[(String, Time)] {
        &self.states
    }

    fn mean_as<T: RealField>(&self) -> DVector<T> {
        self.mean
            .as_ref()
            .map(|m| m.map(|x| convert::<f64, T>(x)))
            .unwrap_or_else(|| DVector::zeros(0))
    }

    /// The unweighted measurement residual.
    fn raw_residual<T: RealField>(&self, params: &[DVector<T>]) -> DVector<T> {
        match self.kind {
            FactorKind::Prior => &params[0] - self.mean_as::<T>(),
            FactorKind::Pseudorange2 | FactorKind::Pseudorange3 => {
                let beacon = self
                    .beacon
                    .as_ref()
                    .map(|b| b.map(|x| convert::<f64, T>(x)))
                    .unwrap_or_else(|| DVector::zeros(params[0].len()));
                let diff = &params[0] - beacon;
                let range = diff.norm();
                let mean = self.mean_as::<T>();
                DVector::from_vec(vec![range + params[1][0].clone() - mean[0].clone()])
            }
            FactorKind::Range2 => {
                let beacon = self
                    .beacon
                    .as_ref()
                    .map(|b| b.map(|x| convert::<f64, T>(x)))
                    .unwrap_or_else(|| DVector::zeros(params[0].len()));
                let diff = &params[0] - beacon;
                let range = diff.norm();
                let mean = self.mean_as::<T>();
                DVector::from_vec(vec![range - mean[0].clone()])
            }
            FactorKind::ConstantValue => &params[1] - &params[0],
        }
    }
}

impl<T: RealField + PartialOrd> Residual<T> for FactorNode {
    fn residual(&self, params: &[DVector<T>]) -> DVector<T> {
        let raw = self.raw_residual(params);
        self.model.weight(&raw)
    }
}

impl CostTerm for FactorNode {
    fn dimension(&self) -> usize {
        self.dimension
    }
}
