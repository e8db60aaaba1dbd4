//! Sparse nonlinear least-squares engine.
//!
//! This module is the external collaborator of the graph core: it consumes
//! cost terms (residual formulas that are generic over the scalar type),
//! differentiates them with forward-mode dual numbers, and minimizes the
//! squared residual norm with a Levenberg-Marquardt loop over sparse normal
//! equations. The graph core on top of it never differentiates and never
//! touches the linear algebra; it only produces cost evaluations and
//! bookkeeping.
//!
//! - [`problem`]: residual block registry and variable layout
//! - [`autodiff`]: Jacobians via `num-dual` dual numbers
//! - [`levenberg`]: the minimization loop
//! - [`covariance`]: marginal covariance blocks after convergence

pub mod autodiff;
pub mod covariance;
pub mod levenberg;
pub mod problem;

pub use covariance::marginal_covariance;
pub use levenberg::{LevenbergMarquardt, Minimization};
pub use problem::Problem;

use std::fmt;
use std::time::Duration;

use nalgebra::{DVector, RealField};
use num_dual::DualDVec64;

/// A residual formula evaluated at a set of parameter vectors.
///
/// Implementations must be pure functions of their stored configuration and
/// the parameters: the engine evaluates them concurrently from multiple
/// threads.
pub trait Residual<T: RealField>: Send + Sync {
    /// Evaluate the (weighted) residual at the given parameter vectors, in
    /// the argument order fixed at registration.
    fn residual(&self, params: &[DVector<T>]) -> DVector<T>;
}

/// A cost term the engine can both evaluate and differentiate.
///
/// The two supertrait instantiations are what the engine needs: plain `f64`
/// for cost evaluation and [`DualDVec64`] for forward-mode Jacobians. A single
/// generic `Residual<T>` impl covers both.
pub trait CostTerm: Residual<f64> + Residual<DualDVec64> {
    /// Dimension of the residual vector this term produces.
    fn dimension(&self) -> usize;
}

/// Configuration of the Levenberg-Marquardt engine.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Convergence tolerance on the cost decrease of an accepted step
    pub cost_tolerance: f64,
    /// Convergence tolerance on the parameter update norm
    pub parameter_tolerance: f64,
    /// Convergence tolerance on the gradient norm
    pub gradient_tolerance: f64,
    /// Initial damping parameter
    pub initial_damping: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            cost_tolerance: 1e-10,
            parameter_tolerance: 1e-10,
            gradient_tolerance: 1e-10,
            initial_damping: 1e-4,
        }
    }
}

impl SolverOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the cost tolerance.
    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    /// Set the parameter tolerance.
    pub fn with_parameter_tolerance(mut self, parameter_tolerance: f64) -> Self {
        self.parameter_tolerance = parameter_tolerance;
        self
    }

    /// Set the gradient tolerance.
    pub fn with_gradient_tolerance(mut self, gradient_tolerance: f64) -> Self {
        self.gradient_tolerance = gradient_tolerance;
        self
    }

    /// Set the initial damping parameter.
    pub fn with_initial_damping(mut self, initial_damping: f64) -> Self {
        self.initial_damping = initial_damping;
        self
    }
}

/// Why the minimization loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverStatus {
    /// Cost decrease of an accepted step fell below the tolerance
    CostToleranceReached,
    /// Parameter update norm fell below the tolerance
    ParameterToleranceReached,
    /// Gradient norm fell below the tolerance
    GradientToleranceReached,
    /// Maximum number of iterations reached without convergence
    MaxIterationsReached,
    /// The linear step computation failed (indefinite or singular system)
    NumericalFailure,
}

impl SolverStatus {
    /// Whether the run ended in a converged state.
    pub fn is_converged(&self) -> bool {
        matches!(
            self,
            SolverStatus::CostToleranceReached
                | SolverStatus::ParameterToleranceReached
                | SolverStatus::GradientToleranceReached
        )
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStatus::CostToleranceReached => write!(f, "Cost tolerance reached"),
            SolverStatus::ParameterToleranceReached => write!(f, "Parameter tolerance reached"),
            SolverStatus::GradientToleranceReached => write!(f, "Gradient tolerance reached"),
            SolverStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            SolverStatus::NumericalFailure => write!(f, "Numerical failure"),
        }
    }
}

/// Summary of one minimization run.
///
/// Non-convergence is reported here, never as an `Err`: the caller decides
/// whether partial results are usable.
#[derive(Debug, Clone)]
pub struct SolverReport {
    /// Final termination status
    pub status: SolverStatus,
    /// Number of iterations performed
    pub iterations: usize,
    /// Number of accepted steps
    pub successful_steps: usize,
    /// Number of rejected steps
    pub unsuccessful_steps: usize,
    /// Cost before the first iteration
    pub initial_cost: f64,
    /// Cost after the last accepted step
    pub final_cost: f64,
    /// Gradient norm at the last evaluation
    pub final_gradient_norm: f64,
    /// Total wall-clock time of the run
    pub elapsed: Duration,
}

impl fmt::Display for SolverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Levenberg-Marquardt Summary ===")?;
        writeln!(f, "Status:              {}", self.status)?;
        writeln!(f, "Iterations:          {}", self.iterations)?;
        writeln!(
            f,
            "Steps:               {} accepted, {} rejected",
            self.successful_steps, self.unsuccessful_steps
        )?;
        writeln!(f, "Initial cost:        {:.6e}", self.initial_cost)?;
        writeln!(f, "Final cost:          {:.6e}", self.final_cost)?;
        writeln!(f, "Final gradient norm: {:.6e}", self.final_gradient_norm)?;
        write!(f, "Total time:          {:?}", self.elapsed)
    }
}
