//! Levenberg-Marquardt minimization over sparse normal equations.

use std::collections::HashMap;
use std::time::Instant;

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::sparse::{SparseColMat, Triplet};
use faer::Mat;
use nalgebra::DVector;
use tracing::{debug, info};

use crate::error::{FusionError, FusionResult};
use crate::solver::problem::{assemble_system, Layout, Problem};
use crate::solver::{SolverOptions, SolverReport, SolverStatus};

/// Result of one minimization run: the optimized variable values and the
/// accompanying report.
pub struct Minimization {
    /// Optimized values, one vector per variable key
    pub values: HashMap<String, DVector<f64>>,
    /// Termination status and run statistics
    pub report: SolverReport,
}

/// Damped Gauss-Newton minimizer with adaptive trust-region style damping.
///
/// Good steps (quality above 0.75) shrink the damping, rejected steps
/// (quality below zero) grow it; in between the step is taken with the
/// damping unchanged.
pub struct LevenbergMarquardt {
    options: SolverOptions,
    damping: f64,
    damping_min: f64,
    damping_max: f64,
    damping_increase_factor: f64,
    damping_decrease_factor: f64,
    min_step_quality: f64,
    good_step_quality: f64,
}

impl LevenbergMarquardt {
    /// Create a solver with default options.
    pub fn new() -> Self {
        Self::with_options(SolverOptions::default())
    }

    /// Create a solver with the given options.
    pub fn with_options(options: SolverOptions) -> Self {
        let damping = options.initial_damping;
        Self {
            options,
            damping,
            damping_min: 1e-12,
            damping_max: 1e12,
            damping_increase_factor: 10.0,
            damping_decrease_factor: 0.3,
            min_step_quality: 0.0,
            good_step_quality: 0.75,
        }
    }

    /// Update damping from the step quality ratio and decide acceptance.
    fn update_damping(&mut self, rho: f64) -> bool {
        if rho > self.good_step_quality {
            self.damping = (self.damping * self.damping_decrease_factor).max(self.damping_min);
            true
        } else if rho < self.min_step_quality {
            self.damping = (self.damping * self.damping_increase_factor).min(self.damping_max);
            false
        } else {
            true
        }
    }

    /// Ratio of actual to predicted cost reduction.
    fn compute_step_quality(current_cost: f64, new_cost: f64, predicted_reduction: f64) -> f64 {
        let actual_reduction = current_cost - new_cost;
        if predicted_reduction.abs() < 1e-15 {
            if actual_reduction > 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            actual_reduction / predicted_reduction
        }
    }

    /// Predicted reduction of the quadratic model for the step `dx`:
    /// `-dx^T g - 0.5 dx^T H dx` with `g = J^T r`.
    fn compute_predicted_reduction(
        step: &Mat<f64>,
        gradient: &Mat<f64>,
        hessian: &SparseColMat<usize, f64>,
    ) -> f64 {
        let linear_term = step.transpose() * gradient;
        let quadratic_term = step.transpose() * (hessian * step);
        -linear_term[(0, 0)] - 0.5 * quadratic_term[(0, 0)]
    }

    /// Solve `(H + lambda I) dx = -g` for the augmented step.
    fn solve_augmented_system(
        hessian: &SparseColMat<usize, f64>,
        gradient: &Mat<f64>,
        lambda: f64,
    ) -> FusionResult<Option<Mat<f64>>> {
        let n = hessian.ncols();
        let mut lambda_triplets = Vec::with_capacity(n);
        for i in 0..n {
            lambda_triplets.push(Triplet::new(i, i, lambda));
        }
        let lambda_i = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &lambda_triplets)
            .map_err(|e| {
                FusionError::LinearAlgebra(format!("failed to build damping matrix: {e:?}"))
            })?;

        let augmented = hessian.clone() + lambda_i;

        let sym = SymbolicLlt::try_new(augmented.symbolic(), faer::Side::Lower).map_err(|e| {
            FusionError::LinearAlgebra(format!("symbolic Cholesky analysis failed: {e:?}"))
        })?;
        match Llt::try_new_with_symbolic(sym, augmented.as_ref(), faer::Side::Lower) {
            Ok(cholesky) => {
                let negative_gradient = gradient * -1.0;
                Ok(Some(cholesky.solve(negative_gradient)))
            }
            // Indefinite augmented system, let the caller raise the damping
            Err(_) => Ok(None),
        }
    }

    /// Minimize the problem starting from the given values.
    ///
    /// Non-convergence within the iteration budget is reported through the
    /// returned [`SolverReport`], not as an error. `Err` is reserved for
    /// structural failures such as unknown variable keys or an unbuildable
    /// linear system.
    pub fn minimize(
        &mut self,
        problem: &Problem,
        initial: &HashMap<String, DVector<f64>>,
    ) -> FusionResult<Minimization> {
        if problem.is_empty() {
            return Err(FusionError::Solver(
                "cannot minimize a problem without residual blocks".to_string(),
            ));
        }

        let start_time = Instant::now();
        let layout = Layout::new(initial);
        let mut values = initial.clone();

        let initial_cost = problem.cost(&values)?;
        let mut current_cost = initial_cost;

        let mut iteration = 0;
        let mut successful_steps = 0;
        let mut unsuccessful_steps = 0;
        let mut final_gradient_norm = f64::INFINITY;

        info!(
            blocks = problem.num_blocks(),
            variables = layout.offsets.len(),
            initial_cost,
            "starting Levenberg-Marquardt"
        );

        let status = loop {
            let (residuals, jacobian) = assemble_system(problem, &values, &layout)?;
            let hessian = jacobian
                .as_ref()
                .transpose()
                .to_col_major()
                .map_err(|e| {
                    FusionError::LinearAlgebra(format!("Jacobian transpose failed: {e:?}"))
                })?
                * jacobian.as_ref();
            let gradient = jacobian.as_ref().transpose() * residuals.as_ref();
            let gradient_norm = gradient.norm_l2();
            final_gradient_norm = gradient_norm;

            if gradient_norm < self.options.gradient_tolerance {
                break SolverStatus::GradientToleranceReached;
            }
            if iteration >= self.options.max_iterations {
                break SolverStatus::MaxIterationsReached;
            }

            let step = match Self::solve_augmented_system(&hessian, &gradient, self.damping)? {
                Some(step) => step,
                None => {
                    unsuccessful_steps += 1;
                    self.damping = (self.damping * self.damping_increase_factor).min(self.damping_max);
                    if self.damping >= self.damping_max {
                        break SolverStatus::NumericalFailure;
                    }
                    iteration += 1;
                    continue;
                }
            };
            let step_norm = step.norm_l2();

            let predicted_reduction =
                Self::compute_predicted_reduction(&step, &gradient, &hessian);

            let mut new_values = values.clone();
            for (key, value) in new_values.iter_mut() {
                let offset = layout.offset_of(key)?;
                for i in 0..value.len() {
                    value[i] += step[(offset + i, 0)];
                }
            }
            let new_cost = problem.cost(&new_values)?;

            let rho = Self::compute_step_quality(current_cost, new_cost, predicted_reduction);
            let accepted = self.update_damping(rho);

            debug!(
                iteration,
                cost = new_cost,
                step_norm,
                gradient_norm,
                damping = self.damping,
                rho,
                accepted,
                "iteration finished"
            );

            iteration += 1;
            if accepted {
                let cost_change = current_cost - new_cost;
                values = new_values;
                current_cost = new_cost;
                successful_steps += 1;

                if cost_change.abs() < self.options.cost_tolerance {
                    break SolverStatus::CostToleranceReached;
                }
                if step_norm < self.options.parameter_tolerance {
                    break SolverStatus::ParameterToleranceReached;
                }
            } else {
                unsuccessful_steps += 1;
            }
        };

        let report = SolverReport {
            status,
            iterations: iteration,
            successful_steps,
            unsuccessful_steps,
            initial_cost,
            final_cost: current_cost,
            final_gradient_norm,
            elapsed: start_time.elapsed(),
        };

        info!(
            status = %report.status,
            iterations = report.iterations,
            final_cost = report.final_cost,
            "finished Levenberg-Marquardt"
        );

        Ok(Minimization { values, report })
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{CostTerm, Residual};
    use nalgebra::RealField;
    use std::sync::Arc;

    struct RangeToBeacon {
        beacon: [f64; 2],
        measured: f64,
    }

    impl<T: RealField> Residual<T> for RangeToBeacon {
        fn residual(&self, params: &[DVector<T>]) -> DVector<T> {
            let dx = params[0][0].clone() - nalgebra::convert::<f64, T>(self.beacon[0]);
            let dy = params[0][1].clone() - nalgebra::convert::<f64, T>(self.beacon[1]);
            let range = (dx.clone() * dx + dy.clone() * dy).sqrt();
            DVector::from_vec(vec![range - nalgebra::convert::<f64, T>(self.measured)])
        }
    }

    impl CostTerm for RangeToBeacon {
        fn dimension(&self) -> usize {
            1
        }
    }

    fn trilateration_problem() -> (Problem, HashMap<String, DVector<f64>>) {
        // True position (1.0, 2.0), three beacons, exact ranges
        let truth = [1.0f64, 2.0];
        let beacons = [[10.0, 0.0], [-10.0, 0.0], [0.0, 10.0]];
        let mut problem = Problem::new();
        for beacon in beacons {
            let measured =
                ((truth[0] - beacon[0]).powi(2) + (truth[1] - beacon[1]).powi(2)).sqrt();
            problem.add_residual_block(
                &["p".to_string()],
                Arc::new(RangeToBeacon { beacon, measured }),
            );
        }
        let mut initial = HashMap::new();
        initial.insert("p".to_string(), DVector::from_vec(vec![0.0, 0.0]));
        (problem, initial)
    }

    #[test]
    fn test_trilateration_converges_to_truth() {
        let (problem, initial) = trilateration_problem();
        let mut solver = LevenbergMarquardt::new();
        let result = solver.minimize(&problem, &initial).unwrap();

        assert!(result.report.status.is_converged(), "{}", result.report);
        let p = &result.values["p"];
        assert!((p[0] - 1.0).abs() < 1e-6, "x = {}", p[0]);
        assert!((p[1] - 2.0).abs() < 1e-6, "y = {}", p[1]);
        assert!(result.report.final_cost < 1e-12);
        assert!(result.report.final_cost <= result.report.initial_cost);
    }

    #[test]
    fn test_empty_problem_is_rejected() {
        let problem = Problem::new();
        let mut solver = LevenbergMarquardt::new();
        assert!(solver.minimize(&problem, &HashMap::new()).is_err());
    }

    #[test]
    fn test_iteration_budget_is_honored() {
        let (problem, initial) = trilateration_problem();
        let options = SolverOptions::default().with_max_iterations(1);
        let mut solver = LevenbergMarquardt::with_options(options);
        let result = solver.minimize(&problem, &initial).unwrap();
        assert!(result.report.iterations <= 1);
    }

    #[test]
    fn test_report_display_mentions_status() {
        let (problem, initial) = trilateration_problem();
        let mut solver = LevenbergMarquardt::new();
        let result = solver.minimize(&problem, &initial).unwrap();
        let text = format!("{}", result.report);
        assert!(text.contains("Status:"));
        assert!(text.contains("Final cost:"));
    }
}
