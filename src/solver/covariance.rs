//! Marginal covariance recovery from the converged linear system.

use std::collections::HashMap;

use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::{Llt, SymbolicLlt};
use faer::Mat;
use nalgebra::{DMatrix, DVector};

use crate::error::{FusionError, FusionResult};
use crate::solver::problem::{assemble_system, Layout, Problem};

/// Extract the marginal covariance blocks of the requested variables.
///
/// The problem is relinearized at the given values, the Gauss-Newton Hessian
/// `J^T J` is factorized once, and for each requested variable the matching
/// columns of the inverse are recovered through sparse triangular solves. The
/// returned blocks are symmetrized against factorization round-off.
///
/// Fails when the Hessian is not positive definite, which is the case for an
/// unconstrained or degenerate problem.
pub fn marginal_covariance(
    problem: &Problem,
    values: &HashMap<String, DVector<f64>>,
    keys: &[String],
) -> FusionResult<HashMap<String, DMatrix<f64>>> {
    if problem.is_empty() {
        return Err(FusionError::Solver(
            "cannot compute covariance without residual blocks".to_string(),
        ));
    }

    let layout = Layout::new(values);
    let (_, jacobian) = assemble_system(problem, values, &layout)?;
    let hessian = jacobian
        .as_ref()
        .transpose()
        .to_col_major()
        .map_err(|e| FusionError::LinearAlgebra(format!("Jacobian transpose failed: {e:?}")))?
        * jacobian.as_ref();

    let sym = SymbolicLlt::try_new(hessian.symbolic(), faer::Side::Lower).map_err(|e| {
        FusionError::LinearAlgebra(format!("symbolic Cholesky analysis failed: {e:?}"))
    })?;
    let cholesky = Llt::try_new_with_symbolic(sym, hessian.as_ref(), faer::Side::Lower)
        .map_err(|_| {
            FusionError::LinearAlgebra(
                "Hessian is not positive definite, covariance is undefined".to_string(),
            )
        })?;

    let n = layout.total_dimension;
    let mut covariances = HashMap::with_capacity(keys.len());
    for key in keys {
        let offset = layout.offset_of(key)?;
        let dim = values
            .get(key)
            .ok_or_else(|| FusionError::Configuration(format!("unknown variable key '{key}'")))?
            .len();

        // Selector columns of the identity pick out this block of H^-1
        let rhs = Mat::from_fn(n, dim, |i, j| if i == offset + j { 1.0 } else { 0.0 });
        let solution = cholesky.solve(rhs);

        let mut block = DMatrix::zeros(dim, dim);
        for i in 0..dim {
            for j in 0..dim {
                block[(i, j)] = solution[(offset + i, j)];
            }
        }
        let symmetrized = (&block + block.transpose()) * 0.5;
        covariances.insert(key.clone(), symmetrized);
    }

    Ok(covariances)
}
