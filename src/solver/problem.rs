//! Residual block registry and sparse system assembly.

use std::collections::HashMap;
use std::sync::Arc;

use faer::sparse::{SparseColMat, Triplet};
use faer::Mat;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::error::{FusionError, FusionResult};
use crate::solver::{autodiff, CostTerm, Residual};

/// One registered cost term together with the variables it touches.
pub struct ResidualBlock {
    /// Row offset of this block in the stacked residual vector
    pub(crate) start_row: usize,
    /// Variable keys in the term's argument order
    pub(crate) variable_keys: Vec<String>,
    /// The cost term itself
    pub(crate) term: Arc<dyn CostTerm>,
}

/// A nonlinear least-squares problem as a list of residual blocks over named
/// variable vectors.
///
/// Variables are referenced by string key only; their current values live in
/// a separate map owned by the caller, so the same problem can be evaluated
/// at different linearization points.
#[derive(Default)]
pub struct Problem {
    blocks: Vec<ResidualBlock>,
    total_residual_dimension: usize,
}

impl Problem {
    /// Create an empty problem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cost term over the given variables. Returns the block index.
    pub fn add_residual_block(
        &mut self,
        variable_keys: &[String],
        term: Arc<dyn CostTerm>,
    ) -> usize {
        let start_row = self.total_residual_dimension;
        self.total_residual_dimension += term.dimension();
        self.blocks.push(ResidualBlock {
            start_row,
            variable_keys: variable_keys.to_vec(),
            term,
        });
        self.blocks.len() - 1
    }

    /// Number of registered residual blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total dimension of the stacked residual vector.
    pub fn total_residual_dimension(&self) -> usize {
        self.total_residual_dimension
    }

    /// Whether no residual block has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub(crate) fn blocks(&self) -> &[ResidualBlock] {
        &self.blocks
    }

    /// Half the squared norm of the stacked residual at the given values.
    pub fn cost(&self, values: &HashMap<String, DVector<f64>>) -> FusionResult<f64> {
        let costs: Vec<f64> = self
            .blocks
            .par_iter()
            .map(|block| {
                let params = gather_params(block, values)?;
                let residual = <dyn CostTerm as Residual<f64>>::residual(block.term.as_ref(), &params);
                Ok(0.5 * residual.norm_squared())
            })
            .collect::<FusionResult<Vec<f64>>>()?;
        Ok(costs.iter().sum())
    }
}

/// Column layout of the stacked parameter vector.
///
/// Keys are ordered lexicographically so the layout is deterministic for a
/// given variable set.
pub(crate) struct Layout {
    pub(crate) offsets: HashMap<String, usize>,
    pub(crate) total_dimension: usize,
}

impl Layout {
    pub(crate) fn new(values: &HashMap<String, DVector<f64>>) -> Self {
        let mut keys: Vec<&String> = values.keys().collect();
        keys.sort();
        let mut offsets = HashMap::with_capacity(keys.len());
        let mut total_dimension = 0;
        for key in keys {
            offsets.insert(key.clone(), total_dimension);
            total_dimension += values[key].len();
        }
        Self {
            offsets,
            total_dimension,
        }
    }

    pub(crate) fn offset_of(&self, key: &str) -> FusionResult<usize> {
        self.offsets
            .get(key)
            .copied()
            .ok_or_else(|| FusionError::Configuration(format!("unknown variable key '{key}'")))
    }
}

struct BlockEvaluation {
    start_row: usize,
    variable_keys: Vec<String>,
    parameter_dims: Vec<usize>,
    residual: DVector<f64>,
    jacobian: DMatrix<f64>,
}

fn gather_params(
    block: &ResidualBlock,
    values: &HashMap<String, DVector<f64>>,
) -> FusionResult<Vec<DVector<f64>>> {
    block
        .variable_keys
        .iter()
        .map(|key| {
            values
                .get(key)
                .cloned()
                .ok_or_else(|| FusionError::Configuration(format!("unknown variable key '{key}'")))
        })
        .collect()
}

/// Evaluate all residual blocks and scatter them into the stacked residual
/// vector and the sparse Jacobian for the given layout.
pub(crate) fn assemble_system(
    problem: &Problem,
    values: &HashMap<String, DVector<f64>>,
    layout: &Layout,
) -> FusionResult<(Mat<f64>, SparseColMat<usize, f64>)> {
    let evaluations: Vec<BlockEvaluation> = problem
        .blocks()
        .par_iter()
        .map(|block| {
            let params = gather_params(block, values)?;
            let parameter_dims: Vec<usize> = params.iter().map(DVector::len).collect();
            let (residual, jacobian) = autodiff::residual_and_jacobian(block.term.as_ref(), &params);
            Ok(BlockEvaluation {
                start_row: block.start_row,
                variable_keys: block.variable_keys.clone(),
                parameter_dims,
                residual,
                jacobian,
            })
        })
        .collect::<FusionResult<Vec<BlockEvaluation>>>()?;

    let num_rows = problem.total_residual_dimension();
    let num_cols = layout.total_dimension;

    let mut stacked = vec![0.0; num_rows];
    let mut triplets = Vec::new();
    for eval in &evaluations {
        for (i, value) in eval.residual.iter().enumerate() {
            stacked[eval.start_row + i] = *value;
        }
        let mut local_col = 0;
        for (key, dim) in eval.variable_keys.iter().zip(&eval.parameter_dims) {
            let col_offset = layout.offset_of(key)?;
            for i in 0..eval.residual.len() {
                for j in 0..*dim {
                    let value = eval.jacobian[(i, local_col + j)];
                    if value != 0.0 {
                        triplets.push(Triplet::new(eval.start_row + i, col_offset + j, value));
                    }
                }
            }
            local_col += dim;
        }
    }

    let jacobian = SparseColMat::<usize, f64>::try_new_from_triplets(num_rows, num_cols, &triplets)
        .map_err(|e| FusionError::LinearAlgebra(format!("failed to build sparse Jacobian: {e:?}")))?;
    let residuals = Mat::from_fn(num_rows, 1, |i, _| stacked[i]);

    Ok((residuals, jacobian))
}
