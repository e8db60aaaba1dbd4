//! Plain Gaussian error model: whitening without robustness.

use nalgebra::{convert, DMatrix, DVector, RealField};

use crate::error::{FusionError, FusionResult};

/// Zero-mean Gaussian noise model in square-root information form.
///
/// `weight(r) = Σ^{-1/2} · r`, which turns the squared norm of the weighted
/// residual into the Mahalanobis distance expected by least squares.
#[derive(Debug, Clone)]
pub struct GaussianModel {
    sqrt_information: DMatrix<f64>,
}

impl GaussianModel {
    /// Diagonal model from per-coordinate standard deviations.
    pub fn from_std_dev_diagonal(std_dev: DVector<f64>) -> FusionResult<Self> {
        if std_dev.is_empty() {
            return Err(FusionError::InvalidInput(
                "standard deviation vector must not be empty".to_string(),
            ));
        }
        if std_dev.iter().any(|s| *s <= 0.0) {
            return Err(FusionError::InvalidInput(
                "standard deviations must be positive".to_string(),
            ));
        }
        Ok(Self {
            sqrt_information: DMatrix::from_diagonal(&std_dev.map(|s| 1.0 / s)),
        })
    }

    /// Full model from a symmetric positive definite covariance matrix.
    pub fn from_covariance(covariance: DMatrix<f64>) -> FusionResult<Self> {
        if !covariance.is_square() || covariance.is_empty() {
            return Err(FusionError::InvalidInput(
                "covariance must be a non-empty square matrix".to_string(),
            ));
        }

        let eigen = covariance.symmetric_eigen();
        if eigen.eigenvalues.iter().any(|l| *l <= 0.0) {
            return Err(FusionError::InvalidInput(
                "covariance must be positive definite".to_string(),
            ));
        }
        let sqrt_information = &eigen.eigenvectors
            * DMatrix::from_diagonal(&eigen.eigenvalues.map(|l| 1.0 / l.sqrt()))
            * eigen.eigenvectors.transpose();
        Ok(Self { sqrt_information })
    }

    /// Residual dimension.
    pub fn dimension(&self) -> usize {
        self.sqrt_information.nrows()
    }

    /// Whiten the raw residual: `Σ^{-1/2} · r`.
    pub fn weight<T: RealField>(&self, raw: &DVector<T>) -> DVector<T> {
        let sqrt_information: DMatrix<T> = self.sqrt_information.map(|x| convert::<f64, T>(x));
        sqrt_information * raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::dvector;

    #[test]
    fn test_diagonal_whitening() {
        let model = GaussianModel::from_std_dev_diagonal(dvector![0.5, 2.0]).unwrap();
        let weighted = model.weight(&dvector![1.0, 1.0]);
        assert_relative_eq!(weighted[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(weighted[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_covariance_model_matches_diagonal() {
        let diag = GaussianModel::from_std_dev_diagonal(dvector![3.0]).unwrap();
        let full = GaussianModel::from_covariance(DMatrix::from_diagonal(&dvector![9.0])).unwrap();
        let r = dvector![2.5];
        assert_relative_eq!(diag.weight(&r)[0], full.weight(&r)[0], epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(GaussianModel::from_std_dev_diagonal(dvector![1.0, 0.0]).is_err());
        assert!(GaussianModel::from_covariance(DMatrix::from_diagonal(&dvector![-1.0])).is_err());
    }
}
