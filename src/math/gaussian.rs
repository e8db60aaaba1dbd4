//! Weighted Gaussian mixture container.
//!
//! A mixture component is stored in square-root information form: instead of
//! the covariance `Σ` we keep `Σ^{-1/2}`, so whitening a residual is a single
//! matrix-vector product and the component's peak density is `w · det(Σ^{-1/2})`.
//! Each component's contribution to a residual splits into an *exponential
//! part* (the whitened residual, the argument of the exponential) and a
//! *linear part* (the scalar prefactor), which is exactly the decomposition
//! the scaled log-sum-exp combination needs to stay overflow free.

use nalgebra::{convert, DMatrix, DVector, RealField};

use crate::error::{FusionError, FusionResult};

/// One weighted Gaussian term of a robust error model.
///
/// Immutable after construction; a fitting procedure (out of scope here) may
/// produce the parameters, the estimator only evaluates them.
#[derive(Debug, Clone)]
pub struct GaussianComponent {
    weight: f64,
    mean: DVector<f64>,
    sqrt_information: DMatrix<f64>,
    /// det(Σ^{-1/2}), cached for the linear part and the density peak.
    sqrt_det: f64,
}

impl GaussianComponent {
    /// Create a component from a diagonal standard deviation vector.
    pub fn from_std_dev(
        weight: f64,
        mean: DVector<f64>,
        std_dev: DVector<f64>,
    ) -> FusionResult<Self> {
        if weight <= 0.0 {
            return Err(FusionError::InvalidInput(format!(
                "component weight must be positive, got {weight}"
            )));
        }
        if mean.len() != std_dev.len() {
            return Err(FusionError::InvalidInput(format!(
                "mean dimension {} does not match std-dev dimension {}",
                mean.len(),
                std_dev.len()
            )));
        }
        if std_dev.iter().any(|s| *s <= 0.0) {
            return Err(FusionError::InvalidInput(
                "standard deviations must be positive".to_string(),
            ));
        }

        let sqrt_information = DMatrix::from_diagonal(&std_dev.map(|s| 1.0 / s));
        let sqrt_det = std_dev.iter().map(|s| 1.0 / s).product();
        Ok(Self {
            weight,
            mean,
            sqrt_information,
            sqrt_det,
        })
    }

    /// Create a component from a full covariance matrix.
    ///
    /// The inverse square root is taken through a symmetric eigendecomposition;
    /// the covariance must be symmetric positive definite.
    pub fn from_covariance(
        weight: f64,
        mean: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> FusionResult<Self> {
        if weight <= 0.0 {
            return Err(FusionError::InvalidInput(format!(
                "component weight must be positive, got {weight}"
            )));
        }
        if !covariance.is_square() || covariance.nrows() != mean.len() {
            return Err(FusionError::InvalidInput(format!(
                "covariance must be {n}x{n} for a {n}-dimensional mean",
                n = mean.len()
            )));
        }

        let eigen = covariance.symmetric_eigen();
        if eigen.eigenvalues.iter().any(|l| *l <= 0.0) {
            return Err(FusionError::InvalidInput(
                "covariance must be positive definite".to_string(),
            ));
        }

        let inv_sqrt_eigenvalues = eigen.eigenvalues.map(|l| 1.0 / l.sqrt());
        let sqrt_information = &eigen.eigenvectors
            * DMatrix::from_diagonal(&inv_sqrt_eigenvalues)
            * eigen.eigenvectors.transpose();
        let sqrt_det = inv_sqrt_eigenvalues.iter().product();
        Ok(Self {
            weight,
            mean,
            sqrt_information,
            sqrt_det,
        })
    }

    /// Dimension of the component.
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Component weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

/// Ordered container of weighted Gaussian components.
///
/// Always holds at least one component; this keeps the downstream
/// normalization constant strictly positive and the logarithms it feeds well
/// defined.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    components: Vec<GaussianComponent>,
}

impl GaussianMixture {
    /// Build a mixture from its components.
    ///
    /// Fails on an empty component list or on components of mixed dimension.
    pub fn new(components: Vec<GaussianComponent>) -> FusionResult<Self> {
        let first = components.first().ok_or_else(|| {
            FusionError::InvalidInput("a mixture needs at least one component".to_string())
        })?;
        let dim = first.dimension();
        if components.iter().any(|c| c.dimension() != dim) {
            return Err(FusionError::InvalidInput(
                "all mixture components must share one dimension".to_string(),
            ));
        }
        Ok(Self { components })
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// A mixture is never empty; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Dimension of the mixture.
    pub fn dimension(&self) -> usize {
        self.components[0].dimension()
    }

    /// Whitened residual of component `k`: `Σ_k^{-1/2} (r − μ_k)`.
    ///
    /// Generic over the scalar type so derivative information carried by `r`
    /// flows through the whitening.
    pub fn exponential_part<T: RealField>(&self, k: usize, residual: &DVector<T>) -> DVector<T> {
        let component = &self.components[k];
        let mean: DVector<T> = component.mean.map(|x| convert::<f64, T>(x));
        let sqrt_information: DMatrix<T> =
            component.sqrt_information.map(|x| convert::<f64, T>(x));
        sqrt_information * (residual - mean)
    }

    /// Scalar prefactor of component `k`: `w_k · det(Σ_k^{-1/2})`.
    ///
    /// Constant with respect to the residual for Gaussian components, so it is
    /// returned as plain `f64` and lifted into the scalar type by the caller.
    pub fn linear_part(&self, k: usize) -> f64 {
        let component = &self.components[k];
        component.weight * component.sqrt_det
    }

    /// Density value of component `k` at its own mean, used for normalization.
    ///
    /// The `(2π)^{-d/2}` factor is common to all components and cancels in the
    /// weighting, so it is left out.
    pub fn maximum_of_component(&self, k: usize) -> f64 {
        let component = &self.components[k];
        component.weight * component.sqrt_det
    }
}
