//! Robust error models for residual weighting.
//!
//! An error model transforms a raw geometric residual into the weighted
//! residual handed to the least-squares engine: `weight(raw) → weighted`,
//! same dimension in and out. The set of models is closed, so dispatch is a
//! plain enum rather than an inheritance hierarchy:
//!
//! - [`GaussianModel`]: pass-through whitening with `Σ^{-1/2}`, no robustness.
//! - [`SumMixture`]: probabilistic combination of all mixture components, the
//!   flagship robust model (Rosen et al., ICRA 2013).
//! - [`MaxMixture`]: deterministic selection of the dominant component
//!   (Olson and Agarwal, RSS 2012).
//!
//! Every `weight` implementation is a pure function of the stored parameters
//! and the residual, generic over the scalar type, and therefore safe to call
//! concurrently from the engine's evaluation threads.

mod gaussian;
mod max_mixture;
mod sum_mixture;

pub use gaussian::GaussianModel;
pub use max_mixture::MaxMixture;
pub use sum_mixture::{NormalizationPolicy, SumMixture};

use nalgebra::{DMatrix, DVector, RealField};

use crate::error::FusionResult;
use crate::math::GaussianMixture;

/// A robust error model instance, selectable per factor.
///
/// Wraps one of the concrete weighting strategies together with an `enabled`
/// toggle: a disabled model passes the raw residual through unchanged, which
/// is useful to compare robust and non-robust runs on identical graphs.
#[derive(Debug, Clone)]
pub struct ErrorModel {
    kind: ErrorModelKind,
    enabled: bool,
}

/// Closed set of weighting strategies behind [`ErrorModel`].
#[derive(Debug, Clone)]
pub enum ErrorModelKind {
    Gaussian(GaussianModel),
    SumMixture(SumMixture),
    MaxMixture(MaxMixture),
}

impl ErrorModel {
    /// Plain Gaussian model from a diagonal standard deviation vector.
    pub fn gaussian_diagonal(std_dev: DVector<f64>) -> FusionResult<Self> {
        Ok(Self::from(ErrorModelKind::Gaussian(
            GaussianModel::from_std_dev_diagonal(std_dev)?,
        )))
    }

    /// Plain Gaussian model from a full covariance matrix.
    pub fn gaussian_covariance(covariance: DMatrix<f64>) -> FusionResult<Self> {
        Ok(Self::from(ErrorModelKind::Gaussian(
            GaussianModel::from_covariance(covariance)?,
        )))
    }

    /// Robust sum-mixture model with the given normalization policy.
    pub fn sum_mixture(mixture: GaussianMixture, policy: NormalizationPolicy) -> Self {
        Self::from(ErrorModelKind::SumMixture(SumMixture::new(mixture, policy)))
    }

    /// Robust max-mixture model.
    pub fn max_mixture(mixture: GaussianMixture) -> Self {
        Self::from(ErrorModelKind::MaxMixture(MaxMixture::new(mixture)))
    }

    /// Dimension of the residual this model weights.
    pub fn dimension(&self) -> usize {
        match &self.kind {
            ErrorModelKind::Gaussian(m) => m.dimension(),
            ErrorModelKind::SumMixture(m) => m.dimension(),
            ErrorModelKind::MaxMixture(m) => m.dimension(),
        }
    }

    /// Enable or disable the model. Disabled means identity weighting.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the model currently weights residuals.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Transform a raw residual into the weighted residual fed to the engine.
    ///
    /// Pure with respect to the model state; generic over the scalar type so
    /// the engine can differentiate through it with dual numbers.
    pub fn weight<T: RealField + PartialOrd>(&self, raw: &DVector<T>) -> DVector<T> {
        if !self.enabled {
            return raw.clone();
        }
        match &self.kind {
            ErrorModelKind::Gaussian(m) => m.weight(raw),
            ErrorModelKind::SumMixture(m) => m.weight(raw),
            ErrorModelKind::MaxMixture(m) => m.weight(raw),
        }
    }
}

impl From<ErrorModelKind> for ErrorModel {
    fn from(kind: ErrorModelKind) -> Self {
        Self {
            kind,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::GaussianComponent;
    use nalgebra::dvector;

    fn two_component_mixture() -> GaussianMixture {
        GaussianMixture::new(vec![
            GaussianComponent::from_std_dev(0.8, dvector![0.0], dvector![0.5]).unwrap(),
            GaussianComponent::from_std_dev(0.2, dvector![0.0], dvector![5.0]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_disabled_model_is_identity() {
        let mut model =
            ErrorModel::sum_mixture(two_component_mixture(), NormalizationPolicy::SumOfMaxima);
        model.set_enabled(false);

        for r in [-100.0, -1.5, 0.0, 0.3, 42.0] {
            let raw = dvector![r];
            assert_eq!(model.weight(&raw), raw);
        }
    }

    #[test]
    fn test_enabled_gaussian_whitens() {
        let model = ErrorModel::gaussian_diagonal(dvector![2.0, 0.5]).unwrap();
        let weighted = model.weight(&dvector![4.0, 1.0]);
        assert_eq!(weighted, dvector![2.0, 2.0]);
    }

    #[test]
    fn test_dimension_reporting() {
        let gaussian = ErrorModel::gaussian_diagonal(dvector![1.0, 1.0, 1.0]).unwrap();
        assert_eq!(gaussian.dimension(), 3);

        let robust =
            ErrorModel::sum_mixture(two_component_mixture(), NormalizationPolicy::SumOfMaxima);
        assert_eq!(robust.dimension(), 1);
    }
}
