//! The robust max-mixture error model.
//!
//! Based on:
//! E. Olson and P. Agarwal, "Inference on networks of mixtures for robust
//! robot mapping", Proc. of Robotics: Science and Systems (RSS), Sydney, 2012.

use nalgebra::{convert, DVector, RealField};

use crate::math::GaussianMixture;

/// Max-mixture weighting: the dominant component stands in for the sum.
///
/// Instead of combining all components probabilistically, the component with
/// the highest likelihood at the current residual is selected and its
/// whitened residual is returned. The selection is deterministic and made
/// through comparisons of the negative log-likelihoods
/// `½‖Σ_k^{-1/2}(r − μ_k)‖² − log(w_k · det(Σ_k^{-1/2}))`, so derivative
/// information flows through the winning branch only.
#[derive(Debug, Clone)]
pub struct MaxMixture {
    mixture: GaussianMixture,
}

impl MaxMixture {
    /// Attach a mixture.
    pub fn new(mixture: GaussianMixture) -> Self {
        Self { mixture }
    }

    /// Residual dimension.
    pub fn dimension(&self) -> usize {
        self.mixture.dimension()
    }

    /// Weight a raw residual with the dominant component.
    pub fn weight<T: RealField + PartialOrd>(&self, raw: &DVector<T>) -> DVector<T> {
        let half: T = convert(0.5);

        let mut best_whitened = self.mixture.exponential_part(0, raw);
        let mut best_cost = half.clone() * best_whitened.norm_squared()
            - convert::<f64, T>(self.mixture.linear_part(0).ln());

        for k in 1..self.mixture.len() {
            let whitened = self.mixture.exponential_part(k, raw);
            let cost = half.clone() * whitened.norm_squared()
                - convert::<f64, T>(self.mixture.linear_part(k).ln());
            if cost < best_cost {
                best_cost = cost;
                best_whitened = whitened;
            }
        }

        best_whitened
    }
}
