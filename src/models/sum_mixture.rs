//! The robust sum-mixture error model.
//!
//! Based on:
//! D. M. Rosen, M. Kaess, and J. J. Leonard,
//! "Robust incremental online inference over sparse factor graphs: Beyond the
//! Gaussian case", Proc. of Intl. Conf. on Robotics and Automation (ICRA),
//! Karlsruhe, 2013.

use nalgebra::{convert, DVector, RealField};

use crate::math::{scaled_log_sum_exp, GaussianMixture};

/// Underflow guard inside the exponent and the normalization logarithm.
const EPSILON: f64 = 1e-10;

/// How the additive normalization constant of a [`SumMixture`] is derived
/// from the component maxima.
///
/// Both variants are kept as explicitly selectable configurations: they do not
/// affect estimation correctness, only which published results a run
/// reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationPolicy {
    /// Sum of the per-component density maxima.
    #[default]
    SumOfMaxima,
    /// Largest per-component maximum, scaled by the component count, plus a
    /// fixed slack of 10.
    ScaledMaximum,
}

/// Sum-mixture weighting: combines all mixture components probabilistically.
///
/// The weighted residual is a scalar robust cost distributed equally over all
/// output coordinates, so its squared sum reconstructs
/// `−2·(L − log(normalization))` where `L` is the scaled log-sum-exp of the
/// component contributions.
#[derive(Debug, Clone)]
pub struct SumMixture {
    mixture: GaussianMixture,
    policy: NormalizationPolicy,
    /// Derived once when the mixture is attached; strictly positive.
    normalization: f64,
}

impl SumMixture {
    /// Attach a mixture and derive the normalization constant per `policy`.
    pub fn new(mixture: GaussianMixture, policy: NormalizationPolicy) -> Self {
        let normalization = match policy {
            NormalizationPolicy::SumOfMaxima => (0..mixture.len())
                .map(|k| mixture.maximum_of_component(k))
                .sum(),
            NormalizationPolicy::ScaledMaximum => {
                let mut max = mixture.maximum_of_component(0);
                for k in 1..mixture.len() {
                    max = max.max(mixture.maximum_of_component(k));
                }
                max * mixture.len() as f64 + 10.0
            }
        };
        Self {
            mixture,
            policy,
            normalization,
        }
    }

    /// Residual dimension.
    pub fn dimension(&self) -> usize {
        self.mixture.dimension()
    }

    /// The normalization constant currently in effect.
    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    /// The policy the normalization constant was derived with.
    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    /// Robustly weight a raw residual.
    ///
    /// For each component `k`: exponent `e_k = −½(‖Σ_k^{-1/2}(r − μ_k)‖² + ε)`
    /// and scaling `s_k = w_k · det(Σ_k^{-1/2})`; the combined
    /// `L = log Σ_k s_k · exp(e_k)` is mapped to
    /// `sqrt(max(0, −2(L − log(N + ε)))) / sqrt(dim)` on every coordinate.
    pub fn weight<T: RealField>(&self, raw: &DVector<T>) -> DVector<T> {
        let n = self.mixture.len();
        let mut exponents = Vec::with_capacity(n);
        let mut scalings = Vec::with_capacity(n);

        let half: T = convert(0.5);
        let guard: T = convert(EPSILON);
        for k in 0..n {
            let whitened = self.mixture.exponential_part(k, raw);
            exponents.push(-(half.clone() * (whitened.norm_squared() + guard.clone())));
            scalings.push(convert::<f64, T>(self.mixture.linear_part(k)));
        }

        let combined = scaled_log_sum_exp(&exponents, &scalings);
        let log_normalization: T = convert((self.normalization + EPSILON).ln());

        // −2(L − log N), clamped against tiny negative round-off.
        let squared_cost = (log_normalization - combined) * convert::<f64, T>(2.0);
        let dim = raw.len();
        let value = squared_cost.max(T::zero()).sqrt() / convert::<f64, T>((dim as f64).sqrt());
        DVector::from_element(dim, value)
    }
}
