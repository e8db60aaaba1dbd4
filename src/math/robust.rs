//! Numerically stable reductions.
//!
//! Mixture-based error models have to evaluate terms of the shape
//! `log(Σ_i s_i · exp(e_i))` where the exponents come from squared Mahalanobis
//! distances and can be arbitrarily large in magnitude. Direct evaluation
//! overflows long before the mathematical result does; the standard fix is to
//! factor out the largest exponent before exponentiating.

use nalgebra::RealField;

/// Computes `log(Σ_i s_i · exp(e_i))` without overflow or underflow.
///
/// The maximum exponent is factored out, so every argument passed to `exp` is
/// non-positive and the reduction stays finite for exponents far beyond the
/// representable range of `exp` itself.
///
/// Generic over the scalar type so the same expression is evaluated with plain
/// `f64` and with derivative-carrying dual numbers. The maximum is selected
/// through [`RealField::max`] comparisons only; no control flow depends on a
/// differentiated quantity, so gradients propagate through the selected
/// branch exactly as the max-subtraction trick requires.
///
/// # Panics
///
/// Panics if `exponents` is empty or the lengths differ. Callers guarantee at
/// least one mixture component.
pub fn scaled_log_sum_exp<T: RealField>(exponents: &[T], scalings: &[T]) -> T {
    assert_eq!(
        exponents.len(),
        scalings.len(),
        "one scaling per exponent required"
    );
    assert!(!exponents.is_empty(), "at least one exponent required");

    let mut max = exponents[0].clone();
    for e in &exponents[1..] {
        max = max.max(e.clone());
    }

    let mut sum = T::zero();
    for (e, s) in exponents.iter().zip(scalings.iter()) {
        sum += s.clone() * (e.clone() - max.clone()).exp();
    }

    max + sum.ln()
}
