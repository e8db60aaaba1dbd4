//! Numerical building blocks for the robust error models
//!
//! - [`robust`]: numerically stable reductions, most importantly the scaled
//!   log-sum-exp used to combine Gaussian mixture components without overflow.
//! - [`gaussian`]: weighted Gaussian mixture container that decomposes each
//!   component into the exponential and linear part of its density.

pub mod gaussian;
pub mod robust;

pub use gaussian::{GaussianComponent, GaussianMixture};
pub use robust::scaled_log_sum_exp;
