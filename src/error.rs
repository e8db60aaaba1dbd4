//! Error types for the argus-fusion library
//!
//! All fallible operations return [`FusionResult`]. The variants follow the
//! crate's error taxonomy: configuration mistakes are surfaced at the call
//! site, numerical guard conditions are handled internally and never appear
//! here, and solver non-convergence is reported through the solver report
//! rather than as an error.

use thiserror::Error;

/// Main result type used throughout the argus-fusion library
pub type FusionResult<T> = Result<T, FusionError>;

/// Main error type for the argus-fusion library
#[derive(Debug, Clone, Error)]
pub enum FusionError {
    /// Invalid input parameters (wrong dimensions, non-positive weights, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Graph construction mistakes (wrong state-list arity, unknown states,
    /// missing measurements, covariance before solve)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Lookup of a measurement or state block that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Solver related errors (empty problem, failed step computation)
    #[error("Solver error: {0}")]
    Solver(String),

    /// Linear algebra related errors (failed factorization, singular system)
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),
}
