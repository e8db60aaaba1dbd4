//! Robust factor-graph sensor fusion.
//!
//! This crate estimates time-varying latent quantities (positions, clock
//! offsets) from noisy, time-stamped measurements. The caller fills a
//! [`data::SensorDataSet`], walks its timeline to materialize state blocks and
//! bind factors in a [`graph::FactorGraph`], and delegates minimization to the
//! sparse Levenberg-Marquardt engine in [`solver`].
//!
//! The core never differentiates anything itself: every residual formula and
//! every error-model weighting is generic over an abstract real-number type,
//! so the engine can evaluate the same code with plain `f64` or with
//! forward-mode dual numbers.
//!
//! # Example
//!
//! ```no_run
//! use argus_fusion::data::{Measurement, SensorDataSet, SensorElement, SensorType, Time};
//! use argus_fusion::graph::{FactorGraph, FactorKind, StateKind, StateList};
//! use argus_fusion::models::ErrorModel;
//! use argus_fusion::solver::SolverOptions;
//! use nalgebra::dvector;
//!
//! let mut data = SensorDataSet::new();
//! let mut m = Measurement::new(SensorType::Pseudorange2, Time::from(0.0), dvector![14.25]);
//! m.set_value(SensorElement::SatellitePosition, dvector![10.0, 10.0]);
//! data.add_element(m);
//!
//! let mut graph = FactorGraph::new();
//! graph.add_state("position", StateKind::Point2, Time::from(0.0)).unwrap();
//! graph.add_state("offset", StateKind::ClockError, Time::from(0.0)).unwrap();
//!
//! let mut list = StateList::new();
//! list.add("position", Time::from(0.0));
//! list.add("offset", Time::from(0.0));
//! let noise = ErrorModel::gaussian_diagonal(dvector![0.25]).unwrap();
//! let range = data.get_element(SensorType::Pseudorange2, Time::from(0.0), 0).unwrap();
//! graph.add_factor(FactorKind::Pseudorange2, &list, Some(range), noise).unwrap();
//!
//! let report = graph.solve(&SolverOptions::default()).unwrap();
//! println!("{report}");
//! ```

pub mod data;
pub mod error;
pub mod graph;
pub mod logger;
pub mod math;
pub mod models;
pub mod solver;

pub use error::{FusionError, FusionResult};
pub use logger::{init_logger, init_logger_with_level};
