//! The factor graph core: time-indexed state storage, factor construction,
//! and the glue to the least-squares engine.

mod factor;
#[allow(clippy::module_inception)]
mod graph;
mod state;

pub use factor::FactorKind;
pub use graph::FactorGraph;
pub use state::{StateBlock, StateDataSet, StateKind, StateList};
