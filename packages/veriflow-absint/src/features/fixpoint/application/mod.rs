//! Fixpoint application layer: the two engines and the settings-driven
//! dispatch entry point.

pub mod analysis;
pub mod backward;
pub mod engine;

pub use analysis::{run_analysis, AnalysisError, AnalysisSummary};
pub use backward::BackwardFixpointEngine;
pub use engine::{EngineError, FixpointEngine};
