//! Fixpoint domain models: results, counterexamples, benchmark counters.

pub mod benchmark;
pub mod result;

pub use benchmark::AnalysisBenchmark;
pub use result::{
    AbstractInterpretationResult, AnalysisVerdict, Counterexample, CounterexampleStep,
    FixpointOutcome,
};
