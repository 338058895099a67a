//! Fixpoint Engine
//!
//! The interprocedural worklist iteration and everything it needs:
//!
//! ```text
//! fixpoint
//! ├── ports/            # TransitionProvider
//! ├── domain/           # result, counterexample, benchmark counters
//! ├── application/      # FixpointEngine, BackwardFixpointEngine, run_analysis
//! └── infrastructure/   # loop detector, providers, soundness debug helper
//! ```
//!
//! The engine is domain-agnostic: it speaks to abstract domains only through
//! the `AbstractDomain` trait and to the graph only through
//! `TransitionProvider`.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use application::{
    run_analysis, AnalysisError, AnalysisSummary, BackwardFixpointEngine, EngineError,
    FixpointEngine,
};
pub use domain::{
    AbstractInterpretationResult, AnalysisBenchmark, AnalysisVerdict, Counterexample,
    CounterexampleStep, FixpointOutcome,
};
pub use infrastructure::{DebugHelper, LoopDetector, ScopedProvider, WholeProgramProvider};
pub use ports::TransitionProvider;
