/*
 * veriflow-absint - Interprocedural Abstract Interpretation Engine
 *
 * Feature-First Architecture:
 * - shared/      : Program model (locations, transitions, statements)
 * - config/      : Analysis settings, domain/widening selection, deadlines
 * - features/    : Vertical slices (domains -> fixpoint -> smt)
 *
 * Given an interprocedural control flow graph and a pluggable abstract
 * domain, the fixpoint engine computes a sound over-approximation of the
 * reachable states at every location and reports whether designated error
 * locations are reachable. Graph construction from surface syntax, solver
 * process management and result presentation are collaborators, not part of
 * this crate.
 */

#![allow(clippy::new_without_default)] // Domain constructors stay explicit
#![allow(clippy::too_many_arguments)] // Transformer signatures mirror the contract
#![allow(clippy::module_inception)] // Feature-first module naming intentional

/// Shared models and utilities
pub mod shared;

/// Analysis configuration surface
pub mod config;

/// Vertical feature slices
pub mod features;

pub use config::{AnalysisSettings, ConfigError, Deadline, DomainKind, WideningKind};
pub use features::domains::{
    AbstractDomain, AbstractState, CallInfo, CallInfoCache, MultiState, SubsetRelation,
};
pub use features::fixpoint::{
    run_analysis, AbstractInterpretationResult, AnalysisBenchmark, AnalysisError, AnalysisSummary,
    AnalysisVerdict, BackwardFixpointEngine, Counterexample, CounterexampleStep, DebugHelper,
    EngineError, FixpointEngine, FixpointOutcome, LoopDetector, ScopedProvider,
    TransitionProvider, WholeProgramProvider,
};
pub use features::smt::{Formula, HoareTripleChecker, Script, SolverVerdict, TripleValidity};
pub use shared::models::{
    BinOp, Expr, Location, LocationId, Procedure, Program, ProgramBuilder, ProgramError, Sort,
    Statement, Transition, TransitionId, TransitionKind, UnOp, VarId,
};
