/*
 * Analysis Dispatch
 *
 * Maps the configuration surface onto concrete engine instantiations. The
 * domain registry is the closed `DomainKind` enum: adding a domain means
 * adding a variant and a match arm, and an unknown identifier already failed
 * at parse time.
 */

use crate::config::{AnalysisSettings, ConfigError, DomainKind};
use crate::features::domains::infrastructure::{
    CongruenceDomain, ConstPropDomain, IntervalDomain, LiveVariablesDomain, OctagonDomain,
};
use crate::features::domains::ports::{AbstractDomain, AbstractState};
use crate::features::fixpoint::domain::{AnalysisBenchmark, AnalysisVerdict};
use crate::features::fixpoint::infrastructure::{DebugHelper, WholeProgramProvider};
use crate::features::smt::Script;
use crate::shared::models::{LocationId, Program};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::backward::BackwardFixpointEngine;
use super::engine::{EngineError, FixpointEngine};

/// Anything that can stop an analysis before it produces a verdict
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Domain-erased summary of one run, ready for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Domain that ran
    pub domain: DomainKind,

    /// Safe / error reachable / timed out
    pub verdict: AnalysisVerdict,

    /// Error locations that received a non-bottom state
    pub reached_errors: Vec<LocationId>,

    /// Lengths of the recorded abstract error traces
    pub counterexample_lengths: Vec<usize>,

    /// Engine counters
    pub benchmark: AnalysisBenchmark,

    /// Did the soundness oracle flag the run?
    pub flagged_unsound: bool,
}

/// Run the configured analysis over `program`
///
/// Library mode seeds every procedure entry; otherwise the entry of `main`
/// is the single seed. Backward domains run on the backward engine seeded
/// from exit locations.
pub fn run_analysis(
    program: &Program,
    settings: &AnalysisSettings,
) -> Result<AnalysisSummary, AnalysisError> {
    settings.validate()?;

    match settings.domain {
        DomainKind::Interval => {
            let domain = IntervalDomain::new(settings.widening, program.literals());
            run_forward(program, &domain, settings)
        }
        DomainKind::Octagon => run_forward(program, &OctagonDomain::new(), settings),
        DomainKind::Equality => run_forward(program, &CongruenceDomain::new(), settings),
        DomainKind::Dataflow => run_forward(program, &ConstPropDomain::new(), settings),
        DomainKind::LiveVariables => run_backward(program, &LiveVariablesDomain::new(), settings),
    }
}

/// Forward seeds: all entries (library mode) or `main`'s entry
fn forward_seeds(
    program: &Program,
    settings: &AnalysisSettings,
) -> Result<Vec<LocationId>, EngineError> {
    if settings.library_mode {
        return Ok(program.entry_locations());
    }
    let main = program
        .procedure("main")
        .and_then(|p| p.entry)
        .ok_or_else(|| EngineError::MissingEntry("main".to_string()))?;
    Ok(vec![main])
}

fn run_forward<D: AbstractDomain>(
    program: &Program,
    domain: &D,
    settings: &AnalysisSettings,
) -> Result<AnalysisSummary, AnalysisError> {
    let seeds = forward_seeds(program, settings)?;
    let provider = WholeProgramProvider::new(program);
    let script = Script::lightweight();

    let mut engine = FixpointEngine::new(program, domain, &provider, settings);
    if settings.validate_posts {
        engine = engine.with_validator(DebugHelper::new(&script));
    }
    let result = engine.run(&seeds)?;

    Ok(summarize(program, settings.domain, &result))
}

fn run_backward<D: AbstractDomain>(
    program: &Program,
    domain: &D,
    settings: &AnalysisSettings,
) -> Result<AnalysisSummary, AnalysisError> {
    let sinks: Vec<LocationId> = program
        .locations()
        .filter(|l| l.is_exit)
        .map(|l| l.id)
        .collect();
    let provider = WholeProgramProvider::new(program);
    let mut engine = BackwardFixpointEngine::new(program, domain, &provider, settings);
    let result = engine.run(&sinks)?;

    Ok(summarize(program, settings.domain, &result))
}

fn summarize<S: AbstractState>(
    program: &Program,
    domain: DomainKind,
    result: &crate::features::fixpoint::domain::AbstractInterpretationResult<S>,
) -> AnalysisSummary {
    let reached_errors: Vec<LocationId> = program
        .error_locations()
        .into_iter()
        .filter(|loc| !result.states_at(*loc).is_empty())
        .collect();
    AnalysisSummary {
        domain,
        verdict: result.verdict(),
        reached_errors,
        counterexample_lengths: result.counterexamples().map(|c| c.len()).collect(),
        benchmark: result.benchmark().clone(),
        flagged_unsound: result.is_flagged_unsound(),
    }
}
