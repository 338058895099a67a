/*
 * Analysis Result Model
 *
 * Created once per engine run, immutable afterwards. Distinguishes a fully
 * converged fixpoint from a cancelled run whose partial `loc2states` is
 * still a valid approximation, just possibly not a fixpoint.
 */

use crate::features::domains::domain::MultiState;
use crate::features::domains::ports::AbstractState;
use crate::shared::models::{LocationId, TransitionId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::benchmark::AnalysisBenchmark;

/// How the worklist loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixpointOutcome {
    /// Worklist drained; `loc2states` is a fixpoint
    Converged,

    /// Deadline fired; partial results
    TimedOut,
}

/// Reportable three-way verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisVerdict {
    /// No error location is reachable
    Safe,

    /// Some error location holds a non-bottom state
    ErrorReachable,

    /// Could not decide before the deadline
    TimedOut,
}

/// One step of an abstract error trace
#[derive(Debug, Clone)]
pub struct CounterexampleStep<S> {
    /// Multi-state at `location` when the step was recorded
    pub multi_state: MultiState<S>,

    /// Location reached by this step
    pub location: LocationId,

    /// Transition taken to reach `location`; `None` for the seed step
    pub transition: Option<TransitionId>,
}

/// A finite abstract execution trace ending in an error location
///
/// Order-dependent: among several reachable witnesses the engine records
/// the one its worklist order found, not necessarily the shortest.
#[derive(Debug, Clone)]
pub struct Counterexample<S> {
    steps: Vec<CounterexampleStep<S>>,
}

impl<S: AbstractState> Counterexample<S> {
    pub fn new(steps: Vec<CounterexampleStep<S>>) -> Self {
        Self { steps }
    }

    /// Steps from an initial location to the error location
    pub fn steps(&self) -> &[CounterexampleStep<S>] {
        &self.steps
    }

    pub fn error_location(&self) -> Option<LocationId> {
        self.steps.last().map(|s| s.location)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Everything one engine run produced
#[derive(Debug)]
pub struct AbstractInterpretationResult<S> {
    loc2states: FxHashMap<LocationId, MultiState<S>>,
    counterexamples: Vec<Counterexample<S>>,
    benchmark: AnalysisBenchmark,
    outcome: FixpointOutcome,
}

impl<S: AbstractState> AbstractInterpretationResult<S> {
    pub fn new(
        loc2states: FxHashMap<LocationId, MultiState<S>>,
        counterexamples: Vec<Counterexample<S>>,
        benchmark: AnalysisBenchmark,
        outcome: FixpointOutcome,
    ) -> Self {
        Self {
            loc2states,
            counterexamples,
            benchmark,
            outcome,
        }
    }

    /// Did any error location receive a non-bottom state?
    pub fn has_reached_error(&self) -> bool {
        !self.counterexamples.is_empty()
    }

    pub fn counterexamples(&self) -> impl Iterator<Item = &Counterexample<S>> {
        self.counterexamples.iter()
    }

    /// States computed at `location`; empty when unreachable
    pub fn states_at(&self, location: LocationId) -> &[S] {
        self.loc2states
            .get(&location)
            .map(|ms| ms.states())
            .unwrap_or(&[])
    }

    pub fn loc2states(&self) -> &FxHashMap<LocationId, MultiState<S>> {
        &self.loc2states
    }

    pub fn benchmark(&self) -> &AnalysisBenchmark {
        &self.benchmark
    }

    pub fn outcome(&self) -> FixpointOutcome {
        self.outcome
    }

    /// Was the run flagged by the soundness oracle?
    pub fn is_flagged_unsound(&self) -> bool {
        self.benchmark.unsound_posts > 0
    }

    pub fn verdict(&self) -> AnalysisVerdict {
        if self.has_reached_error() {
            AnalysisVerdict::ErrorReachable
        } else if self.outcome == FixpointOutcome::TimedOut {
            AnalysisVerdict::TimedOut
        } else {
            AnalysisVerdict::Safe
        }
    }
}
