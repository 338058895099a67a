/*
 * Forward Fixpoint Engine
 *
 * Classic worklist iteration over the interprocedural graph:
 *
 * 1. Seed the worklist with the outgoing transitions of every initial
 *    location, paired with a fresh top multi-state
 * 2. Pop a transition, read the multi-state at its source (absent means
 *    unreachable so far: skip)
 * 3. Transform it: ordinary post for Internal/Summary, the scope-switching
 *    post for Call, and the hierarchical combination with the caller's
 *    pre-call state for Return (a cross product over element pairs)
 * 4. Merge into the target, widening instead of joining when the target is
 *    a previously-visited loop head
 * 5. If the target's multi-state grew, re-enqueue its outgoing transitions
 * 6. Stop when the worklist drains (fixpoint) or the deadline fires
 *    (partial result)
 *
 * Worklist items carry the stack of open call scopes so successor queries
 * can reject returns that answer a different call site. Confluence is a
 * property of compliant domains, not enforced here; counterexample *choice*
 * is worklist-order dependent.
 *
 * Cancellation is an explicit outcome value, never an unwind. Panics are
 * reserved for provider/domain contract violations.
 */

use crate::config::{AnalysisSettings, Deadline};
use crate::features::domains::domain::{CallInfo, CallInfoCache, MultiState};
use crate::features::domains::ports::{AbstractDomain, AbstractState};
use crate::features::fixpoint::domain::{
    AbstractInterpretationResult, AnalysisBenchmark, Counterexample, CounterexampleStep,
    FixpointOutcome,
};
use crate::features::fixpoint::infrastructure::{DebugHelper, LoopDetector};
use crate::features::fixpoint::ports::TransitionProvider;
use crate::shared::models::{LocationId, Program, TransitionId, TransitionKind};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Engine construction/run error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Empty seed set: nothing to analyze (distinct from "no error reachable")
    #[error("no initial locations supplied; the analysis has nothing to seed")]
    MissingInitialLocations,

    /// The selected entry procedure has no entry location
    #[error("procedure '{0}' has no entry location")]
    MissingEntry(String),
}

/// One pending propagation
#[derive(Debug, Clone, PartialEq)]
struct WorkItem {
    transition: TransitionId,
    /// Open call scopes, innermost last
    scopes: Vec<TransitionId>,
}

/// Per-location record of the last propagation that changed it
struct ReachRecord<S> {
    transition: TransitionId,
    post: MultiState<S>,
    step: u64,
}

/// Forward abstract-interpretation engine
pub struct FixpointEngine<'a, D: AbstractDomain, P: TransitionProvider> {
    program: &'a Program,
    domain: &'a D,
    provider: &'a P,
    max_parallel_states: usize,
    loop_heads: FxHashSet<LocationId>,
    deadline: Deadline,
    validator: Option<DebugHelper<'a>>,
}

impl<'a, D: AbstractDomain, P: TransitionProvider> FixpointEngine<'a, D, P> {
    pub fn new(
        program: &'a Program,
        domain: &'a D,
        provider: &'a P,
        settings: &AnalysisSettings,
    ) -> Self {
        Self {
            program,
            domain,
            provider,
            max_parallel_states: settings.max_parallel_states,
            loop_heads: LoopDetector::loop_heads(program),
            deadline: Deadline::from_settings(settings),
            validator: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Attach the soundness oracle; every computed post gets cross-checked
    pub fn with_validator(mut self, validator: DebugHelper<'a>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Run to a fixpoint from `initial`
    pub fn run(
        &mut self,
        initial: &[LocationId],
    ) -> Result<AbstractInterpretationResult<D::State>, EngineError> {
        if initial.is_empty() {
            error!("fixpoint engine started without initial locations");
            return Err(EngineError::MissingInitialLocations);
        }
        let cap = self.max_parallel_states;

        let mut loc2state: FxHashMap<LocationId, MultiState<D::State>> = FxHashMap::default();
        let mut visits: FxHashMap<LocationId, u64> = FxHashMap::default();
        let mut reach: FxHashMap<LocationId, ReachRecord<D::State>> = FxHashMap::default();
        let mut counterexamples: Vec<Counterexample<D::State>> = Vec::new();
        let mut benchmark = AnalysisBenchmark::default();
        let mut call_cache = CallInfoCache::new();
        let mut worklist: VecDeque<WorkItem> = VecDeque::new();

        for &loc in initial {
            let vars = self
                .program
                .variables_of(&self.program.location(loc).procedure);
            loc2state.insert(loc, MultiState::singleton(self.domain.fresh_state(&vars), cap));
            for &t in &self.program.location(loc).outgoing {
                worklist.push_back(WorkItem {
                    transition: t,
                    scopes: Vec::new(),
                });
            }
        }
        info!(
            seeds = initial.len(),
            pending = worklist.len(),
            "fixpoint iteration starting"
        );

        let mut outcome = FixpointOutcome::Converged;
        let mut step: u64 = 0;

        while let Some(item) = worklist.pop_front() {
            if self.deadline.is_expired() {
                warn!(
                    iterations = benchmark.iterations,
                    "deadline fired; returning partial results"
                );
                outcome = FixpointOutcome::TimedOut;
                break;
            }
            benchmark.iterations += 1;
            benchmark.observe_worklist_len(worklist.len());

            let t = self.program.transition(item.transition);
            let Some(pre) = loc2state.get(&t.source).cloned() else {
                continue;
            };
            if pre.is_bottom() {
                continue;
            }

            // Post computation per transition kind.
            let (post, hierarchical_pre, call_info): (
                MultiState<D::State>,
                Option<MultiState<D::State>>,
                Option<CallInfo>,
            ) = match t.kind {
                TransitionKind::Internal | TransitionKind::Summary { .. } => {
                    benchmark.post_applications += pre.states().len() as u64;
                    (pre.map(|s| self.domain.post(s, t)), None, None)
                }
                TransitionKind::Call => {
                    let info = call_cache.get_or_build(self.program, t).clone();
                    benchmark.post_applications += pre.states().len() as u64;
                    (
                        pre.map(|s| self.domain.post_call(s, &info, t)),
                        None,
                        Some(info),
                    )
                }
                TransitionKind::Return { corresponding_call } => {
                    let call_t = self.program.transition(corresponding_call);
                    let Some(caller_pre) = loc2state.get(&call_t.source).cloned() else {
                        // The call site is not reached yet; the return will
                        // be re-enqueued once it is.
                        continue;
                    };
                    let info = call_cache.get_or_build(self.program, call_t).clone();
                    benchmark.post_applications +=
                        (pre.states().len() * caller_pre.states().len()) as u64;
                    let combined = pre.cross_product(&caller_pre, |callee, caller| {
                        self.domain.post_return(callee, caller, &info, t)
                    });
                    (combined, Some(caller_pre), Some(info))
                }
            };

            if let Some(validator) = self.validator.as_mut() {
                let sound = validator.is_post_sound(
                    &pre,
                    hierarchical_pre.as_ref(),
                    &post,
                    t,
                    call_info.as_ref(),
                );
                if !sound {
                    benchmark.unsound_posts += 1;
                }
            }

            if post.is_bottom() {
                continue;
            }
            let dst = t.target;

            // A processed call must wake its returns even when the callee
            // entry does not change (the callee may already be analyzed via
            // another call site); the hierarchical combination with THIS
            // caller still has to run.
            if matches!(t.kind, TransitionKind::Call) {
                let mut callee_scopes = item.scopes.clone();
                callee_scopes.push(t.id);
                for ret in self.program.returns_for_call(t.id) {
                    if !loc2state.contains_key(&self.program.transition(ret).source) {
                        continue;
                    }
                    let duplicate = worklist
                        .iter()
                        .any(|w| w.transition == ret && w.scopes == callee_scopes);
                    if !duplicate {
                        worklist.push_back(WorkItem {
                            transition: ret,
                            scopes: callee_scopes.clone(),
                        });
                    }
                }
            }

            // Merge-or-widen against the state already stored at dst.
            let widen_here =
                self.loop_heads.contains(&dst) && visits.get(&dst).copied().unwrap_or(0) > 0;
            let new_state = match loc2state.get(&dst) {
                None => post.clone(),
                Some(old) if old.is_bottom() => post.clone(),
                Some(old) => {
                    if widen_here {
                        benchmark.widenings += 1;
                        old.cross_product(&post, |o, n| self.domain.widen(o, &o.join(n)))
                    } else {
                        benchmark.merges += 1;
                        old.merge(&post)
                    }
                }
            };

            let changed = match loc2state.get(&dst) {
                None => !new_state.is_bottom(),
                Some(old) => !new_state.subset_of(old).is_covered(),
            };
            if !changed {
                continue;
            }

            step += 1;
            loc2state.insert(dst, new_state.clone());
            *visits.entry(dst).or_insert(0) += 1;
            benchmark.locations_updated += 1;
            reach.insert(
                dst,
                ReachRecord {
                    transition: t.id,
                    post: new_state.clone(),
                    step,
                },
            );
            #[cfg(feature = "trace")]
            eprintln!(
                "[Fixpoint] {} -> {} via {}: {} disjunct(s)",
                t.source,
                dst,
                t.id,
                new_state.states().len()
            );

            if self.program.location(dst).is_error {
                benchmark.counterexamples_recorded += 1;
                debug!(location = %dst, "error location reached");
                counterexamples.push(self.reconstruct(&reach, &loc2state, dst, initial));
            }

            // Scope bookkeeping, then fan out.
            let mut scopes = item.scopes;
            match t.kind {
                TransitionKind::Call => scopes.push(t.id),
                TransitionKind::Return { .. } => {
                    scopes.pop();
                }
                _ => {}
            }
            for succ in self.provider.successors(t.id, scopes.last().copied()) {
                let s = self.program.transition(succ);
                assert!(
                    s.source == dst,
                    "transition provider contract violation: successor {} of {} starts at {}",
                    succ,
                    t.id,
                    s.source
                );
                let duplicate = worklist
                    .iter()
                    .any(|w| w.transition == succ && w.scopes == scopes);
                if !duplicate {
                    worklist.push_back(WorkItem {
                        transition: succ,
                        scopes: scopes.clone(),
                    });
                }
            }
        }

        info!(
            iterations = benchmark.iterations,
            updated = benchmark.locations_updated,
            outcome = ?outcome,
            "fixpoint iteration finished"
        );
        Ok(AbstractInterpretationResult::new(
            loc2state,
            counterexamples,
            benchmark,
            outcome,
        ))
    }

    /// Walk the recorded propagation chain backwards from `error_loc`
    ///
    /// Steps strictly decrease along the walk, so cycles terminate; the
    /// result is one feasible-looking abstract witness, not necessarily the
    /// shortest.
    fn reconstruct(
        &self,
        reach: &FxHashMap<LocationId, ReachRecord<D::State>>,
        loc2state: &FxHashMap<LocationId, MultiState<D::State>>,
        error_loc: LocationId,
        initial: &[LocationId],
    ) -> Counterexample<D::State> {
        let mut steps = Vec::new();
        let mut cur = error_loc;
        let mut last_step = u64::MAX;
        while let Some(rec) = reach.get(&cur) {
            if rec.step >= last_step {
                break;
            }
            last_step = rec.step;
            steps.push(CounterexampleStep {
                multi_state: rec.post.clone(),
                location: cur,
                transition: Some(rec.transition),
            });
            cur = self.program.transition(rec.transition).source;
            if initial.contains(&cur) {
                break;
            }
        }
        let seed = loc2state
            .get(&cur)
            .cloned()
            .unwrap_or_else(|| MultiState::bottom(self.max_parallel_states));
        steps.push(CounterexampleStep {
            multi_state: seed,
            location: cur,
            transition: None,
        });
        steps.reverse();
        Counterexample::new(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::domains::infrastructure::interval::{Bound, IntervalDomain};
    use crate::features::fixpoint::domain::AnalysisVerdict;
    use crate::features::fixpoint::infrastructure::WholeProgramProvider;
    use crate::shared::models::{Expr, ProgramBuilder, Statement, VarId};
    use std::time::Duration;

    fn x() -> VarId {
        VarId::int("x")
    }

    /// x := 0; l1 -> l2 (x := x + 1) -> l1; l1 -> exit
    fn straight_line() -> (Program, LocationId, LocationId) {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![x()]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        let l2 = b.add_location("main");
        b.mark_entry(l0);
        b.mark_exit(l2);
        b.add_internal(
            l0,
            l1,
            Statement::Assign {
                var: x(),
                expr: Expr::int(0),
            },
        );
        b.add_internal(
            l1,
            l2,
            Statement::Assign {
                var: x(),
                expr: Expr::add(Expr::var(x()), Expr::int(1)),
            },
        );
        (b.build().expect("straight line builds"), l0, l2)
    }

    #[test]
    fn test_empty_seed_set_is_an_error() {
        let (p, _, _) = straight_line();
        let d = IntervalDomain::default();
        let provider = WholeProgramProvider::new(&p);
        let settings = AnalysisSettings::default();
        let mut engine = FixpointEngine::new(&p, &d, &provider, &settings);
        assert_eq!(
            engine.run(&[]).unwrap_err(),
            EngineError::MissingInitialLocations
        );
    }

    #[test]
    fn test_straight_line_propagation() {
        let (p, entry, exit) = straight_line();
        let d = IntervalDomain::default();
        let provider = WholeProgramProvider::new(&p);
        let settings = AnalysisSettings::default();
        let mut engine = FixpointEngine::new(&p, &d, &provider, &settings);
        let result = engine.run(&[entry]).expect("run succeeds");

        assert_eq!(result.outcome(), FixpointOutcome::Converged);
        assert_eq!(result.verdict(), AnalysisVerdict::Safe);
        let states = result.states_at(exit);
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].interval_of(&x()).lo, Bound::Int(1));
        assert_eq!(states[0].interval_of(&x()).hi, Bound::Int(1));
    }

    #[test]
    fn test_expired_deadline_reports_partial_result() {
        let (p, entry, _) = straight_line();
        let d = IntervalDomain::default();
        let provider = WholeProgramProvider::new(&p);
        let settings = AnalysisSettings::default();
        let mut engine = FixpointEngine::new(&p, &d, &provider, &settings)
            .with_deadline(Deadline::after(Duration::from_secs(0)));
        let result = engine.run(&[entry]).expect("partial result, not an error");

        assert_eq!(result.outcome(), FixpointOutcome::TimedOut);
        assert_eq!(result.verdict(), AnalysisVerdict::TimedOut);
    }

    #[test]
    fn test_error_location_yields_counterexample() {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![x()]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        b.mark_entry(l0);
        b.mark_error(l1);
        b.add_internal(
            l0,
            l1,
            Statement::Assign {
                var: x(),
                expr: Expr::int(3),
            },
        );
        let p = b.build().expect("error program builds");

        let d = IntervalDomain::default();
        let provider = WholeProgramProvider::new(&p);
        let settings = AnalysisSettings::default();
        let mut engine = FixpointEngine::new(&p, &d, &provider, &settings);
        let result = engine.run(&[l0]).expect("run succeeds");

        assert!(result.has_reached_error());
        assert_eq!(result.verdict(), AnalysisVerdict::ErrorReachable);
        let cex = result.counterexamples().next().expect("one counterexample");
        assert_eq!(cex.error_location(), Some(l1));
        assert_eq!(cex.steps().first().map(|s| s.location), Some(l0));
        assert!(cex.steps().first().expect("seed step").transition.is_none());
    }

    #[test]
    fn test_unreachable_branch_stays_bottom() {
        // assume x < 0 after x := 5 never fires.
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![x()]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        let l2 = b.add_location("main");
        b.mark_entry(l0);
        b.add_internal(
            l0,
            l1,
            Statement::Assign {
                var: x(),
                expr: Expr::int(5),
            },
        );
        b.add_internal(
            l1,
            l2,
            Statement::Assume {
                cond: Expr::lt(Expr::var(x()), Expr::int(0)),
            },
        );
        let p = b.build().expect("program builds");

        let d = IntervalDomain::default();
        let provider = WholeProgramProvider::new(&p);
        let settings = AnalysisSettings::default();
        let mut engine = FixpointEngine::new(&p, &d, &provider, &settings);
        let result = engine.run(&[l0]).expect("run succeeds");

        assert!(result.states_at(l2).is_empty(), "l2 must stay unreachable");
    }
}
