/*
 * Backward Fixpoint Engine
 *
 * The forward algorithm with edge direction and call/return roles swapped:
 * seeded from sink locations, states flow from a transition's target to its
 * source, a Return opens the callee scope and the matching Call closes it.
 * Backward join-only analyses (liveness) need no disjunction, so the
 * disjunction cap is forced to 1 at construction, so misconfiguration is
 * impossible, not just rejected.
 *
 * Domains used backwards interpret `apply` as the backward transformer for
 * every statement kind, including Call and Return payloads.
 */

use crate::config::{AnalysisSettings, Deadline};
use crate::features::domains::domain::MultiState;
use crate::features::domains::ports::{AbstractDomain, AbstractState};
use crate::features::fixpoint::domain::{
    AbstractInterpretationResult, AnalysisBenchmark, FixpointOutcome,
};
use crate::features::fixpoint::infrastructure::LoopDetector;
use crate::features::fixpoint::ports::TransitionProvider;
use crate::shared::models::{LocationId, Program, TransitionId, TransitionKind};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::{error, info, warn};

use super::engine::EngineError;

#[derive(Debug, Clone, PartialEq)]
struct WorkItem {
    transition: TransitionId,
    scopes: Vec<TransitionId>,
}

/// Backward abstract-interpretation engine (join-only, cap forced to 1)
pub struct BackwardFixpointEngine<'a, D: AbstractDomain, P: TransitionProvider> {
    program: &'a Program,
    domain: &'a D,
    provider: &'a P,
    loop_heads: FxHashSet<LocationId>,
    deadline: Deadline,
}

impl<'a, D: AbstractDomain, P: TransitionProvider> BackwardFixpointEngine<'a, D, P> {
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
            loop_heads: LoopDetector::loop_heads(program),
            deadline: Deadline::from_settings(settings),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run to a fixpoint from `sinks`
    pub fn run(
        &mut self,
        sinks: &[LocationId],
    ) -> Result<AbstractInterpretationResult<D::State>, EngineError> {
        if sinks.is_empty() {
            error!("backward engine started without sink locations");
            return Err(EngineError::MissingInitialLocations);
        }
        // Backward join-only analyses do not need disjunction.
        let cap = 1;

        let mut loc2state: FxHashMap<LocationId, MultiState<D::State>> = FxHashMap::default();
        let mut visits: FxHashMap<LocationId, u64> = FxHashMap::default();
        let mut benchmark = AnalysisBenchmark::default();
        let mut worklist: VecDeque<WorkItem> = VecDeque::new();

        for &loc in sinks {
            let vars = self
                .program
                .variables_of(&self.program.location(loc).procedure);
            loc2state.insert(loc, MultiState::singleton(self.domain.fresh_state(&vars), cap));
            for &t in &self.program.location(loc).incoming {
                worklist.push_back(WorkItem {
                    transition: t,
                    scopes: Vec::new(),
                });
            }
        }
        info!(
            seeds = sinks.len(),
            pending = worklist.len(),
            "backward fixpoint iteration starting"
        );

        let mut outcome = FixpointOutcome::Converged;

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
            let Some(pre) = loc2state.get(&t.target).cloned() else {
                continue;
            };

            benchmark.post_applications += pre.states().len() as u64;
            let post = pre.map(|s| self.domain.apply(s, &t.statement));

            let dst = t.source;
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
                None => true,
                Some(old) => !new_state.subset_of(old).is_covered(),
            };
            if !changed {
                continue;
            }

            loc2state.insert(dst, new_state);
            *visits.entry(dst).or_insert(0) += 1;
            benchmark.locations_updated += 1;

            // Scope roles swapped: a Return opens the callee going backward,
            // its Call closes it.
            let mut scopes = item.scopes;
            match t.kind {
                TransitionKind::Return { corresponding_call } => scopes.push(corresponding_call),
                TransitionKind::Call => {
                    scopes.pop();
                }
                _ => {}
            }
            for pred in self.provider.predecessors(t.id, scopes.last().copied()) {
                let p = self.program.transition(pred);
                assert!(
                    p.target == dst,
                    "transition provider contract violation: predecessor {} of {} ends at {}",
                    pred,
                    t.id,
                    p.target
                );
                let duplicate = worklist
                    .iter()
                    .any(|w| w.transition == pred && w.scopes == scopes);
                if !duplicate {
                    worklist.push_back(WorkItem {
                        transition: pred,
                        scopes: scopes.clone(),
                    });
                }
            }
        }

        info!(
            iterations = benchmark.iterations,
            updated = benchmark.locations_updated,
            outcome = ?outcome,
            "backward fixpoint iteration finished"
        );
        Ok(AbstractInterpretationResult::new(
            loc2state,
            Vec::new(),
            benchmark,
            outcome,
        ))
    }
}
