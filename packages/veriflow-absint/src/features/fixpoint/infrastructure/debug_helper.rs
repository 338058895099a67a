/*
 * Soundness Debug Helper
 *
 * Optional cross-validation of engine post-states: every computed post is
 * independently checked as a Hoare triple against the SMT oracle. An INVALID
 * answer means the abstract post-condition fails to over-approximate the
 * concrete post-condition, i.e. a domain bug. The run is flagged and the triple
 * is logged for postmortem inspection, but the engine is not halted: this is
 * a development-time assertion, not a runtime safety check.
 *
 * Debug predicate names come from the checker's own counter, scoped to this
 * run.
 */

use crate::features::domains::domain::{CallInfo, MultiState};
use crate::features::domains::ports::AbstractState;
use crate::features::smt::{Formula, HoareTripleChecker, Script, TripleValidity};
use crate::shared::models::{Expr, Statement, Transition, TransitionKind, VarId};
use tracing::error;

/// Per-run soundness oracle
pub struct DebugHelper<'a> {
    checker: HoareTripleChecker<'a>,
    unsound: u64,
}

impl<'a> DebugHelper<'a> {
    pub fn new(script: &'a Script) -> Self {
        Self {
            checker: HoareTripleChecker::new(script),
            unsound: 0,
        }
    }

    /// Posts rejected so far
    pub fn unsound_count(&self) -> u64 {
        self.unsound
    }

    /// Validate `{pre} transition {post}`; `hierarchical_pre` carries the
    /// caller's pre-call state for Return transitions.
    pub fn is_post_sound<S: AbstractState>(
        &mut self,
        pre: &MultiState<S>,
        hierarchical_pre: Option<&MultiState<S>>,
        post: &MultiState<S>,
        transition: &Transition,
        call_info: Option<&CallInfo>,
    ) -> bool {
        let pre_formula = pre.to_formula();
        let post_formula = post.to_formula();

        let validity = match transition.kind {
            TransitionKind::Call => {
                let Some(info) = call_info else {
                    // Without a renaming plan there is nothing to relate.
                    return true;
                };
                let bindings: Vec<(VarId, Expr)> = info
                    .formals
                    .iter()
                    .cloned()
                    .zip(info.arguments.iter().cloned())
                    .collect();
                self.checker.check_call(&pre_formula, &bindings, &post_formula)
            }
            TransitionKind::Return { .. } => {
                let hier_formula = hierarchical_pre
                    .map(|h| h.to_formula())
                    .unwrap_or(Formula::True);
                let assigns = match &transition.statement {
                    Statement::Return { assigns } => assigns.clone(),
                    _ => Vec::new(),
                };
                self.checker
                    .check_return(&pre_formula, &hier_formula, &assigns, &post_formula)
            }
            TransitionKind::Internal | TransitionKind::Summary { .. } => {
                self.checker
                    .check_internal(&pre_formula, &transition.statement, &post_formula)
            }
        };

        match validity {
            TripleValidity::Invalid => {
                self.unsound += 1;
                let hier = hierarchical_pre
                    .map(|h| h.to_formula().to_string())
                    .unwrap_or_else(|| "-".to_string());
                error!(
                    transition = %transition.statement,
                    pre = %pre_formula,
                    hierarchical_pre = %hier,
                    post = %post_formula,
                    "unsound post-state: abstract post does not cover the concrete post"
                );
                false
            }
            // Unknown is "not disproved": an incomplete backend must not
            // produce false alarms.
            TripleValidity::Valid | TripleValidity::Unknown => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::domains::infrastructure::interval::IntervalDomain;
    use crate::features::domains::ports::AbstractDomain;
    use crate::shared::models::{LocationId, TransitionId};

    fn internal_transition(stmt: Statement) -> Transition {
        Transition {
            id: TransitionId(0),
            source: LocationId(0),
            target: LocationId(1),
            kind: TransitionKind::Internal,
            statement: stmt,
        }
    }

    fn x() -> VarId {
        VarId::int("x")
    }

    #[test]
    fn test_sound_post_accepted() {
        let script = Script::lightweight();
        let mut helper = DebugHelper::new(&script);
        let d = IntervalDomain::default();

        let t = internal_transition(Statement::Assign {
            var: x(),
            expr: Expr::int(1),
        });
        let pre = MultiState::singleton(d.fresh_state(&[x()]), 2);
        let post = pre.map(|s| d.post(s, &t));

        assert!(helper.is_post_sound(&pre, None, &post, &t, None));
        assert_eq!(helper.unsound_count(), 0);
    }

    #[test]
    fn test_corrupted_post_flagged_but_not_fatal() {
        let script = Script::lightweight();
        let mut helper = DebugHelper::new(&script);
        let d = IntervalDomain::default();

        let t = internal_transition(Statement::Assign {
            var: x(),
            expr: Expr::int(7),
        });
        let pre = MultiState::singleton(d.fresh_state(&[x()]), 2);
        // A post claiming x == 1 after x := 7 is unsound.
        let corrupted = MultiState::singleton(
            d.apply(
                &d.fresh_state(&[x()]),
                &Statement::Assume {
                    cond: Expr::eq(Expr::var(x()), Expr::int(1)),
                },
            ),
            2,
        );

        assert!(!helper.is_post_sound(&pre, None, &corrupted, &t, None));
        assert_eq!(helper.unsound_count(), 1, "run is flagged, not aborted");
    }
}
