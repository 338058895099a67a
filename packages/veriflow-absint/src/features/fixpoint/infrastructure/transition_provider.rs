/*
 * Transition Providers
 *
 * Two implementations of the provider port:
 *
 * - `WholeProgramProvider`: context-insensitive whole-program analysis.
 *   A Return is a valid successor whenever it answers its recorded
 *   corresponding call; when a scope is known, mismatching returns are
 *   filtered out so the engine never propagates a return to an unrelated
 *   call site.
 * - `ScopedProvider`: path-program mode. A Return is only valid inside an
 *   open scope whose call matches exactly; with no open scope, returns are
 *   rejected outright, and calls with a summary are replaced by it.
 */

use crate::features::fixpoint::ports::TransitionProvider;
use crate::shared::models::{Program, TransitionId, TransitionKind};
use rustc_hash::FxHashMap;

/// Context-insensitive provider over the full program graph
pub struct WholeProgramProvider<'a> {
    program: &'a Program,
    summaries: FxHashMap<TransitionId, TransitionId>,
}

impl<'a> WholeProgramProvider<'a> {
    pub fn new(program: &'a Program) -> Self {
        let mut summaries = FxHashMap::default();
        for t in program.transitions() {
            if let TransitionKind::Summary { of_call } = t.kind {
                summaries.insert(of_call, t.id);
            }
        }
        Self { program, summaries }
    }

    fn return_matches(&self, ret: TransitionId, scope: Option<TransitionId>) -> bool {
        let t = self.program.transition(ret);
        match (t.corresponding_call(), scope) {
            (Some(call), Some(open)) => call == open,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl TransitionProvider for WholeProgramProvider<'_> {
    fn successors(
        &self,
        transition: TransitionId,
        scope: Option<TransitionId>,
    ) -> Vec<TransitionId> {
        let t = self.program.transition(transition);
        self.program
            .location(t.target)
            .outgoing
            .iter()
            .copied()
            .filter(|succ| {
                let s = self.program.transition(*succ);
                if s.is_return() {
                    self.return_matches(*succ, scope)
                } else {
                    true
                }
            })
            .collect()
    }

    fn predecessors(
        &self,
        transition: TransitionId,
        scope: Option<TransitionId>,
    ) -> Vec<TransitionId> {
        let t = self.program.transition(transition);
        self.program
            .location(t.source)
            .incoming
            .iter()
            .copied()
            .filter(|pred| {
                let p = self.program.transition(*pred);
                // Backward, a Call closes the scope it opened.
                if p.is_call() {
                    match scope {
                        Some(open) => p.id == open,
                        None => true,
                    }
                } else {
                    true
                }
            })
            .collect()
    }

    fn is_entering_scope(&self, transition: TransitionId) -> bool {
        self.program.transition(transition).is_call()
    }

    fn is_leaving_scope(&self, transition: TransitionId, scope: Option<TransitionId>) -> bool {
        self.program.transition(transition).is_return() && self.return_matches(transition, scope)
    }

    fn summary_for_call(&self, call: TransitionId) -> Option<TransitionId> {
        self.summaries.get(&call).copied()
    }
}

/// Path-program provider: strict scope matching
pub struct ScopedProvider<'a> {
    inner: WholeProgramProvider<'a>,
}

impl<'a> ScopedProvider<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self {
            inner: WholeProgramProvider::new(program),
        }
    }
}

impl TransitionProvider for ScopedProvider<'_> {
    fn successors(
        &self,
        transition: TransitionId,
        scope: Option<TransitionId>,
    ) -> Vec<TransitionId> {
        let t = self.inner.program.transition(transition);
        self.inner
            .program
            .location(t.target)
            .outgoing
            .iter()
            .copied()
            .filter_map(|succ| {
                let s = self.inner.program.transition(succ);
                match s.kind {
                    TransitionKind::Return { corresponding_call } => {
                        // No open scope, or a different call: rejected.
                        (scope == Some(corresponding_call)).then_some(succ)
                    }
                    TransitionKind::Call => {
                        // Prefer the inlined summary when one exists.
                        Some(self.inner.summary_for_call(succ).unwrap_or(succ))
                    }
                    _ => Some(succ),
                }
            })
            .collect()
    }

    fn predecessors(
        &self,
        transition: TransitionId,
        scope: Option<TransitionId>,
    ) -> Vec<TransitionId> {
        let t = self.inner.program.transition(transition);
        self.inner
            .program
            .location(t.source)
            .incoming
            .iter()
            .copied()
            .filter(|pred| {
                let p = self.inner.program.transition(*pred);
                if p.is_call() {
                    scope == Some(p.id)
                } else {
                    true
                }
            })
            .collect()
    }

    fn is_entering_scope(&self, transition: TransitionId) -> bool {
        self.inner.is_entering_scope(transition)
    }

    fn is_leaving_scope(&self, transition: TransitionId, scope: Option<TransitionId>) -> bool {
        let t = self.inner.program.transition(transition);
        match t.corresponding_call() {
            Some(call) => scope == Some(call),
            None => false,
        }
    }

    fn summary_for_call(&self, call: TransitionId) -> Option<TransitionId> {
        self.inner.summary_for_call(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{Expr, ProgramBuilder, Statement, VarId};

    /// main calls foo; foo calls itself recursively
    fn recursive_program() -> (Program, TransitionId, TransitionId, TransitionId, TransitionId)
    {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![VarId::int("a")]);
        b.add_procedure("foo", vec![VarId::int("p")], vec![]);
        let m0 = b.add_location("main");
        let m1 = b.add_location("main");
        let f0 = b.add_location("foo");
        let f1 = b.add_location("foo");
        b.mark_entry(m0);
        b.mark_exit(f1);

        let outer_call = b.add_call(
            m0,
            f0,
            Statement::Call {
                callee: "foo".to_string(),
                args: vec![Expr::var(VarId::int("a"))],
            },
        );
        let inner_call = b.add_call(
            f0,
            f0,
            Statement::Call {
                callee: "foo".to_string(),
                args: vec![Expr::var(VarId::int("p"))],
            },
        );
        b.add_internal(f0, f1, Statement::Skip);
        let outer_return = b.add_return(f1, m1, outer_call, Statement::Return { assigns: vec![] });
        let inner_return = b.add_return(f1, f0, inner_call, Statement::Return { assigns: vec![] });
        let p = b.build().expect("recursive program builds");
        (p, outer_call, inner_call, outer_return, inner_return)
    }

    #[test]
    fn test_scope_filters_mismatched_returns() {
        let (p, outer_call, inner_call, outer_return, inner_return) = recursive_program();
        let provider = WholeProgramProvider::new(&p);

        // Walking the edge into foo's exit under the inner scope: only the
        // inner return may fire.
        let internal = p
            .transitions()
            .find(|t| matches!(t.kind, TransitionKind::Internal))
            .expect("has internal edge")
            .id;
        let succs = provider.successors(internal, Some(inner_call));
        assert!(succs.contains(&inner_return));
        assert!(
            !succs.contains(&outer_return),
            "a return must not match the outer invocation's call"
        );

        // Under the outer scope, only the outer return may fire.
        let succs = provider.successors(internal, Some(outer_call));
        assert!(succs.contains(&outer_return));
        assert!(!succs.contains(&inner_return));
    }

    #[test]
    fn test_is_leaving_scope_rejects_wrong_call() {
        let (p, outer_call, inner_call, outer_return, _) = recursive_program();
        let provider = WholeProgramProvider::new(&p);

        assert!(provider.is_leaving_scope(outer_return, Some(outer_call)));
        assert!(!provider.is_leaving_scope(outer_return, Some(inner_call)));
        assert!(provider.is_leaving_scope(outer_return, None), "whole-program mode");
    }

    #[test]
    fn test_scoped_provider_rejects_returns_without_scope() {
        let (p, _, _, outer_return, inner_return) = recursive_program();
        let provider = ScopedProvider::new(&p);

        let internal = p
            .transitions()
            .find(|t| matches!(t.kind, TransitionKind::Internal))
            .expect("has internal edge")
            .id;
        let succs = provider.successors(internal, None);
        assert!(!succs.contains(&outer_return));
        assert!(!succs.contains(&inner_return));
    }

    #[test]
    fn test_entering_scope_is_call_only() {
        let (p, outer_call, _, outer_return, _) = recursive_program();
        let provider = WholeProgramProvider::new(&p);
        assert!(provider.is_entering_scope(outer_call));
        assert!(!provider.is_entering_scope(outer_return));
    }
}
