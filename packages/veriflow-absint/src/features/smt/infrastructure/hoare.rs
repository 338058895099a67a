/*
 * Hoare Triple Checker
 *
 * Decides validity of `{pre} stmt {post}` by reduction to satisfiability:
 * the triple is VALID iff `pre /\ encode(stmt) /\ !post'` is unsatisfiable,
 * where `post'` renames assigned/havoced variables to fresh primed copies.
 *
 * Call and return triples take a separate hierarchical precondition, so the
 * caller context can be conjoined without mixing scopes. Fresh names are
 * minted from a counter owned by this checker instance (one per run), never
 * from process-global state.
 */

use crate::shared::models::{Expr, Statement, VarId};
use std::collections::HashMap;

use super::super::domain::Formula;
use super::script::{Script, SolverVerdict};

/// Outcome of a triple check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripleValidity {
    /// The post-condition over-approximates every concrete post state
    Valid,

    /// A concrete transition escapes the post-condition
    Invalid,

    /// The backend could not decide
    Unknown,
}

/// Incremental checker bound to one solver handle
pub struct HoareTripleChecker<'a> {
    script: &'a Script,
    fresh_counter: u64,
}

impl<'a> HoareTripleChecker<'a> {
    pub fn new(script: &'a Script) -> Self {
        Self {
            script,
            fresh_counter: 0,
        }
    }

    fn fresh(&mut self, base: &VarId) -> VarId {
        self.fresh_counter += 1;
        VarId {
            name: format!("{}#{}", base.name, self.fresh_counter),
            sort: base.sort,
        }
    }

    /// `{pre} stmt {post}` for Internal/Summary transitions
    ///
    /// Call/Return statements must go through `check_call`/`check_return`;
    /// routing them here is a caller bug.
    pub fn check_internal(
        &mut self,
        pre: &Formula,
        stmt: &Statement,
        post: &Formula,
    ) -> TripleValidity {
        let query = match stmt {
            Statement::Skip => {
                Formula::conjunction(vec![pre.clone(), Formula::negated(post.clone())])
            }
            Statement::Assume { cond } => Formula::conjunction(vec![
                pre.clone(),
                Formula::atom(cond.clone()),
                Formula::negated(post.clone()),
            ]),
            Statement::Assign { var, expr } => {
                let primed = self.fresh(var);
                let mut rename = HashMap::new();
                rename.insert(var.clone(), Expr::var(primed.clone()));
                let post_primed = post.substitute(&rename);
                Formula::conjunction(vec![
                    pre.clone(),
                    Formula::atom(Expr::eq(Expr::var(primed), expr.clone())),
                    Formula::negated(post_primed),
                ])
            }
            Statement::Havoc { vars } => {
                let mut rename = HashMap::new();
                for v in vars {
                    rename.insert(v.clone(), Expr::var(self.fresh(v)));
                }
                let post_primed = post.substitute(&rename);
                Formula::conjunction(vec![pre.clone(), Formula::negated(post_primed)])
            }
            Statement::Call { .. } | Statement::Return { .. } => {
                panic!("call/return statements are checked via check_call/check_return")
            }
        };
        self.check_unsat(&query)
    }

    /// `{pre} call {post}`; `bindings` is the formal <- argument plan
    ///
    /// `post` ranges over the callee scope; the binding equations connect the
    /// two scopes.
    pub fn check_call(
        &mut self,
        pre: &Formula,
        bindings: &[(VarId, Expr)],
        post: &Formula,
    ) -> TripleValidity {
        let mut parts = vec![pre.clone()];
        for (formal, arg) in bindings {
            parts.push(Formula::atom(Expr::eq(Expr::var(formal.clone()), arg.clone())));
        }
        parts.push(Formula::negated(post.clone()));
        self.check_unsat(&Formula::conjunction(parts))
    }

    /// `{callee_exit, hierarchical_pre} return {post}`
    ///
    /// The hierarchical precondition is the caller's pre-call state; result
    /// assignments rename their targets in `post` so the caller's old value
    /// does not shadow the returned one.
    pub fn check_return(
        &mut self,
        callee_exit: &Formula,
        hierarchical_pre: &Formula,
        assigns: &[(VarId, Expr)],
        post: &Formula,
    ) -> TripleValidity {
        let mut rename = HashMap::new();
        let mut equations = Vec::with_capacity(assigns.len());
        for (caller_var, callee_expr) in assigns {
            let primed = self.fresh(caller_var);
            rename.insert(caller_var.clone(), Expr::var(primed.clone()));
            equations.push(Formula::atom(Expr::eq(Expr::var(primed), callee_expr.clone())));
        }
        let post_primed = post.substitute(&rename);

        let mut parts = vec![callee_exit.clone(), hierarchical_pre.clone()];
        parts.extend(equations);
        parts.push(Formula::negated(post_primed));
        self.check_unsat(&Formula::conjunction(parts))
    }

    /// Valid iff the query formula has no model
    fn check_unsat(&self, query: &Formula) -> TripleValidity {
        let Some(dnf) = query.to_dnf() else {
            return TripleValidity::Unknown;
        };
        let mut any_unknown = false;
        for disjunct in &dnf {
            match self.script.check_sat(disjunct) {
                SolverVerdict::Sat => return TripleValidity::Invalid,
                SolverVerdict::Unknown => any_unknown = true,
                SolverVerdict::Unsat => {}
            }
        }
        if any_unknown {
            TripleValidity::Unknown
        } else {
            TripleValidity::Valid
        }
    }
}
