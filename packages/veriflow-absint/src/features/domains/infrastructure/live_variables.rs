/*
 * Live Variables Abstract Domain (backward)
 *
 * May-liveness: a variable is live at a point when some path from there
 * reads it before overwriting it. States are plain variable sets ordered by
 * inclusion; the backward engine applies the transfer against edge
 * direction:
 *
 *   live_before = (live_after \ def(stmt)) ∪ use(stmt)
 *
 * Join-only analysis: the power-set lattice is finite, the join is the
 * widening, and the engine caps the disjunction at one element. The empty
 * set is a meaningful fact ("nothing live"), not bottom, so `is_bottom` is
 * always false.
 */

use crate::features::domains::domain::CallInfo;
use crate::features::domains::ports::{AbstractDomain, AbstractState, SubsetRelation};
use crate::features::smt::Formula;
use crate::shared::models::{Statement, Transition, VarId};
use std::collections::BTreeSet;

/// Set of live variables
#[derive(Debug, Clone, PartialEq)]
pub struct LiveVariablesState {
    vars: BTreeSet<VarId>,
    live: BTreeSet<VarId>,
}

impl LiveVariablesState {
    fn over(vars: BTreeSet<VarId>, live: BTreeSet<VarId>) -> Self {
        Self { vars, live }
    }

    pub fn live(&self) -> &BTreeSet<VarId> {
        &self.live
    }

    pub fn is_live(&self, var: &VarId) -> bool {
        self.live.contains(var)
    }
}

impl AbstractState for LiveVariablesState {
    fn variables(&self) -> &BTreeSet<VarId> {
        &self.vars
    }

    fn add_variables(&self, vars: &[VarId]) -> Self {
        let mut out = self.clone();
        for v in vars {
            out.vars.insert(v.clone());
        }
        out
    }

    fn remove_variables(&self, vars: &[VarId]) -> Self {
        let mut out = self.clone();
        for v in vars {
            out.vars.remove(v);
            out.live.remove(v);
        }
        out
    }

    fn is_bottom(&self) -> bool {
        false
    }

    fn subset_of(&self, other: &Self) -> SubsetRelation {
        if self.vars != other.vars {
            return SubsetRelation::None;
        }
        let fwd = self.live.is_subset(&other.live);
        let bwd = other.live.is_subset(&self.live);
        match (fwd, bwd) {
            (true, true) => SubsetRelation::Equal,
            (true, false) => SubsetRelation::Subset,
            (false, true) => SubsetRelation::Superset,
            (false, false) => SubsetRelation::None,
        }
    }

    fn join(&self, other: &Self) -> Self {
        let mut vars = self.vars.clone();
        vars.extend(other.vars.iter().cloned());
        let mut live = self.live.clone();
        live.extend(other.live.iter().cloned());
        Self::over(vars, live)
    }

    fn to_formula(&self) -> Formula {
        // Liveness facts have no logical content over program values.
        Formula::True
    }
}

/// Live-variables domain
#[derive(Debug, Clone, Default)]
pub struct LiveVariablesDomain;

impl LiveVariablesDomain {
    pub fn new() -> Self {
        Self
    }

    fn defs_and_uses(stmt: &Statement) -> (BTreeSet<VarId>, BTreeSet<VarId>) {
        let mut defs = BTreeSet::new();
        let mut uses = BTreeSet::new();
        match stmt {
            Statement::Skip => {}
            Statement::Assign { var, expr } => {
                defs.insert(var.clone());
                expr.collect_vars(&mut uses);
            }
            Statement::Havoc { vars } => {
                defs.extend(vars.iter().cloned());
            }
            Statement::Assume { cond } => {
                cond.collect_vars(&mut uses);
            }
            Statement::Call { args, .. } => {
                for a in args {
                    a.collect_vars(&mut uses);
                }
            }
            Statement::Return { assigns } => {
                for (caller_var, callee_expr) in assigns {
                    defs.insert(caller_var.clone());
                    callee_expr.collect_vars(&mut uses);
                }
            }
        }
        (defs, uses)
    }
}

impl AbstractDomain for LiveVariablesDomain {
    type State = LiveVariablesState;

    /// Fresh seed: nothing live yet
    fn fresh_state(&self, vars: &[VarId]) -> LiveVariablesState {
        LiveVariablesState::over(vars.iter().cloned().collect(), BTreeSet::new())
    }

    fn top_state(&self) -> LiveVariablesState {
        LiveVariablesState::over(BTreeSet::new(), BTreeSet::new())
    }

    fn bottom_state(&self) -> LiveVariablesState {
        LiveVariablesState::over(BTreeSet::new(), BTreeSet::new())
    }

    /// Backward transfer: kill definitions, generate uses
    fn apply(&self, state: &LiveVariablesState, stmt: &Statement) -> LiveVariablesState {
        let (defs, uses) = Self::defs_and_uses(stmt);
        let mut live: BTreeSet<VarId> = state.live.difference(&defs).cloned().collect();
        live.extend(uses);
        LiveVariablesState::over(state.vars.clone(), live)
    }

    fn post_return(
        &self,
        callee_exit: &LiveVariablesState,
        caller_pre: &LiveVariablesState,
        _info: &CallInfo,
        transition: &Transition,
    ) -> LiveVariablesState {
        // Backward engine handles scope swaps through apply; combining here
        // is a plain union of the two liveness views.
        self.apply(&callee_exit.join(caller_pre), &transition.statement)
    }

    fn widen(&self, older: &LiveVariablesState, newer: &LiveVariablesState) -> LiveVariablesState {
        // Finite power-set lattice: join is a widening.
        older.join(newer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::Expr;

    fn x() -> VarId {
        VarId::int("x")
    }

    fn y() -> VarId {
        VarId::int("y")
    }

    #[test]
    fn test_use_generates_liveness() {
        let d = LiveVariablesDomain::new();
        let after = d.fresh_state(&[x(), y()]);
        let before = d.apply(
            &after,
            &Statement::Assign {
                var: y(),
                expr: Expr::add(Expr::var(x()), Expr::int(1)),
            },
        );
        assert!(before.is_live(&x()), "x is read, so live before");
        assert!(!before.is_live(&y()), "y is overwritten, so dead before");
    }

    #[test]
    fn test_def_kills_liveness() {
        let d = LiveVariablesDomain::new();
        let mut live = BTreeSet::new();
        live.insert(x());
        let after = LiveVariablesState::over([x(), y()].into_iter().collect(), live);
        let before = d.apply(
            &after,
            &Statement::Assign {
                var: x(),
                expr: Expr::int(0),
            },
        );
        assert!(!before.is_live(&x()));
    }

    #[test]
    fn test_assume_keeps_condition_vars_live() {
        let d = LiveVariablesDomain::new();
        let after = d.fresh_state(&[x(), y()]);
        let before = d.apply(
            &after,
            &Statement::Assume {
                cond: Expr::lt(Expr::var(x()), Expr::var(y())),
            },
        );
        assert!(before.is_live(&x()));
        assert!(before.is_live(&y()));
    }

    #[test]
    fn test_empty_liveness_is_not_bottom() {
        let d = LiveVariablesDomain::new();
        assert!(!d.fresh_state(&[x()]).is_bottom());
    }

    #[test]
    fn test_join_is_union() {
        let a = LiveVariablesState::over(
            [x(), y()].into_iter().collect(),
            [x()].into_iter().collect(),
        );
        let b = LiveVariablesState::over(
            [x(), y()].into_iter().collect(),
            [y()].into_iter().collect(),
        );
        let j = a.join(&b);
        assert!(j.is_live(&x()) && j.is_live(&y()));
        assert_eq!(a.subset_of(&j), SubsetRelation::Subset);
    }
}
