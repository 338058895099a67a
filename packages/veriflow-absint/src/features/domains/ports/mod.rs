/*
 * Abstract Domain Ports
 *
 * The contract every abstract domain satisfies. The engine sees domains only
 * through these traits; concrete domains live in infrastructure. The
 * associated `State` type replaces the mutually recursive generics of
 * interface-heavy designs: a domain names its state type once, and
 * everything else is written against `D::State`.
 */

use crate::features::domains::domain::CallInfo;
use crate::features::smt::Formula;
use crate::shared::models::{Statement, Transition, VarId};
use std::collections::BTreeSet;
use std::fmt;

/// Four-valued partial-order comparison
///
/// `Subset`/`Superset` short-circuit work in multi-state reduction: a covered
/// element is dropped without a second comparison pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsetRelation {
    /// Incomparable
    None,

    /// `self` is strictly covered by the other state
    Subset,

    /// Both represent the same set of concrete states
    Equal,

    /// `self` strictly covers the other state
    Superset,
}

impl SubsetRelation {
    /// The relation seen from the other operand
    pub fn flipped(self) -> Self {
        match self {
            SubsetRelation::Subset => SubsetRelation::Superset,
            SubsetRelation::Superset => SubsetRelation::Subset,
            other => other,
        }
    }

    /// Is `self` covered (subset or equal)?
    pub fn is_covered(self) -> bool {
        matches!(self, SubsetRelation::Subset | SubsetRelation::Equal)
    }
}

/// One disjunct: a symbolic representation of a set of concrete states
///
/// States are immutable values; every operation returns a new state. A state
/// tracks the set of variables it ranges over because scope changes at
/// call/return boundaries.
pub trait AbstractState: Clone + PartialEq + fmt::Debug {
    /// Variables this state ranges over
    fn variables(&self) -> &BTreeSet<VarId>;

    /// Extend scope with `vars`, unconstrained
    fn add_variables(&self, vars: &[VarId]) -> Self;

    /// Project `vars` out of the scope
    fn remove_variables(&self, vars: &[VarId]) -> Self;

    /// Does this state represent the empty set?
    fn is_bottom(&self) -> bool;

    /// Partial-order comparison against `other`
    fn subset_of(&self, other: &Self) -> SubsetRelation;

    /// Sound over-approximating join (need not be a least upper bound)
    fn join(&self, other: &Self) -> Self;

    /// Render to a formula for the Hoare oracle
    fn to_formula(&self) -> Formula;
}

/// Factory and operator bundle for one abstract domain
pub trait AbstractDomain {
    type State: AbstractState;

    /// Unconstrained state over `vars`
    fn fresh_state(&self, vars: &[VarId]) -> Self::State;

    /// Top over the empty scope
    fn top_state(&self) -> Self::State;

    /// The empty set of concrete states
    fn bottom_state(&self) -> Self::State;

    /// Abstract transformer for one statement
    fn apply(&self, state: &Self::State, stmt: &Statement) -> Self::State;

    /// Post operator for Internal/Summary transitions
    fn post(&self, state: &Self::State, transition: &Transition) -> Self::State {
        self.apply(state, &transition.statement)
    }

    /// Interprocedural post for a Call transition: bind arguments to the
    /// callee's formals through the cached renaming plan, then switch scope
    ///
    /// The default sequence works for any domain because it never relates
    /// states across scopes: temporaries carry the argument values over the
    /// switch.
    fn post_call(&self, caller: &Self::State, info: &CallInfo, _transition: &Transition) -> Self::State {
        let mut state = caller.add_variables(&info.temporaries);
        for (temp, arg) in info.temporaries.iter().zip(info.arguments.iter()) {
            state = self.apply(
                &state,
                &Statement::Assign {
                    var: temp.clone(),
                    expr: arg.clone(),
                },
            );
        }
        let mut state = state.remove_variables(&info.caller_vars);
        state = state.add_variables(&info.callee_vars);
        for (formal, temp) in info.formals.iter().zip(info.temporaries.iter()) {
            state = self.apply(
                &state,
                &Statement::Assign {
                    var: formal.clone(),
                    expr: crate::shared::models::Expr::var(temp.clone()),
                },
            );
        }
        state.remove_variables(&info.temporaries)
    }

    /// Interprocedural post for a Return transition: combine the callee's
    /// exit state with the caller's pre-call state (hierarchical
    /// precondition)
    fn post_return(
        &self,
        callee_exit: &Self::State,
        caller_pre: &Self::State,
        info: &CallInfo,
        transition: &Transition,
    ) -> Self::State;

    /// Convergence-forcing join; `newer` is already `older ⊔ post`
    fn widen(&self, older: &Self::State, newer: &Self::State) -> Self::State;

    /// Merge operator (plain join unless a domain overrides it)
    fn join(&self, a: &Self::State, b: &Self::State) -> Self::State {
        a.join(b)
    }
}
