/*
 * Constant Propagation Abstract Domain
 *
 * Flat lattice per variable: Bottom < Const(c) < Top. This is the classic
 * SCCP value lattice; it backs the `dataflow` configuration id. Joins of
 * differing constants go straight to Top, so the lattice has height two and
 * the join doubles as the widening.
 */

use crate::features::domains::domain::CallInfo;
use crate::features::domains::ports::{AbstractDomain, AbstractState, SubsetRelation};
use crate::features::smt::Formula;
use crate::shared::models::{BinOp, Expr, Sort, Statement, Transition, UnOp, VarId};
use std::collections::{BTreeMap, BTreeSet};

/// Flat lattice value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatticeValue {
    Top,
    Int(i64),
    Bool(bool),
}

impl LatticeValue {
    fn join(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            LatticeValue::Top
        }
    }

    fn contains(self, other: Self) -> bool {
        self == LatticeValue::Top || self == other
    }
}

/// Constant-propagation abstract state
#[derive(Debug, Clone, PartialEq)]
pub struct ConstPropState {
    vars: BTreeSet<VarId>,
    /// Known constants; absent variables are Top
    values: BTreeMap<VarId, LatticeValue>,
    bottom: bool,
}

impl ConstPropState {
    fn top_over(vars: BTreeSet<VarId>) -> Self {
        Self {
            vars,
            values: BTreeMap::new(),
            bottom: false,
        }
    }

    fn bottom_over(vars: BTreeSet<VarId>) -> Self {
        let mut out = Self::top_over(vars);
        out.bottom = true;
        out
    }

    pub fn value_of(&self, var: &VarId) -> LatticeValue {
        self.values.get(var).copied().unwrap_or(LatticeValue::Top)
    }

    fn set(&mut self, var: VarId, value: LatticeValue) {
        if value == LatticeValue::Top {
            self.values.remove(&var);
        } else {
            self.values.insert(var, value);
        }
    }

    /// Constant folding over known values
    pub fn eval(&self, expr: &Expr) -> LatticeValue {
        match expr {
            Expr::IntConst(c) => LatticeValue::Int(*c),
            Expr::BoolConst(b) => LatticeValue::Bool(*b),
            Expr::Var(v) => self.value_of(v),
            Expr::Unary(UnOp::Neg, e) => match self.eval(e) {
                LatticeValue::Int(c) => LatticeValue::Int(c.wrapping_neg()),
                _ => LatticeValue::Top,
            },
            Expr::Unary(UnOp::Not, e) => match self.eval(e) {
                LatticeValue::Bool(b) => LatticeValue::Bool(!b),
                _ => LatticeValue::Top,
            },
            Expr::Binary(op, l, r) => {
                let (a, b) = (self.eval(l), self.eval(r));
                match (op, a, b) {
                    (BinOp::Add, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Int(x.wrapping_add(y))
                    }
                    (BinOp::Sub, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Int(x.wrapping_sub(y))
                    }
                    (BinOp::Mul, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Int(x.wrapping_mul(y))
                    }
                    (BinOp::Div, LatticeValue::Int(x), LatticeValue::Int(y)) if y != 0 => {
                        LatticeValue::Int(x.wrapping_div(y))
                    }
                    (BinOp::Mod, LatticeValue::Int(x), LatticeValue::Int(y)) if y != 0 => {
                        LatticeValue::Int(x.wrapping_rem(y))
                    }
                    (BinOp::Eq, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Bool(x == y)
                    }
                    (BinOp::Ne, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Bool(x != y)
                    }
                    (BinOp::Lt, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Bool(x < y)
                    }
                    (BinOp::Le, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Bool(x <= y)
                    }
                    (BinOp::Gt, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Bool(x > y)
                    }
                    (BinOp::Ge, LatticeValue::Int(x), LatticeValue::Int(y)) => {
                        LatticeValue::Bool(x >= y)
                    }
                    (BinOp::And, LatticeValue::Bool(x), LatticeValue::Bool(y)) => {
                        LatticeValue::Bool(x && y)
                    }
                    (BinOp::And, LatticeValue::Bool(false), _)
                    | (BinOp::And, _, LatticeValue::Bool(false)) => LatticeValue::Bool(false),
                    (BinOp::Or, LatticeValue::Bool(x), LatticeValue::Bool(y)) => {
                        LatticeValue::Bool(x || y)
                    }
                    (BinOp::Or, LatticeValue::Bool(true), _)
                    | (BinOp::Or, _, LatticeValue::Bool(true)) => LatticeValue::Bool(true),
                    _ => LatticeValue::Top,
                }
            }
        }
    }

    fn assume(&self, cond: &Expr) -> Self {
        if self.bottom {
            return self.clone();
        }
        match self.eval(cond) {
            LatticeValue::Bool(false) => return Self::bottom_over(self.vars.clone()),
            LatticeValue::Bool(true) => return self.clone(),
            _ => {}
        }
        let mut out = self.clone();
        match cond {
            // Learn bindings from equality guards.
            Expr::Binary(BinOp::Eq, l, r) => match (&**l, &**r) {
                (Expr::Var(v), rhs) | (rhs, Expr::Var(v)) => {
                    let value = self.eval(rhs);
                    if value != LatticeValue::Top {
                        out.set(v.clone(), value);
                    }
                }
                _ => {}
            },
            Expr::Binary(BinOp::And, l, r) => return self.assume(l).assume(r),
            Expr::Unary(UnOp::Not, e) => return self.assume(&e.negated()),
            Expr::Var(v) if v.sort == Sort::Bool => out.set(v.clone(), LatticeValue::Bool(true)),
            _ => {}
        }
        out
    }
}

impl AbstractState for ConstPropState {
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
            out.values.remove(v);
        }
        out
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    fn subset_of(&self, other: &Self) -> SubsetRelation {
        if self.vars != other.vars {
            return SubsetRelation::None;
        }
        match (self.bottom, other.bottom) {
            (true, true) => return SubsetRelation::Equal,
            (true, false) => return SubsetRelation::Subset,
            (false, true) => return SubsetRelation::Superset,
            (false, false) => {}
        }
        let mut fwd = true;
        let mut bwd = true;
        for v in self.values.keys().chain(other.values.keys()) {
            let a = self.value_of(v);
            let b = other.value_of(v);
            fwd &= b.contains(a);
            bwd &= a.contains(b);
        }
        match (fwd, bwd) {
            (true, true) => SubsetRelation::Equal,
            (true, false) => SubsetRelation::Subset,
            (false, true) => SubsetRelation::Superset,
            (false, false) => SubsetRelation::None,
        }
    }

    fn join(&self, other: &Self) -> Self {
        if self.bottom {
            return other.clone();
        }
        if other.bottom {
            return self.clone();
        }
        let mut vars = self.vars.clone();
        vars.extend(other.vars.iter().cloned());
        let mut out = Self::top_over(vars);
        for v in self.values.keys().chain(other.values.keys()) {
            out.set(v.clone(), self.value_of(v).join(other.value_of(v)));
        }
        out
    }

    fn to_formula(&self) -> Formula {
        if self.bottom {
            return Formula::False;
        }
        let mut parts = Vec::new();
        for (v, value) in &self.values {
            match value {
                LatticeValue::Int(c) => {
                    parts.push(Formula::atom(Expr::eq(Expr::var(v.clone()), Expr::int(*c))));
                }
                LatticeValue::Bool(true) => parts.push(Formula::atom(Expr::var(v.clone()))),
                LatticeValue::Bool(false) => {
                    parts.push(Formula::atom(Expr::not(Expr::var(v.clone()))));
                }
                LatticeValue::Top => {}
            }
        }
        Formula::conjunction(parts)
    }
}

/// Constant-propagation domain (`dataflow` id)
#[derive(Debug, Clone, Default)]
pub struct ConstPropDomain;

impl ConstPropDomain {
    pub fn new() -> Self {
        Self
    }
}

impl AbstractDomain for ConstPropDomain {
    type State = ConstPropState;

    fn fresh_state(&self, vars: &[VarId]) -> ConstPropState {
        ConstPropState::top_over(vars.iter().cloned().collect())
    }

    fn top_state(&self) -> ConstPropState {
        ConstPropState::top_over(BTreeSet::new())
    }

    fn bottom_state(&self) -> ConstPropState {
        ConstPropState::bottom_over(BTreeSet::new())
    }

    fn apply(&self, state: &ConstPropState, stmt: &Statement) -> ConstPropState {
        if state.bottom {
            return state.clone();
        }
        match stmt {
            Statement::Skip => state.clone(),
            Statement::Assume { cond } => state.assume(cond),
            Statement::Assign { var, expr } => {
                let mut out = state.clone();
                out.vars.insert(var.clone());
                let value = state.eval(expr);
                out.set(var.clone(), value);
                out
            }
            Statement::Havoc { vars } => {
                let mut out = state.clone();
                for v in vars {
                    out.values.remove(v);
                }
                out
            }
            Statement::Call { .. } | Statement::Return { .. } => {
                panic!("call/return statements must go through post_call/post_return")
            }
        }
    }

    fn post_return(
        &self,
        callee_exit: &ConstPropState,
        caller_pre: &ConstPropState,
        _info: &CallInfo,
        transition: &Transition,
    ) -> ConstPropState {
        if callee_exit.bottom {
            return ConstPropState::bottom_over(caller_pre.vars.clone());
        }
        let mut out = caller_pre.clone();
        if let Statement::Return { assigns } = &transition.statement {
            for (caller_var, callee_expr) in assigns {
                out.vars.insert(caller_var.clone());
                out.set(caller_var.clone(), callee_exit.eval(callee_expr));
            }
        }
        out
    }

    fn widen(&self, older: &ConstPropState, newer: &ConstPropState) -> ConstPropState {
        // Height-two lattice: the join stabilizes in at most two steps.
        older.join(newer)
    }
}
