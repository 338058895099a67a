/*
 * Interval Abstract Domain
 *
 * Independent per-variable `[lo, hi]` bounds over i64, with boolean flags in
 * a separate three-valued lattice. Assume-refinement handles the linear
 * comparison fragment (var + c against var + c); everything else falls back
 * to a sound top.
 *
 * Widening policies:
 * - simple:                unstable bounds go straight to infinity
 * - literal-guided:        unstable bounds snap to the nearest syntactic
 *                          constant of the analyzed program
 * - exponential-threshold: unstable bounds snap to the next power-of-two
 *                          scaled threshold
 *
 * All three stabilize any ascending chain: each step either keeps a bound or
 * moves it through a finite threshold set towards infinity.
 */

use crate::config::WideningKind;
use crate::features::domains::domain::CallInfo;
use crate::features::domains::ports::{AbstractDomain, AbstractState, SubsetRelation};
use crate::features::smt::Formula;
use crate::shared::models::{BinOp, Expr, Sort, Statement, Transition, UnOp, VarId};
use std::collections::{BTreeMap, BTreeSet};

/// One end of an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bound {
    NegInf,
    Int(i64),
    PosInf,
}

impl Bound {
    fn as_i128(self) -> i128 {
        match self {
            Bound::NegInf => i128::MIN / 4,
            Bound::Int(v) => v as i128,
            Bound::PosInf => i128::MAX / 4,
        }
    }

    fn from_i128(v: i128) -> Self {
        if v <= i64::MIN as i128 {
            Bound::NegInf
        } else if v >= i64::MAX as i128 {
            Bound::PosInf
        } else {
            Bound::Int(v as i64)
        }
    }

    fn is_finite(self) -> bool {
        matches!(self, Bound::Int(_))
    }
}

/// A closed interval; empty when `lo > hi`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lo: Bound,
    pub hi: Bound,
}

impl Interval {
    pub fn top() -> Self {
        Self {
            lo: Bound::NegInf,
            hi: Bound::PosInf,
        }
    }

    pub fn point(v: i64) -> Self {
        Self {
            lo: Bound::Int(v),
            hi: Bound::Int(v),
        }
    }

    pub fn new(lo: Bound, hi: Bound) -> Self {
        Self { lo, hi }
    }

    pub fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    pub fn is_point(&self) -> bool {
        self.lo == self.hi && self.lo.is_finite()
    }

    fn join(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    fn meet(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.max(other.lo),
            hi: self.hi.min(other.hi),
        }
    }

    fn contains(&self, other: &Self) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }

    fn add(&self, other: &Self) -> Self {
        Self {
            lo: Bound::from_i128(self.lo.as_i128() + other.lo.as_i128()),
            hi: Bound::from_i128(self.hi.as_i128() + other.hi.as_i128()),
        }
    }

    fn neg(&self) -> Self {
        let lo = match self.hi {
            Bound::NegInf => Bound::PosInf,
            Bound::PosInf => Bound::NegInf,
            Bound::Int(v) => Bound::from_i128(-(v as i128)),
        };
        let hi = match self.lo {
            Bound::NegInf => Bound::PosInf,
            Bound::PosInf => Bound::NegInf,
            Bound::Int(v) => Bound::from_i128(-(v as i128)),
        };
        Self { lo, hi }
    }

    fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    fn mul(&self, other: &Self) -> Self {
        // Any infinite operand poisons the corner products.
        if !self.lo.is_finite()
            || !self.hi.is_finite()
            || !other.lo.is_finite()
            || !other.hi.is_finite()
        {
            return Interval::top();
        }
        let corners = [
            self.lo.as_i128() * other.lo.as_i128(),
            self.lo.as_i128() * other.hi.as_i128(),
            self.hi.as_i128() * other.lo.as_i128(),
            self.hi.as_i128() * other.hi.as_i128(),
        ];
        let lo = *corners.iter().min().expect("four corners");
        let hi = *corners.iter().max().expect("four corners");
        Self {
            lo: Bound::from_i128(lo),
            hi: Bound::from_i128(hi),
        }
    }
}

/// Three-valued boolean lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tvb {
    True,
    False,
    Top,
}

impl Tvb {
    fn join(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Tvb::Top
        }
    }

    fn contains(self, other: Self) -> bool {
        self == Tvb::Top || self == other
    }
}

/// Interval abstract state
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalState {
    vars: BTreeSet<VarId>,
    ints: BTreeMap<VarId, Interval>,
    bools: BTreeMap<VarId, Tvb>,
    bottom: bool,
}

impl IntervalState {
    fn top_over(vars: BTreeSet<VarId>) -> Self {
        Self {
            vars,
            ints: BTreeMap::new(),
            bools: BTreeMap::new(),
            bottom: false,
        }
    }

    fn bottom_over(vars: BTreeSet<VarId>) -> Self {
        Self {
            vars,
            ints: BTreeMap::new(),
            bools: BTreeMap::new(),
            bottom: true,
        }
    }

    /// Bounds of an integer variable (top when untracked)
    pub fn interval_of(&self, var: &VarId) -> Interval {
        self.ints.get(var).copied().unwrap_or_else(Interval::top)
    }

    /// Value of a boolean variable (top when untracked)
    pub fn tvb_of(&self, var: &VarId) -> Tvb {
        self.bools.get(var).copied().unwrap_or(Tvb::Top)
    }

    fn set_interval(&mut self, var: VarId, interval: Interval) {
        if interval.is_empty() {
            self.bottom = true;
            self.ints.clear();
            self.bools.clear();
            return;
        }
        if interval == Interval::top() {
            self.ints.remove(&var);
        } else {
            self.ints.insert(var, interval);
        }
    }

    fn set_tvb(&mut self, var: VarId, value: Tvb) {
        if value == Tvb::Top {
            self.bools.remove(&var);
        } else {
            self.bools.insert(var, value);
        }
    }

    /// Interval evaluation of an integer expression
    pub fn eval(&self, expr: &Expr) -> Interval {
        if self.bottom {
            return Interval {
                lo: Bound::PosInf,
                hi: Bound::NegInf,
            };
        }
        match expr {
            Expr::IntConst(c) => Interval::point(*c),
            Expr::BoolConst(_) => Interval::top(),
            Expr::Var(v) => self.interval_of(v),
            Expr::Unary(UnOp::Neg, e) => self.eval(e).neg(),
            Expr::Unary(UnOp::Not, _) => Interval::top(),
            Expr::Binary(op, l, r) => {
                let a = self.eval(l);
                let b = self.eval(r);
                match op {
                    BinOp::Add => a.add(&b),
                    BinOp::Sub => a.sub(&b),
                    BinOp::Mul => a.mul(&b),
                    // Division and modulo stay coarse.
                    BinOp::Div | BinOp::Mod => Interval::top(),
                    _ => Interval::top(),
                }
            }
        }
    }

    /// Three-valued evaluation of a boolean expression
    pub fn eval_bool(&self, expr: &Expr) -> Tvb {
        match expr {
            Expr::BoolConst(true) => Tvb::True,
            Expr::BoolConst(false) => Tvb::False,
            Expr::Var(v) if v.sort == Sort::Bool => self.tvb_of(v),
            Expr::Unary(UnOp::Not, e) => match self.eval_bool(e) {
                Tvb::True => Tvb::False,
                Tvb::False => Tvb::True,
                Tvb::Top => Tvb::Top,
            },
            Expr::Binary(op, l, r) if op.is_comparison() => {
                let a = self.eval(l);
                let b = self.eval(r);
                if a.is_empty() || b.is_empty() {
                    return Tvb::Top;
                }
                match op {
                    BinOp::Lt if a.hi < b.lo => Tvb::True,
                    BinOp::Lt if a.lo >= b.hi => Tvb::False,
                    BinOp::Le if a.hi <= b.lo => Tvb::True,
                    BinOp::Le if a.lo > b.hi => Tvb::False,
                    BinOp::Gt if a.lo > b.hi => Tvb::True,
                    BinOp::Gt if a.hi <= b.lo => Tvb::False,
                    BinOp::Ge if a.lo >= b.hi => Tvb::True,
                    BinOp::Ge if a.hi < b.lo => Tvb::False,
                    BinOp::Eq if a.is_point() && b.is_point() && a == b => Tvb::True,
                    BinOp::Eq if a.meet(&b).is_empty() => Tvb::False,
                    BinOp::Ne if a.meet(&b).is_empty() => Tvb::True,
                    BinOp::Ne if a.is_point() && b.is_point() && a == b => Tvb::False,
                    _ => Tvb::Top,
                }
            }
            Expr::Binary(BinOp::And, l, r) => match (self.eval_bool(l), self.eval_bool(r)) {
                (Tvb::False, _) | (_, Tvb::False) => Tvb::False,
                (Tvb::True, Tvb::True) => Tvb::True,
                _ => Tvb::Top,
            },
            Expr::Binary(BinOp::Or, l, r) => match (self.eval_bool(l), self.eval_bool(r)) {
                (Tvb::True, _) | (_, Tvb::True) => Tvb::True,
                (Tvb::False, Tvb::False) => Tvb::False,
                _ => Tvb::Top,
            },
            _ => Tvb::Top,
        }
    }

    /// `var + offset` view of an integer expression
    fn as_linear(expr: &Expr) -> Option<(Option<VarId>, i64)> {
        match expr {
            Expr::IntConst(c) => Some((None, *c)),
            Expr::Var(v) if v.sort == Sort::Int => Some((Some(v.clone()), 0)),
            Expr::Binary(BinOp::Add, l, r) => match (&**l, &**r) {
                (Expr::Var(v), Expr::IntConst(c)) | (Expr::IntConst(c), Expr::Var(v)) => {
                    Some((Some(v.clone()), *c))
                }
                _ => None,
            },
            Expr::Binary(BinOp::Sub, l, r) => match (&**l, &**r) {
                (Expr::Var(v), Expr::IntConst(c)) => Some((Some(v.clone()), -*c)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Refine under `cond`; sound: refinement may keep more than the exact
    /// constraint allows, never less
    fn assume(&self, cond: &Expr) -> Self {
        if self.bottom {
            return self.clone();
        }
        match self.eval_bool(cond) {
            Tvb::False => return Self::bottom_over(self.vars.clone()),
            Tvb::True => return self.clone(),
            Tvb::Top => {}
        }
        let mut out = self.clone();
        match cond {
            Expr::Var(v) if v.sort == Sort::Bool => out.set_tvb(v.clone(), Tvb::True),
            Expr::Unary(UnOp::Not, e) => return self.assume(&e.negated()),
            Expr::Binary(BinOp::And, l, r) => return self.assume(l).assume(r),
            Expr::Binary(BinOp::Or, l, r) => {
                let left = self.assume(l);
                let right = self.assume(r);
                return left.join(&right);
            }
            Expr::Binary(op, l, r) if op.is_comparison() => {
                out.refine_comparison(*op, l, r);
            }
            _ => {}
        }
        out
    }

    fn refine_comparison(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) {
        let (Some(left), Some(right)) = (Self::as_linear(lhs), Self::as_linear(rhs)) else {
            // One side is not linear; bound the linear side by the interval
            // evaluation of the other.
            self.refine_by_eval(op, lhs, rhs);
            return;
        };
        match (left, right) {
            ((Some(x), a), (None, c)) => self.refine_var_const(op, &x, c as i128 - a as i128),
            ((None, c), (Some(y), b)) => {
                self.refine_var_const(op.swapped(), &y, c as i128 - b as i128)
            }
            ((Some(x), a), (Some(y), b)) => self.refine_var_var(op, &x, &y, b as i128 - a as i128),
            ((None, a), (None, c)) => {
                let holds = match op {
                    BinOp::Eq => a == c,
                    BinOp::Ne => a != c,
                    BinOp::Lt => a < c,
                    BinOp::Le => a <= c,
                    BinOp::Gt => a > c,
                    BinOp::Ge => a >= c,
                    _ => true,
                };
                if !holds {
                    *self = Self::bottom_over(self.vars.clone());
                }
            }
        }
    }

    fn refine_by_eval(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) {
        if let Some((Some(x), a)) = Self::as_linear(lhs) {
            let r = self.eval(rhs);
            let shift = Interval::point(0).sub(&Interval::point(a));
            let bound = r.add(&shift); // x <=> r - a
            let refined = match op {
                BinOp::Le | BinOp::Lt => Interval::new(Bound::NegInf, bound.hi),
                BinOp::Ge | BinOp::Gt => Interval::new(bound.lo, Bound::PosInf),
                BinOp::Eq => bound,
                _ => return,
            };
            let met = self.interval_of(&x).meet(&refined);
            self.set_interval(x, met);
        }
    }

    /// `x <=> c` with the offset already folded into `c`
    fn refine_var_const(&mut self, op: BinOp, x: &VarId, c: i128) {
        let current = self.interval_of(x);
        let refined = match op {
            BinOp::Eq => current.meet(&Interval::new(Bound::from_i128(c), Bound::from_i128(c))),
            BinOp::Lt => current.meet(&Interval::new(Bound::NegInf, Bound::from_i128(c - 1))),
            BinOp::Le => current.meet(&Interval::new(Bound::NegInf, Bound::from_i128(c))),
            BinOp::Gt => current.meet(&Interval::new(Bound::from_i128(c + 1), Bound::PosInf)),
            BinOp::Ge => current.meet(&Interval::new(Bound::from_i128(c), Bound::PosInf)),
            BinOp::Ne => {
                // Only narrows when the forbidden point sits on a bound.
                let mut refined = current;
                if let (Bound::Int(lo), true) = (current.lo, current.lo == Bound::from_i128(c)) {
                    refined.lo = Bound::from_i128(lo as i128 + 1);
                }
                if let (Bound::Int(hi), true) = (current.hi, current.hi == Bound::from_i128(c)) {
                    refined.hi = Bound::from_i128(hi as i128 - 1);
                }
                refined
            }
            _ => return,
        };
        self.set_interval(x.clone(), refined);
    }

    /// `x <=> y + d`
    fn refine_var_var(&mut self, op: BinOp, x: &VarId, y: &VarId, d: i128) {
        let ix = self.interval_of(x);
        let iy = self.interval_of(y);
        match op {
            BinOp::Le | BinOp::Lt => {
                let strict = i128::from(op == BinOp::Lt);
                let x_hi = ix.hi.min(Bound::from_i128(iy.hi.as_i128() + d - strict));
                let y_lo = iy.lo.max(Bound::from_i128(ix.lo.as_i128() - d + strict));
                self.set_interval(x.clone(), Interval::new(ix.lo, x_hi));
                if !self.bottom {
                    self.set_interval(y.clone(), Interval::new(y_lo, iy.hi));
                }
            }
            BinOp::Ge | BinOp::Gt => {
                let strict = i128::from(op == BinOp::Gt);
                let x_lo = ix.lo.max(Bound::from_i128(iy.lo.as_i128() + d + strict));
                let y_hi = iy.hi.min(Bound::from_i128(ix.hi.as_i128() - d - strict));
                self.set_interval(x.clone(), Interval::new(x_lo, ix.hi));
                if !self.bottom {
                    self.set_interval(y.clone(), Interval::new(iy.lo, y_hi));
                }
            }
            BinOp::Eq => {
                let shifted = Interval::new(
                    Bound::from_i128(iy.lo.as_i128() + d),
                    Bound::from_i128(iy.hi.as_i128() + d),
                );
                let met_x = ix.meet(&shifted);
                self.set_interval(x.clone(), met_x);
                if !self.bottom {
                    let back = Interval::new(
                        Bound::from_i128(met_x.lo.as_i128() - d),
                        Bound::from_i128(met_x.hi.as_i128() - d),
                    );
                    self.set_interval(y.clone(), iy.meet(&back));
                }
            }
            BinOp::Ne => {
                if ix.is_point() && iy.is_point() && ix.lo.as_i128() == iy.lo.as_i128() + d {
                    *self = Self::bottom_over(self.vars.clone());
                }
            }
            _ => {}
        }
    }
}

impl AbstractState for IntervalState {
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
            out.ints.remove(v);
            out.bools.remove(v);
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
        let mut fwd = true; // self ⊆ other
        let mut bwd = true;
        for v in &self.vars {
            match v.sort {
                Sort::Int => {
                    let a = self.interval_of(v);
                    let b = other.interval_of(v);
                    fwd &= b.contains(&a);
                    bwd &= a.contains(&b);
                }
                Sort::Bool => {
                    let a = self.tvb_of(v);
                    let b = other.tvb_of(v);
                    fwd &= b.contains(a);
                    bwd &= a.contains(b);
                }
            }
            if !fwd && !bwd {
                return SubsetRelation::None;
            }
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
        let mut out = Self::top_over(vars.clone());
        for v in &vars {
            match v.sort {
                Sort::Int => {
                    out.set_interval(v.clone(), self.interval_of(v).join(&other.interval_of(v)));
                }
                Sort::Bool => {
                    out.set_tvb(v.clone(), self.tvb_of(v).join(other.tvb_of(v)));
                }
            }
        }
        out
    }

    fn to_formula(&self) -> Formula {
        if self.bottom {
            return Formula::False;
        }
        let mut parts = Vec::new();
        for (v, interval) in &self.ints {
            if let Bound::Int(lo) = interval.lo {
                parts.push(Formula::atom(Expr::ge(Expr::var(v.clone()), Expr::int(lo))));
            }
            if let Bound::Int(hi) = interval.hi {
                parts.push(Formula::atom(Expr::le(Expr::var(v.clone()), Expr::int(hi))));
            }
        }
        for (v, tvb) in &self.bools {
            match tvb {
                Tvb::True => parts.push(Formula::atom(Expr::var(v.clone()))),
                Tvb::False => parts.push(Formula::atom(Expr::not(Expr::var(v.clone())))),
                Tvb::Top => {}
            }
        }
        Formula::conjunction(parts)
    }
}

/// Interval domain with a configured widening policy
#[derive(Debug, Clone)]
pub struct IntervalDomain {
    widening: WideningKind,
    literals: Vec<i64>,
}

impl Default for IntervalDomain {
    fn default() -> Self {
        Self {
            widening: WideningKind::Simple,
            literals: Vec::new(),
        }
    }
}

impl IntervalDomain {
    pub fn new(widening: WideningKind, literals: BTreeSet<i64>) -> Self {
        Self {
            widening,
            literals: literals.into_iter().collect(),
        }
    }

    fn widen_hi(&self, old: Bound, new: Bound) -> Bound {
        if new <= old {
            return old.max(new);
        }
        match self.widening {
            WideningKind::Simple => Bound::PosInf,
            WideningKind::LiteralGuided => match new {
                Bound::Int(v) => self
                    .literals
                    .iter()
                    .copied()
                    .find(|lit| *lit >= v)
                    .map(Bound::Int)
                    .unwrap_or(Bound::PosInf),
                other => other,
            },
            WideningKind::ExponentialThreshold => match new {
                Bound::Int(v) => next_threshold_up(v),
                other => other,
            },
        }
    }

    fn widen_lo(&self, old: Bound, new: Bound) -> Bound {
        if new >= old {
            return old.min(new);
        }
        match self.widening {
            WideningKind::Simple => Bound::NegInf,
            WideningKind::LiteralGuided => match new {
                Bound::Int(v) => self
                    .literals
                    .iter()
                    .rev()
                    .copied()
                    .find(|lit| *lit <= v)
                    .map(Bound::Int)
                    .unwrap_or(Bound::NegInf),
                other => other,
            },
            WideningKind::ExponentialThreshold => match new {
                Bound::Int(v) => next_threshold_down(v),
                other => other,
            },
        }
    }
}

/// Smallest threshold in {0, ±2^k} at or above `v`
fn next_threshold_up(v: i64) -> Bound {
    if v == 0 {
        return Bound::Int(0);
    }
    if v > 0 {
        let mut t: i64 = 1;
        while t < v {
            match t.checked_mul(2) {
                Some(next) => t = next,
                None => return Bound::PosInf,
            }
        }
        Bound::Int(t)
    } else {
        // Largest -2^k that is still >= v.
        let mut t: i64 = -1;
        while let Some(next) = t.checked_mul(2) {
            if next < v {
                break;
            }
            t = next;
        }
        Bound::Int(t)
    }
}

/// Largest threshold in {0, ±2^k} at or below `v`
fn next_threshold_down(v: i64) -> Bound {
    match next_threshold_up(v.checked_neg().unwrap_or(i64::MAX)) {
        Bound::Int(t) => Bound::Int(-t),
        Bound::PosInf => Bound::NegInf,
        Bound::NegInf => Bound::PosInf,
    }
}

impl AbstractDomain for IntervalDomain {
    type State = IntervalState;

    fn fresh_state(&self, vars: &[VarId]) -> IntervalState {
        IntervalState::top_over(vars.iter().cloned().collect())
    }

    fn top_state(&self) -> IntervalState {
        IntervalState::top_over(BTreeSet::new())
    }

    fn bottom_state(&self) -> IntervalState {
        IntervalState::bottom_over(BTreeSet::new())
    }

    fn apply(&self, state: &IntervalState, stmt: &Statement) -> IntervalState {
        if state.bottom {
            return state.clone();
        }
        match stmt {
            Statement::Skip => state.clone(),
            Statement::Assume { cond } => state.assume(cond),
            Statement::Assign { var, expr } => {
                let mut out = state.clone();
                out.vars.insert(var.clone());
                match var.sort {
                    Sort::Int => {
                        let value = state.eval(expr);
                        out.set_interval(var.clone(), value);
                    }
                    Sort::Bool => {
                        let value = state.eval_bool(expr);
                        out.set_tvb(var.clone(), value);
                    }
                }
                out
            }
            Statement::Havoc { vars } => {
                let mut out = state.clone();
                for v in vars {
                    out.ints.remove(v);
                    out.bools.remove(v);
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
        callee_exit: &IntervalState,
        caller_pre: &IntervalState,
        _info: &CallInfo,
        transition: &Transition,
    ) -> IntervalState {
        if callee_exit.bottom {
            return IntervalState::bottom_over(caller_pre.vars.clone());
        }
        let mut out = caller_pre.clone();
        if let Statement::Return { assigns } = &transition.statement {
            for (caller_var, callee_expr) in assigns {
                out.vars.insert(caller_var.clone());
                match caller_var.sort {
                    Sort::Int => {
                        out.set_interval(caller_var.clone(), callee_exit.eval(callee_expr));
                    }
                    Sort::Bool => {
                        out.set_tvb(caller_var.clone(), callee_exit.eval_bool(callee_expr));
                    }
                }
            }
        }
        out
    }

    fn widen(&self, older: &IntervalState, newer: &IntervalState) -> IntervalState {
        if older.bottom {
            return newer.clone();
        }
        if newer.bottom {
            return older.clone();
        }
        let mut out = IntervalState::top_over(newer.vars.clone());
        for v in &newer.vars {
            match v.sort {
                Sort::Int => {
                    let old = older.interval_of(v);
                    let new = newer.interval_of(v);
                    out.set_interval(
                        v.clone(),
                        Interval::new(self.widen_lo(old.lo, new.lo), self.widen_hi(old.hi, new.hi)),
                    );
                }
                Sort::Bool => {
                    out.set_tvb(v.clone(), older.tvb_of(v).join(newer.tvb_of(v)));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> VarId {
        VarId::int("x")
    }

    fn top() -> IntervalState {
        IntervalDomain::default().fresh_state(&[x()])
    }

    fn assume(state: &IntervalState, cond: Expr) -> IntervalState {
        IntervalDomain::default().apply(state, &Statement::Assume { cond })
    }

    #[test]
    fn test_assume_tightens_bounds() {
        let s = assume(&top(), Expr::lt(Expr::var(x()), Expr::int(10)));
        assert_eq!(s.interval_of(&x()).hi, Bound::Int(9));
    }

    #[test]
    fn test_contradiction_is_bottom() {
        let s = assume(&top(), Expr::lt(Expr::var(x()), Expr::int(0)));
        let s = assume(&s, Expr::gt(Expr::var(x()), Expr::int(5)));
        assert!(s.is_bottom());
    }

    #[test]
    fn test_assign_evaluates_interval() {
        let d = IntervalDomain::default();
        let s = assume(&top(), Expr::eq(Expr::var(x()), Expr::int(4)));
        let s = d.apply(
            &s,
            &Statement::Assign {
                var: x(),
                expr: Expr::add(Expr::var(x()), Expr::int(1)),
            },
        );
        assert_eq!(s.interval_of(&x()), Interval::point(5));
    }

    #[test]
    fn test_var_var_refinement() {
        let d = IntervalDomain::default();
        let y = VarId::int("y");
        let s = d.fresh_state(&[x(), y.clone()]);
        let s = assume(&s, Expr::eq(Expr::var(y.clone()), Expr::int(7)));
        let s = assume(&s, Expr::lt(Expr::var(x()), Expr::var(y)));
        assert_eq!(s.interval_of(&x()).hi, Bound::Int(6));
    }

    #[test]
    fn test_or_joins_branches() {
        let s = assume(
            &top(),
            Expr::or(
                Expr::eq(Expr::var(x()), Expr::int(1)),
                Expr::eq(Expr::var(x()), Expr::int(5)),
            ),
        );
        assert_eq!(s.interval_of(&x()), Interval::new(Bound::Int(1), Bound::Int(5)));
    }

    #[test]
    fn test_simple_widening_tops_out() {
        let d = IntervalDomain::default();
        let older = assume(
            &assume(&top(), Expr::ge(Expr::var(x()), Expr::int(0))),
            Expr::le(Expr::var(x()), Expr::int(1)),
        );
        let newer = assume(
            &assume(&top(), Expr::ge(Expr::var(x()), Expr::int(0))),
            Expr::le(Expr::var(x()), Expr::int(2)),
        );
        let widened = d.widen(&older, &newer);
        assert_eq!(widened.interval_of(&x()).lo, Bound::Int(0), "stable bound kept");
        assert_eq!(widened.interval_of(&x()).hi, Bound::PosInf, "unstable bound topped out");
    }

    #[test]
    fn test_literal_widening_snaps_to_constant() {
        let d = IntervalDomain::new(WideningKind::LiteralGuided, BTreeSet::from([0, 10]));
        let older = assume(&top(), Expr::le(Expr::var(x()), Expr::int(1)));
        let newer = assume(&top(), Expr::le(Expr::var(x()), Expr::int(2)));
        let widened = d.widen(&older, &newer);
        assert_eq!(widened.interval_of(&x()).hi, Bound::Int(10));
    }

    #[test]
    fn test_exponential_widening_snaps_to_power_of_two() {
        let d = IntervalDomain::new(WideningKind::ExponentialThreshold, BTreeSet::new());
        let older = assume(&top(), Expr::le(Expr::var(x()), Expr::int(3)));
        let newer = assume(&top(), Expr::le(Expr::var(x()), Expr::int(5)));
        let widened = d.widen(&older, &newer);
        assert_eq!(widened.interval_of(&x()).hi, Bound::Int(8));
    }

    #[test]
    fn test_widening_chain_stabilizes() {
        // Repeated widening against a cycling set of pushes must reach a
        // fixed point for every policy.
        for kind in WideningKind::ALL {
            let d = IntervalDomain::new(kind, BTreeSet::from([0, 100]));
            let pushes: Vec<IntervalState> = [1, 5, 9, 13]
                .iter()
                .map(|hi| assume(&top(), Expr::le(Expr::var(x()), Expr::int(*hi))))
                .collect();
            let mut current = assume(&top(), Expr::le(Expr::var(x()), Expr::int(0)));
            let mut stable_rounds = 0;
            let mut steps = 0;
            while stable_rounds < pushes.len() {
                let pushed = &pushes[steps % pushes.len()];
                let next = d.widen(&current, &current.join(pushed));
                if next == current {
                    stable_rounds += 1;
                } else {
                    stable_rounds = 0;
                    current = next;
                }
                steps += 1;
                assert!(steps < 200, "widening {:?} failed to stabilize", kind);
            }
        }
    }

    #[test]
    fn test_bool_lattice_join() {
        let d = IntervalDomain::default();
        let p = VarId::bool("p");
        let s = d.fresh_state(&[p.clone()]);
        let st = d.apply(
            &s,
            &Statement::Assign {
                var: p.clone(),
                expr: Expr::bool_const(true),
            },
        );
        let sf = d.apply(
            &s,
            &Statement::Assign {
                var: p.clone(),
                expr: Expr::bool_const(false),
            },
        );
        assert_eq!(st.tvb_of(&p), Tvb::True);
        assert_eq!(st.join(&sf).tvb_of(&p), Tvb::Top);
    }

    #[test]
    fn test_subset_relation_pointwise() {
        let narrow = assume(
            &assume(&top(), Expr::ge(Expr::var(x()), Expr::int(2))),
            Expr::le(Expr::var(x()), Expr::int(3)),
        );
        let wide = assume(
            &assume(&top(), Expr::ge(Expr::var(x()), Expr::int(0))),
            Expr::le(Expr::var(x()), Expr::int(10)),
        );
        assert_eq!(narrow.subset_of(&wide), SubsetRelation::Subset);
        assert_eq!(wide.subset_of(&narrow), SubsetRelation::Superset);
    }

    #[test]
    fn test_to_formula_renders_bounds() {
        let s = assume(
            &assume(&top(), Expr::ge(Expr::var(x()), Expr::int(0))),
            Expr::le(Expr::var(x()), Expr::int(10)),
        );
        let rendered = s.to_formula().to_string();
        assert!(rendered.contains(">= 0"), "formula was {}", rendered);
        assert!(rendered.contains("<= 10"), "formula was {}", rendered);
    }
}
