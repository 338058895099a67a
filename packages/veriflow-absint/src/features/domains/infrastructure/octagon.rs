/*
 * Octagon Abstract Domain
 *
 * Weakly relational constraints of shape `±x ± y <= c`, stored as a
 * difference bound matrix over doubled variables: for integer variable i,
 * row/column 2i stands for +x_i and 2i+1 for -x_i, and m[a][b] bounds
 * v_a - v_b. Unary bounds are encoded on the (2i, 2i+1) pair with doubled
 * constants.
 *
 * The matrix is kept in strongly closed form (Floyd-Warshall plus the
 * octagonal strengthening step) after every transformer application, except
 * directly after widening, where closing would defeat termination. Emptiness
 * shows up as a negative diagonal entry.
 *
 * Boolean variables ride along in the same three-valued lattice the interval
 * domain uses.
 */

use crate::features::domains::domain::CallInfo;
use crate::features::domains::ports::{AbstractDomain, AbstractState, SubsetRelation};
use crate::features::smt::Formula;
use crate::shared::models::{BinOp, Expr, Sort, Statement, Transition, UnOp, VarId};
use std::collections::{BTreeMap, BTreeSet};

use super::interval::{Bound, Interval, Tvb};

/// +infinity for DBM entries; i128 headroom keeps sums overflow-free
const INF: i128 = i128::MAX / 4;

fn sat_add(a: i128, b: i128) -> i128 {
    if a >= INF || b >= INF {
        INF
    } else {
        a + b
    }
}

/// Octagon abstract state
#[derive(Debug, Clone, PartialEq)]
pub struct OctagonState {
    vars: BTreeSet<VarId>,
    /// Integer variables in sorted order; var k owns DBM rows 2k and 2k+1
    index: Vec<VarId>,
    /// Row-major (2n)^2 matrix
    dbm: Vec<i128>,
    bools: BTreeMap<VarId, Tvb>,
    bottom: bool,
    closed: bool,
}

impl OctagonState {
    fn dim(&self) -> usize {
        2 * self.index.len()
    }

    fn top_over(vars: BTreeSet<VarId>) -> Self {
        let index: Vec<VarId> = vars.iter().filter(|v| v.sort == Sort::Int).cloned().collect();
        let dim = 2 * index.len();
        let mut dbm = vec![INF; dim * dim];
        for a in 0..dim {
            dbm[a * dim + a] = 0;
        }
        Self {
            vars,
            index,
            dbm,
            bools: BTreeMap::new(),
            bottom: false,
            closed: true,
        }
    }

    fn bottom_over(vars: BTreeSet<VarId>) -> Self {
        let mut out = Self::top_over(vars);
        out.bottom = true;
        out
    }

    fn get(&self, a: usize, b: usize) -> i128 {
        self.dbm[a * self.dim() + b]
    }

    fn set(&mut self, a: usize, b: usize, v: i128) {
        let dim = self.dim();
        let slot = &mut self.dbm[a * dim + b];
        if v < *slot {
            *slot = v;
            self.closed = false;
        }
    }

    fn var_index(&self, v: &VarId) -> Option<usize> {
        self.index.binary_search(v).ok()
    }

    /// Floyd-Warshall closure plus octagonal strengthening
    fn close(&mut self) {
        if self.bottom || self.closed {
            return;
        }
        let dim = self.dim();
        for k in 0..dim {
            for a in 0..dim {
                let via = self.get(a, k);
                if via >= INF {
                    continue;
                }
                for b in 0..dim {
                    let candidate = sat_add(via, self.get(k, b));
                    if candidate < self.get(a, b) {
                        self.dbm[a * dim + b] = candidate;
                    }
                }
            }
        }
        // Strengthening: v_a - v_b <= (m[a][a^1] + m[b^1][b]) / 2
        for a in 0..dim {
            for b in 0..dim {
                let half = sat_add(self.get(a, a ^ 1), self.get(b ^ 1, b));
                if half < INF {
                    let candidate = half.div_euclid(2);
                    if candidate < self.get(a, b) {
                        self.dbm[a * dim + b] = candidate;
                    }
                }
            }
        }
        for a in 0..dim {
            if self.get(a, a) < 0 {
                self.bottom = true;
                break;
            }
        }
        self.closed = true;
    }

    /// Unary interval of an integer variable, read from the closed DBM
    pub fn interval_of(&self, v: &VarId) -> Interval {
        if self.bottom {
            return Interval::new(Bound::PosInf, Bound::NegInf);
        }
        let Some(i) = self.var_index(v) else {
            return Interval::top();
        };
        let hi2 = self.get(2 * i, 2 * i + 1);
        let lo2 = self.get(2 * i + 1, 2 * i);
        let hi = if hi2 >= INF {
            Bound::PosInf
        } else {
            Bound::Int(hi2.div_euclid(2) as i64)
        };
        let lo = if lo2 >= INF {
            Bound::NegInf
        } else {
            Bound::Int((-lo2.div_euclid(2)) as i64)
        };
        Interval::new(lo, hi)
    }

    pub fn tvb_of(&self, v: &VarId) -> Tvb {
        self.bools.get(v).copied().unwrap_or(Tvb::Top)
    }

    /// Interval evaluation over unary projections
    fn eval(&self, expr: &Expr) -> Interval {
        match expr {
            Expr::IntConst(c) => Interval::point(*c),
            Expr::Var(v) if v.sort == Sort::Int => self.interval_of(v),
            Expr::Unary(UnOp::Neg, e) => {
                let i = self.eval(e);
                Interval::point(0).sub_interval(&i)
            }
            Expr::Binary(BinOp::Add, l, r) => self.eval(l).add_interval(&self.eval(r)),
            Expr::Binary(BinOp::Sub, l, r) => self.eval(l).sub_interval(&self.eval(r)),
            _ => Interval::top(),
        }
    }

    /// Drop all constraints mentioning variable `i`
    fn forget(&mut self, i: usize) {
        let dim = self.dim();
        for row in [2 * i, 2 * i + 1] {
            for b in 0..dim {
                if b != row {
                    self.dbm[row * dim + b] = INF;
                    self.dbm[b * dim + row] = INF;
                }
            }
        }
        self.dbm[(2 * i) * dim + (2 * i + 1)] = INF;
        self.dbm[(2 * i + 1) * dim + (2 * i)] = INF;
        self.dbm[(2 * i) * dim + (2 * i)] = 0;
        self.dbm[(2 * i + 1) * dim + (2 * i + 1)] = 0;
        self.closed = false;
    }

    fn constrain_upper(&mut self, i: usize, c: i128) {
        // x_i <= c  =>  m[2i][2i+1] = 2c
        self.set(2 * i, 2 * i + 1, 2 * c);
    }

    fn constrain_lower(&mut self, i: usize, c: i128) {
        // x_i >= c  =>  m[2i+1][2i] = -2c
        self.set(2 * i + 1, 2 * i, -2 * c);
    }

    /// x_i - x_j <= c
    fn constrain_diff(&mut self, i: usize, j: usize, c: i128) {
        self.set(2 * i, 2 * j, c);
        self.set(2 * j + 1, 2 * i + 1, c);
    }

    /// x_i + x_j <= c
    fn constrain_sum(&mut self, i: usize, j: usize, c: i128) {
        self.set(2 * i, 2 * j + 1, c);
        self.set(2 * j, 2 * i + 1, c);
    }

    /// -x_i - x_j <= c
    fn constrain_neg_sum(&mut self, i: usize, j: usize, c: i128) {
        self.set(2 * i + 1, 2 * j, c);
        self.set(2 * j + 1, 2 * i, c);
    }

    /// `var + offset` view
    fn as_linear(expr: &Expr) -> Option<(Option<VarId>, i128)> {
        match expr {
            Expr::IntConst(c) => Some((None, *c as i128)),
            Expr::Var(v) if v.sort == Sort::Int => Some((Some(v.clone()), 0)),
            Expr::Binary(BinOp::Add, l, r) => match (&**l, &**r) {
                (Expr::Var(v), Expr::IntConst(c)) | (Expr::IntConst(c), Expr::Var(v))
                    if v.sort == Sort::Int =>
                {
                    Some((Some(v.clone()), *c as i128))
                }
                _ => None,
            },
            Expr::Binary(BinOp::Sub, l, r) => match (&**l, &**r) {
                (Expr::Var(v), Expr::IntConst(c)) if v.sort == Sort::Int => {
                    Some((Some(v.clone()), -(*c as i128)))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn assume(&self, cond: &Expr) -> Self {
        if self.bottom {
            return self.clone();
        }
        let mut out = self.clone();
        match cond {
            Expr::BoolConst(true) => return out,
            Expr::BoolConst(false) => return Self::bottom_over(self.vars.clone()),
            Expr::Var(v) if v.sort == Sort::Bool => {
                if out.tvb_of(v) == Tvb::False {
                    return Self::bottom_over(self.vars.clone());
                }
                out.bools.insert(v.clone(), Tvb::True);
                return out;
            }
            Expr::Unary(UnOp::Not, e) => return self.assume(&e.negated()),
            Expr::Binary(BinOp::And, l, r) => return self.assume(l).assume(r),
            Expr::Binary(BinOp::Or, l, r) => {
                return self.assume(l).join(&self.assume(r));
            }
            Expr::Binary(op, lhs, rhs) if op.is_comparison() => {
                out.refine_comparison(*op, lhs, rhs);
            }
            _ => {}
        }
        out.close();
        out
    }

    fn refine_comparison(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) {
        // Normalize Gt/Ge by swapping sides; Ne narrows nothing relational.
        match op {
            BinOp::Gt => return self.refine_comparison(BinOp::Lt, rhs, lhs),
            BinOp::Ge => return self.refine_comparison(BinOp::Le, rhs, lhs),
            BinOp::Ne => {
                let (a, b) = (self.eval(lhs), self.eval(rhs));
                if a.is_point() && b.is_point() && a == b {
                    self.bottom = true;
                }
                return;
            }
            _ => {}
        }
        let strict = i128::from(op == BinOp::Lt);

        // Sum form: x + y <= c
        if let (Expr::Binary(BinOp::Add, l, r), Some((None, c))) = (lhs, Self::as_linear(rhs)) {
            if let (Expr::Var(x), Expr::Var(y)) = (&**l, &**r) {
                if let (Some(i), Some(j)) = (self.var_index(x), self.var_index(y)) {
                    if op == BinOp::Eq {
                        self.constrain_sum(i, j, c);
                        self.constrain_neg_sum(i, j, -c);
                    } else {
                        self.constrain_sum(i, j, c - strict);
                    }
                    return;
                }
            }
        }
        // Difference form: x - y <= c
        if let (Expr::Binary(BinOp::Sub, l, r), Some((None, c))) = (lhs, Self::as_linear(rhs)) {
            if let (Expr::Var(x), Expr::Var(y)) = (&**l, &**r) {
                if let (Some(i), Some(j)) = (self.var_index(x), self.var_index(y)) {
                    if op == BinOp::Eq {
                        self.constrain_diff(i, j, c);
                        self.constrain_diff(j, i, -c);
                    } else {
                        self.constrain_diff(i, j, c - strict);
                    }
                    return;
                }
            }
        }

        let (Some(left), Some(right)) = (Self::as_linear(lhs), Self::as_linear(rhs)) else {
            return;
        };
        match (left, right) {
            ((Some(x), a), (None, c)) => {
                let Some(i) = self.var_index(&x) else { return };
                let bound = c - a;
                match op {
                    BinOp::Le | BinOp::Lt => self.constrain_upper(i, bound - strict),
                    BinOp::Eq => {
                        self.constrain_upper(i, bound);
                        self.constrain_lower(i, bound);
                    }
                    _ => {}
                }
            }
            ((None, c), (Some(y), b)) => {
                let Some(j) = self.var_index(&y) else { return };
                let bound = c - b;
                match op {
                    // c <= y + b  =>  y >= c - b
                    BinOp::Le | BinOp::Lt => self.constrain_lower(j, bound + strict),
                    BinOp::Eq => {
                        self.constrain_upper(j, bound);
                        self.constrain_lower(j, bound);
                    }
                    _ => {}
                }
            }
            ((Some(x), a), (Some(y), b)) => {
                let (Some(i), Some(j)) = (self.var_index(&x), self.var_index(&y)) else {
                    return;
                };
                let d = b - a; // x <= y + d
                match op {
                    BinOp::Le | BinOp::Lt => self.constrain_diff(i, j, d - strict),
                    BinOp::Eq => {
                        self.constrain_diff(i, j, d);
                        self.constrain_diff(j, i, -d);
                    }
                    _ => {}
                }
            }
            ((None, a), (None, c)) => {
                let holds = match op {
                    BinOp::Le => a <= c,
                    BinOp::Lt => a < c,
                    BinOp::Eq => a == c,
                    _ => true,
                };
                if !holds {
                    self.bottom = true;
                }
            }
        }
    }

    fn assign(&self, var: &VarId, expr: &Expr) -> Self {
        let mut out = self.clone();
        if var.sort == Sort::Bool {
            // Boolean assignment: evaluate in the interval-style lattice.
            let value = match expr {
                Expr::BoolConst(true) => Tvb::True,
                Expr::BoolConst(false) => Tvb::False,
                Expr::Var(v) if v.sort == Sort::Bool => self.tvb_of(v),
                _ => Tvb::Top,
            };
            out.vars.insert(var.clone());
            if value == Tvb::Top {
                out.bools.remove(var);
            } else {
                out.bools.insert(var.clone(), value);
            }
            return out;
        }

        let Some(i) = out.var_index(var) else {
            return out;
        };
        match Self::as_linear(expr) {
            Some((None, c)) => {
                out.forget(i);
                out.constrain_upper(i, c);
                out.constrain_lower(i, c);
            }
            Some((Some(y), c)) if &y == var => {
                // x := x + c shifts every constraint mentioning x.
                let dim = out.dim();
                for b in 0..dim {
                    if b == 2 * i || b == 2 * i + 1 {
                        continue;
                    }
                    let m = out.get(2 * i, b);
                    if m < INF {
                        out.dbm[(2 * i) * dim + b] = m + c;
                    }
                    let m = out.get(b, 2 * i);
                    if m < INF {
                        out.dbm[b * dim + 2 * i] = m - c;
                    }
                    let m = out.get(2 * i + 1, b);
                    if m < INF {
                        out.dbm[(2 * i + 1) * dim + b] = m - c;
                    }
                    let m = out.get(b, 2 * i + 1);
                    if m < INF {
                        out.dbm[b * dim + 2 * i + 1] = m + c;
                    }
                }
                let m = out.get(2 * i, 2 * i + 1);
                if m < INF {
                    out.dbm[(2 * i) * dim + 2 * i + 1] = m + 2 * c;
                }
                let m = out.get(2 * i + 1, 2 * i);
                if m < INF {
                    out.dbm[(2 * i + 1) * dim + 2 * i] = m - 2 * c;
                }
                out.closed = false;
            }
            Some((Some(y), c)) => match out.var_index(&y) {
                Some(j) => {
                    // x := y + c  =>  x - y <= c and y - x <= -c
                    out.forget(i);
                    out.constrain_diff(i, j, c);
                    out.constrain_diff(j, i, -c);
                }
                None => out.forget(i),
            },
            None => {
                let value = self.eval(expr);
                out.forget(i);
                if let Bound::Int(hi) = value.hi {
                    out.constrain_upper(i, hi as i128);
                }
                if let Bound::Int(lo) = value.lo {
                    out.constrain_lower(i, lo as i128);
                }
            }
        }
        out.close();
        out
    }
}

/// Interval helpers without exposing octagon internals to the interval file
trait IntervalExt {
    fn add_interval(&self, other: &Interval) -> Interval;
    fn sub_interval(&self, other: &Interval) -> Interval;
}

impl IntervalExt for Interval {
    fn add_interval(&self, other: &Interval) -> Interval {
        let lo = match (self.lo, other.lo) {
            (Bound::Int(a), Bound::Int(b)) => Bound::Int(a.saturating_add(b)),
            _ => Bound::NegInf,
        };
        let hi = match (self.hi, other.hi) {
            (Bound::Int(a), Bound::Int(b)) => Bound::Int(a.saturating_add(b)),
            _ => Bound::PosInf,
        };
        Interval::new(lo, hi)
    }

    fn sub_interval(&self, other: &Interval) -> Interval {
        let lo = match (self.lo, other.hi) {
            (Bound::Int(a), Bound::Int(b)) => Bound::Int(a.saturating_sub(b)),
            _ => Bound::NegInf,
        };
        let hi = match (self.hi, other.lo) {
            (Bound::Int(a), Bound::Int(b)) => Bound::Int(a.saturating_sub(b)),
            _ => Bound::PosInf,
        };
        Interval::new(lo, hi)
    }
}

impl AbstractState for OctagonState {
    fn variables(&self) -> &BTreeSet<VarId> {
        &self.vars
    }

    fn add_variables(&self, vars: &[VarId]) -> Self {
        let mut new_vars = self.vars.clone();
        for v in vars {
            new_vars.insert(v.clone());
        }
        self.reshape(new_vars)
    }

    fn remove_variables(&self, vars: &[VarId]) -> Self {
        let mut new_vars = self.vars.clone();
        for v in vars {
            new_vars.remove(v);
        }
        self.reshape(new_vars)
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
        let mut a = self.clone();
        let mut b = other.clone();
        a.close();
        b.close();
        match (a.bottom, b.bottom) {
            (true, true) => return SubsetRelation::Equal,
            (true, false) => return SubsetRelation::Subset,
            (false, true) => return SubsetRelation::Superset,
            (false, false) => {}
        }
        let mut fwd = true;
        let mut bwd = true;
        for (ea, eb) in a.dbm.iter().zip(b.dbm.iter()) {
            fwd &= ea <= eb;
            bwd &= eb <= ea;
        }
        for v in self.bools.keys().chain(other.bools.keys()) {
            fwd &= b.tvb_of(v) == Tvb::Top || b.tvb_of(v) == a.tvb_of(v);
            bwd &= a.tvb_of(v) == Tvb::Top || a.tvb_of(v) == b.tvb_of(v);
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
        let mut a = self.clone();
        let mut b = other.clone();
        a.close();
        b.close();
        if a.bottom {
            return b;
        }
        if b.bottom {
            return a;
        }
        // Pointwise max on closed forms is the octagon join.
        let mut out = a.clone();
        for (slot, eb) in out.dbm.iter_mut().zip(b.dbm.iter()) {
            *slot = (*slot).max(*eb);
        }
        let keys: Vec<VarId> = out.bools.keys().cloned().collect();
        for v in keys {
            let joined = if a.tvb_of(&v) == b.tvb_of(&v) {
                a.tvb_of(&v)
            } else {
                Tvb::Top
            };
            if joined == Tvb::Top {
                out.bools.remove(&v);
            } else {
                out.bools.insert(v, joined);
            }
        }
        out.closed = true;
        out
    }

    fn to_formula(&self) -> Formula {
        if self.bottom {
            return Formula::False;
        }
        let mut s = self.clone();
        s.close();
        if s.bottom {
            return Formula::False;
        }
        let mut parts = Vec::new();
        for (k, v) in s.index.iter().enumerate() {
            let interval = s.interval_of(v);
            if let Bound::Int(lo) = interval.lo {
                parts.push(Formula::atom(Expr::ge(Expr::var(v.clone()), Expr::int(lo))));
            }
            if let Bound::Int(hi) = interval.hi {
                parts.push(Formula::atom(Expr::le(Expr::var(v.clone()), Expr::int(hi))));
            }
            for (k2, w) in s.index.iter().enumerate() {
                if k2 == k {
                    continue;
                }
                // v - w <= c rendered as v <= w + c (stays in the oracle's
                // linear fragment)
                let c = s.get(2 * k, 2 * k2);
                if c < INF && i64::try_from(c).is_ok() {
                    parts.push(Formula::atom(Expr::le(
                        Expr::var(v.clone()),
                        Expr::add(Expr::var(w.clone()), Expr::int(c as i64)),
                    )));
                }
            }
        }
        for (v, tvb) in &s.bools {
            match tvb {
                Tvb::True => parts.push(Formula::atom(Expr::var(v.clone()))),
                Tvb::False => parts.push(Formula::atom(Expr::not(Expr::var(v.clone())))),
                Tvb::Top => {}
            }
        }
        Formula::conjunction(parts)
    }
}

impl OctagonState {
    /// Rebuild the matrix over a new variable set, copying every entry whose
    /// endpoints survive
    ///
    /// Reads the closed form so constraints implied through dropped
    /// variables survive the projection.
    fn reshape(&self, new_vars: BTreeSet<VarId>) -> Self {
        let mut closed_self = self.clone();
        closed_self.close();
        let this = &closed_self;
        let mut out = if this.bottom {
            Self::bottom_over(new_vars.clone())
        } else {
            Self::top_over(new_vars.clone())
        };
        for (k_new, v) in out.index.clone().iter().enumerate() {
            let Some(k_old) = this.var_index(v) else {
                continue;
            };
            for (k2_new, w) in out.index.clone().iter().enumerate() {
                let Some(k2_old) = this.var_index(w) else {
                    continue;
                };
                for (da, db) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                    let val = this.get(2 * k_old + da, 2 * k2_old + db);
                    let dim = out.dim();
                    let slot = &mut out.dbm[(2 * k_new + da) * dim + (2 * k2_new + db)];
                    *slot = (*slot).min(val);
                }
            }
        }
        for (v, tvb) in &this.bools {
            if new_vars.contains(v) {
                out.bools.insert(v.clone(), *tvb);
            }
        }
        out.closed = false;
        out.close();
        out
    }
}

/// Octagon domain
#[derive(Debug, Clone, Default)]
pub struct OctagonDomain;

impl OctagonDomain {
    pub fn new() -> Self {
        Self
    }
}

impl AbstractDomain for OctagonDomain {
    type State = OctagonState;

    fn fresh_state(&self, vars: &[VarId]) -> OctagonState {
        OctagonState::top_over(vars.iter().cloned().collect())
    }

    fn top_state(&self) -> OctagonState {
        OctagonState::top_over(BTreeSet::new())
    }

    fn bottom_state(&self) -> OctagonState {
        OctagonState::bottom_over(BTreeSet::new())
    }

    fn apply(&self, state: &OctagonState, stmt: &Statement) -> OctagonState {
        if state.bottom {
            return state.clone();
        }
        match stmt {
            Statement::Skip => state.clone(),
            Statement::Assume { cond } => state.assume(cond),
            Statement::Assign { var, expr } => state.assign(var, expr),
            Statement::Havoc { vars } => {
                let mut out = state.clone();
                for v in vars {
                    if let Some(i) = out.var_index(v) {
                        out.forget(i);
                    }
                    out.bools.remove(v);
                }
                out.close();
                out
            }
            Statement::Call { .. } | Statement::Return { .. } => {
                panic!("call/return statements must go through post_call/post_return")
            }
        }
    }

    fn post_return(
        &self,
        callee_exit: &OctagonState,
        caller_pre: &OctagonState,
        _info: &CallInfo,
        transition: &Transition,
    ) -> OctagonState {
        if callee_exit.bottom {
            return OctagonState::bottom_over(caller_pre.vars.clone());
        }
        let mut exit = callee_exit.clone();
        exit.close();
        let mut out = caller_pre.clone();
        if let Statement::Return { assigns } = &transition.statement {
            for (caller_var, callee_expr) in assigns {
                match caller_var.sort {
                    Sort::Int => {
                        let value = exit.eval(callee_expr);
                        if let Some(i) = out.var_index(caller_var) {
                            out.forget(i);
                            if let Bound::Int(hi) = value.hi {
                                out.constrain_upper(i, hi as i128);
                            }
                            if let Bound::Int(lo) = value.lo {
                                out.constrain_lower(i, lo as i128);
                            }
                        }
                    }
                    Sort::Bool => {
                        let value = match callee_expr {
                            Expr::BoolConst(true) => Tvb::True,
                            Expr::BoolConst(false) => Tvb::False,
                            Expr::Var(v) if v.sort == Sort::Bool => exit.tvb_of(v),
                            _ => Tvb::Top,
                        };
                        if value == Tvb::Top {
                            out.bools.remove(caller_var);
                        } else {
                            out.bools.insert(caller_var.clone(), value);
                        }
                    }
                }
            }
        }
        out.close();
        out
    }

    fn widen(&self, older: &OctagonState, newer: &OctagonState) -> OctagonState {
        if older.bottom {
            return newer.clone();
        }
        if newer.bottom {
            return older.clone();
        }
        let mut old = older.clone();
        old.close();
        if old.bottom {
            return newer.clone();
        }
        // Entries that grew go to infinity. The result is deliberately left
        // unclosed; closing after widening can undo the extrapolation.
        let mut out = newer.clone();
        out.close();
        if out.bottom {
            return old;
        }
        for (slot, old_entry) in out.dbm.iter_mut().zip(old.dbm.iter()) {
            if *slot > *old_entry {
                *slot = INF;
            } else {
                *slot = *old_entry;
            }
        }
        let keys: Vec<VarId> = out.bools.keys().cloned().collect();
        for v in keys {
            if old.tvb_of(&v) != out.tvb_of(&v) {
                out.bools.remove(&v);
            }
        }
        out.closed = false;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> VarId {
        VarId::int("x")
    }

    fn y() -> VarId {
        VarId::int("y")
    }

    fn top() -> OctagonState {
        OctagonDomain::new().fresh_state(&[x(), y()])
    }

    fn assume(state: &OctagonState, cond: Expr) -> OctagonState {
        OctagonDomain::new().apply(state, &Statement::Assume { cond })
    }

    #[test]
    fn test_unary_bounds_round_trip() {
        let s = assume(&top(), Expr::le(Expr::var(x()), Expr::int(10)));
        let s = assume(&s, Expr::ge(Expr::var(x()), Expr::int(3)));
        assert_eq!(s.interval_of(&x()), Interval::new(Bound::Int(3), Bound::Int(10)));
    }

    #[test]
    fn test_difference_constraint_propagates() {
        // x <= y && y <= 5  =>  x <= 5 after closure
        let s = assume(&top(), Expr::le(Expr::var(x()), Expr::var(y())));
        let s = assume(&s, Expr::le(Expr::var(y()), Expr::int(5)));
        assert_eq!(s.interval_of(&x()).hi, Bound::Int(5));
    }

    #[test]
    fn test_sum_constraint() {
        // x + y <= 4 && x >= 3  =>  y <= 1
        let s = assume(
            &top(),
            Expr::le(Expr::add(Expr::var(x()), Expr::var(y())), Expr::int(4)),
        );
        let s = assume(&s, Expr::ge(Expr::var(x()), Expr::int(3)));
        assert_eq!(s.interval_of(&y()).hi, Bound::Int(1));
    }

    #[test]
    fn test_contradiction_is_bottom() {
        let s = assume(&top(), Expr::lt(Expr::var(x()), Expr::var(y())));
        let s = assume(&s, Expr::lt(Expr::var(y()), Expr::var(x())));
        assert!(s.is_bottom());
    }

    #[test]
    fn test_assign_relational() {
        // y := x + 1 keeps the relation: assume x <= 7 afterwards bounds y
        let d = OctagonDomain::new();
        let s = d.apply(
            &top(),
            &Statement::Assign {
                var: y(),
                expr: Expr::add(Expr::var(x()), Expr::int(1)),
            },
        );
        let s = assume(&s, Expr::le(Expr::var(x()), Expr::int(7)));
        assert_eq!(s.interval_of(&y()).hi, Bound::Int(8));
    }

    #[test]
    fn test_self_increment_shifts_bounds() {
        let d = OctagonDomain::new();
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
    fn test_join_is_pointwise_max() {
        let a = assume(&top(), Expr::eq(Expr::var(x()), Expr::int(1)));
        let b = assume(&top(), Expr::eq(Expr::var(x()), Expr::int(5)));
        let j = a.join(&b);
        assert_eq!(j.interval_of(&x()), Interval::new(Bound::Int(1), Bound::Int(5)));
    }

    #[test]
    fn test_widening_tops_grown_entries() {
        let d = OctagonDomain::new();
        let older = assume(&top(), Expr::le(Expr::var(x()), Expr::int(1)));
        let newer = assume(&top(), Expr::le(Expr::var(x()), Expr::int(2)));
        let w = d.widen(&older, &newer.join(&older));
        assert_eq!(w.interval_of(&x()).hi, Bound::PosInf);
    }

    #[test]
    fn test_widening_keeps_stable_entries() {
        let d = OctagonDomain::new();
        let base = assume(&top(), Expr::ge(Expr::var(x()), Expr::int(0)));
        let older = assume(&base, Expr::le(Expr::var(x()), Expr::int(1)));
        let newer = assume(&base, Expr::le(Expr::var(x()), Expr::int(2)));
        let w = d.widen(&older, &newer);
        assert_eq!(w.interval_of(&x()).lo, Bound::Int(0));
    }

    #[test]
    fn test_remove_variable_projects() {
        let s = assume(&top(), Expr::le(Expr::var(x()), Expr::var(y())));
        let s = assume(&s, Expr::le(Expr::var(y()), Expr::int(5)));
        let projected = s.remove_variables(&[y()]);
        assert!(!projected.variables().contains(&y()));
        // x <= 5 must survive the projection (it was implied before).
        assert_eq!(projected.interval_of(&x()).hi, Bound::Int(5));
    }

    #[test]
    fn test_subset_relation() {
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
        assert_eq!(narrow.subset_of(&narrow.clone()), SubsetRelation::Equal);
    }
}
