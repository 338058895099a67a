/*
 * Equality / Congruence-Closure Abstract Domain
 *
 * Union-find over a term graph: variables, constants, and compound
 * applications interned from statement expressions. Classes merge when terms
 * are provably equal; congruence propagates merges upward through
 * applications (equal children force equal parents). Disequalities are kept
 * as a symmetric pair set and re-validated whenever representatives change;
 * a merge that contradicts a recorded disequality collapses the state to
 * bottom.
 *
 * The term universe is bounded by the syntactic expressions of the analyzed
 * program, so joins (which only coarsen the partition) form finite chains
 * and the widening can simply be the join.
 */

use crate::features::domains::domain::CallInfo;
use crate::features::domains::ports::{AbstractDomain, AbstractState, SubsetRelation};
use crate::features::smt::Formula;
use crate::shared::models::{BinOp, Expr, Sort, Statement, Transition, UnOp, VarId};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Interned term; children index into the term arena
#[derive(Debug, Clone, PartialEq)]
struct Term {
    expr: Expr,
    /// Child term ids for applications, empty for leaves
    children: Vec<usize>,
    /// Operator tag for congruence matching (None for leaves)
    op: Option<String>,
}

/// Congruence-closure abstract state
#[derive(Debug, Clone)]
pub struct CongruenceState {
    vars: BTreeSet<VarId>,
    terms: Vec<Term>,
    lookup: FxHashMap<Expr, usize>,
    /// Union-find parent links
    parent: Vec<usize>,
    /// Symmetric disequality pairs, stored as term ids
    disequalities: Vec<(usize, usize)>,
    bottom: bool,
}

impl CongruenceState {
    fn top_over(vars: BTreeSet<VarId>) -> Self {
        Self {
            vars,
            terms: Vec::new(),
            lookup: FxHashMap::default(),
            parent: Vec::new(),
            disequalities: Vec::new(),
            bottom: false,
        }
    }

    fn bottom_over(vars: BTreeSet<VarId>) -> Self {
        let mut out = Self::top_over(vars);
        out.bottom = true;
        out
    }

    fn find(&self, mut id: usize) -> usize {
        while self.parent[id] != id {
            id = self.parent[id];
        }
        id
    }

    /// Intern `expr` as a term, recursively interning children
    fn intern(&mut self, expr: &Expr) -> usize {
        if let Some(&id) = self.lookup.get(expr) {
            return id;
        }
        let (children, op) = match expr {
            Expr::Var(_) | Expr::IntConst(_) | Expr::BoolConst(_) => (Vec::new(), None),
            Expr::Unary(unop, e) => {
                let c = self.intern(e);
                (vec![c], Some(format!("unary:{:?}", unop)))
            }
            Expr::Binary(binop, l, r) => {
                let cl = self.intern(l);
                let cr = self.intern(r);
                (vec![cl, cr], Some(format!("binary:{:?}", binop)))
            }
        };
        let id = self.terms.len();
        self.terms.push(Term {
            expr: expr.clone(),
            children,
            op,
        });
        self.parent.push(id);
        self.lookup.insert(expr.clone(), id);
        id
    }

    /// Merge the classes of `a` and `b`, propagate congruence, re-validate
    /// disequalities
    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        // Deterministic representative choice: the older term wins.
        let (winner, loser) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[loser] = winner;

        // Distinct constants in one class mean bottom.
        let mut constants = BTreeSet::new();
        for (id, t) in self.terms.iter().enumerate() {
            if self.find(id) == winner {
                match &t.expr {
                    Expr::IntConst(c) => {
                        constants.insert(*c);
                    }
                    Expr::BoolConst(b) => {
                        constants.insert(i64::from(*b) + i64::MAX / 2);
                    }
                    _ => {}
                }
            }
        }
        if constants.len() > 1 {
            self.bottom = true;
            return;
        }

        // Congruence: applications with pairwise-equal children merge too.
        let mut pending: Vec<(usize, usize)> = Vec::new();
        for i in 0..self.terms.len() {
            for j in (i + 1)..self.terms.len() {
                if self.find(i) == self.find(j) {
                    continue;
                }
                let (ti, tj) = (&self.terms[i], &self.terms[j]);
                if ti.op.is_some()
                    && ti.op == tj.op
                    && ti.children.len() == tj.children.len()
                    && ti
                        .children
                        .iter()
                        .zip(tj.children.iter())
                        .all(|(a, b)| self.find(*a) == self.find(*b))
                {
                    pending.push((i, j));
                }
            }
        }
        for (i, j) in pending {
            self.union(i, j);
            if self.bottom {
                return;
            }
        }

        // Representatives changed: re-validate every disequality.
        for (x, y) in self.disequalities.clone() {
            if self.find(x) == self.find(y) {
                self.bottom = true;
                return;
            }
        }
    }

    /// Record `a != b`; immediately bottom if already equal
    fn add_disequality(&mut self, a: usize, b: usize) {
        if self.find(a) == self.find(b) {
            self.bottom = true;
            return;
        }
        let pair = if a <= b { (a, b) } else { (b, a) };
        if !self.disequalities.contains(&pair) {
            self.disequalities.push(pair);
        }
    }

    /// Are the two expressions provably equal here?
    pub fn proves_equal(&self, a: &Expr, b: &Expr) -> bool {
        if self.bottom {
            return true;
        }
        match (self.lookup.get(a), self.lookup.get(b)) {
            (Some(&ia), Some(&ib)) => self.find(ia) == self.find(ib),
            _ => a == b,
        }
    }

    /// Are the two expressions provably distinct here?
    pub fn proves_distinct(&self, a: &Expr, b: &Expr) -> bool {
        if self.bottom {
            return true;
        }
        let (Some(&ia), Some(&ib)) = (self.lookup.get(a), self.lookup.get(b)) else {
            return false;
        };
        let (ra, rb) = (self.find(ia), self.find(ib));
        if ra == rb {
            return false;
        }
        // Recorded disequality between the classes, or distinct constants.
        let diseq = self
            .disequalities
            .iter()
            .any(|(x, y)| {
                let (rx, ry) = (self.find(*x), self.find(*y));
                (rx == ra && ry == rb) || (rx == rb && ry == ra)
            });
        if diseq {
            return true;
        }
        let const_of = |rep: usize| {
            self.terms.iter().enumerate().find_map(|(id, t)| {
                if self.find(id) == rep {
                    match t.expr {
                        Expr::IntConst(c) => Some(c),
                        _ => None,
                    }
                } else {
                    None
                }
            })
        };
        matches!((const_of(ra), const_of(rb)), (Some(x), Some(y)) if x != y)
    }

    /// Drop every term whose expression mentions `var`, rebuilding the
    /// partition among the survivors
    fn purge_var(&self, var: &VarId) -> Self {
        let mut out = Self::top_over(self.vars.clone());
        out.bottom = self.bottom;
        // Re-intern surviving terms and replay equalities.
        let mut survivors: Vec<usize> = Vec::new();
        for (id, t) in self.terms.iter().enumerate() {
            if !t.expr.free_vars().contains(var) {
                survivors.push(id);
            }
        }
        for &id in &survivors {
            let expr = self.terms[id].expr.clone();
            out.intern(&expr);
        }
        for i in 0..survivors.len() {
            for j in (i + 1)..survivors.len() {
                let (a, b) = (survivors[i], survivors[j]);
                if self.find(a) == self.find(b) {
                    let ia = out.lookup[&self.terms[a].expr];
                    let ib = out.lookup[&self.terms[b].expr];
                    out.union(ia, ib);
                }
            }
        }
        for (a, b) in &self.disequalities {
            if survivors.contains(a) && survivors.contains(b) {
                let ia = out.lookup[&self.terms[*a].expr];
                let ib = out.lookup[&self.terms[*b].expr];
                out.add_disequality(ia, ib);
            }
        }
        out
    }

    /// All equations over currently interned terms, as representative pairs
    fn equations(&self) -> Vec<(Expr, Expr)> {
        let mut out = Vec::new();
        for i in 0..self.terms.len() {
            for j in (i + 1)..self.terms.len() {
                if self.find(i) == self.find(j) {
                    out.push((self.terms[i].expr.clone(), self.terms[j].expr.clone()));
                }
            }
        }
        out
    }

    fn assume(&self, cond: &Expr) -> Self {
        if self.bottom {
            return self.clone();
        }
        match cond {
            Expr::BoolConst(true) => self.clone(),
            Expr::BoolConst(false) => Self::bottom_over(self.vars.clone()),
            Expr::Binary(BinOp::Eq, l, r) => {
                let mut out = self.clone();
                let (a, b) = (out.intern(l), out.intern(r));
                out.union(a, b);
                out
            }
            Expr::Binary(BinOp::Ne, l, r) => {
                let mut out = self.clone();
                let (a, b) = (out.intern(l), out.intern(r));
                out.add_disequality(a, b);
                out
            }
            Expr::Binary(BinOp::And, l, r) => self.assume(l).assume(r),
            Expr::Unary(UnOp::Not, e) => self.assume(&e.negated()),
            Expr::Var(v) if v.sort == Sort::Bool => {
                let mut out = self.clone();
                let (a, b) = (out.intern(cond), out.intern(&Expr::BoolConst(true)));
                out.union(a, b);
                out
            }
            // Ordering constraints carry no equality information.
            _ => self.clone(),
        }
    }
}

impl PartialEq for CongruenceState {
    fn eq(&self, other: &Self) -> bool {
        self.subset_of(other) == SubsetRelation::Equal
    }
}

impl AbstractState for CongruenceState {
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
            out = out.purge_var(v);
            out.vars.remove(v);
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
        // self ⊑ other iff self implies every constraint other knows.
        let implies = |strong: &Self, weak: &Self| {
            weak.equations()
                .iter()
                .all(|(a, b)| strong.proves_equal(a, b))
                && weak.disequalities.iter().all(|(x, y)| {
                    strong.proves_distinct(&weak.terms[*x].expr, &weak.terms[*y].expr)
                })
        };
        let fwd = implies(self, other);
        let bwd = implies(other, self);
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
        // Keep what both sides prove.
        let mut out = Self::top_over(self.vars.clone());
        for (a, b) in self.equations() {
            if other.proves_equal(&a, &b) {
                let (ia, ib) = (out.intern(&a), out.intern(&b));
                out.union(ia, ib);
            }
        }
        for (x, y) in &self.disequalities {
            let (ea, eb) = (&self.terms[*x].expr, &self.terms[*y].expr);
            if other.proves_distinct(ea, eb) {
                let (ia, ib) = (out.intern(ea), out.intern(eb));
                out.add_disequality(ia, ib);
            }
        }
        out
    }

    fn to_formula(&self) -> Formula {
        if self.bottom {
            return Formula::False;
        }
        let mut parts = Vec::new();
        for (a, b) in self.equations() {
            parts.push(Formula::atom(Expr::eq(a, b)));
        }
        for (x, y) in &self.disequalities {
            parts.push(Formula::atom(Expr::ne(
                self.terms[*x].expr.clone(),
                self.terms[*y].expr.clone(),
            )));
        }
        Formula::conjunction(parts)
    }
}

/// Congruence domain
#[derive(Debug, Clone, Default)]
pub struct CongruenceDomain;

impl CongruenceDomain {
    pub fn new() -> Self {
        Self
    }
}

impl AbstractDomain for CongruenceDomain {
    type State = CongruenceState;

    fn fresh_state(&self, vars: &[VarId]) -> CongruenceState {
        CongruenceState::top_over(vars.iter().cloned().collect())
    }

    fn top_state(&self) -> CongruenceState {
        CongruenceState::top_over(BTreeSet::new())
    }

    fn bottom_state(&self) -> CongruenceState {
        CongruenceState::bottom_over(BTreeSet::new())
    }

    fn apply(&self, state: &CongruenceState, stmt: &Statement) -> CongruenceState {
        if state.bottom {
            return state.clone();
        }
        match stmt {
            Statement::Skip => state.clone(),
            Statement::Assume { cond } => state.assume(cond),
            Statement::Assign { var, expr } => {
                // Purge the old value of `var`; keep the new binding only
                // when the right-hand side does not mention `var` itself
                // (otherwise the equation would conflate old and new value).
                let mut out = state.purge_var(var);
                out.vars.insert(var.clone());
                if !expr.free_vars().contains(var) {
                    let (a, b) = (out.intern(&Expr::var(var.clone())), out.intern(expr));
                    out.union(a, b);
                }
                out
            }
            Statement::Havoc { vars } => {
                let mut out = state.clone();
                for v in vars {
                    out = out.purge_var(v);
                    out.vars.insert(v.clone());
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
        callee_exit: &CongruenceState,
        caller_pre: &CongruenceState,
        _info: &CallInfo,
        transition: &Transition,
    ) -> CongruenceState {
        if callee_exit.bottom {
            return CongruenceState::bottom_over(caller_pre.vars.clone());
        }
        let mut out = caller_pre.clone();
        if let Statement::Return { assigns } = &transition.statement {
            for (caller_var, callee_expr) in assigns {
                out = out.purge_var(caller_var);
                out.vars.insert(caller_var.clone());
                // Transport a constant binding if the callee proves one.
                let constant = callee_exit.terms.iter().enumerate().find_map(|(id, t)| {
                    let known = callee_exit.lookup.get(callee_expr)?;
                    if callee_exit.find(id) == callee_exit.find(*known) {
                        match t.expr {
                            Expr::IntConst(c) => Some(Expr::int(c)),
                            Expr::BoolConst(b) => Some(Expr::bool_const(b)),
                            _ => None,
                        }
                    } else {
                        None
                    }
                });
                if let Some(value) = constant {
                    let (a, b) = (out.intern(&Expr::var(caller_var.clone())), out.intern(&value));
                    out.union(a, b);
                }
            }
        }
        out
    }

    fn widen(&self, older: &CongruenceState, newer: &CongruenceState) -> CongruenceState {
        // The partition lattice over a program's finite term universe has
        // finite height, so the join is already a widening.
        older.join(newer)
    }
}
