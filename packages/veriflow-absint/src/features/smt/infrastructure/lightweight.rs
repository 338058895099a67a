/*
 * Lightweight Decision Procedure
 *
 * Decides conjunctions of linear integer constraints without an external
 * solver, by interval propagation to a local fixpoint:
 *
 * 1. Parse each conjunct into a difference-or-bound constraint
 *    (x + a <=> c, x + a <=> y + b) or a boolean literal
 * 2. Propagate bounds until stable (bounded number of passes)
 * 3. An empty interval or boolean conflict is Unsat
 * 4. A conjunct outside the fragment degrades the verdict to Unknown
 *
 * Incomplete by design: it never claims Unsat wrongly, and claims Sat only
 * when every conjunct was understood and propagation found a consistent box.
 */

use crate::shared::models::{BinOp, Expr, Sort, VarId};
use rustc_hash::FxHashMap;

use super::script::{SolverBackend, SolverVerdict};

/// +infinity sentinel; i128 keeps i64 arithmetic overflow-free
const INF: i128 = i128::MAX / 4;

/// Extra propagation passes beyond the variable count
const EXTRA_PASSES: usize = 4;

/// `var + offset`, with `var` optional for constant sides
#[derive(Debug, Clone, PartialEq)]
struct Linear {
    var: Option<VarId>,
    offset: i128,
}

/// One understood conjunct: `lhs op rhs`
#[derive(Debug, Clone)]
struct Constraint {
    op: BinOp,
    lhs: Linear,
    rhs: Linear,
}

/// Built-in backend
#[derive(Debug, Default)]
pub struct LightweightSolver {
    _private: (),
}

impl LightweightSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `var + const` / `const + var` / `var - const` / `var` / `const`
    fn as_linear(e: &Expr) -> Option<Linear> {
        match e {
            Expr::IntConst(c) => Some(Linear {
                var: None,
                offset: *c as i128,
            }),
            Expr::Var(v) if v.sort == Sort::Int => Some(Linear {
                var: Some(v.clone()),
                offset: 0,
            }),
            Expr::Binary(BinOp::Add, l, r) => match (&**l, &**r) {
                (Expr::Var(v), Expr::IntConst(c)) | (Expr::IntConst(c), Expr::Var(v))
                    if v.sort == Sort::Int =>
                {
                    Some(Linear {
                        var: Some(v.clone()),
                        offset: *c as i128,
                    })
                }
                _ => None,
            },
            Expr::Binary(BinOp::Sub, l, r) => match (&**l, &**r) {
                (Expr::Var(v), Expr::IntConst(c)) if v.sort == Sort::Int => Some(Linear {
                    var: Some(v.clone()),
                    offset: -(*c as i128),
                }),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Mutable propagation state for one query
struct Propagation {
    bounds: FxHashMap<VarId, (i128, i128)>,
    booleans: FxHashMap<VarId, bool>,
    disequalities: Vec<(VarId, i128)>,
    conflict: bool,
}

impl Propagation {
    fn new() -> Self {
        Self {
            bounds: FxHashMap::default(),
            booleans: FxHashMap::default(),
            disequalities: Vec::new(),
            conflict: false,
        }
    }

    fn bounds_of(&self, v: &VarId) -> (i128, i128) {
        self.bounds.get(v).copied().unwrap_or((-INF, INF))
    }

    /// Returns true when the bound actually tightened
    fn tighten(&mut self, v: &VarId, lo: i128, hi: i128) -> bool {
        let (old_lo, old_hi) = self.bounds_of(v);
        let new_lo = old_lo.max(lo);
        let new_hi = old_hi.min(hi);
        if new_lo > new_hi {
            self.conflict = true;
        }
        if new_lo != old_lo || new_hi != old_hi {
            self.bounds.insert(v.clone(), (new_lo, new_hi));
            true
        } else {
            false
        }
    }

    fn assign_bool(&mut self, v: &VarId, value: bool) {
        match self.booleans.get(v) {
            Some(prev) if *prev != value => self.conflict = true,
            Some(_) => {}
            None => {
                self.booleans.insert(v.clone(), value);
            }
        }
    }

    /// One propagation step for a difference-or-bound constraint
    fn apply(&mut self, c: &Constraint) -> bool {
        // Normalize to lhs_var + d <= / == / != rhs side.
        let d = c.lhs.offset - c.rhs.offset;
        match (&c.lhs.var, &c.rhs.var) {
            (None, None) => {
                let holds = match c.op {
                    BinOp::Eq => d == 0,
                    BinOp::Ne => d != 0,
                    BinOp::Lt => d < 0,
                    BinOp::Le => d <= 0,
                    BinOp::Gt => d > 0,
                    BinOp::Ge => d >= 0,
                    _ => return false,
                };
                if !holds {
                    self.conflict = true;
                }
                false
            }
            (Some(x), None) => {
                // x + d <=> 0
                match c.op {
                    BinOp::Eq => self.tighten(x, -d, -d),
                    BinOp::Lt => self.tighten(x, -INF, -d - 1),
                    BinOp::Le => self.tighten(x, -INF, -d),
                    BinOp::Gt => self.tighten(x, -d + 1, INF),
                    BinOp::Ge => self.tighten(x, -d, INF),
                    BinOp::Ne => {
                        self.disequalities.push((x.clone(), -d));
                        false
                    }
                    _ => false,
                }
            }
            (None, Some(y)) => {
                // d <=> y
                match c.op {
                    BinOp::Eq => self.tighten(y, d, d),
                    BinOp::Lt => self.tighten(y, d + 1, INF),
                    BinOp::Le => self.tighten(y, d, INF),
                    BinOp::Gt => self.tighten(y, -INF, d - 1),
                    BinOp::Ge => self.tighten(y, -INF, d),
                    BinOp::Ne => {
                        self.disequalities.push((y.clone(), d));
                        false
                    }
                    _ => false,
                }
            }
            (Some(x), Some(y)) => {
                // x + d <=> y; never propagate from an infinite bound, so the
                // pass budget is only spent on real tightening
                let (x_lo, x_hi) = self.bounds_of(x);
                let (y_lo, y_hi) = self.bounds_of(y);
                match c.op {
                    BinOp::Le | BinOp::Lt => {
                        let strict = i128::from(c.op == BinOp::Lt);
                        let mut changed = false;
                        if y_hi < INF {
                            changed |= self.tighten(x, -INF, y_hi - d - strict);
                        }
                        if x_lo > -INF {
                            changed |= self.tighten(y, x_lo + d + strict, INF);
                        }
                        changed
                    }
                    BinOp::Ge | BinOp::Gt => {
                        let strict = i128::from(c.op == BinOp::Gt);
                        let mut changed = false;
                        if y_lo > -INF {
                            changed |= self.tighten(x, y_lo - d + strict, INF);
                        }
                        if x_hi < INF {
                            changed |= self.tighten(y, -INF, x_hi + d - strict);
                        }
                        changed
                    }
                    BinOp::Eq => {
                        let mut changed = false;
                        if y_lo > -INF || y_hi < INF {
                            changed |= self.tighten(x, y_lo - d, y_hi - d);
                        }
                        if x_lo > -INF || x_hi < INF {
                            changed |= self.tighten(y, x_lo + d, x_hi + d);
                        }
                        changed
                    }
                    BinOp::Ne => {
                        // Only decidable when both collapse to the same point.
                        if x_lo == x_hi && y_lo == y_hi && x_lo + d == y_lo {
                            self.conflict = true;
                        }
                        false
                    }
                    _ => false,
                }
            }
        }
    }

    fn check_disequalities(&mut self) {
        for (v, forbidden) in &self.disequalities {
            let (lo, hi) = self.bounds_of(v);
            if lo == hi && lo == *forbidden {
                self.conflict = true;
            }
        }
    }
}

impl SolverBackend for LightweightSolver {
    fn name(&self) -> &'static str {
        "lightweight"
    }

    fn check_sat(&mut self, conjuncts: &[Expr]) -> SolverVerdict {
        let mut constraints = Vec::with_capacity(conjuncts.len());
        let mut prop = Propagation::new();
        let mut out_of_fragment = false;

        for conjunct in conjuncts {
            match conjunct {
                Expr::BoolConst(true) => {}
                Expr::BoolConst(false) => return SolverVerdict::Unsat,
                Expr::Var(v) if v.sort == Sort::Bool => prop.assign_bool(v, true),
                Expr::Unary(crate::shared::models::UnOp::Not, inner) => match &**inner {
                    Expr::Var(v) if v.sort == Sort::Bool => prop.assign_bool(v, false),
                    _ => out_of_fragment = true,
                },
                Expr::Binary(op, lhs, rhs) if op.is_comparison() => {
                    match (Self::as_linear(lhs), Self::as_linear(rhs)) {
                        (Some(l), Some(r)) => constraints.push(Constraint { op: *op, lhs: l, rhs: r }),
                        _ => out_of_fragment = true,
                    }
                }
                _ => out_of_fragment = true,
            }
            if prop.conflict {
                return SolverVerdict::Unsat;
            }
        }

        // Propagate until stable. Strict difference cycles tighten one unit
        // per pass, so the budget also bounds worst-case narrowing walks.
        let max_passes = 8 * constraints.len() + EXTRA_PASSES;
        let mut stabilized = false;
        for _ in 0..max_passes {
            let mut changed = false;
            for c in &constraints {
                changed |= prop.apply(c);
                if prop.conflict {
                    return SolverVerdict::Unsat;
                }
            }
            if !changed {
                stabilized = true;
                break;
            }
        }
        prop.check_disequalities();
        if prop.conflict {
            return SolverVerdict::Unsat;
        }

        if out_of_fragment || !stabilized {
            SolverVerdict::Unknown
        } else {
            SolverVerdict::Sat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Expr {
        Expr::var(VarId::int("x"))
    }

    fn y() -> Expr {
        Expr::var(VarId::int("y"))
    }

    #[test]
    fn test_contradicting_bounds_unsat() {
        let mut solver = LightweightSolver::new();
        let verdict = solver.check_sat(&[
            Expr::lt(x(), Expr::int(0)),
            Expr::gt(x(), Expr::int(10)),
        ]);
        assert_eq!(verdict, SolverVerdict::Unsat);
    }

    #[test]
    fn test_consistent_box_sat() {
        let mut solver = LightweightSolver::new();
        let verdict = solver.check_sat(&[
            Expr::ge(x(), Expr::int(0)),
            Expr::le(x(), Expr::int(10)),
        ]);
        assert_eq!(verdict, SolverVerdict::Sat);
    }

    #[test]
    fn test_strict_cycle_unsat() {
        // x < y && y < x with x pinned into a small box
        let mut solver = LightweightSolver::new();
        let verdict = solver.check_sat(&[
            Expr::lt(x(), y()),
            Expr::lt(y(), x()),
            Expr::ge(x(), Expr::int(0)),
            Expr::le(x(), Expr::int(3)),
        ]);
        assert_eq!(verdict, SolverVerdict::Unsat);
    }

    #[test]
    fn test_equality_pins_value() {
        // x == 5 && x != 5
        let mut solver = LightweightSolver::new();
        let verdict = solver.check_sat(&[
            Expr::eq(x(), Expr::int(5)),
            Expr::ne(x(), Expr::int(5)),
        ]);
        assert_eq!(verdict, SolverVerdict::Unsat);
    }

    #[test]
    fn test_offset_constraint() {
        // x + 1 <= y && y <= x  is unsat
        let mut solver = LightweightSolver::new();
        let verdict = solver.check_sat(&[
            Expr::le(Expr::add(x(), Expr::int(1)), y()),
            Expr::le(y(), x()),
            Expr::eq(x(), Expr::int(3)),
        ]);
        assert_eq!(verdict, SolverVerdict::Unsat);
    }

    #[test]
    fn test_nonlinear_degrades_to_unknown() {
        let mut solver = LightweightSolver::new();
        let verdict = solver.check_sat(&[Expr::lt(Expr::mul(x(), y()), Expr::int(10))]);
        assert_eq!(verdict, SolverVerdict::Unknown);
    }

    #[test]
    fn test_bool_conflict_unsat() {
        let p = VarId::bool("p");
        let mut solver = LightweightSolver::new();
        let verdict = solver.check_sat(&[
            Expr::var(p.clone()),
            Expr::not(Expr::var(p)),
        ]);
        assert_eq!(verdict, SolverVerdict::Unsat);
    }

    #[test]
    fn test_false_literal_unsat() {
        let mut solver = LightweightSolver::new();
        assert_eq!(
            solver.check_sat(&[Expr::BoolConst(false)]),
            SolverVerdict::Unsat
        );
    }
}
