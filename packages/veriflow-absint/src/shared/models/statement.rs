/*
 * Statement and Expression Model
 *
 * Transitions carry a `Statement` payload; abstract post operators interpret
 * it, and the SMT feature reuses `Expr` as its atom language so states can be
 * rendered to formulas without a second expression type.
 *
 * The front-end that lowers surface syntax into these statements is an
 * external collaborator; tests build them directly.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Variable sort (our term language is two-sorted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sort {
    Int,
    Bool,
}

/// A scoped program variable
///
/// Variables are compared by name and sort; procedure scoping is handled by
/// the variable sets tracked on abstract states, not by the name itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId {
    /// Variable name
    pub name: String,

    /// Variable sort
    pub sort: Sort,
}

impl VarId {
    /// Create an integer variable
    pub fn int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort: Sort::Int,
        }
    }

    /// Create a boolean variable
    pub fn bool(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort: Sort::Bool,
        }
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    /// Integer negation
    Neg,
    /// Boolean negation
    Not,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Is this a comparison yielding a boolean?
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    /// Is this an arithmetic operator?
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    /// Comparison with swapped operand order (`a < b` ⇔ `b > a`)
    pub fn swapped(self) -> Self {
        match self {
            BinOp::Lt => BinOp::Gt,
            BinOp::Le => BinOp::Ge,
            BinOp::Gt => BinOp::Lt,
            BinOp::Ge => BinOp::Le,
            other => other,
        }
    }

    /// Logical negation of a comparison (`<` becomes `>=`)
    pub fn negated_comparison(self) -> Option<Self> {
        match self {
            BinOp::Eq => Some(BinOp::Ne),
            BinOp::Ne => Some(BinOp::Eq),
            BinOp::Lt => Some(BinOp::Ge),
            BinOp::Le => Some(BinOp::Gt),
            BinOp::Gt => Some(BinOp::Le),
            BinOp::Ge => Some(BinOp::Lt),
            _ => None,
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        f.write_str(s)
    }
}

/// Expression tree over integers and booleans
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// Integer literal
    IntConst(i64),

    /// Boolean literal
    BoolConst(bool),

    /// Variable reference
    Var(VarId),

    /// Unary application
    Unary(UnOp, Box<Expr>),

    /// Binary application
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(v: VarId) -> Self {
        Expr::Var(v)
    }

    pub fn int(c: i64) -> Self {
        Expr::IntConst(c)
    }

    pub fn bool_const(b: bool) -> Self {
        Expr::BoolConst(b)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Mul, lhs, rhs)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Ne, lhs, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Gt, lhs, rhs)
    }

    pub fn ge(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Ge, lhs, rhs)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::And, lhs, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinOp::Or, lhs, rhs)
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Unary(UnOp::Neg, Box::new(e))
    }

    pub fn not(e: Expr) -> Self {
        Expr::Unary(UnOp::Not, Box::new(e))
    }

    /// Collect free variables into `out`
    pub fn collect_vars(&self, out: &mut BTreeSet<VarId>) {
        match self {
            Expr::IntConst(_) | Expr::BoolConst(_) => {}
            Expr::Var(v) => {
                out.insert(v.clone());
            }
            Expr::Unary(_, e) => e.collect_vars(out),
            Expr::Binary(_, l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
        }
    }

    /// Free variables of this expression
    pub fn free_vars(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    /// Collect integer literals into `out` (used by literal-guided widening)
    pub fn collect_literals(&self, out: &mut BTreeSet<i64>) {
        match self {
            Expr::IntConst(c) => {
                out.insert(*c);
            }
            Expr::BoolConst(_) | Expr::Var(_) => {}
            Expr::Unary(_, e) => e.collect_literals(out),
            Expr::Binary(_, l, r) => {
                l.collect_literals(out);
                r.collect_literals(out);
            }
        }
    }

    /// Substitute variables by expressions (capture is the caller's problem;
    /// the renaming plans built by `CallInfo` only substitute fresh names)
    pub fn substitute(&self, map: &std::collections::HashMap<VarId, Expr>) -> Expr {
        match self {
            Expr::IntConst(_) | Expr::BoolConst(_) => self.clone(),
            Expr::Var(v) => map.get(v).cloned().unwrap_or_else(|| self.clone()),
            Expr::Unary(op, e) => Expr::Unary(*op, Box::new(e.substitute(map))),
            Expr::Binary(op, l, r) => {
                Expr::Binary(*op, Box::new(l.substitute(map)), Box::new(r.substitute(map)))
            }
        }
    }

    /// Logical negation with the `!` pushed over comparisons and connectives
    pub fn negated(&self) -> Expr {
        match self {
            Expr::BoolConst(b) => Expr::BoolConst(!b),
            Expr::Unary(UnOp::Not, inner) => (**inner).clone(),
            Expr::Binary(op, l, r) if op.is_comparison() => {
                let neg = op
                    .negated_comparison()
                    .unwrap_or(BinOp::Ne);
                Expr::Binary(neg, l.clone(), r.clone())
            }
            Expr::Binary(BinOp::And, l, r) => Expr::or(l.negated(), r.negated()),
            Expr::Binary(BinOp::Or, l, r) => Expr::and(l.negated(), r.negated()),
            other => Expr::not(other.clone()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntConst(c) => write!(f, "{}", c),
            Expr::BoolConst(b) => write!(f, "{}", b),
            Expr::Var(v) => write!(f, "{}", v.name),
            Expr::Unary(UnOp::Neg, e) => write!(f, "-({})", e),
            Expr::Unary(UnOp::Not, e) => write!(f, "!({})", e),
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op, r),
        }
    }
}

/// Statement payload carried on a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// No effect
    Skip,

    /// `var := expr`
    Assign { var: VarId, expr: Expr },

    /// Forget everything about `vars`
    Havoc { vars: Vec<VarId> },

    /// Block execution unless `cond` holds
    Assume { cond: Expr },

    /// Procedure call; argument expressions are evaluated in the caller scope
    /// and bound to the callee's declared formals
    Call { callee: String, args: Vec<Expr> },

    /// Procedure return; each `(caller_var, callee_expr)` pair assigns a
    /// callee-scope expression into a caller-scope variable
    Return { assigns: Vec<(VarId, Expr)> },
}

impl Statement {
    /// Integer literals appearing in this statement
    pub fn collect_literals(&self, out: &mut BTreeSet<i64>) {
        match self {
            Statement::Skip | Statement::Havoc { .. } => {}
            Statement::Assign { expr, .. } => expr.collect_literals(out),
            Statement::Assume { cond } => cond.collect_literals(out),
            Statement::Call { args, .. } => {
                for a in args {
                    a.collect_literals(out);
                }
            }
            Statement::Return { assigns } => {
                for (_, e) in assigns {
                    e.collect_literals(out);
                }
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Skip => f.write_str("skip"),
            Statement::Assign { var, expr } => write!(f, "{} := {}", var.name, expr),
            Statement::Havoc { vars } => {
                let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
                write!(f, "havoc {}", names.join(", "))
            }
            Statement::Assume { cond } => write!(f, "assume {}", cond),
            Statement::Call { callee, args } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "call {}({})", callee, rendered.join(", "))
            }
            Statement::Return { assigns } => {
                if assigns.is_empty() {
                    f.write_str("return")
                } else {
                    let rendered: Vec<String> = assigns
                        .iter()
                        .map(|(v, e)| format!("{} := {}", v.name, e))
                        .collect();
                    write!(f, "return [{}]", rendered.join(", "))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_free_vars() {
        let x = VarId::int("x");
        let y = VarId::int("y");
        let e = Expr::add(Expr::var(x.clone()), Expr::mul(Expr::var(y.clone()), Expr::int(2)));

        let vars = e.free_vars();
        assert!(vars.contains(&x));
        assert!(vars.contains(&y));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_expr_literal_collection() {
        let e = Expr::lt(Expr::var(VarId::int("x")), Expr::int(10));
        let mut lits = BTreeSet::new();
        e.collect_literals(&mut lits);
        assert_eq!(lits.into_iter().collect::<Vec<_>>(), vec![10]);
    }

    #[test]
    fn test_negated_comparison() {
        let e = Expr::lt(Expr::var(VarId::int("x")), Expr::int(10));
        let neg = e.negated();
        assert_eq!(
            neg,
            Expr::ge(Expr::var(VarId::int("x")), Expr::int(10)),
            "!(x < 10) should become x >= 10"
        );
    }

    #[test]
    fn test_negated_conjunction_distributes() {
        let x = Expr::var(VarId::bool("p"));
        let y = Expr::var(VarId::bool("q"));
        let e = Expr::and(x.clone(), y.clone());
        assert_eq!(e.negated(), Expr::or(x.negated(), y.negated()));
    }

    #[test]
    fn test_substitute_replaces_only_mapped_vars() {
        let x = VarId::int("x");
        let y = VarId::int("y");
        let e = Expr::add(Expr::var(x.clone()), Expr::var(y.clone()));

        let mut map = std::collections::HashMap::new();
        map.insert(x, Expr::int(1));

        assert_eq!(e.substitute(&map), Expr::add(Expr::int(1), Expr::var(y)));
    }
}
