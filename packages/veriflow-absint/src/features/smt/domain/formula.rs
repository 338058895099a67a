/*
 * Logical Formula Model
 *
 * Abstract states render to formulas so the Hoare oracle can reason about
 * them; a multi-state renders to the disjunction of its elements. Atoms are
 * plain `Expr` booleans, so no second expression language exists.
 */

use crate::shared::models::{Expr, VarId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Cap on the number of disjuncts produced by DNF conversion.
///
/// Beyond this the oracle answers Unknown rather than blowing up.
const MAX_DNF_DISJUNCTS: usize = 256;

/// A quantifier-free formula over program expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Atom(Expr),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn atom(e: Expr) -> Self {
        Formula::Atom(e)
    }

    pub fn negated(f: Formula) -> Self {
        match f {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Not(inner) => *inner,
            other => Formula::Not(Box::new(other)),
        }
    }

    /// Conjunction with `True` units dropped and `False` short-circuiting
    pub fn conjunction(parts: Vec<Formula>) -> Self {
        let mut kept = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Formula::True,
            1 => kept.into_iter().next().expect("len checked"),
            _ => Formula::And(kept),
        }
    }

    /// Disjunction with `False` units dropped and `True` short-circuiting
    pub fn disjunction(parts: Vec<Formula>) -> Self {
        let mut kept = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => kept.extend(inner),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Formula::False,
            1 => kept.into_iter().next().expect("len checked"),
            _ => Formula::Or(kept),
        }
    }

    /// Substitute variables by expressions in every atom
    pub fn substitute(&self, map: &HashMap<VarId, Expr>) -> Formula {
        match self {
            Formula::True | Formula::False => self.clone(),
            Formula::Atom(e) => Formula::Atom(e.substitute(map)),
            Formula::Not(f) => Formula::Not(Box::new(f.substitute(map))),
            Formula::And(fs) => Formula::And(fs.iter().map(|f| f.substitute(map)).collect()),
            Formula::Or(fs) => Formula::Or(fs.iter().map(|f| f.substitute(map)).collect()),
        }
    }

    /// Free variables over all atoms
    pub fn free_vars(&self) -> BTreeSet<VarId> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<VarId>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Atom(e) => e.collect_vars(out),
            Formula::Not(f) => f.collect_vars(out),
            Formula::And(fs) | Formula::Or(fs) => {
                for f in fs {
                    f.collect_vars(out);
                }
            }
        }
    }

    /// Negation normal form: `Not` is pushed into the atoms
    fn nnf(&self, negate: bool) -> Formula {
        match (self, negate) {
            (Formula::True, false) | (Formula::False, true) => Formula::True,
            (Formula::True, true) | (Formula::False, false) => Formula::False,
            (Formula::Atom(e), false) => Formula::Atom(e.clone()),
            (Formula::Atom(e), true) => Formula::Atom(e.negated()),
            (Formula::Not(f), _) => f.nnf(!negate),
            (Formula::And(fs), false) => {
                Formula::conjunction(fs.iter().map(|f| f.nnf(false)).collect())
            }
            (Formula::And(fs), true) => {
                Formula::disjunction(fs.iter().map(|f| f.nnf(true)).collect())
            }
            (Formula::Or(fs), false) => {
                Formula::disjunction(fs.iter().map(|f| f.nnf(false)).collect())
            }
            (Formula::Or(fs), true) => {
                Formula::conjunction(fs.iter().map(|f| f.nnf(true)).collect())
            }
        }
    }

    /// Disjunctive normal form: a list of conjunct lists
    ///
    /// Returns `None` when the conversion would exceed `MAX_DNF_DISJUNCTS`
    /// (the caller treats that as an Unknown verdict). An empty outer list is
    /// `False`; an empty inner list is `True`.
    pub fn to_dnf(&self) -> Option<Vec<Vec<Expr>>> {
        fn go(f: &Formula) -> Option<Vec<Vec<Expr>>> {
            match f {
                Formula::True => Some(vec![vec![]]),
                Formula::False => Some(vec![]),
                Formula::Atom(e) => Some(vec![vec![e.clone()]]),
                Formula::Not(_) => None, // nnf already ran; nested Not means a non-boolean atom
                Formula::Or(fs) => {
                    let mut out = Vec::new();
                    for sub in fs {
                        out.extend(go(sub)?);
                        if out.len() > MAX_DNF_DISJUNCTS {
                            return None;
                        }
                    }
                    Some(out)
                }
                Formula::And(fs) => {
                    let mut acc: Vec<Vec<Expr>> = vec![vec![]];
                    for sub in fs {
                        let rhs = go(sub)?;
                        let mut next = Vec::with_capacity(acc.len() * rhs.len());
                        for left in &acc {
                            for right in &rhs {
                                let mut merged = left.clone();
                                merged.extend(right.iter().cloned());
                                next.push(merged);
                            }
                        }
                        if next.len() > MAX_DNF_DISJUNCTS {
                            return None;
                        }
                        acc = next;
                    }
                    Some(acc)
                }
            }
        }
        go(&self.nnf(false))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => f.write_str("true"),
            Formula::False => f.write_str("false"),
            Formula::Atom(e) => write!(f, "{}", e),
            Formula::Not(inner) => write!(f, "!({})", inner),
            Formula::And(fs) => {
                let parts: Vec<String> = fs.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(" && "))
            }
            Formula::Or(fs) => {
                let parts: Vec<String> = fs.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(" || "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x_lt(c: i64) -> Expr {
        Expr::lt(Expr::var(VarId::int("x")), Expr::int(c))
    }

    #[test]
    fn test_conjunction_drops_true_units() {
        let f = Formula::conjunction(vec![Formula::True, Formula::atom(x_lt(1))]);
        assert_eq!(f, Formula::atom(x_lt(1)));
    }

    #[test]
    fn test_conjunction_short_circuits_false() {
        let f = Formula::conjunction(vec![Formula::atom(x_lt(1)), Formula::False]);
        assert_eq!(f, Formula::False);
    }

    #[test]
    fn test_dnf_of_negated_conjunction() {
        // !(x < 1 && x < 2) => x >= 1 || x >= 2
        let f = Formula::negated(Formula::conjunction(vec![
            Formula::atom(x_lt(1)),
            Formula::atom(x_lt(2)),
        ]));
        let dnf = f.to_dnf().expect("small formula");
        assert_eq!(dnf.len(), 2);
        assert_eq!(dnf[0], vec![Expr::ge(Expr::var(VarId::int("x")), Expr::int(1))]);
    }

    #[test]
    fn test_dnf_false_is_empty() {
        assert_eq!(Formula::False.to_dnf(), Some(vec![]));
    }

    #[test]
    fn test_dnf_distributes_and_over_or() {
        // (a || b) && c  =>  [a, c], [b, c]
        let a = Formula::atom(x_lt(1));
        let b = Formula::atom(x_lt(2));
        let c = Formula::atom(x_lt(3));
        let f = Formula::conjunction(vec![Formula::disjunction(vec![a, b]), c]);
        let dnf = f.to_dnf().expect("small formula");
        assert_eq!(dnf.len(), 2);
        assert_eq!(dnf[0].len(), 2);
    }

    #[test]
    fn test_substitute_reaches_atoms() {
        let mut map = HashMap::new();
        map.insert(VarId::int("x"), Expr::var(VarId::int("x_prime")));
        let f = Formula::atom(x_lt(5)).substitute(&map);
        assert_eq!(
            f,
            Formula::atom(Expr::lt(Expr::var(VarId::int("x_prime")), Expr::int(5)))
        );
    }
}
