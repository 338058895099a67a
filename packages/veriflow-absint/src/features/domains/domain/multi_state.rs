/*
 * Bounded Disjunctive Multi-State
 *
 * A location may hold several incomparable abstract states up to a
 * configurable cap. Invariant maintained by every operation:
 *
 * - no bottom element is stored (an empty set IS bottom)
 * - no element covers another (maximal antichain under the domain order)
 * - at most `max_size` elements
 *
 * Elements are kept in insertion order in a Vec, so every reduction step is
 * reproducible across runs: no hashing-order nondeterminism can leak into
 * analysis results or counterexamples. When the raw union exceeds the cap,
 * the two most recently added disjuncts are merged (domain-level join),
 * repeatedly, re-normalizing after each merge.
 */

use crate::features::domains::ports::{AbstractState, SubsetRelation};
use crate::features::smt::Formula;
use crate::shared::models::VarId;
use std::collections::BTreeSet;

/// Immutable bounded disjunction of abstract states
#[derive(Debug, Clone)]
pub struct MultiState<S> {
    states: Vec<S>,
    max_size: usize,
}

impl<S: AbstractState> MultiState<S> {
    /// The empty disjunction (bottom)
    pub fn bottom(max_size: usize) -> Self {
        assert!(max_size >= 1, "disjunction cap must admit one state");
        Self {
            states: Vec::new(),
            max_size,
        }
    }

    /// A single-element disjunction
    pub fn singleton(state: S, max_size: usize) -> Self {
        Self::from_states(vec![state], max_size)
    }

    /// Normalize an arbitrary candidate set into a valid multi-state
    pub fn from_states(states: Vec<S>, max_size: usize) -> Self {
        assert!(max_size >= 1, "disjunction cap must admit one state");
        Self {
            states: Self::normalize(states, max_size),
            max_size,
        }
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_bottom(&self) -> bool {
        self.states.is_empty()
    }

    /// Variables of the disjunction (all elements share one scope)
    pub fn variables(&self) -> BTreeSet<VarId> {
        self.states
            .first()
            .map(|s| s.variables().clone())
            .unwrap_or_default()
    }

    /// Union with `other`, then reduce
    pub fn merge(&self, other: &Self) -> Self {
        let mut raw = self.states.clone();
        raw.extend(other.states.iter().cloned());
        Self::from_states(raw, self.max_size)
    }

    /// Apply binary operator `f` to every pair, then reduce
    ///
    /// Lifts binary domain operators (widening, return combination) to the
    /// power domain.
    pub fn cross_product(&self, other: &Self, f: impl Fn(&S, &S) -> S) -> Self {
        let mut raw = Vec::with_capacity(self.states.len() * other.states.len());
        for a in &self.states {
            for b in &other.states {
                raw.push(f(a, b));
            }
        }
        Self::from_states(raw, self.max_size)
    }

    /// Per-element transform, then reduce
    pub fn map(&self, f: impl Fn(&S) -> S) -> Self {
        Self::from_states(self.states.iter().map(f).collect(), self.max_size)
    }

    /// Per-element transform producing several states each, then reduce
    pub fn map_collection(&self, f: impl Fn(&S) -> Vec<S>) -> Self {
        Self::from_states(self.states.iter().flat_map(|s| f(s)).collect(), self.max_size)
    }

    /// Collapse the disjunction into a single join of all elements
    pub fn join_all(&self) -> Option<S> {
        let mut iter = self.states.iter();
        let first = iter.next()?.clone();
        Some(iter.fold(first, |acc, s| acc.join(s)))
    }

    /// Four-valued comparison: `S ⊑ T` iff every element of `S` is covered
    /// by some element of `T`
    pub fn subset_of(&self, other: &Self) -> SubsetRelation {
        let forward = Self::covered_by(&self.states, &other.states);
        let backward = Self::covered_by(&other.states, &self.states);
        match (forward, backward) {
            (true, true) => SubsetRelation::Equal,
            (true, false) => SubsetRelation::Subset,
            (false, true) => SubsetRelation::Superset,
            (false, false) => SubsetRelation::None,
        }
    }

    fn covered_by(sub: &[S], sup: &[S]) -> bool {
        sub.iter()
            .all(|s| sup.iter().any(|t| s.subset_of(t).is_covered()))
    }

    /// Disjunction of the element formulas
    pub fn to_formula(&self) -> Formula {
        Formula::disjunction(self.states.iter().map(|s| s.to_formula()).collect())
    }

    /// Drop bottoms, keep a maximal antichain, then merge the two most
    /// recently added elements until the cap is respected.
    fn normalize(raw: Vec<S>, max_size: usize) -> Vec<S> {
        let mut kept: Vec<S> = Vec::with_capacity(raw.len().min(max_size + 1));
        for s in raw {
            Self::insert_antichain(&mut kept, s);
        }
        while kept.len() > max_size {
            let b = kept.pop().expect("len > max_size >= 1");
            let a = kept.pop().expect("len > max_size >= 1");
            Self::insert_antichain(&mut kept, a.join(&b));
        }
        kept
    }

    /// Insert preserving the antichain invariant and insertion order
    fn insert_antichain(kept: &mut Vec<S>, s: S) {
        if s.is_bottom() {
            return;
        }
        for existing in kept.iter() {
            if s.subset_of(existing).is_covered() {
                return;
            }
        }
        kept.retain(|existing| !existing.subset_of(&s).is_covered());
        kept.push(s);
    }
}

/// Equality requires identical variable sets and bijective covering in both
/// directions.
impl<S: AbstractState> PartialEq for MultiState<S> {
    fn eq(&self, other: &Self) -> bool {
        self.variables() == other.variables()
            && self.subset_of(other) == SubsetRelation::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::domains::infrastructure::interval::{IntervalDomain, IntervalState};
    use crate::features::domains::ports::AbstractDomain;
    use crate::shared::models::{Expr, Statement};

    fn domain() -> IntervalDomain {
        IntervalDomain::default()
    }

    fn x_in(lo: i64, hi: i64) -> IntervalState {
        let d = domain();
        let x = VarId::int("x");
        let top = d.fresh_state(&[x.clone()]);
        let lo_bounded = d.apply(
            &top,
            &Statement::Assume {
                cond: Expr::ge(Expr::var(x.clone()), Expr::int(lo)),
            },
        );
        d.apply(
            &lo_bounded,
            &Statement::Assume {
                cond: Expr::le(Expr::var(x), Expr::int(hi)),
            },
        )
    }

    #[test]
    fn test_bottom_is_empty() {
        let ms: MultiState<IntervalState> = MultiState::bottom(3);
        assert!(ms.is_bottom());
        assert!(ms.states().is_empty());
    }

    #[test]
    fn test_covered_elements_are_dropped() {
        let ms = MultiState::from_states(vec![x_in(0, 10), x_in(2, 5)], 4);
        assert_eq!(ms.states().len(), 1, "nested interval must be absorbed");
    }

    #[test]
    fn test_incomparable_elements_are_kept() {
        let ms = MultiState::from_states(vec![x_in(0, 1), x_in(5, 6)], 4);
        assert_eq!(ms.states().len(), 2);
    }

    #[test]
    fn test_cap_merges_most_recent_pair() {
        // Three pairwise-incomparable intervals with cap 2: the two most
        // recently added ([5,6] and [10,11]) merge into [5,11].
        let ms = MultiState::from_states(vec![x_in(0, 1), x_in(5, 6), x_in(10, 11)], 2);
        assert_eq!(ms.states().len(), 2);

        let merged = &ms.states()[1];
        let expected = x_in(5, 11);
        assert_eq!(
            merged.subset_of(&expected),
            SubsetRelation::Equal,
            "reduction must join the newest disjuncts"
        );
    }

    #[test]
    fn test_reduction_overapproximates_inputs() {
        let originals = [x_in(0, 1), x_in(5, 6), x_in(10, 11)];
        let ms = MultiState::from_states(originals.to_vec(), 2);
        for original in &originals {
            let covered = ms
                .states()
                .iter()
                .any(|t| original.subset_of(t).is_covered());
            assert!(covered, "discarded precision must still cover {:?}", original);
        }
    }

    #[test]
    fn test_merge_is_subset_monotone() {
        let a = MultiState::singleton(x_in(0, 1), 3);
        let b = MultiState::singleton(x_in(5, 6), 3);
        let merged = a.merge(&b);
        assert!(a.subset_of(&merged).is_covered());
        assert!(b.subset_of(&merged).is_covered());
    }

    #[test]
    fn test_subset_four_values() {
        let small = MultiState::singleton(x_in(1, 2), 3);
        let big = MultiState::singleton(x_in(0, 10), 3);
        let other = MultiState::singleton(x_in(20, 30), 3);

        assert_eq!(small.subset_of(&big), SubsetRelation::Subset);
        assert_eq!(big.subset_of(&small), SubsetRelation::Superset);
        assert_eq!(small.subset_of(&small.clone()), SubsetRelation::Equal);
        assert_eq!(small.subset_of(&other), SubsetRelation::None);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let ms = MultiState::from_states(
            vec![x_in(0, 1), x_in(5, 6), x_in(10, 11), x_in(0, 3)],
            2,
        );
        let again = MultiState::from_states(ms.states().to_vec(), 2);
        assert_eq!(ms, again, "reduce(reduce(S)) must equal reduce(S)");
        assert_eq!(ms.states().len(), again.states().len());
    }

    #[test]
    fn test_cross_product_applies_pairwise() {
        let a = MultiState::from_states(vec![x_in(0, 1), x_in(10, 11)], 4);
        let b = MultiState::singleton(x_in(0, 20), 4);
        let joined = a.cross_product(&b, |l, r| l.join(r));
        // Every pair joins to [0,20], which collapses to one element.
        assert_eq!(joined.states().len(), 1);
    }

    #[test]
    fn test_bottom_merge_identity() {
        let a = MultiState::singleton(x_in(0, 1), 3);
        let bot = MultiState::bottom(3);
        assert_eq!(a.merge(&bot), a);
        assert!(bot.subset_of(&a).is_covered());
    }
}
