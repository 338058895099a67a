//! Property suites for the domain contract and the multi-state invariants.
//!
//! Randomized counterparts of the scenario tests: widening termination,
//! antichain maintenance, reduction idempotence, and post-operator
//! monotonicity, sampled over the interval domain.

use proptest::prelude::*;
use std::collections::BTreeSet;
use veriflow_absint::features::domains::infrastructure::interval::{
    IntervalDomain, IntervalState,
};
use veriflow_absint::{
    AbstractDomain, AbstractState, Expr, MultiState, Statement, SubsetRelation, VarId,
    WideningKind,
};

fn x() -> VarId {
    VarId::int("x")
}

fn y() -> VarId {
    VarId::int("y")
}

/// State with x in [lo, lo + width] and y in [ylo, ylo + ywidth]
fn boxed_state(d: &IntervalDomain, lo: i64, width: i64, ylo: i64, ywidth: i64) -> IntervalState {
    let mut s = d.fresh_state(&[x(), y()]);
    for (var, l, w) in [(x(), lo, width), (y(), ylo, ywidth)] {
        s = d.apply(
            &s,
            &Statement::Assume {
                cond: Expr::ge(Expr::var(var.clone()), Expr::int(l)),
            },
        );
        s = d.apply(
            &s,
            &Statement::Assume {
                cond: Expr::le(Expr::var(var), Expr::int(l.saturating_add(w))),
            },
        );
    }
    s
}

/// A small pool of statements to sample transformers from
fn statement_pool() -> Vec<Statement> {
    vec![
        Statement::Skip,
        Statement::Assign {
            var: x(),
            expr: Expr::add(Expr::var(x()), Expr::int(1)),
        },
        Statement::Assign {
            var: x(),
            expr: Expr::var(y()),
        },
        Statement::Assign {
            var: y(),
            expr: Expr::mul(Expr::var(x()), Expr::int(2)),
        },
        Statement::Assume {
            cond: Expr::lt(Expr::var(x()), Expr::int(50)),
        },
        Statement::Assume {
            cond: Expr::ge(Expr::var(x()), Expr::var(y())),
        },
        Statement::Havoc { vars: vec![x()] },
    ]
}

proptest! {
    /// Widening termination: for every policy, a chain driven by arbitrary
    /// pushes from a bounded pool stabilizes in a bounded number of steps.
    #[test]
    fn widening_chains_stabilize(
        pushes in prop::collection::vec((-100i64..100, 0i64..50, -100i64..100, 0i64..50), 1..20),
        kind_idx in 0usize..3,
    ) {
        let kind = WideningKind::ALL[kind_idx];
        let d = IntervalDomain::new(kind, BTreeSet::from([0, 10, 100]));
        let mut current = boxed_state(&d, 0, 0, 0, 0);
        let mut steps = 0usize;
        // Replay the pushes cyclically until a full cycle changes nothing.
        let mut stable = 0usize;
        let mut i = 0usize;
        while stable < pushes.len() {
            let (lo, w, ylo, yw) = pushes[i % pushes.len()];
            let pushed = boxed_state(&d, lo, w, ylo, yw);
            let next = d.widen(&current, &current.join(&pushed));
            if next == current {
                stable += 1;
            } else {
                stable = 0;
                current = next;
            }
            i += 1;
            steps += 1;
            prop_assert!(steps < 500, "widening {:?} did not stabilize", kind);
        }
    }

    /// Antichain invariant: no element of a reduced multi-state covers
    /// another, and the cap is never exceeded.
    #[test]
    fn multi_state_is_maximal_antichain(
        boxes in prop::collection::vec((-100i64..100, 0i64..50), 1..8),
        cap in 1usize..5,
    ) {
        let d = IntervalDomain::default();
        let states: Vec<IntervalState> = boxes
            .iter()
            .map(|(lo, w)| boxed_state(&d, *lo, *w, 0, 0))
            .collect();
        let ms = MultiState::from_states(states.clone(), cap);

        prop_assert!(ms.states().len() <= cap);
        for (i, a) in ms.states().iter().enumerate() {
            for (j, b) in ms.states().iter().enumerate() {
                if i != j {
                    prop_assert_eq!(
                        a.subset_of(b),
                        SubsetRelation::None,
                        "elements {} and {} are comparable",
                        i,
                        j
                    );
                }
            }
        }
        // Soundness: every input is covered by some element.
        for s in &states {
            prop_assert!(ms.states().iter().any(|t| s.subset_of(t).is_covered()));
        }
    }

    /// Idempotence: reducing a reduced multi-state changes nothing.
    #[test]
    fn reduction_is_idempotent(
        boxes in prop::collection::vec((-100i64..100, 0i64..50), 1..8),
        cap in 1usize..5,
    ) {
        let d = IntervalDomain::default();
        let states: Vec<IntervalState> = boxes
            .iter()
            .map(|(lo, w)| boxed_state(&d, *lo, *w, 0, 0))
            .collect();
        let once = MultiState::from_states(states, cap);
        let twice = MultiState::from_states(once.states().to_vec(), cap);
        prop_assert_eq!(once.states().len(), twice.states().len());
        prop_assert!(once == twice, "reduce(reduce(S)) != reduce(S)");
    }

    /// Monotonicity: a <= b implies post(a, e) <= post(b, e) for every
    /// statement in the pool.
    #[test]
    fn post_operator_is_monotone(
        lo in -100i64..100,
        w in 0i64..50,
        grow in 0i64..50,
        ylo in -100i64..100,
        yw in 0i64..50,
        stmt_idx in 0usize..7,
    ) {
        let d = IntervalDomain::default();
        let small = boxed_state(&d, lo, w, ylo, yw);
        // b encloses a by construction.
        let big = boxed_state(&d, lo.saturating_sub(grow), w.saturating_add(2 * grow), ylo, yw);
        prop_assume!(small.subset_of(&big).is_covered());

        let stmt = &statement_pool()[stmt_idx];
        let post_small = d.apply(&small, stmt);
        let post_big = d.apply(&big, stmt);
        prop_assert!(
            post_small.subset_of(&post_big).is_covered(),
            "post not monotone for {:?}",
            stmt
        );
    }

    /// Merging is an upper bound of both operands.
    #[test]
    fn merge_covers_both_operands(
        a_boxes in prop::collection::vec((-100i64..100, 0i64..50), 1..4),
        b_boxes in prop::collection::vec((-100i64..100, 0i64..50), 1..4),
    ) {
        let d = IntervalDomain::default();
        let to_ms = |boxes: &[(i64, i64)]| {
            MultiState::from_states(
                boxes.iter().map(|(lo, w)| boxed_state(&d, *lo, *w, 0, 0)).collect(),
                3,
            )
        };
        let a = to_ms(&a_boxes);
        let b = to_ms(&b_boxes);
        let merged = a.merge(&b);
        prop_assert!(a.subset_of(&merged).is_covered());
        prop_assert!(b.subset_of(&merged).is_covered());
    }
}
