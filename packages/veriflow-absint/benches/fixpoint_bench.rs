//! Fixpoint engine benchmark: nested branching plus a counting loop, sized
//! by a location-count parameter.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use veriflow_absint::features::domains::infrastructure::interval::IntervalDomain;
use veriflow_absint::{
    AnalysisSettings, Expr, FixpointEngine, LocationId, Program, ProgramBuilder, Statement, VarId,
    WholeProgramProvider, WideningKind,
};

fn x() -> VarId {
    VarId::int("x")
}

/// A chain of `blocks` diamonds feeding a counting loop.
fn chained_program(blocks: usize) -> (Program, LocationId) {
    let mut b = ProgramBuilder::new();
    b.add_procedure("main", vec![], vec![x()]);
    let entry = b.add_location("main");
    b.mark_entry(entry);
    let mut cur = entry;
    for i in 0..blocks {
        let left = b.add_location("main");
        let right = b.add_location("main");
        let join = b.add_location("main");
        b.add_internal(
            cur,
            left,
            Statement::Assign {
                var: x(),
                expr: Expr::int(i as i64),
            },
        );
        b.add_internal(
            cur,
            right,
            Statement::Assign {
                var: x(),
                expr: Expr::int(-(i as i64)),
            },
        );
        b.add_internal(left, join, Statement::Skip);
        b.add_internal(right, join, Statement::Skip);
        cur = join;
    }
    // Counting loop at the tail.
    let head = b.add_location("main");
    let body = b.add_location("main");
    let exit = b.add_location("main");
    b.mark_exit(exit);
    b.add_internal(
        cur,
        head,
        Statement::Assign {
            var: x(),
            expr: Expr::int(0),
        },
    );
    b.add_internal(
        head,
        body,
        Statement::Assume {
            cond: Expr::lt(Expr::var(x()), Expr::int(1000)),
        },
    );
    b.add_internal(
        body,
        head,
        Statement::Assign {
            var: x(),
            expr: Expr::add(Expr::var(x()), Expr::int(1)),
        },
    );
    b.add_internal(
        head,
        exit,
        Statement::Assume {
            cond: Expr::ge(Expr::var(x()), Expr::int(1000)),
        },
    );
    (b.build().expect("bench program builds"), entry)
}

fn bench_fixpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixpoint_interval");
    for blocks in [4usize, 16, 64] {
        let (program, entry) = chained_program(blocks);
        let domain = IntervalDomain::new(WideningKind::LiteralGuided, program.literals());
        let settings = AnalysisSettings::default().with_max_parallel_states(2);
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &blocks, |bench, _| {
            bench.iter(|| {
                let provider = WholeProgramProvider::new(&program);
                let mut engine = FixpointEngine::new(&program, &domain, &provider, &settings);
                black_box(engine.run(&[entry]).expect("bench run"))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fixpoint);
criterion_main!(benches);
