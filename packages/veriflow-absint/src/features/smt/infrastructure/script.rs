/*
 * Solver Script Handle
 *
 * The solver is a single-threaded resource: at most one formula may be under
 * construction per instance. Callers go through `Script::check_sat`, which
 * holds the lock for the whole build-assert-check cycle; the RAII guard is
 * the release. An external SMT process would be wired in as another
 * `SolverBackend` implementation.
 */

use crate::shared::models::Expr;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::lightweight::LightweightSolver;

/// Three-valued satisfiability verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverVerdict {
    /// A model exists
    Sat,

    /// No model exists
    Unsat,

    /// Out of fragment, or budget exhausted
    Unknown,
}

/// Pluggable decision procedure for conjunctions of boolean expressions
pub trait SolverBackend: Send {
    fn name(&self) -> &'static str;

    /// Decide satisfiability of the conjunction of `conjuncts`
    fn check_sat(&mut self, conjuncts: &[Expr]) -> SolverVerdict;
}

/// Locked handle around one solver instance
pub struct Script {
    backend: Mutex<Box<dyn SolverBackend>>,
    queries: AtomicU64,
}

impl Script {
    /// Handle backed by the built-in lightweight procedure
    pub fn lightweight() -> Self {
        Self::with_backend(Box::new(LightweightSolver::new()))
    }

    pub fn with_backend(backend: Box<dyn SolverBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
            queries: AtomicU64::new(0),
        }
    }

    /// One query = one lock acquisition
    pub fn check_sat(&self, conjuncts: &[Expr]) -> SolverVerdict {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let mut backend = self.backend.lock();
        backend.check_sat(conjuncts)
    }

    /// Queries issued over the handle's lifetime
    pub fn queries_issued(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.lock().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::VarId;

    #[test]
    fn test_query_counter_increments() {
        let script = Script::lightweight();
        assert_eq!(script.queries_issued(), 0);

        script.check_sat(&[Expr::lt(Expr::var(VarId::int("x")), Expr::int(1))]);
        script.check_sat(&[Expr::BoolConst(false)]);
        assert_eq!(script.queries_issued(), 2);
    }

    #[test]
    fn test_backend_name_exposed() {
        assert_eq!(Script::lightweight().backend_name(), "lightweight");
    }
}
