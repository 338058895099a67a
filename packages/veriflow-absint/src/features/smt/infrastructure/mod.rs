//! SMT infrastructure: solver backends, the locked script handle, and the
//! Hoare-triple checker built on top of them.

pub mod hoare;
pub mod lightweight;
pub mod script;

pub use hoare::{HoareTripleChecker, TripleValidity};
pub use lightweight::LightweightSolver;
pub use script::{Script, SolverBackend, SolverVerdict};
