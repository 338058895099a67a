//! SMT Module
//!
//! Formula model and the Hoare-triple oracle used by the soundness debug
//! helper. The real SMT solver is an external collaborator consumed behind
//! the `SolverBackend` port; the in-tree `LightweightSolver` decides
//! conjunctions of linear integer constraints without external dependencies.
//!
//! ## Architecture
//!
//! ```text
//! smt
//! ├── domain/               # Formula representation
//! └── infrastructure/
//!     ├── script            # Locked solver handle (one formula at a time)
//!     ├── lightweight       # Built-in decision procedure
//!     └── hoare             # {pre} stmt {post} validity checking
//! ```

pub mod domain;
pub mod infrastructure;

pub use domain::Formula;
pub use infrastructure::{
    HoareTripleChecker, LightweightSolver, Script, SolverBackend, SolverVerdict, TripleValidity,
};
