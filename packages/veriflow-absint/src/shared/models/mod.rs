//! Shared program model
//!
//! These types are shared by every feature (domains, fixpoint, smt), so they
//! live here instead of inside a feature slice:
//!
//! - `statement`: expression and statement payloads carried on transitions
//! - `program`: locations, transitions, procedures and the validated builder

pub mod program;
pub mod statement;

pub use program::{
    Location, LocationId, Procedure, Program, ProgramBuilder, ProgramError, Transition,
    TransitionId, TransitionKind,
};
pub use statement::{BinOp, Expr, Sort, Statement, UnOp, VarId};
