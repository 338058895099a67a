/*
 * Interprocedural Control Flow Graph
 *
 * Locations and transitions are built once by `ProgramBuilder` and shared
 * read-only for the whole analysis run. The engine never mutates the graph;
 * "mutation" during analysis is always replacement of a map entry keyed by
 * `LocationId`.
 *
 * Call/return pairing is immutable: a `Return` transition records its
 * `corresponding_call` at construction time and `build()` rejects a pairing
 * that does not name a `Call` transition.
 */

use super::statement::{Statement, VarId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Identifier of a location (index into the program's location arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub u32);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Identifier of a transition (index into the program's transition arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub u32);

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Transition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Intra-procedural edge
    Internal,

    /// Call site → callee entry
    Call,

    /// Callee exit → return site; the pairing is fixed at build time
    Return { corresponding_call: TransitionId },

    /// Inlined summary standing in for a call
    Summary { of_call: TransitionId },
}

/// A graph node: one program location
///
/// Never mutated by the engine, only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Location ID
    pub id: LocationId,

    /// Procedure this location belongs to
    pub procedure: String,

    /// Procedure entry point
    pub is_entry: bool,

    /// Procedure exit point
    pub is_exit: bool,

    /// Designated error location
    pub is_error: bool,

    /// Incoming transitions, in insertion order
    pub incoming: Vec<TransitionId>,

    /// Outgoing transitions, in insertion order
    pub outgoing: Vec<TransitionId>,
}

/// A directed edge between two locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Transition ID
    pub id: TransitionId,

    /// Source location
    pub source: LocationId,

    /// Target location
    pub target: LocationId,

    /// Edge kind
    pub kind: TransitionKind,

    /// Statement payload
    pub statement: Statement,
}

impl Transition {
    pub fn is_call(&self) -> bool {
        matches!(self.kind, TransitionKind::Call)
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, TransitionKind::Return { .. })
    }

    pub fn is_summary(&self) -> bool {
        matches!(self.kind, TransitionKind::Summary { .. })
    }

    /// The call this transition answers, if it is a return
    pub fn corresponding_call(&self) -> Option<TransitionId> {
        match self.kind {
            TransitionKind::Return { corresponding_call } => Some(corresponding_call),
            _ => None,
        }
    }
}

/// Procedure metadata: declared parameters and locals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    /// Procedure name
    pub name: String,

    /// Formal parameters, in declaration order
    pub params: Vec<VarId>,

    /// Local variables, in declaration order
    pub locals: Vec<VarId>,

    /// Entry location (set once a location is marked as entry)
    pub entry: Option<LocationId>,

    /// Exit location
    pub exit: Option<LocationId>,
}

impl Procedure {
    /// All variables in scope inside this procedure
    pub fn variables(&self) -> Vec<VarId> {
        let mut vars = self.params.clone();
        vars.extend(self.locals.iter().cloned());
        vars
    }
}

/// Immutable interprocedural control flow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    locations: Vec<Location>,
    transitions: Vec<Transition>,
    procedures: FxHashMap<String, Procedure>,
}

impl Program {
    pub fn location(&self, id: LocationId) -> &Location {
        &self.locations[id.0 as usize]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0 as usize]
    }

    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    /// Variables in scope at locations of `procedure`
    pub fn variables_of(&self, procedure: &str) -> Vec<VarId> {
        self.procedures
            .get(procedure)
            .map(|p| p.variables())
            .unwrap_or_default()
    }

    /// All procedure entry locations (library-mode seeds)
    pub fn entry_locations(&self) -> Vec<LocationId> {
        self.locations
            .iter()
            .filter(|l| l.is_entry)
            .map(|l| l.id)
            .collect()
    }

    /// All designated error locations
    pub fn error_locations(&self) -> Vec<LocationId> {
        self.locations
            .iter()
            .filter(|l| l.is_error)
            .map(|l| l.id)
            .collect()
    }

    /// Every integer literal appearing in a statement, sorted
    ///
    /// Feeds the literal-guided widening policy.
    pub fn literals(&self) -> BTreeSet<i64> {
        let mut out = BTreeSet::new();
        for t in &self.transitions {
            t.statement.collect_literals(&mut out);
        }
        out
    }

    /// All Return transitions answering `call`
    pub fn returns_for_call(&self, call: TransitionId) -> Vec<TransitionId> {
        self.transitions
            .iter()
            .filter(|t| t.corresponding_call() == Some(call))
            .map(|t| t.id)
            .collect()
    }

    /// The summary transition standing in for `call`, if one was built
    pub fn summary_for_call(&self, call: TransitionId) -> Option<TransitionId> {
        self.transitions
            .iter()
            .find(|t| matches!(t.kind, TransitionKind::Summary { of_call } if of_call == call))
            .map(|t| t.id)
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }
}

/// Graph construction error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    /// An edge references a location id that was never added
    #[error("Unknown location {0} referenced by transition")]
    UnknownLocation(LocationId),

    /// A return's corresponding_call does not name a Call transition
    #[error("Transition {0} is paired as corresponding_call but is not a Call")]
    NotACall(TransitionId),

    /// A summary's of_call does not name a Call transition
    #[error("Transition {0} is referenced as of_call but is not a Call")]
    SummaryOfNonCall(TransitionId),

    /// A location names a procedure that was never declared
    #[error("Location {location} belongs to undeclared procedure '{procedure}'")]
    UnknownProcedure {
        location: LocationId,
        procedure: String,
    },

    /// Two locations of the same procedure are both marked entry
    #[error("Procedure '{0}' has more than one entry location")]
    DuplicateEntry(String),

    /// A call statement names a procedure that was never declared
    #[error("Call transition {transition} targets undeclared procedure '{callee}'")]
    UnknownCallee {
        transition: TransitionId,
        callee: String,
    },
}

/// Builder for `Program`
///
/// Accumulates locations and transitions, then validates the whole graph in
/// `build()`. There is no partially-built `Program` value: an inconsistent
/// call/return pairing is an `Err`, not a null field.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    locations: Vec<Location>,
    transitions: Vec<Transition>,
    procedures: FxHashMap<String, Procedure>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a procedure with its formals and locals
    pub fn add_procedure(&mut self, name: impl Into<String>, params: Vec<VarId>, locals: Vec<VarId>) {
        let name = name.into();
        self.procedures.insert(
            name.clone(),
            Procedure {
                name,
                params,
                locals,
                entry: None,
                exit: None,
            },
        );
    }

    /// Add a location in `procedure`
    pub fn add_location(&mut self, procedure: &str) -> LocationId {
        let id = LocationId(self.locations.len() as u32);
        self.locations.push(Location {
            id,
            procedure: procedure.to_string(),
            is_entry: false,
            is_exit: false,
            is_error: false,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        id
    }

    pub fn mark_entry(&mut self, id: LocationId) {
        self.locations[id.0 as usize].is_entry = true;
    }

    pub fn mark_exit(&mut self, id: LocationId) {
        self.locations[id.0 as usize].is_exit = true;
    }

    pub fn mark_error(&mut self, id: LocationId) {
        self.locations[id.0 as usize].is_error = true;
    }

    fn push_transition(
        &mut self,
        source: LocationId,
        target: LocationId,
        kind: TransitionKind,
        statement: Statement,
    ) -> TransitionId {
        let id = TransitionId(self.transitions.len() as u32);
        self.transitions.push(Transition {
            id,
            source,
            target,
            kind,
            statement,
        });
        id
    }

    /// Add an intra-procedural edge
    pub fn add_internal(
        &mut self,
        source: LocationId,
        target: LocationId,
        statement: Statement,
    ) -> TransitionId {
        self.push_transition(source, target, TransitionKind::Internal, statement)
    }

    /// Add a call edge; `statement` must be `Statement::Call`
    pub fn add_call(
        &mut self,
        source: LocationId,
        target: LocationId,
        statement: Statement,
    ) -> TransitionId {
        debug_assert!(
            matches!(statement, Statement::Call { .. }),
            "call transition requires a Call statement"
        );
        self.push_transition(source, target, TransitionKind::Call, statement)
    }

    /// Add a return edge answering `corresponding_call`
    pub fn add_return(
        &mut self,
        source: LocationId,
        target: LocationId,
        corresponding_call: TransitionId,
        statement: Statement,
    ) -> TransitionId {
        self.push_transition(
            source,
            target,
            TransitionKind::Return { corresponding_call },
            statement,
        )
    }

    /// Add a summary edge standing in for `of_call`
    pub fn add_summary(
        &mut self,
        source: LocationId,
        target: LocationId,
        of_call: TransitionId,
        statement: Statement,
    ) -> TransitionId {
        self.push_transition(source, target, TransitionKind::Summary { of_call }, statement)
    }

    /// Validate and freeze the graph
    pub fn build(mut self) -> Result<Program, ProgramError> {
        // Locations must belong to declared procedures; entries must be unique.
        for loc in &self.locations {
            if !self.procedures.contains_key(&loc.procedure) {
                return Err(ProgramError::UnknownProcedure {
                    location: loc.id,
                    procedure: loc.procedure.clone(),
                });
            }
        }
        for loc in &self.locations {
            if loc.is_entry {
                let proc = self
                    .procedures
                    .get_mut(&loc.procedure)
                    .expect("checked above");
                if proc.entry.is_some() {
                    return Err(ProgramError::DuplicateEntry(loc.procedure.clone()));
                }
                proc.entry = Some(loc.id);
            }
            if loc.is_exit {
                if let Some(proc) = self.procedures.get_mut(&loc.procedure) {
                    proc.exit = Some(loc.id);
                }
            }
        }

        // Edge endpoints and pairings.
        let n_locs = self.locations.len() as u32;
        let is_call = |id: TransitionId, transitions: &[Transition]| {
            transitions
                .get(id.0 as usize)
                .map(|t| t.is_call())
                .unwrap_or(false)
        };
        for t in &self.transitions {
            if t.source.0 >= n_locs {
                return Err(ProgramError::UnknownLocation(t.source));
            }
            if t.target.0 >= n_locs {
                return Err(ProgramError::UnknownLocation(t.target));
            }
            match t.kind {
                TransitionKind::Return { corresponding_call } => {
                    if !is_call(corresponding_call, &self.transitions) {
                        return Err(ProgramError::NotACall(corresponding_call));
                    }
                }
                TransitionKind::Summary { of_call } => {
                    if !is_call(of_call, &self.transitions) {
                        return Err(ProgramError::SummaryOfNonCall(of_call));
                    }
                }
                TransitionKind::Call => {
                    if let Statement::Call { ref callee, .. } = t.statement {
                        if !self.procedures.contains_key(callee) {
                            return Err(ProgramError::UnknownCallee {
                                transition: t.id,
                                callee: callee.clone(),
                            });
                        }
                    }
                }
                TransitionKind::Internal => {}
            }
        }

        // Wire incoming/outgoing lists.
        for i in 0..self.transitions.len() {
            let (src, dst, id) = {
                let t = &self.transitions[i];
                (t.source, t.target, t.id)
            };
            self.locations[src.0 as usize].outgoing.push(id);
            self.locations[dst.0 as usize].incoming.push(id);
        }

        Ok(Program {
            locations: self.locations,
            transitions: self.transitions,
            procedures: self.procedures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::statement::Expr;

    fn diamond() -> Program {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![VarId::int("x")]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        let l2 = b.add_location("main");
        let l3 = b.add_location("main");
        b.mark_entry(l0);
        b.mark_exit(l3);
        b.add_internal(
            l0,
            l1,
            Statement::Assume {
                cond: Expr::lt(Expr::var(VarId::int("x")), Expr::int(0)),
            },
        );
        b.add_internal(
            l0,
            l2,
            Statement::Assume {
                cond: Expr::ge(Expr::var(VarId::int("x")), Expr::int(0)),
            },
        );
        b.add_internal(l1, l3, Statement::Skip);
        b.add_internal(l2, l3, Statement::Skip);
        b.build().expect("diamond builds")
    }

    #[test]
    fn test_builder_wires_adjacency() {
        let p = diamond();
        let entry = p.location(LocationId(0));
        assert_eq!(entry.outgoing.len(), 2);
        assert!(entry.incoming.is_empty());

        let exit = p.location(LocationId(3));
        assert_eq!(exit.incoming.len(), 2);
        assert!(exit.is_exit);
    }

    #[test]
    fn test_builder_rejects_return_paired_with_non_call() {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        let internal = b.add_internal(l0, l1, Statement::Skip);
        b.add_return(l1, l0, internal, Statement::Return { assigns: vec![] });

        assert_eq!(b.build().unwrap_err(), ProgramError::NotACall(internal));
    }

    #[test]
    fn test_builder_rejects_undeclared_procedure() {
        let mut b = ProgramBuilder::new();
        let l0 = b.add_location("ghost");
        let err = b.build().unwrap_err();
        assert_eq!(
            err,
            ProgramError::UnknownProcedure {
                location: l0,
                procedure: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_builder_rejects_unknown_callee() {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        b.add_call(
            l0,
            l1,
            Statement::Call {
                callee: "missing".to_string(),
                args: vec![],
            },
        );
        assert!(matches!(
            b.build().unwrap_err(),
            ProgramError::UnknownCallee { .. }
        ));
    }

    #[test]
    fn test_literals_are_collected_sorted() {
        let p = diamond();
        let lits: Vec<i64> = p.literals().into_iter().collect();
        assert_eq!(lits, vec![0]);
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        b.mark_entry(l0);
        b.mark_entry(l1);
        assert_eq!(
            b.build().unwrap_err(),
            ProgramError::DuplicateEntry("main".to_string())
        );
    }
}
