/*
 * Call Renaming Plans
 *
 * Modeling a call without aliasing caller and callee variables needs a
 * renaming plan: argument expressions are evaluated into fresh temporaries in
 * the caller scope, the scope switches, and the temporaries are assigned to
 * the callee's formals. The plan depends only on the call transition, so it
 * is built lazily and cached for the run's lifetime; entries are never
 * invalidated mid-run.
 */

use crate::shared::models::{Expr, Program, Statement, Transition, TransitionId, VarId};
use rustc_hash::FxHashMap;

/// Renaming plan and scope snapshot for one Call transition
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Callee procedure name
    pub callee: String,

    /// Callee formals, in declaration order
    pub formals: Vec<VarId>,

    /// Argument expressions over the caller scope, positionally matching
    /// `formals`
    pub arguments: Vec<Expr>,

    /// Fresh temporaries carrying argument values across the scope switch
    pub temporaries: Vec<VarId>,

    /// Snapshot of the caller scope at the call site
    pub caller_vars: Vec<VarId>,

    /// Full callee scope (formals + locals)
    pub callee_vars: Vec<VarId>,
}

/// Per-run cache of call renaming plans
#[derive(Debug, Default)]
pub struct CallInfoCache {
    plans: FxHashMap<TransitionId, CallInfo>,
}

impl CallInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The plan for `call`, building it on first use
    ///
    /// Panics if `call` is not a Call transition or its statement is not a
    /// call; the builder validated both, so this is a provider bug.
    pub fn get_or_build(&mut self, program: &Program, call: &Transition) -> &CallInfo {
        self.plans
            .entry(call.id)
            .or_insert_with(|| Self::build(program, call))
    }

    fn build(program: &Program, call: &Transition) -> CallInfo {
        let Statement::Call { callee, args } = &call.statement else {
            panic!(
                "transition {} is tagged Call but carries {}",
                call.id, call.statement
            );
        };
        let procedure = program
            .procedure(callee)
            .unwrap_or_else(|| panic!("call {} targets unknown procedure '{}'", call.id, callee));

        let formals = procedure.params.clone();
        let temporaries: Vec<VarId> = formals
            .iter()
            .enumerate()
            .map(|(i, formal)| VarId {
                name: format!("{}!arg{}@{}", formal.name, i, call.id),
                sort: formal.sort,
            })
            .collect();

        let caller_vars = program.variables_of(&program.location(call.source).procedure);

        CallInfo {
            callee: callee.clone(),
            formals,
            arguments: args.clone(),
            temporaries,
            caller_vars,
            callee_vars: procedure.variables(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::ProgramBuilder;

    fn call_program() -> Program {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![VarId::int("a")]);
        b.add_procedure("inc", vec![VarId::int("p")], vec![VarId::int("r")]);
        let m0 = b.add_location("main");
        let m1 = b.add_location("main");
        let f0 = b.add_location("inc");
        b.mark_entry(m0);
        b.add_call(
            m0,
            f0,
            Statement::Call {
                callee: "inc".to_string(),
                args: vec![Expr::var(VarId::int("a"))],
            },
        );
        b.add_internal(m0, m1, Statement::Skip);
        b.build().expect("call program builds")
    }

    #[test]
    fn test_plan_matches_formals_positionally() {
        let p = call_program();
        let call = p
            .transitions()
            .find(|t| t.is_call())
            .expect("has a call")
            .clone();
        let mut cache = CallInfoCache::new();
        let info = cache.get_or_build(&p, &call);

        assert_eq!(info.callee, "inc");
        assert_eq!(info.formals, vec![VarId::int("p")]);
        assert_eq!(info.arguments, vec![Expr::var(VarId::int("a"))]);
        assert_eq!(info.temporaries.len(), 1);
        assert_eq!(info.callee_vars.len(), 2, "formals + locals");
        assert_eq!(info.caller_vars, vec![VarId::int("a")]);
    }

    #[test]
    fn test_plan_is_cached() {
        let p = call_program();
        let call = p
            .transitions()
            .find(|t| t.is_call())
            .expect("has a call")
            .clone();
        let mut cache = CallInfoCache::new();
        let first = cache.get_or_build(&p, &call).temporaries.clone();
        let second = cache.get_or_build(&p, &call).temporaries.clone();
        assert_eq!(first, second, "temporary names must be stable per run");
    }
}
