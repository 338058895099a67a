/*
 * Transition Provider Port
 *
 * Abstracts the graph being analyzed. The `scope` argument is the Call
 * transition that opened the current procedure activation (innermost one);
 * it disambiguates which Return a path may take when a procedure is analyzed
 * as an isolated path program. Whole-program analysis passes the scope
 * through but accepts any structurally matching return.
 */

use crate::shared::models::TransitionId;

/// Graph queries the engine needs, scope-aware
pub trait TransitionProvider {
    /// Transitions a path may take after `transition`, under `scope`
    ///
    /// Every returned transition must start at `transition`'s target;
    /// anything else is a contract violation the engine treats as fatal.
    fn successors(&self, transition: TransitionId, scope: Option<TransitionId>)
        -> Vec<TransitionId>;

    /// Mirror image for backward analyses
    fn predecessors(
        &self,
        transition: TransitionId,
        scope: Option<TransitionId>,
    ) -> Vec<TransitionId>;

    /// Does this transition open a procedure scope (a Call)?
    fn is_entering_scope(&self, transition: TransitionId) -> bool;

    /// May this transition close `scope`? Only a Return whose recorded
    /// corresponding call matches can.
    fn is_leaving_scope(&self, transition: TransitionId, scope: Option<TransitionId>) -> bool;

    /// The inlined summary standing in for `call`, when one exists
    fn summary_for_call(&self, call: TransitionId) -> Option<TransitionId>;
}
