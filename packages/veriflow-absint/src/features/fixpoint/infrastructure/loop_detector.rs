/*
 * Loop Head Detection
 *
 * The engine widens (instead of joining) exactly at loop heads. A loop head
 * is the target of a DFS back edge in the intra-procedural graph; call and
 * return edges never form intra-procedural loops, so they are excluded.
 * Start order is the location insertion order, which makes the detected set
 * deterministic.
 */

use crate::shared::models::{LocationId, Program, TransitionKind};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, Control, DfsEvent};
use rustc_hash::{FxHashMap, FxHashSet};

/// Computes the set of widening points of a program
pub struct LoopDetector;

impl LoopDetector {
    /// All locations targeted by an intra-procedural back edge
    pub fn loop_heads(program: &Program) -> FxHashSet<LocationId> {
        let mut graph: DiGraph<LocationId, ()> = DiGraph::new();
        let mut nodes: FxHashMap<LocationId, NodeIndex> = FxHashMap::default();
        for loc in program.locations() {
            nodes.insert(loc.id, graph.add_node(loc.id));
        }
        for t in program.transitions() {
            let intra = matches!(
                t.kind,
                TransitionKind::Internal | TransitionKind::Summary { .. }
            );
            let same_proc =
                program.location(t.source).procedure == program.location(t.target).procedure;
            if intra && same_proc {
                graph.add_edge(nodes[&t.source], nodes[&t.target], ());
            }
        }

        let mut heads = FxHashSet::default();
        depth_first_search(&graph, graph.node_indices(), |event| {
            if let DfsEvent::BackEdge(_, target) = event {
                heads.insert(graph[target]);
            }
            Control::<()>::Continue
        });
        heads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{ProgramBuilder, Statement};

    #[test]
    fn test_while_loop_head_detected() {
        // l0 -> l1 -> l2 -> l1 (back edge), l1 -> l3
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        let l2 = b.add_location("main");
        let l3 = b.add_location("main");
        b.mark_entry(l0);
        b.add_internal(l0, l1, Statement::Skip);
        b.add_internal(l1, l2, Statement::Skip);
        b.add_internal(l2, l1, Statement::Skip);
        b.add_internal(l1, l3, Statement::Skip);
        let p = b.build().expect("loop program builds");

        let heads = LoopDetector::loop_heads(&p);
        assert!(heads.contains(&l1), "while head must be detected");
        assert_eq!(heads.len(), 1, "straight-line locations are not heads");
    }

    #[test]
    fn test_acyclic_graph_has_no_heads() {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        let l2 = b.add_location("main");
        b.mark_entry(l0);
        b.add_internal(l0, l1, Statement::Skip);
        b.add_internal(l0, l2, Statement::Skip);
        b.add_internal(l1, l2, Statement::Skip);
        let p = b.build().expect("dag builds");

        assert!(LoopDetector::loop_heads(&p).is_empty());
    }

    #[test]
    fn test_self_loop_is_a_head() {
        let mut b = ProgramBuilder::new();
        b.add_procedure("main", vec![], vec![]);
        let l0 = b.add_location("main");
        let l1 = b.add_location("main");
        b.mark_entry(l0);
        b.add_internal(l0, l1, Statement::Skip);
        b.add_internal(l1, l1, Statement::Skip);
        let p = b.build().expect("self loop builds");

        assert!(LoopDetector::loop_heads(&p).contains(&l1));
    }
}
