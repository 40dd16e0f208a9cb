//! Full isomorphism fallback for ambiguous canonical forms.
//!
//! When id refinement cannot prove a canonical ordering unique, equality
//! of two records degrades to a VF2 isomorphism test on the reduced body
//! (singletons and pairs are excluded; their layout was already compared
//! structurally). Self-dual candidates additionally try the reversed
//! graph.

use petgraph::graph::DiGraph;

use sortbound_core::{Counter, Stats};

use crate::domain::poset::PosetRecord;

fn reduced_graph(record: &PosetRecord, reduced_n: usize, reversed: bool) -> DiGraph<(), ()> {
    let mut graph = DiGraph::with_capacity(reduced_n, reduced_n * 2);
    let nodes: Vec<_> = (0..reduced_n).map(|_| graph.add_node(())).collect();
    for j in 0..reduced_n {
        for k in j + 1..reduced_n {
            if record.is_edge(j, k) {
                if reversed {
                    graph.add_edge(nodes[k], nodes[j], ());
                } else {
                    graph.add_edge(nodes[j], nodes[k], ());
                }
            }
        }
    }
    graph
}

/// VF2 test on the reduced bodies of two records.
pub fn is_isomorphic(first: &PosetRecord, second: &PosetRecord, reduced_n: usize) -> bool {
    Stats::inc(Counter::Vf2Test);
    let g1 = reduced_graph(first, reduced_n, false);
    let g2 = reduced_graph(second, reduced_n, false);
    let result = petgraph::algo::is_isomorphic(&g1, &g2);
    if result {
        Stats::inc(Counter::Vf2Positive);
        // two provably-unique canonical forms with different bits must not
        // be isomorphic; hitting this means the canonicalizer lied
        debug_assert!(
            !(first.unique_graph() && second.unique_graph() && !first.same_graph(second)),
            "unique canonical forms found isomorphic"
        );
    }
    result
}

/// VF2 test of `first` against the dual of `second`.
pub fn is_rev_isomorphic(first: &PosetRecord, second: &PosetRecord, reduced_n: usize) -> bool {
    Stats::inc(Counter::RevIsoTest);
    Stats::inc(Counter::Vf2Test);
    debug_assert!(first.self_dual() && second.self_dual());
    let g1 = reduced_graph(first, reduced_n, false);
    let g2 = reduced_graph(second, reduced_n, true);
    let result = petgraph::algo::is_isomorphic(&g1, &g2);
    if result {
        Stats::inc(Counter::Vf2Positive);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relabeled_bodies_are_isomorphic() {
        // N poset under two labelings
        let mut a = PosetRecord::new();
        a.add_edge(0, 2);
        a.add_edge(1, 2);
        a.add_edge(1, 3);
        let mut b = PosetRecord::new();
        b.add_edge(0, 3);
        b.add_edge(1, 3);
        b.add_edge(1, 2);
        assert!(is_isomorphic(&a, &b, 4));
    }

    #[test]
    fn different_shapes_are_not_isomorphic() {
        let mut chain = PosetRecord::new();
        chain.add_edge(0, 1);
        chain.add_edge(1, 2);
        let mut fork = PosetRecord::new();
        fork.add_edge(0, 1);
        fork.add_edge(0, 2);
        assert!(!is_isomorphic(&chain, &fork, 3));
    }

    #[test]
    fn dual_of_fork_matches_merge() {
        // fork 0 → {1, 2} is the dual of merge {0, 1} → 2
        let mut fork = PosetRecord::new();
        fork.add_edge(0, 1);
        fork.add_edge(0, 2);
        fork.set_self_dual(true);
        let mut merge = PosetRecord::new();
        merge.add_edge(0, 2);
        merge.add_edge(1, 2);
        merge.set_self_dual(true);
        assert!(!is_isomorphic(&fork, &merge, 3));
        assert!(is_rev_isomorphic(&fork, &merge, 3));
    }
}
