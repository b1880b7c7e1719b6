//! Minimal dispatchable form of a consistent STN.
//!
//! On the minimal distance graph, an edge is redundant when an equal-weight
//! two-hop path through some intermediate dominates it: non-negative edges
//! need a non-negative second hop, negative edges a negative first hop. Each
//! removal re-checks that the witness hops are still present, and both the
//! edge order and the intermediate order are by node id, so the surviving set
//! is deterministic.

use crate::checkers::stn::apsp::ApspMatrix;
use crate::graph::{EdgeId, NodeId, TNGraph};
use itertools::Itertools;

/// Removes every dominated edge of the minimal distance graph; returns how
/// many were removed.
pub(crate) fn minimize_dispatchable(g: &mut TNGraph, apsp: &ApspMatrix) -> usize {
    let nodes: Vec<NodeId> = g.node_ids().collect();
    let edges: Vec<EdgeId> = g
        .edge_ids()
        .sorted_by_key(|&id| (g.source(id), g.target(id)))
        .collect();
    let mut removed = 0;
    for id in edges {
        let (u, v) = (g.source(id), g.target(id));
        let w = g.edge(id).value.unwrap();
        let dominated = nodes.iter().any(|&x| {
            if x == u || x == v {
                return false;
            }
            let (Some(dux), Some(dxv)) = (apsp.get(u, x), apsp.get(x, v)) else {
                return false;
            };
            if dux + dxv != w {
                return false;
            }
            // the witness hops must have survived earlier removals
            if g.edge_between(u, x).is_none() || g.edge_between(x, v).is_none() {
                return false;
            }
            (w >= 0 && dxv >= 0) || (w < 0 && dux < 0)
        });
        if dominated {
            g.remove_edge(id);
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checkers::init::init_and_check;
    use crate::checkers::stn::apsp::{install_minimal_distance_graph, johnson};
    use crate::checkers::{CheckStatus, Deadline};

    fn minimized(mut g: TNGraph) -> TNGraph {
        let mut st = CheckStatus::default();
        init_and_check(&mut g, &mut st, false).unwrap();
        let deadline = Deadline::start(None);
        let apsp = johnson(&g, &deadline).ok().unwrap();
        install_minimal_distance_graph(&mut g, &apsp);
        minimize_dispatchable(&mut g, &apsp);
        g
    }

    #[test]
    fn chain_keeps_only_its_links() {
        // A -> B -> C with an implied A -> C that must disappear
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_ordinary_edge(a, b, 2);
        g.add_ordinary_edge(b, c, 3);
        g.add_ordinary_edge(a, c, 5);
        let g = minimized(g);
        let a = g.node_id("A").unwrap();
        let b = g.node_id("B").unwrap();
        let c = g.node_id("C").unwrap();
        assert!(g.edge_between(a, b).is_some());
        assert!(g.edge_between(b, c).is_some());
        assert!(g.edge_between(a, c).is_none());
    }

    #[test]
    fn minimization_is_idempotent() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_ordinary_edge(a, b, 2);
        g.add_ordinary_edge(b, c, 3);
        g.add_ordinary_edge(c, a, -4);
        let g1 = minimized(g);
        let mut g2 = g1.clone();
        let deadline = Deadline::start(None);
        let apsp = johnson(&g2, &deadline).ok().unwrap();
        let removed = minimize_dispatchable(&mut g2, &apsp);
        assert_eq!(removed, 0);
        assert_eq!(g1.num_edges(), g2.num_edges());
    }
}
