//! Dispatchability minimization of a controllable STNU.
//!
//! Removes ordinary constraints that are slack (looser than the shortest
//! path) or dominated by an equal-weight two-hop path, while preserving the
//! contingent link edges and every wait. The surviving set admits the same
//! executions with only local propagation.

use crate::checkers::stn::apsp::ApspMatrix;
use crate::core::{IntCst, SatInt};
use crate::graph::{ConstraintType, EdgeId, NodeId, TNGraph};
use itertools::Itertools;

/// True when the edge's ordinary value may be considered for removal.
fn removable(g: &TNGraph, id: EdgeId) -> bool {
    let e = g.edge(id);
    e.has_ordinary() && e.kind != ConstraintType::Contingent
}

/// Minimizes the ordinary constraints of `g`; returns the largest absolute
/// weight among the constraints that had to stay.
pub(crate) fn minimize_estnu(g: &mut TNGraph, apsp: &ApspMatrix) -> Option<IntCst> {
    // slack values first: an ordinary value looser than the shortest path is
    // never tight for any execution
    for id in g.edge_ids().collect::<Vec<_>>() {
        if !removable(g, id) {
            continue;
        }
        let (u, v) = (g.source(id), g.target(id));
        let w = g.edge(id).value.unwrap();
        if apsp.get(u, v).is_some_and(|d| d < w) {
            drop_ordinary(g, id);
        }
    }

    // then the two-hop domination filter, in deterministic order
    let nodes: Vec<NodeId> = g.node_ids().collect();
    let edges: Vec<EdgeId> = g
        .edge_ids()
        .filter(|&id| removable(g, id))
        .sorted_by_key(|&id| (g.source(id), g.target(id)))
        .collect();
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
            let hops_present = g.edge_between(u, x).is_some_and(|e| g.edge(e).has_ordinary())
                && g.edge_between(x, v).is_some_and(|e| g.edge(e).has_ordinary());
            hops_present && ((w >= 0 && dxv >= 0) || (w < 0 && dux < 0))
        });
        if dominated {
            drop_ordinary(g, id);
        }
    }

    g.edge_ids()
        .filter_map(|id| g.edge(id).value.finite())
        .map(|w| w.abs())
        .max()
}

/// Removes the ordinary value of an edge; the edge itself disappears when
/// nothing else rides on it.
fn drop_ordinary(g: &mut TNGraph, id: EdgeId) {
    g.edge_mut(id).value = SatInt::NULL;
    if g.edge(id).is_empty() {
        g.remove_edge(id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checkers::init::init_and_check;
    use crate::checkers::stn::apsp::johnson;
    use crate::checkers::{CheckStatus, Deadline};

    #[test]
    fn waits_and_contingent_edges_survive() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        let x = g.add_named("X").unwrap();
        g.add_contingent_link(a, 2, 5, c);
        g.add_ordinary_edge(x, a, 10);
        // a wait left by a previous check
        let xa = g.edge_between(x, a).unwrap();
        g.edge_mut(xa).tighten_uc(crate::core::ALetter('C'), -3);

        let mut st = CheckStatus::default();
        init_and_check(&mut g, &mut st, true).unwrap();
        let deadline = Deadline::start(None);
        let apsp = johnson(&g, &deadline).ok().unwrap();
        minimize_estnu(&mut g, &apsp);

        let ac = g.edge_between(a, c).unwrap();
        let ca = g.edge_between(c, a).unwrap();
        assert_eq!(g.edge(ac).value.unwrap(), 5);
        assert_eq!(g.edge(ca).value.unwrap(), -2);
        let xa = g.edge_between(x, a).unwrap();
        assert_eq!(g.edge(xa).uc_value(crate::core::ALetter('C')), Some(-3));
    }

    #[test]
    fn slack_ordinary_values_are_dropped() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_ordinary_edge(a, b, 2);
        g.add_ordinary_edge(b, c, 3);
        g.add_ordinary_edge(a, c, 9);
        let mut st = CheckStatus::default();
        init_and_check(&mut g, &mut st, false).unwrap();
        let deadline = Deadline::start(None);
        let apsp = johnson(&g, &deadline).ok().unwrap();
        let max = minimize_estnu(&mut g, &apsp);
        assert!(g.edge_between(a, c).is_none());
        assert_eq!(max, Some(3));
    }
}
