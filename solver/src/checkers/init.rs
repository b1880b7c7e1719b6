//! Network normalization shared by every variant.

use crate::checkers::{CheckError, CheckStatus};
use crate::core::{horizon, IntCst, Label, SatInt};
use crate::graph::{ConstraintType, Node, TNGraph, ZERO_NODE_NAME};
use itertools::Itertools;

/// Facts established by initialization and consumed by the kernels.
#[derive(Copy, Clone, Debug)]
pub(crate) struct InitInfo {
    pub horizon: IntCst,
    pub max_abs_weight: IntCst,
}

/// Normalizes `g` in place so that propagation can assume the standard form:
/// a clean `Z` reachable from every node at distance 0, no self-loops or
/// empty edges, validated contingent pairs, a finite horizon.
///
/// Repairs are logged at `warn!`; impossible repairs fail with
/// [`CheckError::NotWellDefined`].
pub(crate) fn init_and_check(
    g: &mut TNGraph,
    status: &mut CheckStatus,
    with_contingents: bool,
) -> Result<InitInfo, CheckError> {
    // 1. the source node
    let z = match g.z() {
        Some(z) => z,
        None => {
            tracing::warn!("no node named {ZERO_NODE_NAME}: adding it at the origin");
            g.add_node(Node::new(ZERO_NODE_NAME))
                .map_err(CheckError::NotWellDefined)?
        }
    };

    // 2. Z's label is always empty
    if !g.node(z).label.is_empty() {
        tracing::warn!("clearing the non-empty label of {ZERO_NODE_NAME}");
        g.node_mut(z).label = Label::empty();
    }

    // 3. drop self-loops and empty edges
    let all_edges: Vec<_> = g.edge_ids().collect();
    for id in all_edges {
        if g.source(id) == g.target(id) {
            tracing::warn!("removing self-loop {}", g.edge(id).name());
            g.remove_edge(id);
        } else if g.edge(id).is_empty() {
            tracing::warn!("removing empty edge {}", g.edge(id).name());
            g.remove_edge(id);
        }
    }

    // 4. contingent links
    if with_contingents {
        validate_contingent_links(g)?;
    }

    // 5. the horizon must be representable
    let max_abs = g.max_abs_weight();
    let h = horizon(max_abs, g.num_nodes()).ok_or_else(|| {
        CheckError::Overflow(format!(
            "horizon {max_abs} × {} exceeds the representable band",
            g.num_nodes() - 1
        ))
    })?;

    // 6. everybody happens at or after Z
    let nodes: Vec<_> = g.node_ids().filter(|&n| n != z).collect();
    for n in nodes {
        let id = g.ensure_edge(n, z);
        let e = g.edge_mut(id);
        if e.is_empty() {
            e.kind = ConstraintType::Internal;
        }
        e.tighten_value(e.value.min_ignoring_null(SatInt::ZERO));
    }

    status.initialized = true;
    Ok(InitInfo {
        horizon: h,
        max_abs_weight: max_abs,
    })
}

/// Validates the declared contingent links: `0 < x < y`, companion edges
/// present (a missing side is re-materialized from the registry), one
/// activation per contingent, one link per a-letter, and no stray contingent
/// edge outside the registry.
fn validate_contingent_links(g: &mut TNGraph) -> Result<(), CheckError> {
    let links = g.links().to_vec();
    for link in &links {
        if !(0 < link.lower && link.lower < link.upper) {
            return Err(CheckError::NotWellDefined(format!(
                "contingent link ({}, {}, {}, {}) violates 0 < x < y",
                g.node(link.activation).name(),
                link.lower,
                link.upper,
                g.node(link.contingent).name()
            )));
        }
        // a side dropped since declaration is inferred back from the registry
        for (s, t, v) in [
            (link.activation, link.contingent, link.upper),
            (link.contingent, link.activation, -link.lower),
        ] {
            if g.edge_between(s, t).is_none() {
                tracing::warn!(
                    "re-materializing missing contingent edge {} → {}",
                    g.node(s).name(),
                    g.node(t).name()
                );
            }
            let id = g.ensure_edge(s, t);
            let e = g.edge_mut(id);
            e.kind = ConstraintType::Contingent;
            e.tighten_value(SatInt::new(v));
        }
    }

    for (a, b) in links.iter().tuple_combinations() {
        if a.contingent == b.contingent {
            return Err(CheckError::NotWellDefined(format!(
                "contingent node {} has two activations",
                g.node(a.contingent).name()
            )));
        }
        if a.letter == b.letter {
            return Err(CheckError::NotWellDefined(format!(
                "a-letter {} names two contingent links",
                a.letter
            )));
        }
    }

    // a contingent-typed edge that is not a side of a declared link cannot be
    // repaired
    for id in g.edge_ids().collect::<Vec<_>>() {
        if g.edge(id).kind != ConstraintType::Contingent {
            continue;
        }
        let (u, v) = (g.source(id), g.target(id));
        let covered = links
            .iter()
            .any(|l| (l.activation, l.contingent) == (u, v) || (l.contingent, l.activation) == (u, v));
        if !covered {
            return Err(CheckError::NotWellDefined(format!(
                "contingent edge {} does not belong to any declared link",
                g.edge(id).name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_z_is_created_and_closed_over() {
        let mut g = TNGraph::new();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        g.add_ordinary_edge(a, b, 5);
        let mut status = CheckStatus::default();
        let info = init_and_check(&mut g, &mut status, false).unwrap();
        let z = g.z().expect("Z created");
        assert!(status.initialized);
        assert_eq!(info.max_abs_weight, 5);
        assert_eq!(info.horizon, 10);
        // every non-Z node now reaches Z with weight 0
        for n in [a, b] {
            let e = g.edge_between(n, z).unwrap();
            assert_eq!(g.edge(e).value.unwrap(), 0);
        }
    }

    #[test]
    fn self_loops_are_dropped() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        g.add_ordinary_edge(a, a, -1);
        let mut status = CheckStatus::default();
        init_and_check(&mut g, &mut status, false).unwrap();
        assert!(g.edge_between(a, a).is_none());
    }

    #[test]
    fn inverted_contingent_bounds_are_rejected() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 7, 4, c);
        let mut status = CheckStatus::default();
        let err = init_and_check(&mut g, &mut status, true);
        assert!(matches!(err, Err(CheckError::NotWellDefined(_))));
    }

    #[test]
    fn duplicate_activation_is_rejected() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 1, 5, c);
        g.add_contingent_link(b, 2, 6, c);
        let mut status = CheckStatus::default();
        let err = init_and_check(&mut g, &mut status, true);
        assert!(matches!(err, Err(CheckError::NotWellDefined(_))));
    }
}
