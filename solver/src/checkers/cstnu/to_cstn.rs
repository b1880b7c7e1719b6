//! Rewriting a CSTNU into a CSTN whose consistency verdict matches the
//! controllability verdict.
//!
//! Each contingent link `(A, x, y, C)` becomes an observation point pinned to
//! the activation: executing `A` reveals a fresh proposition whose outcome
//! selects which extreme duration the environment takes, and labeled values
//! pin `C − A` to `x` under the positive literal and to `y` under the
//! negative one. The resulting network is checked as a CSTN under
//! instantaneous-reaction semantics.

use crate::checkers::cstnu::fresh_prop;
use crate::checkers::CheckError;
use crate::core::{Label, LitState, Prop, SatInt};
use crate::graph::{ConstraintType, Node, TNGraph};

/// Builds the CSTN rewriting of `g`. Fails when no fresh proposition is left
/// for some contingent link.
pub fn cstnu_to_cstn(g: &TNGraph) -> Result<TNGraph, CheckError> {
    let mut out = TNGraph::new();
    for n in g.node_ids() {
        let mut node = g.node(n).clone();
        node.aletter = None;
        out.add_node(node).map_err(CheckError::NotWellDefined)?;
    }

    // copy the plain constraints; case values stay behind
    for id in g.edge_ids() {
        let (u, v) = (g.source(id), g.target(id));
        let su = out.node_id(g.node(u).name()).expect("copied node");
        let tv = out.node_id(g.node(v).name()).expect("copied node");
        let new = out.add_edge_named(g.edge(id).name(), su, tv);
        if let Some(w) = g.edge(id).value.finite() {
            out.edge_mut(new).tighten_value(SatInt::new(w));
        }
        for (l, w) in g.edge(id).labeled.iter() {
            out.edge_mut(new).labeled.merge(l, w);
        }
        out.edge_mut(new).kind = if g.edge(id).kind == ConstraintType::Contingent {
            ConstraintType::Requirement
        } else {
            g.edge(id).kind
        };
    }

    // one observation point per contingent link, pinned to the activation;
    // its outcome selects the duration the environment takes
    let mut assigned: Vec<Prop> = Vec::new();
    for link in g.links() {
        let p = fresh_prop(g, link.letter, &assigned).ok_or_else(|| {
            CheckError::NotWellDefined(format!(
                "no proposition left to observe contingent link {}",
                link.letter
            ))
        })?;
        assigned.push(p);
        let a = out.node_id(g.node(link.activation).name()).expect("copied node");
        let c = out.node_id(g.node(link.contingent).name()).expect("copied node");
        let obs = out
            .add_node(Node::observer(format!("{}?", link.letter), p))
            .map_err(CheckError::NotWellDefined)?;
        out.add_ordinary_edge(a, obs, 0);
        out.add_ordinary_edge(obs, a, 0);

        let straight = Label::empty().set(p, LitState::Straight);
        let negated = Label::empty().set(p, LitState::Negated);
        // short duration under p, long one under ¬p
        out.add_labeled_value(a, c, straight, link.lower);
        out.add_labeled_value(c, a, straight, -link.lower);
        out.add_labeled_value(a, c, negated, link.upper);
        out.add_labeled_value(c, a, negated, -link.upper);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checkers::cstn::Cstn;
    use crate::checkers::cstnu::Cstnu;
    use crate::checkers::{CstnAlg, CstnConfig, Semantics};

    fn ir_config() -> CstnConfig {
        CstnConfig {
            alg: CstnAlg::HunsbergerPosenato19,
            semantics: Semantics::Ir,
            wo_node_labels: false,
            time_budget: None,
        }
    }

    fn verdicts_agree(g: TNGraph) {
        let cstn_graph = cstnu_to_cstn(&g).unwrap();
        let mut cstnu = Cstnu::with_config(g, ir_config());
        let dc = cstnu.dynamic_controllability_check().unwrap().consistent;
        let mut cstn = Cstn::with_config(cstn_graph, ir_config());
        let consistent = cstn.dynamic_consistency_check().unwrap().consistent;
        assert_eq!(dc, consistent);
    }

    #[test]
    fn transform_replaces_contingency_with_observation() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 2, 5, c);
        let out = cstnu_to_cstn(&g).unwrap();
        assert!(out.links().is_empty());
        assert_eq!(out.observer_count(), 1);
        let a = out.node_id("A").unwrap();
        let c = out.node_id("C").unwrap();
        let obs = out.node_id("C?").unwrap();
        assert!(out.node(obs).is_observer());
        assert!(!out.node(c).is_contingent());
        // the observation is pinned to the activation
        assert_eq!(out.edge(out.edge_between(a, obs).unwrap()).value.unwrap(), 0);
        assert_eq!(out.edge(out.edge_between(obs, a).unwrap()).value.unwrap(), 0);
        let ac = out.edge_between(a, c).unwrap();
        assert_eq!(out.edge(ac).labeled.len(), 2);
        assert_eq!(out.edge(ac).kind, ConstraintType::Requirement);
    }

    #[test]
    fn agreement_on_a_controllable_link() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        let y = g.add_named("Y").unwrap();
        g.add_contingent_link(a, 2, 5, c);
        g.add_ordinary_edge(c, y, 3);
        g.add_ordinary_edge(y, c, 0);
        verdicts_agree(g);
    }

    #[test]
    fn agreement_on_a_squeezed_link() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 1, 10, c);
        g.add_ordinary_edge(c, a, -2);
        verdicts_agree(g);
    }
}
