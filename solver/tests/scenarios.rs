//! End-to-end scenarios across the network family.

use tempnet::checkers::stnu::{CaseKind, SrncEdgeType};
use tempnet::prelude::*;

fn stn_config(alg: StnAlg) -> StnConfig {
    StnConfig {
        alg,
        time_budget: None,
    }
}

fn ir_config() -> CstnConfig {
    CstnConfig {
        alg: CstnAlg::HunsbergerPosenato19,
        semantics: Semantics::Ir,
        wo_node_labels: false,
        time_budget: None,
    }
}

#[test]
fn minimal_consistent_stn() {
    let mut g = TNGraph::new();
    g.add_named("Z").unwrap();
    let a = g.add_named("A").unwrap();
    let b = g.add_named("B").unwrap();
    g.add_ordinary_edge(a, b, 5);
    g.add_ordinary_edge(b, a, -2);

    let mut stn = Stn::with_config(g, stn_config(StnAlg::Johnson));
    let status = stn.consistency_check().unwrap();
    assert_eq!(status.consistent, Some(true));
    assert!(status.finished);

    // distances are reported against Z: A is pinned to it, B runs at least
    // 2 after
    let a = stn.graph().node_id("A").unwrap();
    let b = stn.graph().node_id("B").unwrap();
    assert_eq!(stn.distance_to_z(a), Some(0));
    assert_eq!(stn.distance_to_z(b), Some(-2));

    // the minimal distance graph has exactly one edge per finitely-connected
    // ordered pair
    assert_eq!(stn.graph().num_edges(), 4);
    let z = stn.graph().node_id("Z").unwrap();
    for (s, t, w) in [(a, b, 5), (b, a, -2), (a, z, 0), (b, z, -2)] {
        let e = stn.graph().edge_between(s, t).expect("minimal edge");
        assert_eq!(stn.graph().edge(e).value.unwrap(), w);
    }
}

#[test]
fn trivially_inconsistent_stn() {
    let mut g = TNGraph::new();
    g.add_named("Z").unwrap();
    let a = g.add_named("A").unwrap();
    let b = g.add_named("B").unwrap();
    g.add_ordinary_edge(a, b, 3);
    g.add_ordinary_edge(b, a, -4);

    let mut stn = Stn::new(g);
    let status = stn.consistency_check().unwrap().clone();
    assert_eq!(status.consistent, Some(false));
    let cycle = status.negative_cycle.as_ref().expect("witness");
    assert_eq!(cycle.total, -1);
    let names: Vec<&str> = cycle.nodes.iter().map(|&n| stn.graph().node(n).name()).collect();
    assert_eq!(names.len(), 3);
    assert_eq!(names.first(), names.last());
    assert!(names.contains(&"A") && names.contains(&"B"));
}

#[test]
fn simple_dc_stnu() {
    let mut g = TNGraph::new();
    g.add_named("Z").unwrap();
    let a = g.add_named("A").unwrap();
    let c = g.add_named("C").unwrap();
    let x = g.add_named("X").unwrap();
    let y = g.add_named("Y").unwrap();
    g.add_contingent_link(a, 2, 5, c);
    g.add_ordinary_edge(x, a, 10);
    g.add_ordinary_edge(a, x, 0);
    g.add_ordinary_edge(c, y, 3);
    g.add_ordinary_edge(y, c, 0);

    let mut stnu = Stnu::new(g);
    let status = stnu.dynamic_controllability_check().unwrap().clone();
    assert_eq!(status.consistent, Some(true));
    assert!(stnu.apply_min_dispatchable_estnu().unwrap());

    // the contingent link survives minimization untouched
    let g = stnu.graph();
    let a = g.node_id("A").unwrap();
    let c = g.node_id("C").unwrap();
    let ac = g.edge_between(a, c).expect("contingent edge");
    let ca = g.edge_between(c, a).expect("companion edge");
    assert_eq!(g.edge(ac).value.unwrap(), 5);
    assert!(g.edge(ac).lower_case.is_some());
    assert_eq!(g.edge(ca).uc_value(ALetter('C')), Some(-5));
    assert_eq!(g.links().len(), 1);
    assert!(stnu.check_status().max_min_constraint.is_some());
}

#[test]
fn non_dc_stnu_witnessed_by_srnc() {
    let mut g = TNGraph::new();
    g.add_named("Z").unwrap();
    let a = g.add_named("A").unwrap();
    let c = g.add_named("C").unwrap();
    g.add_contingent_link(a, 1, 10, c);
    g.add_ordinary_edge(c, a, -2);

    let mut stnu = Stnu::new(g);
    let status = stnu.dynamic_controllability_check().unwrap().clone();
    assert_eq!(status.consistent, Some(false));
    let srnc = status.srnc.as_ref().expect("witness");
    assert_eq!(srnc.sum, -1);
    assert_eq!(srnc.edge_type, SrncEdgeType::LowerCase);
    assert!(srnc.is_simple);

    // the expansion holds the lower-case edge A → C (c:1) and the ordinary
    // C → A (−2)
    let a = stnu.graph().node_id("A").unwrap();
    let c = stnu.graph().node_id("C").unwrap();
    assert!(srnc
        .expanded
        .iter()
        .any(|e| e.source == a && e.target == c && e.kind == CaseKind::Lower(ALetter('C')) && e.value == 1));
    assert!(srnc
        .expanded
        .iter()
        .any(|e| e.source == c && e.target == a && e.kind == CaseKind::Ordinary && e.value == -2));
}

#[test]
fn cstn_with_observation() {
    let mut g = TNGraph::new();
    g.add_named("Z").unwrap();
    let p = Prop::from_char('p').unwrap();
    let obs = g.add_node(Node::observer("P?", p)).unwrap();
    let x = g.add_named("X").unwrap();
    let y = g.add_named("Y").unwrap();
    let straight = Label::empty().set(p, LitState::Straight);
    let negated = Label::empty().set(p, LitState::Negated);
    g.add_labeled_value(x, obs, Label::empty(), 2);
    g.add_labeled_value(obs, y, straight, 3);
    g.add_labeled_value(obs, y, negated, 5);

    let mut cstn = Cstn::with_config(g, ir_config());
    let status = cstn.dynamic_consistency_check().unwrap();
    assert_eq!(status.consistent, Some(true));

    let g = cstn.graph();
    let x = g.node_id("X").unwrap();
    let y = g.node_id("Y").unwrap();
    let xy = g.edge_between(x, y).expect("derived edge");
    assert_eq!(g.edge(xy).labeled.get(straight), Some(5));
    assert_eq!(g.edge(xy).labeled.get(negated), Some(7));
    assert!(g.edge(xy).labeled.holds_invariant());
}

#[test]
fn pstn_approximation_loop() {
    let mut g = TNGraph::new();
    g.add_named("Z").unwrap();
    let a1 = g.add_named("A1").unwrap();
    let c1 = g.add_named("C1").unwrap();
    let a2 = g.add_named("A2").unwrap();
    let c2 = g.add_named("C2").unwrap();
    g.add_contingent_link(a1, 3, 19, c1);
    g.add_contingent_link(a2, 3, 19, c2);
    g.node_mut(c1).log_normal = Some(LogNormal { mu: 2.0, sigma: 0.3 });
    g.node_mut(c2).log_normal = Some(LogNormal { mu: 2.0, sigma: 0.3 });
    g.add_ordinary_edge(c1, a2, 0);
    g.add_ordinary_edge(a2, c1, 0);
    g.add_ordinary_edge(a1, c2, 30);

    let mut pstn = Pstn::new(g);
    let status = pstn.build_approx_stnu().unwrap();
    assert!(status.exit_flag >= 1);
    // the seeded ranges are not controllable; at least one tightening round
    // ran before the verdict flipped
    assert!(status.base.cycles >= 2);
    assert!(status.probability_mass > 0.0 && status.probability_mass < 1.0);
    let approx = status.approximating_stnu.as_ref().expect("approximating STNU");
    for link in approx.links() {
        assert!(link.lower >= 3);
        assert!(link.upper <= 19);
    }

    // the approximation is controllable as claimed
    let mut check = Stnu::new(approx.clone());
    assert_eq!(check.dynamic_controllability_check().unwrap().consistent, Some(true));
}

#[test]
fn cstnu_dc_matches_rewritten_cstn() {
    let mut g = TNGraph::new();
    g.add_named("Z").unwrap();
    let a = g.add_named("A").unwrap();
    let c = g.add_named("C").unwrap();
    let y = g.add_named("Y").unwrap();
    g.add_contingent_link(a, 2, 5, c);
    g.add_ordinary_edge(c, y, 3);
    g.add_ordinary_edge(y, c, 0);

    let rewritten = cstnu_to_cstn(&g).unwrap();
    let mut cstnu = Cstnu::with_config(g, ir_config());
    let dc = cstnu.dynamic_controllability_check().unwrap().consistent;
    let mut cstn = Cstn::with_config(rewritten, ir_config());
    assert_eq!(cstn.dynamic_consistency_check().unwrap().consistent, dc);
    assert_eq!(dc, Some(true));
}

#[test]
fn init_closes_every_node_over_z() {
    let mut g = TNGraph::new();
    let a = g.add_named("A").unwrap();
    let b = g.add_named("B").unwrap();
    g.add_ordinary_edge(a, b, 7);
    let mut stn = Stn::new(g);
    stn.init_and_check().unwrap();
    let g = stn.graph();
    let z = g.z().expect("created Z");
    for n in g.node_ids().filter(|&n| n != z) {
        let e = g.edge_between(n, z).expect("closure edge");
        assert!(g.edge(e).value.unwrap() <= 0);
    }
}
