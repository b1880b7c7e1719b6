//! RUL-family propagation engine for STNU dynamic controllability.
//!
//! The engine maintains three constraint shapes on the labeled distance
//! graph: ordinary values, upper-case values (contingent upper bounds and the
//! waits derived from them) and lower-case values. Five rules combine
//! adjacent constraints:
//!
//! - no-case:        `(u,v,w₁) (v,z,w₂)        → (u,z,w₁+w₂)`
//! - upper-case:     `(u,v,w)  (v,A,C:y)       → (u,A,C:w+y)`
//! - lower-case:     `(A,C,c:x)(C,z,w), w < 0  → (A,z,x+w)`
//! - cross-case:     `(A,C,c:x)(C,B,D:y), y < 0, D ≠ c → (A,B,D:x+y)`
//! - letter-removal: `(u,A,C:w), w ≥ −x(C)     → (u,A,w)`
//!
//! Applications are monotone (values only decrease) and any value below
//! `−horizon` certifies a pumped negative cycle, so the fixpoint loop
//! terminates. A negative self-loop aborts the run and the provenance arena
//! reconstructs the semi-reducible negative cycle.

use crate::checkers::init::InitInfo;
use crate::checkers::stnu::srnc::{CaseKind, Derivation, ProvId, ProvenanceArena, RuleId, SemiReducibleCycle};
use crate::checkers::{CheckStatus, Deadline};
use crate::core::{IntCst, Label, SatInt};
use crate::graph::{ConstraintType, EdgeId, LowerCase, NodeId, TNGraph};
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::VecDeque;

pub(crate) enum StnuOutcome {
    Controllable,
    NotControllable(SemiReducibleCycle),
    Timeout,
}

/// A constraint produced by one rule application, not yet written to the
/// graph.
#[derive(Copy, Clone, Debug)]
struct Candidate {
    source: NodeId,
    target: NodeId,
    kind: CaseKind,
    value: IntCst,
    rule: RuleId,
    parents: [Option<ProvId>; 2],
}

pub(crate) struct RulEngine<'a> {
    g: &'a mut TNGraph,
    status: &'a mut CheckStatus,
    arena: ProvenanceArena,
    horizon: IntCst,
    only_to_z: bool,
    queue: VecDeque<EdgeId>,
    queued: hashbrown::HashSet<EdgeId>,
    /// Activation nodes, the only ordinary targets kept in to-Z mode.
    activations: hashbrown::HashSet<NodeId>,
}

impl<'a> RulEngine<'a> {
    pub fn new(
        g: &'a mut TNGraph,
        status: &'a mut CheckStatus,
        info: InitInfo,
        only_to_z: bool,
    ) -> RulEngine<'a> {
        let activations = g.links().iter().map(|l| l.activation).collect();
        RulEngine {
            g,
            status,
            arena: ProvenanceArena::new(),
            horizon: info.horizon,
            only_to_z,
            queue: VecDeque::new(),
            queued: hashbrown::HashSet::new(),
            activations,
        }
    }

    /// Installs the case values of every contingent link on its companion
    /// edges: `A→C` gets the lower-case `c:x`, `C→A` the upper-case `C:−y`.
    fn install_case_values(&mut self) {
        for link in self.g.links().to_vec() {
            let ac = self.g.edge_between(link.activation, link.contingent).expect("contingent edge");
            self.g.edge_mut(ac).lower_case = Some(LowerCase {
                letter: link.letter,
                label: Label::empty(),
                value: link.lower,
            });
            let ca = self.g.edge_between(link.contingent, link.activation).expect("companion edge");
            self.g.edge_mut(ca).tighten_uc(link.letter, -link.upper);
        }
    }

    /// Registers every present constraint as a base derivation.
    fn register_base(&mut self) {
        let order: Vec<EdgeId> = self
            .g
            .edge_ids()
            .sorted_by_key(|&id| self.g.edge_sort_key(id))
            .collect();
        for id in order {
            let (u, v) = (self.g.source(id), self.g.target(id));
            let e = self.g.edge(id);
            let mut shapes: SmallVec<[(CaseKind, IntCst); 3]> = SmallVec::new();
            if let Some(w) = e.value.finite() {
                shapes.push((CaseKind::Ordinary, w));
            }
            for (a, _, w) in e.upper_case.iter() {
                shapes.push((CaseKind::Upper(a), w));
            }
            if let Some(lc) = e.lower_case {
                shapes.push((CaseKind::Lower(lc.letter), lc.value));
            }
            for (kind, value) in shapes {
                let prov = self.arena.record(Derivation {
                    rule: RuleId::Base,
                    parents: [None, None],
                    source: u,
                    target: v,
                    kind,
                    value,
                    edge: Some(id),
                });
                self.arena.set_current(id, kind, prov);
            }
            self.enqueue(id);
        }
    }

    fn enqueue(&mut self, id: EdgeId) {
        if self.queued.insert(id) {
            self.queue.push_back(id);
        }
    }

    /// Runs the fixpoint loop.
    pub fn check(mut self, deadline: &Deadline) -> StnuOutcome {
        self.install_case_values();
        self.register_base();

        let mut pops = 0u32;
        while let Some(id) = self.queue.pop_front() {
            self.queued.remove(&id);
            pops += 1;
            if pops % 64 == 0 && deadline.expired() {
                return StnuOutcome::Timeout;
            }
            self.status.cycles += 1;

            // pair the popped edge as the first element with its successors
            let succ: Vec<EdgeId> = self
                .g
                .out_edges(self.g.target(id))
                .sorted_by_key(|&e| self.g.edge_sort_key(e))
                .collect();
            for e2 in succ {
                if let Some(cycle) = self.combine(id, e2) {
                    return StnuOutcome::NotControllable(cycle);
                }
            }
            // and as the second element with its predecessors
            let pred: Vec<EdgeId> = self
                .g
                .in_edges(self.g.source(id))
                .sorted_by_key(|&e| self.g.edge_sort_key(e))
                .collect();
            for e1 in pred {
                if let Some(cycle) = self.combine(e1, id) {
                    return StnuOutcome::NotControllable(cycle);
                }
            }
        }
        StnuOutcome::Controllable
    }

    /// Applies every rule matching the pair `(e1: u→v, e2: v→z)`.
    fn combine(&mut self, e1: EdgeId, e2: EdgeId) -> Option<SemiReducibleCycle> {
        debug_assert_eq!(self.g.target(e1), self.g.source(e2));
        for cand in self.candidates(e1, e2) {
            if let Some(cycle) = self.apply(cand) {
                return Some(cycle);
            }
        }
        None
    }

    fn candidates(&self, e1: EdgeId, e2: EdgeId) -> SmallVec<[Candidate; 4]> {
        let mut out = SmallVec::new();
        let (u, v) = (self.g.source(e1), self.g.target(e1));
        let z = self.g.target(e2);
        debug_assert_eq!(v, self.g.source(e2));
        let c1 = self.g.edge(e1);
        let c2 = self.g.edge(e2);

        if let Some(w1) = c1.value.finite() {
            // no-case
            if let Some(w2) = c2.value.finite() {
                out.push(Candidate {
                    source: u,
                    target: z,
                    kind: CaseKind::Ordinary,
                    value: w1 + w2,
                    rule: RuleId::NoCase,
                    parents: [
                        self.arena.current(e1, CaseKind::Ordinary),
                        self.arena.current(e2, CaseKind::Ordinary),
                    ],
                });
            }
            // upper-case; the label collapses on a self-loop at the activation
            for (d, _, y) in c2.upper_case.iter() {
                let kind = if u == z { CaseKind::Ordinary } else { CaseKind::Upper(d) };
                out.push(Candidate {
                    source: u,
                    target: z,
                    kind,
                    value: w1 + y,
                    rule: RuleId::UpperCase,
                    parents: [
                        self.arena.current(e1, CaseKind::Ordinary),
                        self.arena.current(e2, CaseKind::Upper(d)),
                    ],
                });
            }
        }

        if let Some(lc) = c1.lower_case {
            // lower-case: only through a negative continuation
            if let Some(w2) = c2.value.finite() {
                if w2 < 0 {
                    out.push(Candidate {
                        source: u,
                        target: z,
                        kind: CaseKind::Ordinary,
                        value: lc.value + w2,
                        rule: RuleId::LowerCase,
                        parents: [
                            self.arena.current(e1, CaseKind::Lower(lc.letter)),
                            self.arena.current(e2, CaseKind::Ordinary),
                        ],
                    });
                }
            }
            // cross-case: distinct letters only
            for (d, _, y) in c2.upper_case.iter() {
                if d != lc.letter && y < 0 {
                    let kind = if u == z { CaseKind::Ordinary } else { CaseKind::Upper(d) };
                    out.push(Candidate {
                        source: u,
                        target: z,
                        kind,
                        value: lc.value + y,
                        rule: RuleId::CrossCase,
                        parents: [
                            self.arena.current(e1, CaseKind::Lower(lc.letter)),
                            self.arena.current(e2, CaseKind::Upper(d)),
                        ],
                    });
                }
            }
        }
        out
    }

    fn bump(&mut self, rule: RuleId) {
        match rule {
            RuleId::NoCase => self.status.rules.no_case += 1,
            RuleId::UpperCase => self.status.rules.upper_case += 1,
            RuleId::LowerCase => self.status.rules.lower_case += 1,
            RuleId::CrossCase => self.status.rules.cross_case += 1,
            RuleId::LetterRemoval => self.status.rules.letter_removal += 1,
            RuleId::Base => {}
        }
    }

    /// Writes a candidate to the graph; returns the witness when it closes a
    /// negative loop or escapes the horizon.
    fn apply(&mut self, cand: Candidate) -> Option<SemiReducibleCycle> {
        // a self-loop never becomes an edge: negative means not controllable,
        // non-negative is vacuous
        if cand.source == cand.target {
            if cand.value < 0 {
                self.bump(cand.rule);
                let closing: Vec<ProvId> = cand.parents.into_iter().flatten().collect();
                return Some(self.arena.build_cycle(&closing, cand.value));
            }
            return None;
        }
        if self.only_to_z
            && cand.kind == CaseKind::Ordinary
            && Some(cand.target) != self.g.z()
            && !self.activations.contains(&cand.target)
        {
            return None;
        }

        let existed = self.g.edge_between(cand.source, cand.target).is_some();
        let id = self.g.ensure_edge(cand.source, cand.target);
        if !existed {
            self.g.edge_mut(id).kind = ConstraintType::Derived;
        }
        let changed = match cand.kind {
            CaseKind::Ordinary => self.g.edge_mut(id).tighten_value(SatInt::new(cand.value)),
            CaseKind::Upper(d) => self.g.edge_mut(id).tighten_uc(d, cand.value),
            CaseKind::Lower(_) => unreachable!("lower-case values are never derived"),
        };
        if !changed {
            return None;
        }
        self.bump(cand.rule);
        let prov = self.arena.record(Derivation {
            rule: cand.rule,
            parents: cand.parents,
            source: cand.source,
            target: cand.target,
            kind: cand.kind,
            value: cand.value,
            edge: None,
        });
        self.arena.set_current(id, cand.kind, prov);
        self.enqueue(id);

        // values below the horizon certify a pumped negative cycle
        if cand.value < -self.horizon {
            tracing::debug!("value {} escaped the horizon {}", cand.value, self.horizon);
            return Some(self.arena.build_cycle(&[prov], cand.value));
        }

        // letter-removal: a wait not longer than the contingent's lower bound
        // is an ordinary constraint
        if let CaseKind::Upper(d) = cand.kind {
            let lower = self.g.link_of_letter(d).map(|l| l.lower);
            if lower.is_some_and(|x| cand.value >= -x) {
                return self.apply(Candidate {
                    source: cand.source,
                    target: cand.target,
                    kind: CaseKind::Ordinary,
                    value: cand.value,
                    rule: RuleId::LetterRemoval,
                    parents: [Some(prov), None],
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checkers::init::init_and_check;
    use crate::checkers::stnu::srnc::SrncEdgeType;

    fn check(mut g: TNGraph, only_to_z: bool) -> (StnuOutcome, CheckStatus) {
        let mut status = CheckStatus::default();
        let info = init_and_check(&mut g, &mut status, true).unwrap();
        let deadline = Deadline::start(None);
        let outcome = RulEngine::new(&mut g, &mut status, info, only_to_z).check(&deadline);
        (outcome, status)
    }

    fn controllable_link() -> TNGraph {
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
        g
    }

    #[test]
    fn controllable_network_reaches_fixpoint() {
        for to_z in [false, true] {
            let (outcome, status) = check(controllable_link(), to_z);
            assert!(matches!(outcome, StnuOutcome::Controllable), "only_to_z={to_z}");
            assert!(status.rules.total() > 0);
        }
    }

    #[test]
    fn squeezed_link_yields_lower_case_cycle() {
        // (A, 1, 10, C) with C → A of −2: following the lower bound violates
        // the ordinary constraint
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 1, 10, c);
        g.add_ordinary_edge(c, a, -2);
        let (outcome, _) = check(g, false);
        let StnuOutcome::NotControllable(srnc) = outcome else {
            panic!("expected a negative cycle witness");
        };
        assert_eq!(srnc.sum, -1);
        assert_eq!(srnc.edge_type, SrncEdgeType::LowerCase);
        assert!(srnc.is_simple);
        assert_eq!(srnc.expanded.len(), 2);
        assert_eq!(srnc.lower_case_counts.len(), 1);
        assert_eq!(srnc.lower_case_counts[0].1, 1);
    }
}
