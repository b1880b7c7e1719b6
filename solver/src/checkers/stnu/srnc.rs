//! Semi-reducible negative cycles and the provenance arena.
//!
//! Every derived constraint records the rule that produced it and the arena
//! ids of its parents instead of pointers to other edges, so the edge graph
//! stays free of ownership cycles. When propagation closes a negative
//! self-loop, walking the arena backward reconstructs the witness cycle down
//! to base edges.

use crate::collections::ref_store::IdVec;
use crate::core::{ALetter, IntCst};
use crate::create_index_type;
use crate::graph::{EdgeId, NodeId};
use std::collections::HashMap;

create_index_type!(ProvId);

/// Shape of one constraint in the labeled distance graph.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum CaseKind {
    Ordinary,
    Upper(ALetter),
    Lower(ALetter),
}

/// Propagation rules of the engine.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RuleId {
    /// The constraint was present in the input.
    Base,
    NoCase,
    UpperCase,
    LowerCase,
    CrossCase,
    LetterRemoval,
}

/// One record of the provenance arena: a constraint snapshot plus how it was
/// obtained.
#[derive(Copy, Clone, Debug)]
pub struct Derivation {
    pub rule: RuleId,
    pub parents: [Option<ProvId>; 2],
    pub source: NodeId,
    pub target: NodeId,
    pub kind: CaseKind,
    pub value: IntCst,
    /// The graph edge carrying a base constraint; derived snapshots may
    /// outlive the edge value that was since tightened further.
    pub edge: Option<EdgeId>,
}

/// One edge of a reported cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SrncEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: CaseKind,
    pub value: IntCst,
    pub edge: Option<EdgeId>,
}

impl SrncEdge {
    fn of(d: &Derivation) -> SrncEdge {
        SrncEdge {
            source: d.source,
            target: d.target,
            kind: d.kind,
            value: d.value,
            edge: d.edge,
        }
    }
}

/// Overall shape of a semi-reducible negative cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SrncEdgeType {
    Ordinary,
    UpperCase,
    LowerCase,
    Mixed,
}

/// Witness of non-controllability, with per-edge provenance.
#[derive(Clone, Debug)]
pub struct SemiReducibleCycle {
    /// The constraints whose combination closed the negative loop, at the
    /// level they were combined (possibly derived).
    pub cycle: Vec<SrncEdge>,
    /// The cycle with every derived constraint inlined down to base edges.
    pub expanded: Vec<SrncEdge>,
    pub edge_type: SrncEdgeType,
    /// Lower-case participations per contingent letter.
    pub lower_case_counts: Vec<(ALetter, u32)>,
    /// Upper-case participations per contingent letter.
    pub upper_case_counts: Vec<(ALetter, u32)>,
    /// No base edge appears twice in the expansion.
    pub is_simple: bool,
    /// Sum of the expanded edge values; strictly negative.
    pub sum: IntCst,
    /// Largest multiplicity of a single base edge in the expansion.
    pub max_multiplicity: u32,
}

/// Hard cap on the expansion size; a deeper witness is truncated (the counts
/// and the flags are computed on the truncated expansion).
const MAX_EXPANSION: usize = 16_384;

/// The arena of derivations accumulated during one check.
#[derive(Default)]
pub(crate) struct ProvenanceArena {
    records: IdVec<ProvId, Derivation>,
    /// Provenance of the current (tightest) constraint of each shape.
    current: HashMap<(EdgeId, CaseKind), ProvId>,
}

impl ProvenanceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, d: Derivation) -> ProvId {
        self.records.push(d)
    }

    pub fn get(&self, id: ProvId) -> &Derivation {
        &self.records[id]
    }

    pub fn set_current(&mut self, edge: EdgeId, kind: CaseKind, id: ProvId) {
        self.current.insert((edge, kind), id);
    }

    pub fn current(&self, edge: EdgeId, kind: CaseKind) -> Option<ProvId> {
        self.current.get(&(edge, kind)).copied()
    }

    /// Inlines a derivation to base edges, appending to `out`. Parent ids are
    /// always smaller than the derived id, so the walk terminates.
    fn expand_into(&self, id: ProvId, out: &mut Vec<SrncEdge>) {
        if out.len() >= MAX_EXPANSION {
            return;
        }
        let d = self.get(id);
        match d.rule {
            RuleId::Base => out.push(SrncEdge::of(d)),
            _ => {
                for p in d.parents.into_iter().flatten() {
                    self.expand_into(p, out);
                }
            }
        }
    }

    /// Builds the full witness from the derivations that closed a negative
    /// loop.
    pub fn build_cycle(&self, closing: &[ProvId], sum_hint: IntCst) -> SemiReducibleCycle {
        let cycle: Vec<SrncEdge> = closing.iter().map(|&id| SrncEdge::of(self.get(id))).collect();
        let mut expanded = Vec::new();
        for &id in closing {
            self.expand_into(id, &mut expanded);
        }
        if expanded.len() >= MAX_EXPANSION {
            tracing::warn!("cycle expansion truncated at {MAX_EXPANSION} edges");
        }

        let mut lower: HashMap<ALetter, u32> = HashMap::new();
        let mut upper: HashMap<ALetter, u32> = HashMap::new();
        for e in &expanded {
            match e.kind {
                CaseKind::Ordinary => {}
                CaseKind::Upper(a) => *upper.entry(a).or_default() += 1,
                CaseKind::Lower(a) => *lower.entry(a).or_default() += 1,
            }
        }
        let edge_type = match (lower.is_empty(), upper.is_empty()) {
            (true, true) => SrncEdgeType::Ordinary,
            (true, false) => SrncEdgeType::UpperCase,
            (false, true) => SrncEdgeType::LowerCase,
            (false, false) => SrncEdgeType::Mixed,
        };

        let mut occurrences: HashMap<(NodeId, NodeId, CaseKind), u32> = HashMap::new();
        for e in &expanded {
            *occurrences.entry((e.source, e.target, e.kind)).or_default() += 1;
        }
        let max_multiplicity = occurrences.values().copied().max().unwrap_or(0);
        let is_simple = max_multiplicity <= 1;

        let sum = if expanded.len() < MAX_EXPANSION {
            expanded.iter().map(|e| e.value as i64).sum::<i64>() as IntCst
        } else {
            sum_hint
        };

        let mut lower_case_counts: Vec<_> = lower.into_iter().collect();
        let mut upper_case_counts: Vec<_> = upper.into_iter().collect();
        lower_case_counts.sort_by_key(|&(a, _)| a);
        upper_case_counts.sort_by_key(|&(a, _)| a);

        let cycle = SemiReducibleCycle {
            cycle,
            expanded,
            edge_type,
            lower_case_counts,
            upper_case_counts,
            is_simple,
            sum,
            max_multiplicity,
        };
        tracing::debug!(
            "negative cycle witness: {} base edges, sum {}, type {:?}",
            cycle.expanded.len(),
            cycle.sum,
            cycle.edge_type
        );
        cycle
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::TNGraph;

    #[test]
    fn expansion_inlines_to_base_edges() {
        let mut g = TNGraph::new();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        let e1 = g.add_ordinary_edge(a, c, 1);
        let e2 = g.add_ordinary_edge(c, a, -2);

        let mut arena = ProvenanceArena::new();
        let base = |edge, source, target, kind, value| Derivation {
            rule: RuleId::Base,
            parents: [None, None],
            source,
            target,
            kind,
            value,
            edge: Some(edge),
        };
        let lc = arena.record(base(e1, a, c, CaseKind::Lower(ALetter('C')), 1));
        let ord = arena.record(base(e2, c, a, CaseKind::Ordinary, -2));

        let srnc = arena.build_cycle(&[lc, ord], -1);
        assert_eq!(srnc.sum, -1);
        assert_eq!(srnc.edge_type, SrncEdgeType::LowerCase);
        assert!(srnc.is_simple);
        assert_eq!(srnc.max_multiplicity, 1);
        assert_eq!(srnc.expanded.len(), 2);
        assert_eq!(srnc.lower_case_counts, vec![(ALetter('C'), 1)]);
        assert!(srnc.upper_case_counts.is_empty());
    }

    #[test]
    fn repeated_base_edges_break_simplicity() {
        let mut g = TNGraph::new();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        let e = g.add_ordinary_edge(a, b, -1);
        let back = g.add_ordinary_edge(b, a, 0);

        let mut arena = ProvenanceArena::new();
        let ab = arena.record(Derivation {
            rule: RuleId::Base,
            parents: [None, None],
            source: a,
            target: b,
            kind: CaseKind::Ordinary,
            value: -1,
            edge: Some(e),
        });
        let ba = arena.record(Derivation {
            rule: RuleId::Base,
            parents: [None, None],
            source: b,
            target: a,
            kind: CaseKind::Ordinary,
            value: 0,
            edge: Some(back),
        });
        let aa = arena.record(Derivation {
            rule: RuleId::NoCase,
            parents: [Some(ab), Some(ba)],
            source: a,
            target: a,
            kind: CaseKind::Ordinary,
            value: -1,
            edge: None,
        });
        // the loop traversed twice
        let srnc = arena.build_cycle(&[aa, aa], -2);
        assert_eq!(srnc.expanded.len(), 4);
        assert!(!srnc.is_simple);
        assert_eq!(srnc.max_multiplicity, 2);
        assert_eq!(srnc.sum, -2);
        assert_eq!(srnc.edge_type, SrncEdgeType::Ordinary);
    }
}
