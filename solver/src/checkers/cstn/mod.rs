//! CSTN dynamic consistency checking.
//!
//! Edges carry labeled-value maps; propagation fires three rules until a
//! fixpoint or a negative self-loop:
//!
//! - LP: `(u,v,α:w₁) (v,z,β:w₂) → (u,z,α∧β:w₁+w₂)`; with q-rule handling,
//!   negative sums may conjoin inconsistent labels into unknown literals.
//! - R0: at an observation point `P?` of `p`, an outgoing value mentioning
//!   `p` below the reaction guard cannot depend on the outcome: `p` is
//!   removed from its label.
//! - R3: a value entering `X` from `P?` combines with another value entering
//!   `X` below the guard, dropping `p` and keeping the weaker weight.
//!
//! The reaction guard implements the Std / IR / ε semantics triple in one
//! parameter.

use crate::checkers::init::{init_and_check, InitInfo};
use crate::checkers::{CheckError, CheckStatus, CstnAlg, CstnConfig, Deadline, NegativeCycle, Semantics};
use crate::core::{IntCst, Label, SatInt};
use crate::graph::{ConstraintType, EdgeId, NodeId, TNGraph};
use crate::io::luke::{write_file, NetworkKind};
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

pub(crate) enum CstnOutcome {
    Consistent,
    Inconsistent(NegativeCycle),
    Timeout,
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum LabeledRule {
    Lp,
    R0,
    R3,
}

#[derive(Copy, Clone, Debug)]
struct Candidate {
    source: NodeId,
    target: NodeId,
    label: Label,
    value: IntCst,
    rule: LabeledRule,
}

/// Streamlines the network: pushes every node label onto the labeled values
/// of its incident edges (dropping the values that become inconsistent) and
/// clears the node labels.
pub(crate) fn streamline(g: &mut TNGraph) {
    for id in g.edge_ids().collect::<Vec<_>>() {
        let (u, v) = (g.source(id), g.target(id));
        let scenario = g.node(u).label.conjunction(g.node(v).label);
        let Some(scenario) = scenario else {
            // the endpoints can never coexist: the edge constrains nothing
            let entries: Vec<_> = g.edge(id).labeled.iter().collect();
            for (l, _) in entries {
                g.edge_mut(id).labeled.remove(l);
            }
            continue;
        };
        if scenario.is_empty() {
            continue;
        }
        let entries: Vec<_> = g.edge(id).labeled.iter().collect();
        for (l, w) in entries {
            g.edge_mut(id).labeled.remove(l);
            if let Some(pushed) = l.conjunction(scenario) {
                g.edge_mut(id).labeled.merge(pushed, w);
            } else {
                tracing::warn!("dropping labeled value {l}:{w} inconsistent with its node labels");
            }
        }
    }
    for n in g.node_ids().collect::<Vec<_>>() {
        g.node_mut(n).label = Label::empty();
    }
}

/// CSTN-specific normalization on top of the shared one: observers are
/// validated (one per used proposition), node labels are streamlined away and
/// ordinary values become empty-labeled entries.
pub(crate) fn init_cstn(
    g: &mut TNGraph,
    status: &mut CheckStatus,
    with_contingents: bool,
) -> Result<InitInfo, CheckError> {
    let info = init_and_check(g, status, with_contingents)?;
    for p in g.propositions_used() {
        let observers: Vec<NodeId> = g.node_ids().filter(|&n| g.node(n).observes == Some(p)).collect();
        match observers.len() {
            0 => {
                return Err(CheckError::NotWellDefined(format!(
                    "proposition {p} appears on labels but no time-point observes it"
                )))
            }
            1 => {}
            _ => {
                return Err(CheckError::NotWellDefined(format!(
                    "proposition {p} is observed by {} time-points",
                    observers.len()
                )))
            }
        }
    }
    streamline(g);
    for id in g.edge_ids().collect::<Vec<_>>() {
        if let Some(w) = g.edge(id).value.finite() {
            g.edge_mut(id).labeled.merge(Label::empty(), w);
            g.edge_mut(id).value = SatInt::NULL;
        }
    }
    Ok(info)
}

pub(crate) struct CstnEngine<'a> {
    g: &'a mut TNGraph,
    status: &'a mut CheckStatus,
    alg: CstnAlg,
    semantics: Semantics,
    horizon: IntCst,
    queue: VecDeque<EdgeId>,
    queued: hashbrown::HashSet<EdgeId>,
}

impl<'a> CstnEngine<'a> {
    pub fn new(
        g: &'a mut TNGraph,
        status: &'a mut CheckStatus,
        info: InitInfo,
        alg: CstnAlg,
        semantics: Semantics,
    ) -> CstnEngine<'a> {
        CstnEngine {
            g,
            status,
            alg,
            semantics,
            horizon: info.horizon,
            queue: VecDeque::new(),
            queued: hashbrown::HashSet::new(),
        }
    }

    fn enqueue(&mut self, id: EdgeId) {
        if self.queued.insert(id) {
            self.queue.push_back(id);
        }
    }

    pub fn check(mut self, deadline: &Deadline) -> CstnOutcome {
        let order: Vec<EdgeId> = self
            .g
            .edge_ids()
            .sorted_by_key(|&id| self.g.edge_sort_key(id))
            .collect();
        for id in order {
            self.enqueue(id);
        }

        let mut pops = 0u32;
        while let Some(id) = self.queue.pop_front() {
            self.queued.remove(&id);
            pops += 1;
            if pops % 64 == 0 && deadline.expired() {
                return CstnOutcome::Timeout;
            }
            self.status.cycles += 1;

            if let Some(witness) = self.propagate_edge(id) {
                return CstnOutcome::Inconsistent(witness);
            }
        }
        CstnOutcome::Consistent
    }

    /// Fires every rule in which the popped edge can participate.
    fn propagate_edge(&mut self, id: EdgeId) -> Option<NegativeCycle> {
        let (u, v) = (self.g.source(id), self.g.target(id));

        // R0 on the values leaving an observation point
        if self.g.node(u).observes.is_some() {
            for cand in self.r0_candidates(id) {
                if let Some(w) = self.apply(cand) {
                    return Some(w);
                }
            }
        }

        // R3 around the target of the popped edge
        for cand in self.r3_candidates(id) {
            if let Some(w) = self.apply(cand) {
                return Some(w);
            }
        }

        // LP with the popped edge first, then second
        let succ: Vec<EdgeId> = self
            .g
            .out_edges(v)
            .sorted_by_key(|&e| self.g.edge_sort_key(e))
            .collect();
        for e2 in succ {
            for cand in self.lp_candidates(id, e2) {
                if let Some(w) = self.apply(cand) {
                    return Some(w);
                }
            }
        }
        let pred: Vec<EdgeId> = self
            .g
            .in_edges(u)
            .sorted_by_key(|&e| self.g.edge_sort_key(e))
            .collect();
        for e1 in pred {
            for cand in self.lp_candidates(e1, id) {
                if let Some(w) = self.apply(cand) {
                    return Some(w);
                }
            }
        }
        None
    }

    /// Conjunction policy: plain conjunction for non-negative sums, extended
    /// (unknown-literal) conjunction for negative ones when the algorithm
    /// uses q-rules.
    fn conjoin(&self, a: Label, b: Label, sum: IntCst) -> Option<Label> {
        match a.conjunction(b) {
            Some(l) => Some(l),
            None if sum < 0 && self.alg.uses_unknowns() => Some(a.conjunction_extended(b)),
            None => None,
        }
    }

    fn lp_candidates(&self, e1: EdgeId, e2: EdgeId) -> SmallVec<[Candidate; 4]> {
        let mut out = SmallVec::new();
        let u = self.g.source(e1);
        let z = self.g.target(e2);
        if self.only_to_z() && Some(z) != self.g.z() && u != z {
            return out;
        }
        let m1 = &self.g.edge(e1).labeled;
        let m2 = &self.g.edge(e2).labeled;
        for (a, w1) in m1.iter() {
            for (b, w2) in m2.iter() {
                let sum = w1 + w2;
                if let Some(label) = self.conjoin(a, b, sum) {
                    out.push(Candidate {
                        source: u,
                        target: z,
                        label,
                        value: sum,
                        rule: LabeledRule::Lp,
                    });
                }
            }
        }
        out
    }

    /// R0 rewrites values on the popped edge `P? → X` in place.
    fn r0_candidates(&self, id: EdgeId) -> SmallVec<[Candidate; 4]> {
        let mut out = SmallVec::new();
        let u = self.g.source(id);
        let p = self.g.node(u).observes.expect("observer");
        let guard = self.semantics.reaction_guard();
        for (l, w) in self.g.edge(id).labeled.iter() {
            if l.contains(p) && w < guard {
                out.push(Candidate {
                    source: u,
                    target: self.g.target(id),
                    label: l.remove(p),
                    value: w,
                    rule: LabeledRule::R0,
                });
            }
        }
        out
    }

    /// R3 combinations where the popped edge plays either role.
    fn r3_candidates(&self, id: EdgeId) -> SmallVec<[Candidate; 8]> {
        let mut out = SmallVec::new();
        let (y, x) = (self.g.source(id), self.g.target(id));
        if self.only_to_z() && Some(x) != self.g.z() {
            return out;
        }
        // the popped edge as the observer side
        if self.g.node(y).observes.is_some() {
            let others: Vec<EdgeId> = self
                .g
                .in_edges(x)
                .filter(|&e| e != id)
                .sorted_by_key(|&e| self.g.edge_sort_key(e))
                .collect();
            for e2 in others {
                self.r3_pair(id, e2, &mut out);
            }
        }
        // the popped edge as the tightened side
        let observers: Vec<EdgeId> = self
            .g
            .in_edges(x)
            .filter(|&e| e != id && self.g.node(self.g.source(e)).observes.is_some())
            .sorted_by_key(|&e| self.g.edge_sort_key(e))
            .collect();
        for e1 in observers {
            self.r3_pair(e1, id, &mut out);
        }
        out
    }

    /// `e1 = (P? → X)` with `(γ, v)`, `e2 = (Y → X)` with `(β p̃, w)`:
    /// tighten `e2` with `(γ ∧ β∖p, max(v, w))`.
    fn r3_pair(&self, e1: EdgeId, e2: EdgeId, out: &mut SmallVec<[Candidate; 8]>) {
        let obs = self.g.source(e1);
        let Some(p) = self.g.node(obs).observes else { return };
        let y = self.g.source(e2);
        if y == obs {
            return;
        }
        let guard = self.semantics.reaction_guard();
        for (beta, w) in self.g.edge(e2).labeled.iter() {
            if !beta.contains(p) || w >= guard {
                continue;
            }
            for (gamma, v) in self.g.edge(e1).labeled.iter() {
                let value = v.max(w);
                if let Some(label) = self.conjoin(gamma, beta.remove(p), value) {
                    out.push(Candidate {
                        source: y,
                        target: self.g.target(e2),
                        label,
                        value,
                        rule: LabeledRule::R3,
                    });
                }
            }
        }
    }

    fn only_to_z(&self) -> bool {
        self.alg.only_to_z()
    }

    fn bump(&mut self, rule: LabeledRule) {
        match rule {
            LabeledRule::Lp => self.status.rules.labeled_prop += 1,
            LabeledRule::R0 => self.status.rules.r0 += 1,
            LabeledRule::R3 => self.status.rules.r3 += 1,
        }
    }

    /// Merges a candidate into the graph. A negative self-loop under an
    /// unknown-free label witnesses inconsistency; q-labeled loops carry no
    /// verdict on their own and are discarded, as are q-values escaping the
    /// horizon (they can only keep falling).
    fn apply(&mut self, cand: Candidate) -> Option<NegativeCycle> {
        if cand.source == cand.target {
            if cand.value < 0 && !cand.label.contains_unknown() {
                self.bump(cand.rule);
                return Some(NegativeCycle {
                    nodes: vec![cand.source, cand.source],
                    total: cand.value,
                });
            }
            return None;
        }
        if cand.value < -self.horizon {
            if !cand.label.contains_unknown() {
                self.bump(cand.rule);
                return Some(NegativeCycle {
                    nodes: vec![cand.source, cand.target],
                    total: cand.value,
                });
            }
            return None;
        }
        let existed = self.g.edge_between(cand.source, cand.target).is_some();
        let id = self.g.ensure_edge(cand.source, cand.target);
        if !existed {
            self.g.edge_mut(id).kind = ConstraintType::Derived;
        }
        if !self.g.edge_mut(id).labeled.merge(cand.label, cand.value) {
            return None;
        }
        self.bump(cand.rule);
        if self.alg == CstnAlg::HunsbergerPosenato20 && Some(cand.target) == self.g.z() {
            self.status.rules.potential_update += 1;
        }
        self.enqueue(id);
        None
    }
}

/// CSTN algorithm object.
pub struct Cstn {
    g: TNGraph,
    pub config: CstnConfig,
    status: CheckStatus,
    info: Option<InitInfo>,
}

impl Cstn {
    pub fn new(g: TNGraph) -> Cstn {
        Cstn::with_config(g, CstnConfig::default())
    }

    pub fn with_timeout(g: TNGraph, seconds: u64) -> Cstn {
        let config = CstnConfig {
            time_budget: Some(Duration::from_secs(seconds)),
            ..CstnConfig::default()
        };
        Cstn::with_config(g, config)
    }

    pub fn with_config(g: TNGraph, config: CstnConfig) -> Cstn {
        Cstn {
            g,
            config,
            status: CheckStatus::default(),
            info: None,
        }
    }

    pub fn init_and_check(&mut self) -> Result<&CheckStatus, CheckError> {
        self.config.validate()?;
        self.info = Some(init_cstn(&mut self.g, &mut self.status, false)?);
        Ok(&self.status)
    }

    /// Runs the configured dynamic-consistency check.
    pub fn dynamic_consistency_check(&mut self) -> Result<&CheckStatus, CheckError> {
        self.config.validate()?;
        if !self.status.initialized {
            self.init_and_check()?;
        }
        let info = self.info.expect("initialized");
        let deadline = Deadline::start(self.config.time_budget);
        let outcome = CstnEngine::new(
            &mut self.g,
            &mut self.status,
            info,
            self.config.alg,
            self.config.semantics,
        )
        .check(&deadline);
        self.status.execution_time = deadline.elapsed();
        match outcome {
            CstnOutcome::Consistent => {
                self.status.finished = true;
                self.status.consistent = Some(true);
            }
            CstnOutcome::Inconsistent(witness) => {
                self.status.finished = true;
                self.status.consistent = Some(false);
                self.status.negative_cycle = Some(witness);
            }
            CstnOutcome::Timeout => {
                self.status.finished = false;
                self.status.timeout = true;
            }
        }
        Ok(&self.status)
    }

    pub fn graph(&self) -> &TNGraph {
        &self.g
    }

    pub fn set_graph(&mut self, g: TNGraph) {
        self.g = g;
        self.reset();
    }

    pub fn checked_graph(&self) -> TNGraph {
        self.g.clone()
    }

    pub fn into_graph(self) -> TNGraph {
        self.g
    }

    pub fn check_status(&self) -> &CheckStatus {
        &self.status
    }

    pub fn reset(&mut self) {
        self.status.reset();
        self.info = None;
    }

    pub fn save_graph_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        write_file(path, &self.g, NetworkKind::Cstn)
    }
}
