//! CSTNU dynamic controllability checking.
//!
//! The kernel runs the conditional rules (LP, R0, R3) together with the
//! labeled liftings of the uncertainty rules: upper-case propagation,
//! lower-case propagation, cross-case and letter-removal, all operating on
//! labeled value maps. The three upper-case flavors share one code path and
//! one counter.

mod to_cstn;

pub use to_cstn::cstnu_to_cstn;

use crate::checkers::cstn::{init_cstn, CstnOutcome};
use crate::checkers::init::InitInfo;
use crate::checkers::{CheckError, CheckStatus, CstnConfig, Deadline, NegativeCycle, Semantics};
use crate::core::{ALetter, IntCst, Label, Prop};
use crate::graph::{ConstraintType, EdgeId, LowerCase, NodeId, TNGraph};
use crate::io::luke::{write_file, NetworkKind};
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Shape of a candidate constraint.
#[derive(Copy, Clone, Debug)]
enum Shape {
    Labeled,
    Upper(ALetter),
}

#[derive(Copy, Clone, Debug)]
enum CstnuRule {
    Lp,
    R0,
    R3,
    UpperCase,
    LowerCase,
    CrossCase,
    LetterRemoval,
}

#[derive(Copy, Clone, Debug)]
struct Candidate {
    source: NodeId,
    target: NodeId,
    shape: Shape,
    label: Label,
    value: IntCst,
    rule: CstnuRule,
}

pub(crate) struct CstnuEngine<'a> {
    g: &'a mut TNGraph,
    status: &'a mut CheckStatus,
    semantics: Semantics,
    use_unknowns: bool,
    horizon: IntCst,
    queue: VecDeque<EdgeId>,
    queued: hashbrown::HashSet<EdgeId>,
}

impl<'a> CstnuEngine<'a> {
    pub fn new(
        g: &'a mut TNGraph,
        status: &'a mut CheckStatus,
        info: InitInfo,
        semantics: Semantics,
    ) -> CstnuEngine<'a> {
        CstnuEngine {
            g,
            status,
            semantics,
            use_unknowns: true,
            horizon: info.horizon,
            queue: VecDeque::new(),
            queued: hashbrown::HashSet::new(),
        }
    }

    /// Installs the labeled case values of every contingent link.
    fn install_case_values(&mut self) {
        for link in self.g.links().to_vec() {
            let ac = self.g.edge_between(link.activation, link.contingent).expect("contingent edge");
            self.g.edge_mut(ac).lower_case = Some(LowerCase {
                letter: link.letter,
                label: Label::empty(),
                value: link.lower,
            });
            let ca = self.g.edge_between(link.contingent, link.activation).expect("companion edge");
            self.g.edge_mut(ca).upper_case.merge(link.letter, Label::empty(), -link.upper);
        }
    }

    fn enqueue(&mut self, id: EdgeId) {
        if self.queued.insert(id) {
            self.queue.push_back(id);
        }
    }

    pub fn check(mut self, deadline: &Deadline) -> CstnOutcome {
        self.install_case_values();
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

    fn propagate_edge(&mut self, id: EdgeId) -> Option<NegativeCycle> {
        let (u, v) = (self.g.source(id), self.g.target(id));

        if self.g.node(u).observes.is_some() {
            for cand in self.r0_candidates(id) {
                if let Some(w) = self.apply(cand) {
                    return Some(w);
                }
            }
        }
        for cand in self.r3_candidates(id) {
            if let Some(w) = self.apply(cand) {
                return Some(w);
            }
        }
        let succ: Vec<EdgeId> = self
            .g
            .out_edges(v)
            .sorted_by_key(|&e| self.g.edge_sort_key(e))
            .collect();
        for e2 in succ {
            for cand in self.pair_candidates(id, e2) {
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
            for cand in self.pair_candidates(e1, id) {
                if let Some(w) = self.apply(cand) {
                    return Some(w);
                }
            }
        }
        None
    }

    fn conjoin(&self, a: Label, b: Label, sum: IntCst) -> Option<Label> {
        match a.conjunction(b) {
            Some(l) => Some(l),
            None if sum < 0 && self.use_unknowns => Some(a.conjunction_extended(b)),
            None => None,
        }
    }

    /// All binary rules on the pair `(e1: u→v, e2: v→z)`.
    fn pair_candidates(&self, e1: EdgeId, e2: EdgeId) -> SmallVec<[Candidate; 8]> {
        let mut out = SmallVec::new();
        let u = self.g.source(e1);
        let z = self.g.target(e2);
        let c1 = self.g.edge(e1);
        let c2 = self.g.edge(e2);

        for (a, w1) in c1.labeled.iter() {
            // LP
            for (b, w2) in c2.labeled.iter() {
                let sum = w1 + w2;
                if let Some(label) = self.conjoin(a, b, sum) {
                    out.push(Candidate {
                        source: u,
                        target: z,
                        shape: Shape::Labeled,
                        label,
                        value: sum,
                        rule: CstnuRule::Lp,
                    });
                }
            }
            // upper-case propagation; the letter collapses on a loop at the
            // activation
            for (d, b, y) in c2.upper_case.iter() {
                let sum = w1 + y;
                let Some(label) = self.conjoin(a, b, sum) else { continue };
                let shape = if u == z { Shape::Labeled } else { Shape::Upper(d) };
                out.push(Candidate {
                    source: u,
                    target: z,
                    shape,
                    label,
                    value: sum,
                    rule: CstnuRule::UpperCase,
                });
            }
        }

        if let Some(lc) = c1.lower_case {
            // lower-case: only through negative continuations
            for (b, w2) in c2.labeled.iter() {
                if w2 >= 0 {
                    continue;
                }
                let sum = lc.value + w2;
                if let Some(label) = self.conjoin(lc.label, b, sum) {
                    out.push(Candidate {
                        source: u,
                        target: z,
                        shape: Shape::Labeled,
                        label,
                        value: sum,
                        rule: CstnuRule::LowerCase,
                    });
                }
            }
            // cross-case: distinct letters only
            for (d, b, y) in c2.upper_case.iter() {
                if d == lc.letter || y >= 0 {
                    continue;
                }
                let sum = lc.value + y;
                let Some(label) = self.conjoin(lc.label, b, sum) else { continue };
                let shape = if u == z { Shape::Labeled } else { Shape::Upper(d) };
                out.push(Candidate {
                    source: u,
                    target: z,
                    shape,
                    label,
                    value: sum,
                    rule: CstnuRule::CrossCase,
                });
            }
        }
        out
    }

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
                    shape: Shape::Labeled,
                    label: l.remove(p),
                    value: w,
                    rule: CstnuRule::R0,
                });
            }
        }
        out
    }

    fn r3_candidates(&self, id: EdgeId) -> SmallVec<[Candidate; 8]> {
        let mut out = SmallVec::new();
        let (y, x) = (self.g.source(id), self.g.target(id));
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
                        shape: Shape::Labeled,
                        label,
                        value,
                        rule: CstnuRule::R3,
                    });
                }
            }
        }
    }

    fn bump(&mut self, rule: CstnuRule) {
        match rule {
            CstnuRule::Lp => self.status.rules.labeled_prop += 1,
            CstnuRule::R0 => self.status.rules.r0 += 1,
            CstnuRule::R3 => self.status.rules.r3 += 1,
            CstnuRule::UpperCase => self.status.rules.upper_case += 1,
            CstnuRule::LowerCase => self.status.rules.lower_case += 1,
            CstnuRule::CrossCase => self.status.rules.cross_case += 1,
            CstnuRule::LetterRemoval => self.status.rules.letter_removal += 1,
        }
    }

    fn apply(&mut self, cand: Candidate) -> Option<NegativeCycle> {
        // unknown-free negative self-loops are the witness; q-labeled loops
        // carry no verdict and are discarded, as are q-values escaping the
        // horizon
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
        let changed = match cand.shape {
            Shape::Labeled => self.g.edge_mut(id).labeled.merge(cand.label, cand.value),
            Shape::Upper(d) => self.g.edge_mut(id).upper_case.merge(d, cand.label, cand.value),
        };
        if !changed {
            return None;
        }
        self.bump(cand.rule);
        self.enqueue(id);
        // letter-removal on the freshly tightened upper-case value
        if let Shape::Upper(d) = cand.shape {
            let lower = self.g.link_of_letter(d).map(|l| l.lower);
            if lower.is_some_and(|x| cand.value >= -x) {
                return self.apply(Candidate {
                    source: cand.source,
                    target: cand.target,
                    shape: Shape::Labeled,
                    label: cand.label,
                    value: cand.value,
                    rule: CstnuRule::LetterRemoval,
                });
            }
        }
        None
    }
}

/// CSTNU algorithm object.
pub struct Cstnu {
    g: TNGraph,
    pub config: CstnConfig,
    status: CheckStatus,
    info: Option<InitInfo>,
}

impl Cstnu {
    pub fn new(g: TNGraph) -> Cstnu {
        Cstnu::with_config(g, CstnConfig::default())
    }

    pub fn with_timeout(g: TNGraph, seconds: u64) -> Cstnu {
        let config = CstnConfig {
            time_budget: Some(Duration::from_secs(seconds)),
            ..CstnConfig::default()
        };
        Cstnu::with_config(g, config)
    }

    pub fn with_config(g: TNGraph, config: CstnConfig) -> Cstnu {
        Cstnu {
            g,
            config,
            status: CheckStatus::default(),
            info: None,
        }
    }

    pub fn init_and_check(&mut self) -> Result<&CheckStatus, CheckError> {
        self.config.validate()?;
        self.info = Some(init_cstn(&mut self.g, &mut self.status, true)?);
        Ok(&self.status)
    }

    /// Runs the dynamic-controllability check.
    pub fn dynamic_controllability_check(&mut self) -> Result<&CheckStatus, CheckError> {
        self.config.validate()?;
        if !self.status.initialized {
            self.init_and_check()?;
        }
        let info = self.info.expect("initialized");
        let deadline = Deadline::start(self.config.time_budget);
        let outcome =
            CstnuEngine::new(&mut self.g, &mut self.status, info, self.config.semantics).check(&deadline);
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

    /// Externally visible duration ranges of the contingent links, one
    /// four-tuple `(activation, x, y, contingent)` per link.
    pub fn contingent_ranges(&self) -> Vec<(String, IntCst, IntCst, String)> {
        self.g
            .links()
            .iter()
            .map(|l| {
                (
                    self.g.node(l.activation).name().to_string(),
                    l.lower,
                    l.upper,
                    self.g.node(l.contingent).name().to_string(),
                )
            })
            .collect()
    }

    /// The equivalent CSTN of the owned network (one observation point per
    /// contingent link); check it under IR semantics.
    pub fn to_cstn(&self) -> Result<TNGraph, CheckError> {
        cstnu_to_cstn(&self.g)
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
        write_file(path, &self.g, NetworkKind::Cstnu)
    }
}

/// A proposition not yet used in `g`, preferring the lowercase form of the
/// contingent's a-letter.
pub(crate) fn fresh_prop(g: &TNGraph, letter: ALetter, extra_used: &[Prop]) -> Option<Prop> {
    let used: Vec<Prop> = g.propositions_used().into_iter().chain(extra_used.iter().copied()).collect();
    let candidates = std::iter::once(letter.0.to_ascii_lowercase())
        .chain('a'..='z')
        .chain('A'..='Z')
        .chain('0'..='9');
    candidates
        .filter_map(Prop::from_char)
        .find(|p| !used.contains(p))
}
