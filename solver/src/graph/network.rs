//! The directed multigraph shared by every network variant.
//!
//! Nodes and edges are addressed by typed ids; names resolve through O(1)
//! indexes. Parallel constraints between the same ordered pair are merged
//! into a single edge (tightening), so each pair holds at most one edge and
//! `edge_between` is O(1).

use crate::core::{ALetter, IntCst, Label, Prop, SatInt};
use crate::create_index_type;
use crate::graph::{ConstraintType, Edge, Node};
use crate::collections::ref_store::{IdMap, IdVec};

create_index_type!(NodeId);
create_index_type!(EdgeId);

/// Name reserved for the network's source time-point.
pub const ZERO_NODE_NAME: &str = "Z";

/// A contingent link `(A, x, y, C)`: the environment chooses `C − A` in `[x, y]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContingentLink {
    pub activation: NodeId,
    pub contingent: NodeId,
    pub lower: IntCst,
    pub upper: IntCst,
    pub letter: ALetter,
}

#[derive(Clone, Debug)]
struct EdgeSlot {
    source: NodeId,
    target: NodeId,
    edge: Edge,
}

/// A temporal constraint network.
#[derive(Clone, Debug, Default)]
pub struct TNGraph {
    nodes: IdVec<NodeId, Node>,
    edges: IdVec<EdgeId, Option<EdgeSlot>>,
    out: IdVec<NodeId, Vec<EdgeId>>,
    inc: IdVec<NodeId, Vec<EdgeId>>,
    node_index: hashbrown::HashMap<String, NodeId>,
    edge_index: hashbrown::HashMap<String, EdgeId>,
    pair_index: hashbrown::HashMap<(NodeId, NodeId), EdgeId>,
    z: Option<NodeId>,
    /// Contingent links, registered by initialization.
    links: Vec<ContingentLink>,
    link_of_contingent: IdMap<NodeId, usize>,
}

impl TNGraph {
    pub fn new() -> TNGraph {
        TNGraph::default()
    }

    // ----- nodes -----

    pub fn add_node(&mut self, node: Node) -> Result<NodeId, String> {
        if self.node_index.contains_key(node.name()) {
            return Err(format!("duplicate node name: {}", node.name()));
        }
        let name = node.name().to_string();
        let id = self.nodes.push(node);
        self.out.push(Vec::new());
        self.inc.push(Vec::new());
        self.node_index.insert(name.clone(), id);
        if name == ZERO_NODE_NAME {
            self.z = Some(id);
        }
        Ok(id)
    }

    /// Adds a plain node with the given name.
    pub fn add_named(&mut self, name: &str) -> Result<NodeId, String> {
        self.add_node(Node::new(name))
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys()
    }

    /// The designated source, set when a node named `Z` is added.
    pub fn z(&self) -> Option<NodeId> {
        self.z
    }

    pub fn observers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids().filter(|&n| self.nodes[n].is_observer())
    }

    pub fn observer_count(&self) -> usize {
        self.observers().count()
    }

    /// The observation time-point of proposition `p`, if any.
    pub fn observer_of(&self, p: Prop) -> Option<NodeId> {
        self.node_ids().find(|&n| self.nodes[n].observes == Some(p))
    }

    pub fn contingent_count(&self) -> usize {
        self.node_ids().filter(|&n| self.nodes[n].is_contingent()).count()
    }

    /// Union of the propositions observed or mentioned on node labels and
    /// labeled values.
    pub fn propositions_used(&self) -> Vec<Prop> {
        let mut mask = Label::empty();
        for n in self.nodes.values() {
            mask = mask.conjunction_extended(n.label);
            if let Some(p) = n.observes {
                mask = mask.conjunction_extended(Label::empty().set(p, crate::core::LitState::Straight));
            }
        }
        for slot in self.edges.values().flatten() {
            for (l, _) in slot.edge.labeled.iter() {
                mask = mask.conjunction_extended(l);
            }
            for (_, l, _) in slot.edge.upper_case.iter() {
                mask = mask.conjunction_extended(l);
            }
        }
        mask.props().collect()
    }

    // ----- edges -----

    /// The edge `source → target`, creating an empty one if absent.
    pub fn ensure_edge(&mut self, source: NodeId, target: NodeId) -> EdgeId {
        if let Some(&id) = self.pair_index.get(&(source, target)) {
            return id;
        }
        let name = format!("{}-{}", self.nodes[source].name(), self.nodes[target].name());
        self.insert_edge(name, source, target)
    }

    /// Inserts a named empty edge. If the pair already holds an edge, that
    /// edge is returned and the name is ignored (parallel constraints merge).
    pub fn add_edge_named(&mut self, name: impl Into<String>, source: NodeId, target: NodeId) -> EdgeId {
        if let Some(&id) = self.pair_index.get(&(source, target)) {
            return id;
        }
        self.insert_edge(name.into(), source, target)
    }

    fn insert_edge(&mut self, mut name: String, source: NodeId, target: NodeId) -> EdgeId {
        while self.edge_index.contains_key(&name) {
            name.push('\'');
        }
        let id = self.edges.push(Some(EdgeSlot {
            source,
            target,
            edge: Edge::new(name.clone()),
        }));
        self.out[source].push(id);
        self.inc[target].push(id);
        self.edge_index.insert(name, id);
        self.pair_index.insert((source, target), id);
        id
    }

    /// Adds (or tightens) an ordinary constraint `target − source ≤ weight`.
    pub fn add_ordinary_edge(&mut self, source: NodeId, target: NodeId, weight: IntCst) -> EdgeId {
        let id = self.ensure_edge(source, target);
        self.edge_mut(id).tighten_value(SatInt::new(weight));
        id
    }

    /// Adds (or tightens) a labeled value on `source → target`.
    pub fn add_labeled_value(&mut self, source: NodeId, target: NodeId, label: Label, value: IntCst) -> EdgeId {
        let id = self.ensure_edge(source, target);
        self.edge_mut(id).labeled.merge(label, value);
        id
    }

    /// Declares a contingent link `(activation, lower, upper, contingent)`:
    /// registers it and materializes its two companion edges. The bounds are
    /// kept in the registry (requirement constraints merged onto the same
    /// pair cannot distort them); initialization validates `0 < x < y`. The
    /// contingent node is tagged with a fresh a-letter, preferring the first
    /// character of its name.
    pub fn add_contingent_link(&mut self, activation: NodeId, lower: IntCst, upper: IntCst, contingent: NodeId) {
        let ea = self.ensure_edge(activation, contingent);
        {
            let e = self.edge_mut(ea);
            e.kind = ConstraintType::Contingent;
            e.tighten_value(SatInt::new(upper));
        }
        let eb = self.ensure_edge(contingent, activation);
        {
            let e = self.edge_mut(eb);
            e.kind = ConstraintType::Contingent;
            e.tighten_value(SatInt::new(-lower));
        }
        let letter = match self.nodes[contingent].aletter {
            Some(l) => l,
            None => {
                let l = self.fresh_aletter(self.nodes[contingent].name());
                self.nodes[contingent].aletter = Some(l);
                l
            }
        };
        self.link_of_contingent.insert(contingent, self.links.len());
        self.links.push(ContingentLink {
            activation,
            contingent,
            lower,
            upper,
            letter,
        });
    }

    /// An a-letter not yet naming any link, preferring the first character of
    /// `name`.
    fn fresh_aletter(&self, name: &str) -> ALetter {
        let used: Vec<char> = self.links.iter().map(|l| l.letter.0).collect();
        let preferred = name.chars().next().filter(|c| c.is_ascii_alphanumeric());
        preferred
            .into_iter()
            .chain(('A'..='Z').chain('a'..='z'))
            .find(|c| !used.contains(c))
            .map(ALetter)
            .unwrap_or(ALetter('?'))
    }

    /// Rewrites the bounds of the link on `contingent`, both in the registry
    /// and on the companion edges (PSTN range shrinking). Requirement values
    /// previously merged onto the companion edges are overwritten.
    pub fn set_link_bounds(&mut self, contingent: NodeId, lower: IntCst, upper: IntCst) {
        let Some(&i) = self.link_of_contingent.get(contingent) else {
            return;
        };
        self.links[i].lower = lower;
        self.links[i].upper = upper;
        let (a, c) = (self.links[i].activation, self.links[i].contingent);
        let ac = self.ensure_edge(a, c);
        self.edge_mut(ac).value = SatInt::new(upper);
        let ca = self.ensure_edge(c, a);
        self.edge_mut(ca).value = SatInt::new(-lower);
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id].as_ref().expect("removed edge").edge
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id].as_mut().expect("removed edge").edge
    }

    pub fn source(&self, id: EdgeId) -> NodeId {
        self.edges[id].as_ref().expect("removed edge").source
    }

    pub fn target(&self, id: EdgeId) -> NodeId {
        self.edges[id].as_ref().expect("removed edge").target
    }

    pub fn edge_by_name(&self, name: &str) -> Option<EdgeId> {
        self.edge_index.get(name).copied()
    }

    pub fn edge_between(&self, source: NodeId, target: NodeId) -> Option<EdgeId> {
        self.pair_index.get(&(source, target)).copied()
    }

    pub fn out_edges(&self, n: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.out[n].iter().copied()
    }

    pub fn in_edges(&self, n: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.inc[n].iter().copied()
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }

    pub fn num_edges(&self) -> usize {
        self.edge_ids().count()
    }

    pub fn remove_edge(&mut self, id: EdgeId) {
        if let Some(slot) = self.edges[id].take() {
            self.out[slot.source].retain(|&e| e != id);
            self.inc[slot.target].retain(|&e| e != id);
            self.edge_index.remove(slot.edge.name());
            self.pair_index.remove(&(slot.source, slot.target));
        }
    }

    /// Largest absolute finite ordinary weight over all edges.
    pub fn max_abs_weight(&self) -> IntCst {
        self.edges
            .values()
            .flatten()
            .filter_map(|s| s.edge.value.finite())
            .map(|v| v.abs())
            .max()
            .unwrap_or(0)
    }

    // ----- contingent registry -----

    pub fn links(&self) -> &[ContingentLink] {
        &self.links
    }

    pub fn link_of(&self, contingent: NodeId) -> Option<&ContingentLink> {
        self.link_of_contingent.get(contingent).map(|&i| &self.links[i])
    }

    pub fn link_of_letter(&self, letter: ALetter) -> Option<&ContingentLink> {
        self.links.iter().find(|l| l.letter == letter)
    }

    /// Deterministic order for queue tie-breaks: lexicographic on
    /// `(source_name, target_name, edge_name)`.
    pub fn edge_sort_key(&self, id: EdgeId) -> (String, String, String) {
        let slot = self.edges[id].as_ref().expect("removed edge");
        (
            self.nodes[slot.source].name().to_string(),
            self.nodes[slot.target].name().to_string(),
            slot.edge.name().to_string(),
        )
    }
}

impl std::fmt::Display for TNGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "nodes: {}", self.nodes.values().map(|n| n.name()).collect::<Vec<_>>().join(" "))?;
        for id in self.edge_ids() {
            let (s, t) = (self.source(id), self.target(id));
            writeln!(f, "  {} -> {} : {}", self.node(s).name(), self.node(t).name(), self.edge(id))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parallel_constraints_merge() {
        let mut g = TNGraph::new();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        let e1 = g.add_ordinary_edge(a, b, 5);
        let e2 = g.add_ordinary_edge(a, b, 3);
        assert_eq!(e1, e2);
        assert_eq!(g.num_edges(), 1);
        assert_eq!(g.edge(e1).value.unwrap(), 3);
        // looser constraint is absorbed
        g.add_ordinary_edge(a, b, 10);
        assert_eq!(g.edge(e1).value.unwrap(), 3);
    }

    #[test]
    fn z_is_recognized_by_name() {
        let mut g = TNGraph::new();
        assert!(g.z().is_none());
        let z = g.add_named("Z").unwrap();
        assert_eq!(g.z(), Some(z));
    }

    #[test]
    fn removal_clears_all_indexes() {
        let mut g = TNGraph::new();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        let e = g.add_ordinary_edge(a, b, 1);
        let name = g.edge(e).name().to_string();
        g.remove_edge(e);
        assert_eq!(g.num_edges(), 0);
        assert!(g.edge_between(a, b).is_none());
        assert!(g.edge_by_name(&name).is_none());
        assert_eq!(g.out_edges(a).count(), 0);
        assert_eq!(g.in_edges(b).count(), 0);
    }

    #[test]
    fn contingent_link_creates_companions() {
        let mut g = TNGraph::new();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 2, 5, c);
        let ac = g.edge_between(a, c).unwrap();
        let ca = g.edge_between(c, a).unwrap();
        assert_eq!(g.edge(ac).value.unwrap(), 5);
        assert_eq!(g.edge(ca).value.unwrap(), -2);
        assert_eq!(g.edge(ac).kind, ConstraintType::Contingent);
        assert!(g.node(c).is_contingent());
    }
}
