//! Shortest-path engines of the STN checker.
//!
//! Distances are reported *against Z*: the algorithms run on the reverse
//! graph, so `dist(v)` is the length of the shortest path `v ↝ Z` (after
//! initialization every node has such a path of weight ≤ 0).

use crate::checkers::{Deadline, NegativeCycle, DEADLINE_PERIOD};
use crate::collections::ref_store::IdMap;
use crate::core::IntCst;
use crate::graph::{ConstraintType, EdgeId, NodeId, TNGraph};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Result of a single-source computation.
pub(crate) enum StnOutcome {
    Consistent(IdMap<NodeId, IntCst>),
    Inconsistent(NegativeCycle),
    Timeout,
}

/// One directed relaxation step `source --weight--> target`, already oriented
/// the way the algorithm traverses it.
#[derive(Copy, Clone, Debug)]
struct Arc {
    source: NodeId,
    target: NodeId,
    weight: IntCst,
}

/// All ordinary weights as arcs, reversed when computing distances to Z,
/// in deterministic `(source, target)` id order.
fn arcs(g: &TNGraph, reverse: bool) -> Vec<Arc> {
    let mut arcs: Vec<Arc> = g
        .edge_ids()
        .filter_map(|id| {
            g.edge(id).value.finite().map(|w| {
                let (u, v) = (g.source(id), g.target(id));
                if reverse {
                    Arc {
                        source: v,
                        target: u,
                        weight: w,
                    }
                } else {
                    Arc {
                        source: u,
                        target: v,
                        weight: w,
                    }
                }
            })
        })
        .collect();
    arcs.sort_by_key(|a| (a.source, a.target));
    arcs
}

/// Bellman-Ford on the reverse graph, rooted at Z.
///
/// `|V| − 1` relaxation passes; one extra pass detects a negative cycle,
/// reconstructed from the predecessor pointers. After initialization Z
/// reaches every node on the reverse graph, so any negative cycle of the
/// network is visible from it.
pub(crate) fn bellman_ford_to_z(g: &TNGraph, deadline: &Deadline) -> StnOutcome {
    let z = g.z().expect("initialized graph");
    let arcs = arcs(g, true);
    let mut dist: IdMap<NodeId, IntCst> = IdMap::new();
    let mut pred: IdMap<NodeId, NodeId> = IdMap::new();
    dist.insert(z, 0);

    let n = g.num_nodes();
    let mut ticks = 0u32;
    for _pass in 0..n.saturating_sub(1) {
        let mut changed = false;
        for a in &arcs {
            ticks += 1;
            if ticks % DEADLINE_PERIOD == 0 && deadline.expired() {
                return StnOutcome::Timeout;
            }
            let Some(&du) = dist.get(a.source) else { continue };
            let candidate = du + a.weight;
            if dist.get(a.target).is_none_or(|&dv| candidate < dv) {
                dist.insert(a.target, candidate);
                pred.insert(a.target, a.source);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // one extra pass: any improvement witnesses a negative cycle
    for a in &arcs {
        let Some(&du) = dist.get(a.source) else { continue };
        if dist.get(a.target).is_none_or(|&dv| du + a.weight < dv) {
            pred.insert(a.target, a.source);
            return StnOutcome::Inconsistent(extract_cycle(g, &pred, a.target, true));
        }
    }
    StnOutcome::Consistent(dist)
}

/// Walks the predecessor pointers from a node known to be improvable until a
/// node repeats, then collects the cycle. When the pointers come from a
/// reverse-graph run the node order is flipped so that consecutive pairs are
/// edges of the original graph.
fn extract_cycle(g: &TNGraph, pred: &IdMap<NodeId, NodeId>, from: NodeId, reverse: bool) -> NegativeCycle {
    // walk the predecessor pointers until a node repeats; the repeated suffix
    // is the cycle
    let mut position: IdMap<NodeId, usize> = IdMap::new();
    let mut walk = vec![from];
    position.insert(from, 0);
    let mut nodes = loop {
        let v = *walk.last().unwrap();
        let u = *pred.get(v).expect("predecessor on improving path");
        if let Some(&i) = position.get(u) {
            let mut cycle = walk.split_off(i);
            cycle.push(u);
            break cycle;
        }
        position.insert(u, walk.len());
        walk.push(u);
    };
    if !reverse {
        nodes.reverse();
    }
    let total = nodes
        .windows(2)
        .map(|w| {
            let e = g.edge_between(w[0], w[1]).expect("cycle edge");
            g.edge(e).value.unwrap()
        })
        .sum();
    NegativeCycle { nodes, total }
}

/// An element of the Dijkstra queue: a node and its tentative distance.
/// The `Ord` implementation turns the max-heap into a min-heap on distances.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
struct HeapElem {
    dist: IntCst,
    node: NodeId,
}

impl PartialOrd for HeapElem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapElem {
    fn cmp(&self, other: &Self) -> Ordering {
        Reverse((self.dist, self.node)).cmp(&Reverse((other.dist, other.node)))
    }
}

/// Dijkstra on the reverse graph from Z. Only applicable when every weight is
/// non-negative; the caller has validated this.
pub(crate) fn dijkstra_to_z(g: &TNGraph) -> IdMap<NodeId, IntCst> {
    let z = g.z().expect("initialized graph");
    dijkstra_from(g, z, true, |_, w| w)
}

/// Dijkstra from `origin`, with a per-arc reweighting hook (used by Johnson's
/// reduced costs). `reweight(arc, w)` must be non-negative.
fn dijkstra_from(g: &TNGraph, origin: NodeId, reverse: bool, reweight: impl Fn(EdgeId, IntCst) -> IntCst) -> IdMap<NodeId, IntCst> {
    let mut dist: IdMap<NodeId, IntCst> = IdMap::new();
    let mut settled: IdMap<NodeId, ()> = IdMap::new();
    let mut queue: BinaryHeap<HeapElem> = BinaryHeap::new();
    dist.insert(origin, 0);
    queue.push(HeapElem { dist: 0, node: origin });

    while let Some(HeapElem { dist: du, node: u }) = queue.pop() {
        if settled.contains(u) {
            continue;
        }
        settled.insert(u, ());
        let edges: Vec<EdgeId> = if reverse {
            g.in_edges(u).collect()
        } else {
            g.out_edges(u).collect()
        };
        for id in edges {
            let Some(w) = g.edge(id).value.finite() else { continue };
            let w = reweight(id, w);
            debug_assert!(w >= 0, "negative weight in Dijkstra");
            let v = if reverse { g.source(id) } else { g.target(id) };
            let candidate = du + w;
            if dist.get(v).is_none_or(|&dv| candidate < dv) {
                dist.insert(v, candidate);
                queue.push(HeapElem { dist: candidate, node: v });
            }
        }
    }
    dist
}

/// All-pairs shortest paths, `dist[u][v]` indexed by node id.
pub(crate) struct ApspMatrix {
    pub dist: Vec<Vec<Option<IntCst>>>,
}

impl ApspMatrix {
    pub fn get(&self, u: NodeId, v: NodeId) -> Option<IntCst> {
        self.dist[usize::from(u)][usize::from(v)]
    }
}

/// Johnson's algorithm: potentials from a virtual source (Bellman-Ford over
/// the forward graph with an all-zero initialization), then one Dijkstra per
/// node on reduced costs.
pub(crate) fn johnson(g: &TNGraph, deadline: &Deadline) -> Result<ApspMatrix, StnOutcome> {
    let arcs = arcs(g, false);
    let n = g.num_nodes();

    // virtual source: every node starts at 0, as if a fresh source had a
    // 0-edge to each of them
    let mut pot: IdMap<NodeId, IntCst> = IdMap::new();
    let mut pred: IdMap<NodeId, NodeId> = IdMap::new();
    for v in g.node_ids() {
        pot.insert(v, 0);
    }
    let mut ticks = 0u32;
    for _pass in 0..n.saturating_sub(1) {
        let mut changed = false;
        for a in &arcs {
            ticks += 1;
            if ticks % DEADLINE_PERIOD == 0 && deadline.expired() {
                return Err(StnOutcome::Timeout);
            }
            let candidate = pot[a.source] + a.weight;
            if candidate < pot[a.target] {
                pot.insert(a.target, candidate);
                pred.insert(a.target, a.source);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    for a in &arcs {
        if pot[a.source] + a.weight < pot[a.target] {
            pred.insert(a.target, a.source);
            return Err(StnOutcome::Inconsistent(extract_cycle(g, &pred, a.target, false)));
        }
    }

    let mut dist = vec![vec![None; n]; n];
    for u in g.node_ids() {
        let du = dijkstra_from(g, u, false, |id, w| w + pot[g.source(id)] - pot[g.target(id)]);
        for (v, &reduced) in du.entries() {
            dist[usize::from(u)][usize::from(v)] = Some(reduced - pot[u] + pot[v]);
        }
    }
    Ok(ApspMatrix { dist })
}

/// Floyd-Warshall in `O(n³)`, with successor-matrix cycle reconstruction.
pub(crate) fn floyd_warshall(g: &TNGraph, deadline: &Deadline) -> Result<ApspMatrix, StnOutcome> {
    let n = g.num_nodes();
    let mut dist = vec![vec![None; n]; n];
    let mut next: Vec<Vec<Option<usize>>> = vec![vec![None; n]; n];
    for v in 0..n {
        dist[v][v] = Some(0);
        next[v][v] = Some(v);
    }
    for a in arcs(g, false) {
        let (u, v) = (usize::from(a.source), usize::from(a.target));
        if dist[u][v].is_none_or(|d| a.weight < d) {
            dist[u][v] = Some(a.weight);
            next[u][v] = Some(v);
        }
    }
    for k in 0..n {
        if deadline.expired() {
            return Err(StnOutcome::Timeout);
        }
        for i in 0..n {
            let Some(dik) = dist[i][k] else { continue };
            for j in 0..n {
                let Some(dkj) = dist[k][j] else { continue };
                if dist[i][j].is_none_or(|d| dik + dkj < d) {
                    dist[i][j] = Some(dik + dkj);
                    next[i][j] = next[i][k];
                }
            }
        }
        // a negative diagonal entry appears as soon as the cycle closes
        for v in 0..n {
            if dist[v][v].is_some_and(|d| d < 0) {
                return Err(StnOutcome::Inconsistent(cycle_from_next(g, &next, v)));
            }
        }
    }
    Ok(ApspMatrix { dist })
}

fn cycle_from_next(g: &TNGraph, next: &[Vec<Option<usize>>], start: usize) -> NegativeCycle {
    let mut nodes = vec![NodeId::from(start)];
    let mut v = next[start][start].expect("successor on negative cycle");
    while v != start {
        nodes.push(NodeId::from(v));
        v = next[v][start].expect("successor on negative cycle");
    }
    nodes.push(NodeId::from(start));
    let total = nodes
        .windows(2)
        .map(|w| g.edge(g.edge_between(w[0], w[1]).expect("cycle edge")).value.unwrap())
        .sum();
    NegativeCycle { nodes, total }
}

/// Replaces `g` by its minimal distance graph: one edge per ordered pair with
/// a finite shortest path, weighted by that path.
pub(crate) fn install_minimal_distance_graph(g: &mut TNGraph, apsp: &ApspMatrix) {
    let ids: Vec<NodeId> = g.node_ids().collect();
    for id in g.edge_ids().collect::<Vec<_>>() {
        g.remove_edge(id);
    }
    for &u in &ids {
        for &v in &ids {
            if u == v {
                continue;
            }
            if let Some(d) = apsp.get(u, v) {
                let e = g.add_ordinary_edge(u, v, d);
                g.edge_mut(e).kind = ConstraintType::Derived;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::checkers::CheckStatus;
    use crate::checkers::init::init_and_check;

    fn triangle() -> TNGraph {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        g.add_ordinary_edge(a, b, 5);
        g.add_ordinary_edge(b, a, -2);
        let mut st = CheckStatus::default();
        init_and_check(&mut g, &mut st, false).unwrap();
        g
    }

    #[test]
    fn distances_to_z() {
        let g = triangle();
        let deadline = Deadline::start(None);
        let StnOutcome::Consistent(dist) = bellman_ford_to_z(&g, &deadline) else {
            panic!("expected consistency");
        };
        let a = g.node_id("A").unwrap();
        let b = g.node_id("B").unwrap();
        let z = g.node_id("Z").unwrap();
        assert_eq!(dist[z], 0);
        assert_eq!(dist[a], 0);
        assert_eq!(dist[b], -2);
    }

    #[test]
    fn johnson_and_floyd_warshall_agree() {
        let g = triangle();
        let deadline = Deadline::start(None);
        let j = johnson(&g, &deadline).ok().unwrap();
        let fw = floyd_warshall(&g, &deadline).ok().unwrap();
        for u in g.node_ids() {
            for v in g.node_ids() {
                if u != v {
                    assert_eq!(j.get(u, v), fw.get(u, v), "{u:?} -> {v:?}");
                }
            }
        }
    }

    #[test]
    fn negative_cycle_is_reconstructed() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        g.add_ordinary_edge(a, b, 3);
        g.add_ordinary_edge(b, a, -4);
        let mut st = CheckStatus::default();
        init_and_check(&mut g, &mut st, false).unwrap();
        let deadline = Deadline::start(None);
        let StnOutcome::Inconsistent(cycle) = bellman_ford_to_z(&g, &deadline) else {
            panic!("expected a negative cycle");
        };
        assert_eq!(cycle.total, -1);
        assert_eq!(cycle.nodes.len(), 3);
        assert_eq!(cycle.nodes.first(), cycle.nodes.last());
        let names: Vec<&str> = cycle.nodes.iter().map(|&n| g.node(n).name()).collect();
        assert!(names.contains(&"A") && names.contains(&"B"));
    }
}
