//! Simple Temporal Network consistency checking.

pub(crate) mod apsp;
pub(crate) mod dispatch;

use crate::checkers::init::init_and_check;
use crate::checkers::stn::apsp::StnOutcome;
use crate::checkers::{CheckError, CheckStatus, Deadline, StnAlg, StnConfig};
use crate::collections::ref_store::IdMap;
use crate::core::IntCst;
use crate::graph::{NodeId, TNGraph};
use crate::io::luke::{write_file, NetworkKind};
use std::path::Path;
use std::time::Duration;

/// STN algorithm object: owns a graph, a configuration and the status of the
/// last check.
pub struct Stn {
    g: TNGraph,
    pub config: StnConfig,
    status: CheckStatus,
    distances: Option<IdMap<NodeId, IntCst>>,
}

impl Stn {
    pub fn new(g: TNGraph) -> Stn {
        Stn::with_config(g, StnConfig::default())
    }

    pub fn with_timeout(g: TNGraph, seconds: u64) -> Stn {
        let config = StnConfig {
            time_budget: Some(Duration::from_secs(seconds)),
            ..StnConfig::default()
        };
        Stn::with_config(g, config)
    }

    pub fn with_config(g: TNGraph, config: StnConfig) -> Stn {
        Stn {
            g,
            config,
            status: CheckStatus::default(),
            distances: None,
        }
    }

    /// Normalizes the owned graph into standard form and validates it.
    pub fn init_and_check(&mut self) -> Result<&CheckStatus, CheckError> {
        init_and_check(&mut self.g, &mut self.status, false)?;
        Ok(&self.status)
    }

    /// Runs the configured consistency algorithm. Distances against Z are
    /// retained and, for the all-pairs algorithms, the owned graph is
    /// replaced by its minimal distance form.
    pub fn consistency_check(&mut self) -> Result<&CheckStatus, CheckError> {
        if !self.status.initialized {
            self.init_and_check()?;
        }
        let deadline = Deadline::start(self.config.time_budget);
        let outcome = match self.config.alg {
            StnAlg::BellmanFord => apsp::bellman_ford_to_z(&self.g, &deadline),
            StnAlg::Dijkstra => {
                if let Some(id) = self.g.edge_ids().find(|&id| self.g.edge(id).value.finite().is_some_and(|w| w < 0)) {
                    return Err(CheckError::UnsupportedConfiguration(format!(
                        "Dijkstra on a graph with negative edge {}",
                        self.g.edge(id).name()
                    )));
                }
                StnOutcome::Consistent(apsp::dijkstra_to_z(&self.g))
            }
            StnAlg::Johnson | StnAlg::FloydWarshall => {
                let computed = match self.config.alg {
                    StnAlg::Johnson => apsp::johnson(&self.g, &deadline),
                    _ => apsp::floyd_warshall(&self.g, &deadline),
                };
                match computed {
                    Ok(matrix) => {
                        let z = self.g.z().expect("initialized graph");
                        let mut dist = IdMap::new();
                        for v in self.g.node_ids() {
                            if let Some(d) = matrix.get(v, z) {
                                dist.insert(v, d);
                            }
                        }
                        apsp::install_minimal_distance_graph(&mut self.g, &matrix);
                        StnOutcome::Consistent(dist)
                    }
                    Err(outcome) => outcome,
                }
            }
        };
        self.record(outcome, &deadline);
        Ok(&self.status)
    }

    fn record(&mut self, outcome: StnOutcome, deadline: &Deadline) {
        self.status.execution_time = deadline.elapsed();
        match outcome {
            StnOutcome::Consistent(dist) => {
                self.distances = Some(dist);
                self.status.finished = true;
                self.status.consistent = Some(true);
            }
            StnOutcome::Inconsistent(cycle) => {
                self.status.finished = true;
                self.status.consistent = Some(false);
                self.status.negative_cycle = Some(cycle);
            }
            StnOutcome::Timeout => {
                self.status.finished = false;
                self.status.timeout = true;
            }
        }
    }

    /// Rewrites the owned graph into Muscettola minimal dispatchable form.
    /// Returns false (with the witness in the status) when the network is
    /// inconsistent.
    pub fn apply_minimal_dispatchable(&mut self) -> Result<bool, CheckError> {
        if !self.status.initialized {
            self.init_and_check()?;
        }
        let deadline = Deadline::start(self.config.time_budget);
        match apsp::johnson(&self.g, &deadline) {
            Ok(matrix) => {
                apsp::install_minimal_distance_graph(&mut self.g, &matrix);
                let removed = dispatch::minimize_dispatchable(&mut self.g, &matrix);
                tracing::debug!("dispatchability minimization removed {removed} edges");
                self.status.finished = true;
                self.status.consistent = Some(true);
                self.status.execution_time = deadline.elapsed();
                Ok(true)
            }
            Err(outcome) => {
                self.record(outcome, &deadline);
                Ok(false)
            }
        }
    }

    /// Distance from `node` to Z computed by the last successful check.
    pub fn distance_to_z(&self, node: NodeId) -> Option<IntCst> {
        self.distances.as_ref().and_then(|d| d.get(node).copied())
    }

    pub fn graph(&self) -> &TNGraph {
        &self.g
    }

    /// Replaces the owned graph, clearing the status and every cache.
    pub fn set_graph(&mut self, g: TNGraph) {
        self.g = g;
        self.reset();
    }

    /// A copy of the owned graph in its current (possibly checked) form.
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
        self.distances = None;
    }

    pub fn save_graph_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        write_file(path, &self.g, NetworkKind::Stn)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn simple() -> TNGraph {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let b = g.add_named("B").unwrap();
        g.add_ordinary_edge(a, b, 5);
        g.add_ordinary_edge(b, a, -2);
        g
    }

    #[test]
    fn all_algorithms_agree_on_consistency() {
        for alg in [StnAlg::BellmanFord, StnAlg::Johnson, StnAlg::FloydWarshall] {
            let mut stn = Stn::with_config(
                simple(),
                StnConfig {
                    alg,
                    time_budget: None,
                },
            );
            let status = stn.consistency_check().unwrap();
            assert_eq!(status.consistent, Some(true), "{alg:?}");
            let a = stn.graph().node_id("A").unwrap();
            let b = stn.graph().node_id("B").unwrap();
            assert_eq!(stn.distance_to_z(a), Some(0), "{alg:?}");
            assert_eq!(stn.distance_to_z(b), Some(-2), "{alg:?}");
        }
    }

    #[test]
    fn dijkstra_refuses_negative_weights() {
        let mut stn = Stn::with_config(
            simple(),
            StnConfig {
                alg: StnAlg::Dijkstra,
                time_budget: None,
            },
        );
        assert!(matches!(
            stn.consistency_check(),
            Err(CheckError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn apsp_is_idempotent() {
        let mut stn = Stn::with_config(
            simple(),
            StnConfig {
                alg: StnAlg::Johnson,
                time_budget: None,
            },
        );
        stn.consistency_check().unwrap();
        let first: Vec<_> = edge_list(stn.graph());
        stn.status.reset();
        stn.status.initialized = true;
        stn.consistency_check().unwrap();
        assert_eq!(first, edge_list(stn.graph()));
    }

    fn edge_list(g: &TNGraph) -> Vec<(String, String, IntCst)> {
        let mut v: Vec<_> = g
            .edge_ids()
            .map(|id| {
                (
                    g.node(g.source(id)).name().to_string(),
                    g.node(g.target(id)).name().to_string(),
                    g.edge(id).value.unwrap(),
                )
            })
            .collect();
        v.sort();
        v
    }
}
